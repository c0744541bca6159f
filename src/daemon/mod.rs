use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use tracing::{debug, error, info};

use crate::{
    utils::clock::SystemClock,
    window_api::GenericProbe,
};

use self::{
    storage::{database::Database, settings::Settings, DB_FILE_NAME},
    tracker::controller::TrackerController,
};

pub mod args;
pub mod shutdown;
pub mod storage;
pub mod tracker;

/// Represents the starting point for the daemon: opens the store, runs the
/// startup retention sweep, spawns the tracker and waits for a shutdown
/// request.
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    let db = Arc::new(Database::open(&dir.join(DB_FILE_NAME))?);
    db.ensure_default_rules()?;

    let settings = Settings::load(&db)?;
    let removed = db.cleanup_retention(settings.retention_days)?;
    if removed > 0 {
        info!("Retention cleanup removed {removed} expired sessions");
    }

    let probe = GenericProbe::new()?;
    let controller = TrackerController::spawn(db, Box::new(probe), Arc::new(SystemClock));

    let mut events = controller.subscribe();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(?event, "Tracker event");
        }
    });

    shutdown::wait_for_shutdown().await;
    info!("Shutdown requested");

    controller.stop();
    let result = controller.join().await;
    event_log.abort();
    if let Err(e) = &result {
        error!("Tracker loop ended with an error {:?}", e);
    }
    result
}

#[cfg(test)]
mod daemon_tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{Duration as ChronoDuration, Utc};
    use tempfile::tempdir;

    use crate::{
        daemon::{
            storage::{database::Database, DB_FILE_NAME},
            tracker::controller::TrackerController,
        },
        utils::{clock::SystemClock, logging::TEST_LOGGING},
        window_api::{ForegroundApp, MockSystemProbe},
    };

    fn test_items() -> Vec<ForegroundApp> {
        vec![
            ForegroundApp {
                process_name: "chrome.exe".into(),
                window_title: "YouTube - Cat Video".into(),
                exe_path: "C:\\apps\\chrome.exe".into(),
            },
            ForegroundApp {
                process_name: "chrome.exe".into(),
                window_title: "YouTube - Cat Video".into(),
                exe_path: "C:\\apps\\chrome.exe".into(),
            },
            ForegroundApp {
                process_name: "code.exe".into(),
                window_title: "main.py - editor".into(),
                exe_path: "C:\\apps\\code.exe".into(),
            },
        ]
    }

    /// Very simple smoke test to check that the wiring holds together: a
    /// file-backed database, the default rules, the controller task and a
    /// mocked desktop.
    #[tokio::test]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let db = Arc::new(Database::open(&dir.path().join(DB_FILE_NAME))?);
        db.ensure_default_rules()?;

        let mut probe = MockSystemProbe::new();
        probe.expect_idle_seconds().returning(|| 0);
        let mut items = test_items().into_iter().cycle();
        probe
            .expect_foreground_app()
            .returning(move || items.next().unwrap())
            .times(..7);

        let controller =
            TrackerController::spawn(db.clone(), Box::new(probe), Arc::new(SystemClock));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        controller.stop();
        controller.join().await?;

        let sessions = db.fetch_sessions(
            Utc::now() - ChronoDuration::hours(1),
            Utc::now() + ChronoDuration::hours(1),
        )?;
        assert!(sessions.len() >= 2);
        // The default rules classify the YouTube tab, the editor falls back.
        assert!(sessions.iter().any(|s| s.category == "Video"));
        assert!(sessions.iter().any(|s| s.category == "Other"));
        Ok(())
    }
}
