//! The tracking engine. Once per sampling interval it reads the idle probe
//! and the foreground window, classifies what it sees and maintains the
//! single currently-open session row. Everything durable goes through
//! [Database] eagerly; a crash can only ever lose the final extension of the
//! open session.

pub mod controller;
pub mod events;
pub mod idle;
pub mod prompt;
pub mod rules;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    daemon::storage::{database::Database, entities::NewSession, settings::Settings},
    utils::clock::Clock,
    window_api::{ForegroundApp, SystemProbe},
};

use self::{
    events::{EventChannel, TrackerEvent, TrackerStatus},
    idle::evaluate_idle,
    prompt::should_prompt,
    rules::{apply_rules, AppContext, IDLE_CATEGORY},
};

/// Sleep slice used while paused, keeping stop latency low.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A tick gap above this multiple of the sampling interval means the loop
/// was not running (suspend, or the tail of an idle window); the lost time
/// is recorded as an idle span.
const SLEEP_GAP_FACTOR: u32 = 3;

/// The session currently being extended. At most one exists at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: i64,
    pub start_ts: DateTime<Utc>,
    /// Observed values kept verbatim for change detection. The persisted row
    /// may differ: empty process names are stored as "Unknown".
    pub process_name: String,
    pub window_title: String,
    pub exe_path: String,
    pub category: String,
}

/// Slot holding the open session. Shared with the controller so that pausing
/// can close the session from the caller's execution context.
pub type SessionSlot = Mutex<Option<ActiveSession>>;

pub(crate) fn lock_slot(slot: &SessionSlot) -> MutexGuard<'_, Option<ActiveSession>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Pause/stop signals crossing the controller/engine boundary. Both are
/// single-writer flags read once per loop slice; no further locking needed.
pub struct EngineSignals {
    paused: AtomicBool,
    shutdown: CancellationToken,
}

impl EngineSignals {
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.shutdown.cancel();
    }

    pub async fn stopped(&self) {
        self.shutdown.cancelled().await;
    }
}

impl Default for EngineSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Finishes the open session, if any: rewrites its end bound to `now`,
/// clamped so clock skew can't produce a negative duration, and empties the
/// slot. Callable from any execution context; an empty slot is a no-op.
pub(crate) fn close_active_session(
    db: &Database,
    slot: &SessionSlot,
    now: DateTime<Utc>,
    events: &EventChannel,
) -> Result<()> {
    let Some(active) = lock_slot(slot).take() else {
        return Ok(());
    };
    let duration = (now - active.start_ts).num_seconds().max(0);
    db.update_session_end(active.session_id, now, duration)?;
    events.emit(TrackerEvent::SessionsChanged);
    Ok(())
}

pub struct TrackerEngine {
    db: Arc<Database>,
    probe: Box<dyn SystemProbe>,
    clock: Arc<dyn Clock>,
    events: EventChannel,
    signals: Arc<EngineSignals>,
    slot: Arc<SessionSlot>,
}

impl TrackerEngine {
    pub fn new(
        db: Arc<Database>,
        probe: Box<dyn SystemProbe>,
        clock: Arc<dyn Clock>,
        events: EventChannel,
        signals: Arc<EngineSignals>,
        slot: Arc<SessionSlot>,
    ) -> Self {
        Self {
            db,
            probe,
            clock,
            events,
            signals,
            slot,
        }
    }

    /// Executes the sampling loop until stop is requested. Ticks are
    /// strictly sequential; the sleep starts only after the full
    /// classify-and-persist cycle finished.
    pub async fn run(mut self) -> Result<()> {
        info!("Tracker loop starting");
        self.events
            .emit(TrackerEvent::StatusChanged(TrackerStatus::Running));
        let mut last_tick = self.clock.instant();
        loop {
            if self.signals.is_paused() {
                // The pause call already closed the session. Keep the gap
                // reference fresh so resuming doesn't fabricate an idle span.
                last_tick = self.clock.instant();
                tokio::select! {
                    _ = self.signals.stopped() => break,
                    _ = self.clock.sleep(PAUSE_POLL_INTERVAL) => continue,
                }
            }

            let settings = match Settings::load(&self.db) {
                Ok(v) => v,
                Err(e) => {
                    error!("Can't read settings, skipping this tick {e:?}");
                    tokio::select! {
                        _ = self.signals.stopped() => break,
                        _ = self.clock.sleep(PAUSE_POLL_INTERVAL) => continue,
                    }
                }
            };

            let now = self.clock.instant();
            let gap = now - last_tick;
            last_tick = now;

            if let Err(e) = self.tick(&settings, gap) {
                // Losing one session boundary beats taking the tracker down.
                error!("Tick failed {e:?}");
            }

            tokio::select! {
                _ = self.signals.stopped() => break,
                _ = self.clock.sleep(settings.sampling_interval()) => {}
            }
        }

        let result = close_active_session(&self.db, &self.slot, self.clock.now(), &self.events);
        self.events
            .emit(TrackerEvent::StatusChanged(TrackerStatus::Stopped));
        info!("Tracker loop stopped");
        result
    }

    /// One classify-and-persist cycle. `gap` is the wall-clock distance to
    /// the previous tick.
    fn tick(&mut self, settings: &Settings, gap: Duration) -> Result<()> {
        let status = evaluate_idle(self.probe.idle_seconds(), settings.idle_threshold_secs());
        let now = self.clock.now();
        let gap_secs = gap.as_secs() as i64;

        if status.is_idle {
            debug!(idle_seconds = status.idle_seconds, "User is idle");
            close_active_session(&self.db, &self.slot, now, &self.events)?;
            if gap_secs > 0 {
                self.record_idle_span(now, gap_secs)?;
            }
            return Ok(());
        }

        if gap > settings.sampling_interval() * SLEEP_GAP_FACTOR {
            // The loop was not running for a stretch. Account for the lost
            // time before tracking the current app.
            close_active_session(&self.db, &self.slot, now, &self.events)?;
            self.record_idle_span(now, gap_secs)?;
        }

        let app = self.probe.foreground_app();
        let rules = self.db.list_rules()?;
        let context = AppContext::new(app.process_name.clone(), app.window_title.clone());
        let category = apply_rules(&rules, &context);

        let same_pair = lock_slot(&self.slot).as_ref().is_some_and(|active| {
            active.process_name == app.process_name && active.window_title == app.window_title
        });

        if same_pair {
            self.extend_active(now)
        } else {
            close_active_session(&self.db, &self.slot, now, &self.events)?;
            self.open_session(settings, now, app, category)
        }
    }

    fn open_session(
        &self,
        settings: &Settings,
        now: DateTime<Utc>,
        app: ForegroundApp,
        category: String,
    ) -> Result<()> {
        let record = NewSession {
            start_ts: now,
            end_ts: now,
            duration_sec: 0,
            process_name: if app.process_name.is_empty() {
                "Unknown".to_string()
            } else {
                app.process_name.clone()
            },
            exe_path: app.exe_path.clone(),
            window_title: app.window_title.clone(),
            category: category.clone(),
            intent_tag: None,
        };
        let session_id = self.db.add_session(&record)?;
        *lock_slot(&self.slot) = Some(ActiveSession {
            session_id,
            start_ts: now,
            process_name: app.process_name,
            window_title: app.window_title,
            exe_path: app.exe_path,
            category: category.clone(),
        });
        self.events.emit(TrackerEvent::SessionsChanged);

        let local_time = now.with_timezone(&chrono::Local).time();
        if should_prompt(settings, &category, local_time) {
            debug!(session_id, category = %category, "Prompting for intent");
            self.events.emit(TrackerEvent::PromptNeeded {
                session_id,
                category,
            });
        }
        Ok(())
    }

    fn extend_active(&self, now: DateTime<Utc>) -> Result<()> {
        let Some((session_id, start_ts)) = lock_slot(&self.slot)
            .as_ref()
            .map(|active| (active.session_id, active.start_ts))
        else {
            return Ok(());
        };
        let duration = (now - start_ts).num_seconds().max(0);
        self.db.update_session_end(session_id, now, duration)?;
        self.events.emit(TrackerEvent::SessionsChanged);
        Ok(())
    }

    /// Writes one synthetic idle session covering exactly `gap_secs` ending
    /// at `end`.
    fn record_idle_span(&self, end: DateTime<Utc>, gap_secs: i64) -> Result<()> {
        let start = end - chrono::Duration::seconds(gap_secs);
        self.db.add_session(&NewSession {
            start_ts: start,
            end_ts: end,
            duration_sec: gap_secs,
            process_name: String::new(),
            exe_path: String::new(),
            window_title: String::new(),
            category: IDLE_CATEGORY.to_string(),
            intent_tag: None,
        })?;
        self.events.emit(TrackerEvent::SessionsChanged);
        Ok(())
    }
}
