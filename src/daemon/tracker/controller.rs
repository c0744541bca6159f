use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::info;

use crate::{daemon::storage::database::Database, utils::clock::Clock, window_api::SystemProbe};

use super::{
    close_active_session,
    events::{EventChannel, TrackerEvent, TrackerStatus},
    EngineSignals, SessionSlot, TrackerEngine,
};

/// Runs the engine on its own task and exposes the inbound command surface:
/// pause, resume, stop and intent-tag updates. Every command is safe to call
/// while a tick is in flight; the store's per-call atomicity is the only
/// synchronization the shared pieces need.
pub struct TrackerController {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    events: EventChannel,
    signals: Arc<EngineSignals>,
    slot: Arc<SessionSlot>,
    handle: JoinHandle<Result<()>>,
}

impl TrackerController {
    pub fn spawn(db: Arc<Database>, probe: Box<dyn SystemProbe>, clock: Arc<dyn Clock>) -> Self {
        let events = EventChannel::new(64);
        let signals = Arc::new(EngineSignals::new());
        let slot: Arc<SessionSlot> = Arc::new(Mutex::new(None));
        let engine = TrackerEngine::new(
            db.clone(),
            probe,
            clock.clone(),
            events.clone(),
            signals.clone(),
            slot.clone(),
        );
        let handle = tokio::spawn(engine.run());
        Self {
            db,
            clock,
            events,
            signals,
            slot,
            handle,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Stops sampling until [resume](Self::resume). The open session is
    /// closed right here on the caller's context, so the pause is durable
    /// immediately instead of at the next tick.
    pub fn pause(&self) -> Result<()> {
        self.signals.set_paused(true);
        close_active_session(&self.db, &self.slot, self.clock.now(), &self.events)?;
        self.events
            .emit(TrackerEvent::StatusChanged(TrackerStatus::Paused));
        info!("Tracking paused");
        Ok(())
    }

    pub fn resume(&self) {
        self.signals.set_paused(false);
        self.events
            .emit(TrackerEvent::StatusChanged(TrackerStatus::Running));
        info!("Tracking resumed");
    }

    /// Requests a cooperative stop; the loop exits within one sleep slice.
    pub fn stop(&self) {
        self.signals.request_stop();
    }

    /// Waits for the loop to exit after [stop](Self::stop).
    pub async fn join(self) -> Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("Tracker task terminated abnormally {e:?}")),
        }
    }

    /// Applies a prompt answer. The session may have been closed or even
    /// deleted since the prompt fired; the tag lands on whichever row still
    /// has the id, and silently nowhere otherwise.
    pub fn set_intent_tag(&self, session_id: i64, intent_tag: &str) -> Result<()> {
        self.db.update_session_intent(session_id, intent_tag)
    }
}
