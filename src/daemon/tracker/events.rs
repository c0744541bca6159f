use std::fmt::Display;

use tokio::sync::broadcast;

/// Coarse run state of the tracker, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Running,
    Paused,
    Stopped,
}

impl Display for TrackerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerStatus::Running => write!(f, "Running"),
            TrackerStatus::Paused => write!(f, "Paused"),
            TrackerStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Notifications the tracker pushes to whoever is listening. Presentation
/// code subscribes to refresh its views; nothing in the tracker waits for a
/// consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Some session row was opened, extended or closed.
    SessionsChanged,
    /// A distraction session opened inside the focus window; the user should
    /// be asked what they intend. The answer comes back asynchronously as an
    /// intent-tag update.
    PromptNeeded { session_id: i64, category: String },
    StatusChanged(TrackerStatus),
}

/// Broadcast fan-out for [TrackerEvent]. Every subscriber sees events in
/// emission order; emitting with no subscribers is fine.
#[derive(Clone)]
pub struct EventChannel {
    sender: broadcast::Sender<TrackerEvent>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: TrackerEvent) {
        // An error only means nobody is listening right now.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::{EventChannel, TrackerEvent, TrackerStatus};

    #[test]
    fn subscribers_see_events_in_emission_order() {
        let channel = EventChannel::new(8);
        let mut receiver = channel.subscribe();

        channel.emit(TrackerEvent::SessionsChanged);
        channel.emit(TrackerEvent::StatusChanged(TrackerStatus::Paused));

        assert_eq!(receiver.try_recv().unwrap(), TrackerEvent::SessionsChanged);
        assert_eq!(
            receiver.try_recv().unwrap(),
            TrackerEvent::StatusChanged(TrackerStatus::Paused)
        );
    }

    #[test]
    fn emitting_without_subscribers_does_not_panic() {
        let channel = EventChannel::new(8);
        channel.emit(TrackerEvent::SessionsChanged);
    }

    #[test]
    fn status_text_matches_presentation() {
        assert_eq!(TrackerStatus::Running.to_string(), "Running");
        assert_eq!(TrackerStatus::Paused.to_string(), "Paused");
        assert_eq!(TrackerStatus::Stopped.to_string(), "Stopped");
    }
}
