//! Events delivered to the dashboard.
//!
//! Input and lifecycle events come from the terminal layer; historian
//! messages and state changes come from the historian connection thread.
//! All of them share one [`UiEvent`] type so the application can drain a
//! single ordered stream.

use std::sync::mpsc::Sender;

use crate::historian::HistorianState;
use crate::jsondom::Node;

/// Physical buttons of the dashboard (arrow keys and Enter on a terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Middle,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// The user or the process asked to exit.
    Quit,
    KeyPress(Key),
    TextInput(String),
    /// An unsolicited message pushed by the historian. The receiver owns it.
    HistorianMessage(Node),
    HistorianStateChange {
        old: HistorianState,
        new: HistorianState,
    },
}

/// Receiver of historian events.
///
/// Called on the historian connection thread, in arrival order. Handlers
/// must return promptly: while one runs, no further message is read and no
/// pending command can receive its response.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: UiEvent);
}

/// Forward events into a channel drained by the UI thread.
impl EventHandler for Sender<UiEvent> {
    fn on_event(&self, event: UiEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Event receiver gone; dropping historian event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_channel_handler_preserves_order() {
        let (tx, rx) = mpsc::channel();
        let handler: &dyn EventHandler = &tx;

        handler.on_event(UiEvent::HistorianStateChange {
            old: HistorianState::Unconnected,
            new: HistorianState::ConnectedWaiting,
        });
        handler.on_event(UiEvent::HistorianMessage(Node::Null));

        assert!(matches!(
            rx.recv().unwrap(),
            UiEvent::HistorianStateChange { .. }
        ));
        assert_eq!(rx.recv().unwrap(), UiEvent::HistorianMessage(Node::Null));
    }

    #[test]
    fn test_channel_handler_tolerates_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        tx.on_event(UiEvent::Quit);
    }
}
