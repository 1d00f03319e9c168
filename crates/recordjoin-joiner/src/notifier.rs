use tokio::sync::broadcast;
use tracing::debug;

/// Fired once per mutating operation of the joiner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinerEvent {
    /// Increases by one with every event
    pub revision: u64,
}

/// Change notification channel. While held, notifications are collected
/// and delivered as a single event on the final release.
#[derive(Debug)]
pub struct Notifier {
    sender: broadcast::Sender<JoinerEvent>,
    held: usize,
    pending: bool,
    revision: u64,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            held: 0,
            pending: false,
            revision: 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JoinerEvent> {
        self.sender.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns whether an event was delivered right away
    pub fn notify(&mut self) -> bool {
        if self.held > 0 {
            self.pending = true;
            return false;
        }
        self.fire();
        true
    }

    pub fn hold(&mut self) {
        self.held += 1;
    }

    /// Returns whether the release delivered the collected event
    pub fn release(&mut self) -> bool {
        self.held = self.held.saturating_sub(1);
        if self.held == 0 && self.pending {
            self.pending = false;
            self.fire();
            return true;
        }
        false
    }

    /// Run `f` with notifications coalesced into at most one event
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.hold();
        let result = f(self);
        self.release();
        result
    }

    fn fire(&mut self) {
        self.revision += 1;
        let event = JoinerEvent {
            revision: self.revision,
        };
        if self.sender.send(event).is_err() {
            debug!("No subscribers for change event {}", self.revision);
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_delivers_event() {
        let mut notifier = Notifier::default();
        let mut events = notifier.subscribe();

        assert!(notifier.notify());
        assert_eq!(events.try_recv().unwrap().revision, 1);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_batch_coalesces() {
        let mut notifier = Notifier::default();
        let mut events = notifier.subscribe();

        notifier.batch(|n| {
            assert!(!n.notify());
            n.batch(|inner| inner.notify());
            assert!(!n.notify());
        });

        assert_eq!(events.try_recv().unwrap().revision, 1);
        assert!(events.try_recv().is_err());

        // nothing happened, nothing is sent
        notifier.batch(|_| ());
        assert!(events.try_recv().is_err());
        assert_eq!(notifier.revision(), 1);
    }

    #[test]
    fn test_without_subscribers() {
        let mut notifier = Notifier::new(1);
        assert!(notifier.notify());
        assert!(notifier.notify());
        assert_eq!(notifier.revision(), 2);
    }
}
