use std::sync::mpsc::Sender;

use super::events::Event;

/// Trait implemented by callers that wish to observe state changes.
///
/// Events may be delivered from install worker threads, so implementations
/// must be shareable across threads and should return quickly.
pub trait Reporter: Send + Sync {
    /// Receive a structured event.
    fn report(&self, event: Event);
}

impl Reporter for () {
    fn report(&self, _event: Event) {}
}

impl Reporter for Sender<Event> {
    fn report(&self, event: Event) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.send(event);
    }
}
