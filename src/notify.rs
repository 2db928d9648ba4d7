use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-cabin broadcast of committed events, for back-office screens that
/// follow new reservations as they arrive.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a cabin's events. Creates the channel if needed.
    pub fn subscribe(&self, cabin_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(cabin_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, cabin_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&cabin_id) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn remove(&self, cabin_id: &Ulid) {
        self.channels.remove(cabin_id);
    }
}
