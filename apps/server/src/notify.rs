use serde::Serialize;
use tokio::sync::broadcast;

/// Lifecycle events published after a transition commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookingEvent {
    Created {
        booking_id: i64,
        slot_id: i64,
    },
    Confirmed {
        booking_id: i64,
        slot_id: i64,
    },
    Rejected {
        booking_id: i64,
    },
    Rescheduled {
        booking_id: i64,
        from_slot_id: i64,
        to_slot_id: i64,
        surcharge_pending: bool,
    },
    Cancelled {
        booking_id: i64,
        coupon_code: Option<String>,
    },
    Completed {
        booking_id: i64,
    },
    Expired {
        booking_id: i64,
    },
}

/// Fire-and-forget fan-out; delivery is up to whoever subscribes.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<BookingEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: BookingEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}
