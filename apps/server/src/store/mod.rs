//! SQLite implementation of every repository trait.

mod bookings;
mod catalog;
mod coupons;
mod payments;
mod slots;

use sqlx::SqlitePool;

/// SQL condition that is true when booking `b` holds slot `s`. Binds one parameter: `now`.
///
/// The single source of truth for occupancy: the create guard, the reschedule
/// guard and the availability listing all go through it.
pub(crate) const HOLDING_PREDICATE: &str = "((b.slot_id = s.id AND (b.status IN ('confirmed', 'completed', 'rescheduled') OR (b.status = 'pending_payment' AND b.expires_at > ?))) OR b.previous_slot_id = s.id)";

/// Repository backed by a SQLite pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
