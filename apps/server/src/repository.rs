//! Storage capabilities the booking engine depends on, one trait per aggregate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BookingError;
use crate::models::*;

#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Bulk insert in fixed-size chunks. Performs no overlap validation.
    async fn create_in_batches(&self, slots: &[NewSlot]) -> Result<u64, BookingError>;

    /// Slots of one provider starting in `[start, end)`, with occupancy as of `now`.
    async fn list_by_date_range(
        &self,
        provider_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SlotWithStatus>, BookingError>;

    async fn get(&self, slot_id: i64) -> Result<Option<Slot>, BookingError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Atomically takes the slot and records the pending payment.
    /// Fails with `Conflict` when the slot is held or the coupon is already spent.
    async fn create_hold(&self, hold: NewHold) -> Result<(Booking, Payment), BookingError>;

    /// Releases a pending hold unconditionally (the intent could not be created).
    async fn release_hold(&self, booking_id: i64, now: DateTime<Utc>)
        -> Result<Transition, BookingError>;

    /// Releases a pending hold only if it expired before `now`.
    async fn expire_hold(&self, booking_id: i64, now: DateTime<Utc>)
        -> Result<Transition, BookingError>;

    async fn confirm(&self, update: ProcessorUpdate) -> Result<PaymentSettlement, BookingError>;

    async fn reject(&self, update: ProcessorUpdate) -> Result<PaymentSettlement, BookingError>;

    /// Moves a firm booking onto a free slot, inserting the surcharge payment if any.
    async fn move_slot(&self, mv: SlotMove) -> Result<Option<Payment>, BookingError>;

    async fn settle_surcharge(
        &self,
        update: ProcessorUpdate,
    ) -> Result<PaymentSettlement, BookingError>;

    async fn rollback_reschedule(
        &self,
        rollback: RescheduleRollback,
    ) -> Result<PaymentSettlement, BookingError>;

    async fn cancel(&self, cancellation: Cancellation) -> Result<Transition, BookingError>;

    async fn complete(&self, booking_id: i64, now: DateTime<Utc>)
        -> Result<Transition, BookingError>;

    async fn find(&self, booking_id: i64) -> Result<Option<BookingDetail>, BookingError>;

    async fn stale_pending_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, BookingError>;

    async fn stale_reschedule_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, BookingError>;

    async fn upcoming(
        &self,
        provider_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: Option<BookingStatus>,
    ) -> Result<Vec<BookingDetail>, BookingError>;

    async fn status_counts(&self, provider_id: i64) -> Result<Vec<StatusCount>, BookingError>;

    async fn all_pending(&self) -> Result<Vec<BookingDetail>, BookingError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find(&self, payment_id: i64) -> Result<Option<Payment>, BookingError>;

    async fn list_for_booking(&self, booking_id: i64) -> Result<Vec<Payment>, BookingError>;

    async fn attach_intent(
        &self,
        payment_id: i64,
        intent_id: &str,
        payment_url: &str,
    ) -> Result<(), BookingError>;

    async fn mark_refunded(&self, payment_id: i64, external_id: &str)
        -> Result<Transition, BookingError>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Fails with `DuplicateCode` when the code is taken.
    async fn insert(&self, coupon: &Coupon) -> Result<(), BookingError>;

    async fn find(&self, code: &str) -> Result<Option<Coupon>, BookingError>;

    /// Compare-and-swap `is_available` from true to false. Returns whether this call won.
    async fn update_status(&self, code: &str) -> Result<bool, BookingError>;

    async fn restore(&self, code: &str) -> Result<bool, BookingError>;
}

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn find_active(&self, ids: &[i64]) -> Result<Vec<Service>, BookingError>;

    async fn list_active(&self) -> Result<Vec<Service>, BookingError>;
}
