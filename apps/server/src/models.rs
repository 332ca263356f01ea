use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Statuses ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    Cancelled,
    Rejected,
    Completed,
    Rescheduled,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Completed => "completed",
            BookingStatus::Rescheduled => "rescheduled",
            BookingStatus::Expired => "expired",
        }
    }

    /// Firm statuses hold their slot regardless of time.
    pub fn is_firm(&self) -> bool {
        matches!(
            self,
            BookingStatus::Confirmed | BookingStatus::Completed | BookingStatus::Rescheduled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Rejected | BookingStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentType {
    Total,
    Partial,
    Surcharge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
    Refunded,
}

// ── Database models ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub duration_min: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Slot {
    pub id: i64,
    pub provider_id: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSlot {
    pub provider_id: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SlotWithStatus {
    pub id: i64,
    pub provider_id: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_booked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: i64,
    pub slot_id: i64,
    pub client_id: i64,
    pub status: BookingStatus,
    pub total_amount: i64,
    pub coupon_code: Option<String>,
    pub discount_amount: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub reschedule_count: i64,
    /// Set while a paid reschedule waits for its surcharge; the old slot stays held.
    pub previous_slot_id: Option<i64>,
    pub reschedule_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking joined with its slot.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookingDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub booking: Booking,
    pub provider_id: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: i64,
    pub booking_id: i64,
    pub amount: i64,
    pub payment_type: PaymentType,
    pub method: String,
    pub status: PaymentStatus,
    pub intent_id: Option<String>,
    pub external_transaction_id: Option<String>,
    pub payment_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coupon {
    pub code: String,
    pub user_id: i64,
    pub discount_percentage: i64,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_available && now < self.expire_at
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatusCount {
    pub status: BookingStatus,
    pub count: i64,
    pub amount: i64,
}

// ── Store inputs ──

/// Everything needed to insert a pending hold and its first payment.
#[derive(Debug, Clone)]
pub struct NewHold {
    pub slot_id: i64,
    pub client_id: i64,
    pub services: Vec<Service>,
    pub total_amount: i64,
    pub discount_amount: i64,
    pub coupon_code: Option<String>,
    pub payment_amount: i64,
    pub payment_type: PaymentType,
    pub method: String,
    pub expires_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SlotMove {
    pub booking_id: i64,
    pub from_slot_id: i64,
    pub to_slot_id: i64,
    /// Surcharge amount; `None` for a free move.
    pub surcharge: Option<i64>,
    pub method: String,
    pub hold_until: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RescheduleRollback {
    pub booking_id: i64,
    /// The surcharge payment being rejected, when the rollback comes from the processor.
    pub surcharge_payment_id: Option<i64>,
    /// Processor transaction id of the rejected surcharge.
    pub external_id: Option<String>,
    /// Only roll back if the surcharge window closed before this instant.
    pub stale_before: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    pub booking_id: i64,
    pub expected: BookingStatus,
    pub compensation: Option<Coupon>,
    pub now: DateTime<Utc>,
}

/// A processor-verified status change for one payment.
#[derive(Debug, Clone)]
pub struct ProcessorUpdate {
    pub booking_id: i64,
    pub payment_id: i64,
    pub external_id: String,
    pub now: DateTime<Utc>,
}

// ── Transition outcomes ──

/// Outcome of a conditional update: either this call moved the row or someone else already had.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    AlreadyResolved,
}

impl Transition {
    pub fn from_rows(rows: u64) -> Self {
        if rows > 0 {
            Transition::Applied
        } else {
            Transition::AlreadyResolved
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaymentSettlement {
    pub booking_changed: bool,
    pub payment_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub reschedules_rolled_back: usize,
}

// ── API request/response types ──

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub slot_id: i64,
    pub service_ids: Vec<i64>,
    pub payment_percentage: u8,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub payment: Payment,
    pub redirect_url: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub new_slot_id: i64,
}

#[derive(Debug, Serialize)]
pub struct RescheduleResponse {
    pub requires_payment: bool,
    pub amount: i64,
    pub free: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelationResponse {
    pub booking_id: i64,
    pub within_24h: bool,
    pub payment_type: Option<PaymentType>,
    pub coupon_percentage: i64,
    pub loses_deposit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarberStats {
    pub provider_id: i64,
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub confirmed_revenue: i64,
}

#[derive(Debug, Serialize)]
pub struct BookingWithPayments {
    #[serde(flatten)]
    pub detail: BookingDetail,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub provider_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub provider_id: i64,
    pub date: NaiveDate,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSlotsRequest {
    pub provider_id: i64,
    pub slots: Vec<SlotTime>,
}

#[derive(Debug, Deserialize)]
pub struct SlotTime {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct OpenDayRequest {
    pub provider_id: i64,
    pub date: NaiveDate,
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub slot_minutes: i64,
}

#[derive(Debug, Deserialize)]
pub struct IssueCouponRequest {
    pub user_id: i64,
    pub discount_percentage: i64,
    pub validity_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SlotsCreated {
    pub created: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
