//! Cancellation and reschedule rules. Pure functions, no I/O.

use crate::config::BookingPolicy;
use crate::models::PaymentType;

/// How much of the booking the client actually paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentCompleteness {
    Total,
    Partial,
}

impl PaymentCompleteness {
    pub fn from_payment_type(payment_type: PaymentType) -> Option<Self> {
        match payment_type {
            PaymentType::Total => Some(PaymentCompleteness::Total),
            PaymentType::Partial => Some(PaymentCompleteness::Partial),
            PaymentType::Surcharge => None,
        }
    }

    pub fn payment_type(self) -> PaymentType {
        match self {
            PaymentCompleteness::Total => PaymentType::Total,
            PaymentCompleteness::Partial => PaymentType::Partial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consequence {
    pub coupon_percentage: i64,
    pub loses_deposit: bool,
}

/// The whole cancellation rule.
pub fn consequences(within_24h: bool, completeness: PaymentCompleteness) -> Consequence {
    let (coupon_percentage, loses_deposit) = match (within_24h, completeness) {
        (true, PaymentCompleteness::Total) => (50, false),
        (true, PaymentCompleteness::Partial) => (0, true),
        (false, PaymentCompleteness::Total) => (75, false),
        (false, PaymentCompleteness::Partial) => (25, false),
    };
    Consequence {
        coupon_percentage,
        loses_deposit,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescheduleCharge {
    pub free: bool,
    pub amount: i64,
}

/// Free while the slot is far enough away and the free allowance lasts, otherwise a
/// percentage of the booking total rounded up to a minor unit.
pub fn reschedule_charge(
    hours_until_slot: i64,
    reschedule_count: i64,
    policy: &BookingPolicy,
    total_amount: i64,
) -> RescheduleCharge {
    if hours_until_slot >= policy.free_window_hours
        && reschedule_count < policy.max_free_reschedules
    {
        return RescheduleCharge {
            free: true,
            amount: 0,
        };
    }

    RescheduleCharge {
        free: false,
        amount: percentage_ceil(total_amount, policy.surcharge_percentage),
    }
}

/// `amount * pct / 100`, rounded up.
pub fn percentage_ceil(amount: i64, pct: i64) -> i64 {
    (amount * pct + 99).div_euclid(100)
}

/// `amount * pct / 100`, rounded down. Used for discounts so the client never pays
/// less than the rounded-up price.
pub fn percentage_floor(amount: i64, pct: i64) -> i64 {
    (amount * pct).div_euclid(100)
}
