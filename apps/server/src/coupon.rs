use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

use crate::error::BookingError;
use crate::models::Coupon;
use crate::repository::CouponRepository;

/// Shortest code ever generated.
pub const MIN_CODE_LENGTH: usize = 10;
/// Attempts before giving up on a colliding code.
pub const ISSUE_ATTEMPTS: usize = 3;

/// Random uppercase alphanumeric code, at least `MIN_CODE_LENGTH` long.
pub fn generate_code(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length.max(MIN_CODE_LENGTH))
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Clone)]
pub struct CouponEngine {
    repo: Arc<dyn CouponRepository>,
    code_length: usize,
}

impl CouponEngine {
    pub fn new(repo: Arc<dyn CouponRepository>, code_length: usize) -> Self {
        Self { repo, code_length }
    }

    /// Unsaved coupon with a fresh code.
    pub fn draft(
        &self,
        user_id: i64,
        discount_percentage: i64,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> Coupon {
        Coupon {
            code: generate_code(self.code_length),
            user_id,
            discount_percentage,
            is_available: true,
            created_at: now,
            expire_at: now + validity,
        }
    }

    pub async fn issue(
        &self,
        user_id: i64,
        discount_percentage: i64,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> Result<Coupon, BookingError> {
        if !(1..=100).contains(&discount_percentage) {
            return Err(BookingError::Validation(
                "Discount percentage must be between 1 and 100".into(),
            ));
        }
        if validity <= Duration::zero() {
            return Err(BookingError::Validation("Coupon validity must be positive".into()));
        }

        for attempt in 1..=ISSUE_ATTEMPTS {
            let coupon = self.draft(user_id, discount_percentage, validity, now);
            match self.repo.insert(&coupon).await {
                Ok(()) => {
                    tracing::info!(user_id, code = %coupon.code, discount_percentage, "Coupon issued");
                    return Ok(coupon);
                }
                Err(BookingError::DuplicateCode) => {
                    tracing::warn!("Coupon code collision (attempt {})", attempt);
                }
                Err(e) => return Err(e),
            }
        }
        Err(BookingError::DuplicateCode)
    }

    /// Returns the coupon only if `user_id` may redeem it right now.
    pub async fn validate(
        &self,
        code: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Coupon, BookingError> {
        let code = normalize_code(code);
        let coupon = self
            .repo
            .find(&code)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| BookingError::NotFound("Coupon not found".into()))?;

        if coupon.is_usable(now) {
            Ok(coupon)
        } else if !coupon.is_available {
            Err(BookingError::Conflict("Coupon has already been used".into()))
        } else {
            Err(BookingError::Validation("Coupon has expired".into()))
        }
    }

    /// Single-use redemption. `false` means someone else already spent it.
    pub async fn update_status(&self, code: &str) -> Result<bool, BookingError> {
        self.repo.update_status(&normalize_code(code)).await
    }

    pub async fn restore(&self, code: &str) -> Result<bool, BookingError> {
        self.repo.restore(&normalize_code(code)).await
    }
}
