use async_trait::async_trait;
use sqlx::{Executor, Sqlite};

use super::{is_unique_violation, Store};
use crate::error::BookingError;
use crate::models::Coupon;
use crate::repository::CouponRepository;

pub(crate) async fn consume<'e, E>(executor: E, code: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE coupons SET is_available = 0 WHERE code = ? AND is_available = 1")
        .bind(code)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn restore<'e, E>(executor: E, code: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE coupons SET is_available = 1 WHERE code = ? AND is_available = 0")
        .bind(code)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn insert<'e, E>(executor: E, coupon: &Coupon) -> Result<(), BookingError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO coupons (code, user_id, discount_percentage, is_available, created_at, expire_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&coupon.code)
    .bind(coupon.user_id)
    .bind(coupon.discount_percentage)
    .bind(coupon.is_available)
    .bind(coupon.created_at)
    .bind(coupon.expire_at)
    .execute(executor)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            BookingError::DuplicateCode
        } else {
            BookingError::Database(e)
        }
    })?;
    Ok(())
}

#[async_trait]
impl CouponRepository for Store {
    async fn insert(&self, coupon: &Coupon) -> Result<(), BookingError> {
        insert(&self.pool, coupon).await
    }

    async fn find(&self, code: &str) -> Result<Option<Coupon>, BookingError> {
        let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(coupon)
    }

    async fn update_status(&self, code: &str) -> Result<bool, BookingError> {
        Ok(consume(&self.pool, code).await?)
    }

    async fn restore(&self, code: &str) -> Result<bool, BookingError> {
        Ok(restore(&self.pool, code).await?)
    }
}
