use async_trait::async_trait;
use sqlx::{Executor, Sqlite};

use super::Store;
use crate::error::BookingError;
use crate::models::{Payment, PaymentType, Transition};
use crate::repository::PaymentRepository;

pub(crate) async fn insert_pending<'e, E>(
    executor: E,
    booking_id: i64,
    amount: i64,
    payment_type: PaymentType,
    method: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Payment, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Payment>(
        "INSERT INTO payments (booking_id, amount, payment_type, method, status, created_at)
         VALUES (?, ?, ?, ?, 'pending', ?)
         RETURNING *",
    )
    .bind(booking_id)
    .bind(amount)
    .bind(payment_type)
    .bind(method)
    .bind(now)
    .fetch_one(executor)
    .await
}

#[async_trait]
impl PaymentRepository for Store {
    async fn find(&self, payment_id: i64) -> Result<Option<Payment>, BookingError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    async fn list_for_booking(&self, booking_id: i64) -> Result<Vec<Payment>, BookingError> {
        let payments =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE booking_id = ? ORDER BY id")
                .bind(booking_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(payments)
    }

    async fn attach_intent(
        &self,
        payment_id: i64,
        intent_id: &str,
        payment_url: &str,
    ) -> Result<(), BookingError> {
        sqlx::query("UPDATE payments SET intent_id = ?, payment_url = ? WHERE id = ?")
            .bind(intent_id)
            .bind(payment_url)
            .bind(payment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_refunded(
        &self,
        payment_id: i64,
        external_id: &str,
    ) -> Result<Transition, BookingError> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = 'refunded', external_transaction_id = COALESCE(external_transaction_id, ?)
             WHERE id = ? AND status IN ('pending', 'approved')",
        )
        .bind(external_id)
        .bind(payment_id)
        .execute(&self.pool)
        .await?;
        Ok(Transition::from_rows(result.rows_affected()))
    }
}
