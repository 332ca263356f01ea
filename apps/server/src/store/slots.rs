use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use super::{Store, HOLDING_PREDICATE};
use crate::error::BookingError;
use crate::models::{NewSlot, Slot, SlotWithStatus};
use crate::repository::SlotRepository;

/// Rows per INSERT statement.
const BATCH_SIZE: usize = 100;

#[async_trait]
impl SlotRepository for Store {
    async fn create_in_batches(&self, slots: &[NewSlot]) -> Result<u64, BookingError> {
        let mut created = 0;
        for chunk in slots.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO slots (provider_id, start_at, end_at) ");
            builder.push_values(chunk, |mut row, slot| {
                row.push_bind(slot.provider_id)
                    .push_bind(slot.start_at)
                    .push_bind(slot.end_at);
            });
            let result = builder.build().execute(&self.pool).await?;
            created += result.rows_affected();
        }

        tracing::info!("Created {} slots in {} batch(es)", created, slots.len().div_ceil(BATCH_SIZE));
        Ok(created)
    }

    async fn list_by_date_range(
        &self,
        provider_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SlotWithStatus>, BookingError> {
        let sql = format!(
            "SELECT s.id, s.provider_id, s.start_at, s.end_at,
                    EXISTS (SELECT 1 FROM bookings b WHERE {}) AS is_booked
             FROM slots s
             WHERE s.provider_id = ? AND s.start_at >= ? AND s.start_at < ?
             ORDER BY s.start_at",
            HOLDING_PREDICATE
        );

        let slots = sqlx::query_as::<_, SlotWithStatus>(&sql)
            .bind(now)
            .bind(provider_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        Ok(slots)
    }

    async fn get(&self, slot_id: i64) -> Result<Option<Slot>, BookingError> {
        let slot = sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = ?")
            .bind(slot_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(slot)
    }
}
