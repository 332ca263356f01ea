use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::{coupons, is_unique_violation, payments, Store, HOLDING_PREDICATE};
use crate::error::BookingError;
use crate::models::*;
use crate::repository::BookingRepository;

const DETAIL_SELECT: &str = "SELECT b.*, s.provider_id, s.start_at, s.end_at
     FROM bookings b JOIN slots s ON s.id = b.slot_id";

/// Expires pending holds on `slot_id` whose window has closed, restoring their coupons.
async fn expire_stale_on_slot(
    conn: &mut SqliteConnection,
    slot_id: i64,
    now: DateTime<Utc>,
) -> Result<usize, sqlx::Error> {
    let released: Vec<Option<String>> = sqlx::query_scalar(
        "UPDATE bookings SET status = 'expired', updated_at = ?
         WHERE slot_id = ? AND status = 'pending_payment' AND expires_at <= ?
         RETURNING coupon_code",
    )
    .bind(now)
    .bind(slot_id)
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;

    for code in released.iter().flatten() {
        coupons::restore(&mut *conn, code).await?;
    }
    if !released.is_empty() {
        tracing::info!(slot_id, count = released.len(), "Expired stale holds before taking slot");
    }
    Ok(released.len())
}

/// Moves a pending hold to `expired`. `stale_before` limits it to holds that timed out.
async fn release_pending(
    pool: &sqlx::SqlitePool,
    booking_id: i64,
    now: DateTime<Utc>,
    stale_before: Option<DateTime<Utc>>,
) -> Result<Transition, BookingError> {
    let mut tx = pool.begin().await?;

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("UPDATE bookings SET status = 'expired', updated_at = ");
    builder.push_bind(now);
    builder.push(" WHERE id = ");
    builder.push_bind(booking_id);
    builder.push(" AND status = 'pending_payment'");
    if let Some(cutoff) = stale_before {
        builder.push(" AND expires_at < ");
        builder.push_bind(cutoff);
    }
    builder.push(" RETURNING coupon_code");

    let released: Option<Option<String>> = builder
        .build_query_scalar()
        .fetch_optional(&mut *tx)
        .await?;

    let Some(coupon_code) = released else {
        return Ok(Transition::AlreadyResolved);
    };
    if let Some(code) = coupon_code {
        coupons::restore(&mut *tx, &code).await?;
    }
    tx.commit().await?;

    Ok(Transition::Applied)
}

async fn approve_payment(
    conn: &mut SqliteConnection,
    update: &ProcessorUpdate,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET status = 'approved', external_transaction_id = ?, paid_at = ?
         WHERE id = ? AND booking_id = ? AND status = 'pending'",
    )
    .bind(&update.external_id)
    .bind(update.now)
    .bind(update.payment_id)
    .bind(update.booking_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn reject_payment(
    conn: &mut SqliteConnection,
    booking_id: i64,
    payment_id: i64,
    external_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments
         SET status = 'rejected', external_transaction_id = COALESCE(?, external_transaction_id)
         WHERE id = ? AND booking_id = ? AND status = 'pending'",
    )
    .bind(external_id)
    .bind(payment_id)
    .bind(booking_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

fn conflict_on_unique(err: sqlx::Error, message: &str) -> BookingError {
    if is_unique_violation(&err) {
        BookingError::Conflict(message.into())
    } else {
        BookingError::Database(err)
    }
}

#[async_trait]
impl BookingRepository for Store {
    async fn create_hold(&self, hold: NewHold) -> Result<(Booking, Payment), BookingError> {
        let mut tx = self.pool.begin().await?;

        expire_stale_on_slot(&mut tx, hold.slot_id, hold.now).await?;

        let sql = format!(
            "INSERT INTO bookings (slot_id, client_id, status, total_amount, coupon_code,
                                   discount_amount, expires_at, reschedule_count, created_at, updated_at)
             SELECT s.id, ?, 'pending_payment', ?, ?, ?, ?, 0, ?, ?
             FROM slots s
             WHERE s.id = ? AND NOT EXISTS (SELECT 1 FROM bookings b WHERE {})
             RETURNING *",
            HOLDING_PREDICATE
        );

        let booking = sqlx::query_as::<_, Booking>(&sql)
            .bind(hold.client_id)
            .bind(hold.total_amount)
            .bind(&hold.coupon_code)
            .bind(hold.discount_amount)
            .bind(hold.expires_at)
            .bind(hold.now)
            .bind(hold.now)
            .bind(hold.slot_id)
            .bind(hold.now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "Slot is already held"))?
            .ok_or_else(|| BookingError::Conflict("Slot is already held".into()))?;

        if let Some(code) = &hold.coupon_code {
            if !coupons::consume(&mut *tx, code).await? {
                return Err(BookingError::Conflict("Coupon has already been used".into()));
            }
        }

        for service in &hold.services {
            sqlx::query("INSERT INTO booking_services (booking_id, service_id, price) VALUES (?, ?, ?)")
                .bind(booking.id)
                .bind(service.id)
                .bind(service.price)
                .execute(&mut *tx)
                .await?;
        }

        let payment = payments::insert_pending(
            &mut *tx,
            booking.id,
            hold.payment_amount,
            hold.payment_type,
            &hold.method,
            hold.now,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            booking_id = booking.id,
            slot_id = booking.slot_id,
            payment_id = payment.id,
            "Hold created"
        );
        Ok((booking, payment))
    }

    async fn release_hold(
        &self,
        booking_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Transition, BookingError> {
        release_pending(&self.pool, booking_id, now, None).await
    }

    async fn expire_hold(
        &self,
        booking_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Transition, BookingError> {
        release_pending(&self.pool, booking_id, now, Some(now)).await
    }

    async fn confirm(&self, update: ProcessorUpdate) -> Result<PaymentSettlement, BookingError> {
        let mut tx = self.pool.begin().await?;

        let booking = sqlx::query(
            "UPDATE bookings SET status = 'confirmed', expires_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'pending_payment'",
        )
        .bind(update.now)
        .bind(update.booking_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Slot is already taken"))?;

        let payment_changed = approve_payment(&mut tx, &update).await?;
        tx.commit().await?;

        Ok(PaymentSettlement {
            booking_changed: booking.rows_affected() == 1,
            payment_changed,
        })
    }

    async fn reject(&self, update: ProcessorUpdate) -> Result<PaymentSettlement, BookingError> {
        let mut tx = self.pool.begin().await?;

        let released: Option<Option<String>> = sqlx::query_scalar(
            "UPDATE bookings SET status = 'rejected', expires_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'pending_payment'
             RETURNING coupon_code",
        )
        .bind(update.now)
        .bind(update.booking_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(Some(code)) = &released {
            coupons::restore(&mut *tx, code).await?;
        }

        let payment_changed = reject_payment(
            &mut tx,
            update.booking_id,
            update.payment_id,
            Some(&update.external_id),
        )
        .await?;
        tx.commit().await?;

        Ok(PaymentSettlement {
            booking_changed: released.is_some(),
            payment_changed,
        })
    }

    async fn move_slot(&self, mv: SlotMove) -> Result<Option<Payment>, BookingError> {
        let mut tx = self.pool.begin().await?;

        expire_stale_on_slot(&mut tx, mv.to_slot_id, mv.now).await?;

        let (previous_slot_id, reschedule_expires_at) = match mv.surcharge {
            Some(_) => (Some(mv.from_slot_id), Some(mv.hold_until)),
            None => (None, None),
        };

        let sql = format!(
            "UPDATE bookings
             SET slot_id = ?, status = 'rescheduled', reschedule_count = reschedule_count + 1,
                 previous_slot_id = ?, reschedule_expires_at = ?, updated_at = ?
             WHERE id = ? AND slot_id = ? AND status IN ('confirmed', 'rescheduled')
               AND previous_slot_id IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM slots s, bookings b
                   WHERE s.id = ? AND b.id <> ? AND {}
               )",
            HOLDING_PREDICATE
        );

        let result = sqlx::query(&sql)
            .bind(mv.to_slot_id)
            .bind(previous_slot_id)
            .bind(reschedule_expires_at)
            .bind(mv.now)
            .bind(mv.booking_id)
            .bind(mv.from_slot_id)
            .bind(mv.to_slot_id)
            .bind(mv.booking_id)
            .bind(mv.now)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "New slot is already held"))?;

        if result.rows_affected() == 0 {
            return Err(BookingError::Conflict(
                "New slot is already held or the booking changed".into(),
            ));
        }

        let surcharge = match mv.surcharge {
            Some(amount) => Some(
                payments::insert_pending(
                    &mut *tx,
                    mv.booking_id,
                    amount,
                    PaymentType::Surcharge,
                    &mv.method,
                    mv.now,
                )
                .await?,
            ),
            None => None,
        };

        tx.commit().await?;

        tracing::info!(
            booking_id = mv.booking_id,
            from_slot_id = mv.from_slot_id,
            to_slot_id = mv.to_slot_id,
            surcharge_pending = surcharge.is_some(),
            "Booking moved"
        );
        Ok(surcharge)
    }

    async fn settle_surcharge(
        &self,
        update: ProcessorUpdate,
    ) -> Result<PaymentSettlement, BookingError> {
        let mut tx = self.pool.begin().await?;

        // Only the newest surcharge can release the old slot.
        let booking = sqlx::query(
            "UPDATE bookings SET previous_slot_id = NULL, reschedule_expires_at = NULL, updated_at = ?
             WHERE id = ? AND previous_slot_id IS NOT NULL
               AND ? = (SELECT MAX(p.id) FROM payments p
                        WHERE p.booking_id = bookings.id AND p.payment_type = 'surcharge')",
        )
        .bind(update.now)
        .bind(update.booking_id)
        .bind(update.payment_id)
        .execute(&mut *tx)
        .await?;

        let payment_changed = approve_payment(&mut tx, &update).await?;
        tx.commit().await?;

        Ok(PaymentSettlement {
            booking_changed: booking.rows_affected() == 1,
            payment_changed,
        })
    }

    async fn rollback_reschedule(
        &self,
        rollback: RescheduleRollback,
    ) -> Result<PaymentSettlement, BookingError> {
        let mut tx = self.pool.begin().await?;

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "UPDATE bookings
             SET slot_id = previous_slot_id, previous_slot_id = NULL, reschedule_expires_at = NULL,
                 reschedule_count = reschedule_count - 1,
                 status = CASE WHEN reschedule_count - 1 > 0 THEN 'rescheduled' ELSE 'confirmed' END,
                 updated_at = ",
        );
        builder.push_bind(rollback.now);
        builder.push(" WHERE id = ");
        builder.push_bind(rollback.booking_id);
        builder.push(" AND previous_slot_id IS NOT NULL");
        if let Some(cutoff) = rollback.stale_before {
            builder.push(" AND reschedule_expires_at < ");
            builder.push_bind(cutoff);
        }
        if let Some(payment_id) = rollback.surcharge_payment_id {
            builder.push(
                " AND (SELECT MAX(p.id) FROM payments p
                       WHERE p.booking_id = bookings.id AND p.payment_type = 'surcharge') = ",
            );
            builder.push_bind(payment_id);
        }

        let booking = builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "Previous slot is no longer free"))?;

        let payment_changed = match rollback.surcharge_payment_id {
            Some(payment_id) => {
                reject_payment(
                    &mut tx,
                    rollback.booking_id,
                    payment_id,
                    rollback.external_id.as_deref(),
                )
                .await?
            }
            None => false,
        };
        tx.commit().await?;

        Ok(PaymentSettlement {
            booking_changed: booking.rows_affected() == 1,
            payment_changed,
        })
    }

    async fn cancel(&self, cancellation: Cancellation) -> Result<Transition, BookingError> {
        let mut tx = self.pool.begin().await?;

        let cancelled: Option<Option<String>> = sqlx::query_scalar(
            "UPDATE bookings
             SET status = 'cancelled', expires_at = NULL, previous_slot_id = NULL,
                 reschedule_expires_at = NULL, updated_at = ?
             WHERE id = ? AND status = ?
             RETURNING coupon_code",
        )
        .bind(cancellation.now)
        .bind(cancellation.booking_id)
        .bind(cancellation.expected)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(consumed_coupon) = cancelled else {
            return Ok(Transition::AlreadyResolved);
        };

        // A pending hold never delivered its discount, so the coupon goes back.
        if cancellation.expected == BookingStatus::PendingPayment {
            if let Some(code) = consumed_coupon {
                coupons::restore(&mut *tx, &code).await?;
            }
        }

        if let Some(coupon) = &cancellation.compensation {
            coupons::insert(&mut *tx, coupon).await?;
        }

        tx.commit().await?;
        Ok(Transition::Applied)
    }

    async fn complete(
        &self,
        booking_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Transition, BookingError> {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'completed', updated_at = ?
             WHERE id = ? AND status IN ('confirmed', 'rescheduled') AND previous_slot_id IS NULL",
        )
        .bind(now)
        .bind(booking_id)
        .execute(&self.pool)
        .await?;
        Ok(Transition::from_rows(result.rows_affected()))
    }

    async fn find(&self, booking_id: i64) -> Result<Option<BookingDetail>, BookingError> {
        let sql = format!("{} WHERE b.id = ?", DETAIL_SELECT);
        let detail = sqlx::query_as::<_, BookingDetail>(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(detail)
    }

    async fn stale_pending_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, BookingError> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM bookings
             WHERE status = 'pending_payment' AND expires_at < ?
             ORDER BY id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn stale_reschedule_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, BookingError> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM bookings
             WHERE previous_slot_id IS NOT NULL AND reschedule_expires_at < ?
             ORDER BY id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn upcoming(
        &self,
        provider_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: Option<BookingStatus>,
    ) -> Result<Vec<BookingDetail>, BookingError> {
        let sql = format!(
            "{} WHERE s.provider_id = ? AND s.start_at >= ? AND s.start_at < ?
                AND (? IS NULL OR b.status = ?)
             ORDER BY s.start_at, b.id",
            DETAIL_SELECT
        );
        let bookings = sqlx::query_as::<_, BookingDetail>(&sql)
            .bind(provider_id)
            .bind(start)
            .bind(end)
            .bind(status)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }

    async fn status_counts(&self, provider_id: i64) -> Result<Vec<StatusCount>, BookingError> {
        let counts = sqlx::query_as::<_, StatusCount>(
            "SELECT b.status AS status, COUNT(*) AS count, COALESCE(SUM(b.total_amount), 0) AS amount
             FROM bookings b JOIN slots s ON s.id = b.slot_id
             WHERE s.provider_id = ?
             GROUP BY b.status",
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn all_pending(&self) -> Result<Vec<BookingDetail>, BookingError> {
        let sql = format!(
            "{} WHERE b.status = 'pending_payment' ORDER BY b.created_at, b.id",
            DETAIL_SELECT
        );
        let bookings = sqlx::query_as::<_, BookingDetail>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }
}
