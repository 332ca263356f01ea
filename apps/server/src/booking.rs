//! Booking lifecycle: holds, confirmation, reschedules, cancellation, projections.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{CacheFamily, TtlCache};
use crate::clock::Clock;
use crate::config::BookingPolicy;
use crate::coupon::{CouponEngine, ISSUE_ATTEMPTS};
use crate::error::BookingError;
use crate::gateway::{PaymentGateway, PaymentIntentRequest, ProcessorStatus};
use crate::models::*;
use crate::notify::{BookingEvent, Notifier};
use crate::policy::{self, PaymentCompleteness};
use crate::repository::*;
use crate::store::Store;

/// Payment method recorded for processor-hosted checkouts.
pub const CHECKOUT_METHOD: &str = "checkout";

/// The storage capabilities the service runs on.
#[derive(Clone)]
pub struct Repositories {
    pub slots: Arc<dyn SlotRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub catalog: Arc<dyn ServiceCatalog>,
}

impl Repositories {
    pub fn from_store(store: Store) -> Self {
        let store = Arc::new(store);
        Self {
            slots: store.clone(),
            bookings: store.clone(),
            payments: store.clone(),
            coupons: store.clone(),
            catalog: store,
        }
    }
}

pub struct BookingService {
    slots: Arc<dyn SlotRepository>,
    bookings: Arc<dyn BookingRepository>,
    payments: Arc<dyn PaymentRepository>,
    catalog: Arc<dyn ServiceCatalog>,
    coupons: CouponEngine,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    cache: TtlCache,
    notifier: Notifier,
    policy: BookingPolicy,
}

impl BookingService {
    pub fn new(
        repos: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        cache: TtlCache,
        notifier: Notifier,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            slots: repos.slots,
            bookings: repos.bookings,
            payments: repos.payments,
            catalog: repos.catalog,
            coupons: CouponEngine::new(repos.coupons, policy.coupon_code_length),
            gateway,
            clock,
            cache,
            notifier,
            policy,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    // ── Slot hold ──

    pub async fn create(
        &self,
        client_id: i64,
        req: CreateBookingRequest,
    ) -> Result<CreatedBooking, BookingError> {
        let now = self.clock.now();

        let payment_type = match req.payment_percentage {
            50 => PaymentType::Partial,
            100 => PaymentType::Total,
            other => {
                return Err(BookingError::Validation(format!(
                    "Payment percentage must be 50 or 100, got {}",
                    other
                )))
            }
        };

        let slot = self
            .slots
            .get(req.slot_id)
            .await?
            .ok_or_else(|| BookingError::Validation("Slot does not exist".into()))?;
        if slot.start_at <= now {
            return Err(BookingError::Validation("Slot has already started".into()));
        }

        let mut service_ids = req.service_ids.clone();
        service_ids.sort_unstable();
        service_ids.dedup();
        if service_ids.is_empty() {
            return Err(BookingError::Pricing("At least one service is required".into()));
        }
        let services = self.catalog.find_active(&service_ids).await?;
        if services.len() != service_ids.len() {
            return Err(BookingError::Pricing(
                "Some services are unknown or inactive".into(),
            ));
        }
        let subtotal: i64 = services.iter().map(|s| s.price).sum();
        if subtotal <= 0 {
            return Err(BookingError::Pricing(
                "Services must add up to a positive price".into(),
            ));
        }

        let coupon = match req
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            Some(code) => Some(self.coupons.validate(code, client_id, now).await?),
            None => None,
        };
        let discount_amount = coupon
            .as_ref()
            .map(|c| policy::percentage_floor(subtotal, c.discount_percentage))
            .unwrap_or(0);
        let total_amount = subtotal - discount_amount;
        if total_amount <= 0 {
            return Err(BookingError::Pricing(
                "Discounted total must be positive".into(),
            ));
        }
        let payment_amount =
            policy::percentage_ceil(total_amount, i64::from(req.payment_percentage));

        let title = services
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(" + ");

        let (booking, payment) = self
            .bookings
            .create_hold(NewHold {
                slot_id: slot.id,
                client_id,
                services,
                total_amount,
                discount_amount,
                coupon_code: coupon.map(|c| c.code),
                payment_amount,
                payment_type,
                method: CHECKOUT_METHOD.into(),
                expires_at: now + self.policy.hold_window(),
                now,
            })
            .await?;
        self.invalidate_provider(slot.provider_id);

        let intent = match self
            .gateway
            .create_intent(&PaymentIntentRequest {
                booking_id: booking.id,
                payment_id: payment.id,
                amount: payment.amount,
                title,
            })
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                tracing::error!(
                    booking_id = booking.id,
                    "Payment intent failed, releasing hold: {}",
                    e
                );
                self.release_failed_hold(booking.id, slot.provider_id, now)
                    .await;
                return Err(BookingError::ExternalService(e.to_string()));
            }
        };

        if let Err(e) = self
            .payments
            .attach_intent(payment.id, &intent.id, &intent.redirect_url)
            .await
        {
            tracing::error!(
                booking_id = booking.id,
                "Storing payment intent failed, releasing hold: {}",
                e
            );
            self.release_failed_hold(booking.id, slot.provider_id, now)
                .await;
            return Err(e);
        }

        self.notifier.publish(BookingEvent::Created {
            booking_id: booking.id,
            slot_id: booking.slot_id,
        });

        let payment = Payment {
            intent_id: Some(intent.id),
            payment_url: Some(intent.redirect_url.clone()),
            ..payment
        };
        Ok(CreatedBooking {
            booking,
            payment,
            redirect_url: intent.redirect_url,
        })
    }

    // ── Processor-driven transitions ──

    pub async fn payment(&self, payment_id: i64) -> Result<Option<Payment>, BookingError> {
        self.payments.find(payment_id).await
    }

    /// Applies a status the processor reported for `payment`. Only callers that fetched
    /// the status from the processor itself may use this.
    pub async fn apply_processor_status(
        &self,
        payment: &Payment,
        status: ProcessorStatus,
        external_id: &str,
    ) -> Result<Transition, BookingError> {
        let now = self.clock.now();
        let booking_id = payment.booking_id;
        let update = ProcessorUpdate {
            booking_id,
            payment_id: payment.id,
            external_id: external_id.to_string(),
            now,
        };
        let surcharge = payment.payment_type == PaymentType::Surcharge;

        let settlement = match (status, surcharge) {
            (ProcessorStatus::Approved, false) => self.bookings.confirm(update).await?,
            (ProcessorStatus::Approved, true) => self.bookings.settle_surcharge(update).await?,
            (ProcessorStatus::Rejected, false) => self.bookings.reject(update).await?,
            (ProcessorStatus::Rejected, true) => {
                self.bookings
                    .rollback_reschedule(RescheduleRollback {
                        booking_id,
                        surcharge_payment_id: Some(payment.id),
                        external_id: Some(external_id.to_string()),
                        stale_before: None,
                        now,
                    })
                    .await?
            }
            (ProcessorStatus::Refunded, _) => {
                let transition = self
                    .payments
                    .mark_refunded(payment.id, external_id)
                    .await?;
                if transition == Transition::Applied {
                    tracing::info!(booking_id, payment_id = payment.id, "Payment refunded");
                }
                return Ok(transition);
            }
            (ProcessorStatus::Pending, _) => return Ok(Transition::AlreadyResolved),
        };

        if !settlement.booking_changed {
            if status == ProcessorStatus::Approved && settlement.payment_changed {
                tracing::warn!(
                    booking_id,
                    payment_id = payment.id,
                    "Payment approved after the booking was released, refund required"
                );
            } else {
                tracing::info!(
                    booking_id,
                    payment_id = payment.id,
                    "Booking already resolved, notification ignored"
                );
            }
            return Ok(Transition::AlreadyResolved);
        }

        let detail = self.bookings.find(booking_id).await?;
        if let Some(detail) = &detail {
            self.invalidate_provider(detail.provider_id);
        }
        if surcharge {
            self.cache.invalidate_family(CacheFamily::Availability);
        }

        match (status, surcharge) {
            (ProcessorStatus::Approved, false) => {
                tracing::info!(booking_id, payment_id = payment.id, "Booking confirmed");
                self.notifier.publish(BookingEvent::Confirmed {
                    booking_id,
                    slot_id: detail.map(|d| d.booking.slot_id).unwrap_or_default(),
                });
            }
            (ProcessorStatus::Approved, true) => {
                tracing::info!(booking_id, payment_id = payment.id, "Reschedule surcharge paid");
            }
            (ProcessorStatus::Rejected, false) => {
                tracing::warn!(booking_id, payment_id = payment.id, "Payment rejected");
                self.notifier.publish(BookingEvent::Rejected { booking_id });
            }
            _ => {
                tracing::warn!(
                    booking_id,
                    payment_id = payment.id,
                    "Surcharge rejected, reschedule rolled back"
                );
            }
        }
        Ok(Transition::Applied)
    }

    // ── Client operations ──

    async fn owned_booking(
        &self,
        client_id: i64,
        booking_id: i64,
    ) -> Result<BookingDetail, BookingError> {
        self.bookings
            .find(booking_id)
            .await?
            .filter(|d| d.booking.client_id == client_id)
            .ok_or_else(|| BookingError::NotFound("Booking not found".into()))
    }

    pub async fn get(
        &self,
        client_id: i64,
        booking_id: i64,
    ) -> Result<BookingWithPayments, BookingError> {
        let detail = self.owned_booking(client_id, booking_id).await?;
        let payments = self.payments.list_for_booking(booking_id).await?;
        Ok(BookingWithPayments { detail, payments })
    }

    pub async fn reschedule(
        &self,
        client_id: i64,
        booking_id: i64,
        new_slot_id: i64,
    ) -> Result<RescheduleResponse, BookingError> {
        let now = self.clock.now();
        let detail = self.owned_booking(client_id, booking_id).await?;
        let booking = &detail.booking;

        if !matches!(
            booking.status,
            BookingStatus::Confirmed | BookingStatus::Rescheduled
        ) {
            return Err(BookingError::Conflict(format!(
                "A {} booking cannot be rescheduled",
                booking.status.as_str()
            )));
        }
        if booking.previous_slot_id.is_some() {
            return Err(BookingError::Conflict(
                "A reschedule surcharge is still pending".into(),
            ));
        }
        if new_slot_id == booking.slot_id {
            return Err(BookingError::Validation(
                "Booking is already on this slot".into(),
            ));
        }
        if detail.start_at <= now {
            return Err(BookingError::Validation("Booking has already started".into()));
        }
        let new_slot = self
            .slots
            .get(new_slot_id)
            .await?
            .ok_or_else(|| BookingError::Validation("Slot does not exist".into()))?;
        if new_slot.start_at <= now {
            return Err(BookingError::Validation("Slot has already started".into()));
        }

        let hours_until = (detail.start_at - now).num_hours();
        let charge = policy::reschedule_charge(
            hours_until,
            booking.reschedule_count,
            &self.policy,
            booking.total_amount,
        );
        let surcharge = (!charge.free && charge.amount > 0).then_some(charge.amount);

        let payment = self
            .bookings
            .move_slot(SlotMove {
                booking_id,
                from_slot_id: booking.slot_id,
                to_slot_id: new_slot.id,
                surcharge,
                method: CHECKOUT_METHOD.into(),
                hold_until: now + self.policy.hold_window(),
                now,
            })
            .await?;
        self.invalidate_provider(detail.provider_id);
        self.invalidate_provider(new_slot.provider_id);

        let Some(payment) = payment else {
            self.notifier.publish(BookingEvent::Rescheduled {
                booking_id,
                from_slot_id: booking.slot_id,
                to_slot_id: new_slot.id,
                surcharge_pending: false,
            });
            return Ok(RescheduleResponse {
                requires_payment: false,
                amount: 0,
                free: charge.free,
                message: "Booking moved to the new slot".into(),
                redirect_url: None,
            });
        };

        let intent = self
            .gateway
            .create_intent(&PaymentIntentRequest {
                booking_id,
                payment_id: payment.id,
                amount: payment.amount,
                title: format!("Reschedule surcharge for booking {}", booking_id),
            })
            .await;

        let intent = match intent {
            Ok(intent) => intent,
            Err(e) => {
                tracing::error!(
                    booking_id,
                    "Surcharge intent failed, rolling back reschedule: {}",
                    e
                );
                self.abandon_reschedule(booking_id, [detail.provider_id, new_slot.provider_id], now)
                    .await;
                return Err(BookingError::ExternalService(e.to_string()));
            }
        };

        if let Err(e) = self
            .payments
            .attach_intent(payment.id, &intent.id, &intent.redirect_url)
            .await
        {
            tracing::error!(
                booking_id,
                "Storing surcharge intent failed, rolling back reschedule: {}",
                e
            );
            self.abandon_reschedule(booking_id, [detail.provider_id, new_slot.provider_id], now)
                .await;
            return Err(e);
        }

        self.notifier.publish(BookingEvent::Rescheduled {
            booking_id,
            from_slot_id: booking.slot_id,
            to_slot_id: new_slot.id,
            surcharge_pending: true,
        });

        Ok(RescheduleResponse {
            requires_payment: true,
            amount: payment.amount,
            free: false,
            message: format!(
                "A surcharge of {} is due to keep the new slot",
                payment.amount
            ),
            redirect_url: Some(intent.redirect_url),
        })
    }

    async fn evaluate_cancellation(
        &self,
        detail: &BookingDetail,
        now: DateTime<Utc>,
    ) -> Result<CancelationResponse, BookingError> {
        let booking = &detail.booking;
        if booking.status.is_terminal() || booking.status == BookingStatus::Completed {
            return Err(BookingError::Conflict(format!(
                "A {} booking cannot be cancelled",
                booking.status.as_str()
            )));
        }
        if booking.status.is_firm() && detail.start_at <= now {
            return Err(BookingError::Validation("Booking has already started".into()));
        }

        let within_24h = detail.start_at - now < Duration::hours(24);
        let payments = self.payments.list_for_booking(booking.id).await?;
        let completeness = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Approved)
            .find_map(|p| PaymentCompleteness::from_payment_type(p.payment_type));

        let Some(completeness) = completeness else {
            return Ok(CancelationResponse {
                booking_id: booking.id,
                within_24h,
                payment_type: None,
                coupon_percentage: 0,
                loses_deposit: false,
                coupon_code: None,
                message: "Nothing was paid, the hold is simply released".into(),
            });
        };

        let consequence = policy::consequences(within_24h, completeness);
        let message = if consequence.loses_deposit {
            "The deposit is forfeited for cancellations within 24 hours".to_string()
        } else {
            format!(
                "Cancelling earns a {}% coupon",
                consequence.coupon_percentage
            )
        };

        Ok(CancelationResponse {
            booking_id: booking.id,
            within_24h,
            payment_type: Some(completeness.payment_type()),
            coupon_percentage: consequence.coupon_percentage,
            loses_deposit: consequence.loses_deposit,
            coupon_code: None,
            message,
        })
    }

    /// Dry run of `cancel`.
    pub async fn preview_cancel(
        &self,
        client_id: i64,
        booking_id: i64,
    ) -> Result<CancelationResponse, BookingError> {
        let now = self.clock.now();
        let detail = self.owned_booking(client_id, booking_id).await?;
        self.evaluate_cancellation(&detail, now).await
    }

    pub async fn cancel(
        &self,
        client_id: i64,
        booking_id: i64,
    ) -> Result<CancelationResponse, BookingError> {
        let now = self.clock.now();
        let detail = self.owned_booking(client_id, booking_id).await?;
        let mut response = self.evaluate_cancellation(&detail, now).await?;
        let validity = Duration::days(self.policy.coupon_validity_days);

        for attempt in 1..=ISSUE_ATTEMPTS {
            let compensation = (response.coupon_percentage > 0).then(|| {
                self.coupons.draft(
                    detail.booking.client_id,
                    response.coupon_percentage,
                    validity,
                    now,
                )
            });
            let coupon_code = compensation.as_ref().map(|c| c.code.clone());

            let result = self
                .bookings
                .cancel(Cancellation {
                    booking_id,
                    expected: detail.booking.status,
                    compensation,
                    now,
                })
                .await;

            match result {
                Ok(Transition::Applied) => {
                    self.invalidate_provider(detail.provider_id);
                    if detail.booking.previous_slot_id.is_some() {
                        self.cache.invalidate_family(CacheFamily::Availability);
                    }
                    tracing::info!(
                        booking_id,
                        coupon_percentage = response.coupon_percentage,
                        loses_deposit = response.loses_deposit,
                        "Booking cancelled"
                    );
                    self.notifier.publish(BookingEvent::Cancelled {
                        booking_id,
                        coupon_code: coupon_code.clone(),
                    });
                    response.coupon_code = coupon_code;
                    return Ok(response);
                }
                Ok(Transition::AlreadyResolved) => {
                    return Err(BookingError::Conflict(
                        "Booking changed while cancelling, try again".into(),
                    ));
                }
                Err(BookingError::DuplicateCode) if attempt < ISSUE_ATTEMPTS => {
                    tracing::warn!("Compensation coupon collided (attempt {})", attempt);
                }
                Err(e) => return Err(e),
            }
        }
        Err(BookingError::DuplicateCode)
    }

    pub async fn validate_coupon(&self, client_id: i64, code: &str) -> Result<Coupon, BookingError> {
        self.coupons.validate(code, client_id, self.clock.now()).await
    }

    pub async fn list_services(&self) -> Result<Vec<Service>, BookingError> {
        self.catalog.list_active().await
    }

    // ── Staff operations ──

    pub async fn complete(&self, booking_id: i64) -> Result<BookingDetail, BookingError> {
        let detail = self
            .bookings
            .find(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Booking not found".into()))?;

        match self.bookings.complete(booking_id, self.clock.now()).await? {
            Transition::Applied => {
                self.invalidate_provider(detail.provider_id);
                tracing::info!(booking_id, "Booking completed");
                self.notifier
                    .publish(BookingEvent::Completed { booking_id });
                self.bookings
                    .find(booking_id)
                    .await?
                    .ok_or_else(|| BookingError::NotFound("Booking not found".into()))
            }
            Transition::AlreadyResolved => Err(BookingError::Conflict(format!(
                "A {} booking cannot be completed",
                detail.booking.status.as_str()
            ))),
        }
    }

    pub async fn issue_coupon(&self, req: IssueCouponRequest) -> Result<Coupon, BookingError> {
        let days = req.validity_days.unwrap_or(self.policy.coupon_validity_days);
        self.coupons
            .issue(
                req.user_id,
                req.discount_percentage,
                Duration::days(days),
                self.clock.now(),
            )
            .await
    }

    pub async fn create_slots(&self, slots: &[NewSlot]) -> Result<u64, BookingError> {
        let created = self.slots.create_in_batches(slots).await?;
        let mut providers: Vec<i64> = slots.iter().map(|s| s.provider_id).collect();
        providers.sort_unstable();
        providers.dedup();
        for provider_id in providers {
            self.invalidate_provider(provider_id);
        }
        Ok(created)
    }

    /// Uncached listing, for callers that act on the result.
    pub async fn slots_live(
        &self,
        provider_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SlotWithStatus>, BookingError> {
        self.slots
            .list_by_date_range(provider_id, start, end, self.clock.now())
            .await
    }

    /// Cached listing for display. Never authoritative for holds.
    pub async fn availability(
        &self,
        provider_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SlotWithStatus>, BookingError> {
        if start >= end {
            return Err(BookingError::Validation("start must be before end".into()));
        }
        let key = format!("{}:{}:{}", provider_id, start.to_rfc3339(), end.to_rfc3339());
        self.cache
            .get_or_load(CacheFamily::Availability, &key, || {
                self.slots_live(provider_id, start, end)
            })
            .await
    }

    pub async fn stats_by_barber(&self, provider_id: i64) -> Result<BarberStats, BookingError> {
        self.cache
            .get_or_load(CacheFamily::Stats, &provider_id.to_string(), || async {
                let counts = self.bookings.status_counts(provider_id).await?;
                let mut by_status = BTreeMap::new();
                let mut confirmed_revenue = 0;
                for row in &counts {
                    by_status.insert(row.status.as_str().to_string(), row.count);
                    if row.status == BookingStatus::Confirmed {
                        confirmed_revenue = row.amount;
                    }
                }
                Ok::<_, BookingError>(BarberStats {
                    provider_id,
                    total: counts.iter().map(|r| r.count).sum(),
                    by_status,
                    confirmed_revenue,
                })
            })
            .await
    }

    /// Bookings whose slot starts on `date` (UTC), ordered by start.
    pub async fn upcoming(
        &self,
        provider_id: i64,
        date: NaiveDate,
        status: Option<BookingStatus>,
    ) -> Result<Vec<BookingDetail>, BookingError> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1);
        self.bookings.upcoming(provider_id, start, end, status).await
    }

    pub async fn all_pending(&self) -> Result<Vec<BookingDetail>, BookingError> {
        self.bookings.all_pending().await
    }

    // ── Expiry ──

    /// Releases holds whose window closed and rolls back unpaid reschedules.
    /// One failing booking does not stop the rest.
    pub async fn sweep_expired(&self) -> Result<SweepReport, BookingError> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for booking_id in self.bookings.stale_pending_ids(now).await? {
            match self.bookings.expire_hold(booking_id, now).await {
                Ok(Transition::Applied) => {
                    report.expired += 1;
                    tracing::info!(booking_id, "Expired unpaid hold");
                    self.notifier.publish(BookingEvent::Expired { booking_id });
                }
                Ok(Transition::AlreadyResolved) => {
                    tracing::debug!(booking_id, "Hold resolved before the sweep reached it");
                }
                Err(e) => tracing::error!(booking_id, "Failed to expire hold: {}", e),
            }
        }

        for booking_id in self.bookings.stale_reschedule_ids(now).await? {
            let rollback = self
                .bookings
                .rollback_reschedule(RescheduleRollback {
                    booking_id,
                    surcharge_payment_id: None,
                    external_id: None,
                    stale_before: Some(now),
                    now,
                })
                .await;
            match rollback {
                Ok(settlement) if settlement.booking_changed => {
                    report.reschedules_rolled_back += 1;
                    tracing::info!(booking_id, "Rolled back unpaid reschedule");
                }
                Ok(_) => {
                    tracing::debug!(booking_id, "Reschedule resolved before the sweep reached it");
                }
                Err(e) => tracing::error!(booking_id, "Failed to roll back reschedule: {}", e),
            }
        }

        if report != SweepReport::default() {
            self.cache.invalidate_family(CacheFamily::Availability);
            self.cache.invalidate_family(CacheFamily::Stats);
        }
        Ok(report)
    }

    async fn release_failed_hold(&self, booking_id: i64, provider_id: i64, now: DateTime<Utc>) {
        if let Err(e) = self.bookings.release_hold(booking_id, now).await {
            tracing::error!(booking_id, "Failed to release hold: {}", e);
        }
        self.invalidate_provider(provider_id);
    }

    async fn abandon_reschedule(
        &self,
        booking_id: i64,
        providers: [i64; 2],
        now: DateTime<Utc>,
    ) {
        let rollback = self
            .bookings
            .rollback_reschedule(RescheduleRollback {
                booking_id,
                surcharge_payment_id: None,
                external_id: None,
                stale_before: None,
                now,
            })
            .await;
        if let Err(e) = rollback {
            tracing::error!(booking_id, "Failed to roll back reschedule: {}", e);
        }
        for provider_id in providers {
            self.invalidate_provider(provider_id);
        }
    }

    fn invalidate_provider(&self, provider_id: i64) {
        self.cache
            .invalidate(CacheFamily::Availability, &format!("{}:", provider_id));
        self.cache.remove(CacheFamily::Stats, &provider_id.to_string());
    }
}
