#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use barber_server::{
    booking::{BookingService, Repositories},
    cache::TtlCache,
    clock::ManualClock,
    config::{BookingPolicy, CacheConfig},
    db,
    gateway::{
        GatewayError, PaymentGateway, PaymentIntent, PaymentIntentRequest, ProcessorPayment,
        ProcessorStatus,
    },
    models::*,
    notify::Notifier,
    repository::SlotRepository,
    store::Store,
    webhook::{Reconciler, WebhookError, WebhookOutcome},
    AppState,
};

pub const CLIENT: i64 = 1;
pub const OTHER_CLIENT: i64 = 2;
pub const BARBER: i64 = 10;

/// In-process stand-in for the payment processor.
#[derive(Default)]
pub struct FakeGateway {
    pub intents: Mutex<Vec<PaymentIntentRequest>>,
    pub payments: Mutex<HashMap<String, ProcessorPayment>>,
    pub fail_intents: AtomicBool,
}

impl FakeGateway {
    pub fn set_payment(&self, external_id: &str, status: ProcessorStatus, booking_id: i64, payment_id: i64) {
        self.payments.lock().unwrap().insert(
            external_id.to_string(),
            ProcessorPayment {
                id: external_id.to_string(),
                status,
                metadata: serde_json::json!({
                    "booking_id": booking_id,
                    "payment_id": payment_id.to_string(),
                }),
            },
        );
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_intents.store(failing, Ordering::SeqCst);
    }

    pub fn intent_count(&self) -> usize {
        self.intents.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, req: &PaymentIntentRequest) -> Result<PaymentIntent, GatewayError> {
        if self.fail_intents.load(Ordering::SeqCst) {
            return Err(GatewayError::Unexpected("processor unavailable".into()));
        }
        self.intents.lock().unwrap().push(req.clone());
        Ok(PaymentIntent {
            id: format!("pref-{}", req.payment_id),
            redirect_url: format!("https://pay.example.com/checkout/{}", req.payment_id),
        })
    }

    async fn get_payment(&self, external_id: &str) -> Result<ProcessorPayment, GatewayError> {
        self.payments
            .lock()
            .unwrap()
            .get(external_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(external_id.to_string()))
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub store: Store,
    pub gateway: Arc<FakeGateway>,
    pub clock: Arc<ManualClock>,
    pub service: Arc<BookingService>,
    pub reconciler: Arc<Reconciler>,
    pub start: DateTime<Utc>,
    pub haircut: i64,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(BookingPolicy::default(), None).await
    }

    pub async fn with_webhook_secret(secret: &str) -> Self {
        Self::build(BookingPolicy::default(), Some(secret.to_string())).await
    }

    pub async fn build(policy: BookingPolicy, webhook_secret: Option<String>) -> Self {
        let pool = db::memory_pool().await.unwrap();
        let store = Store::new(pool.clone());
        let gateway = Arc::new(FakeGateway::default());
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));

        let service = Arc::new(BookingService::new(
            Repositories::from_store(store.clone()),
            gateway.clone(),
            clock.clone(),
            TtlCache::new(CacheConfig::default()),
            Notifier::default(),
            policy,
        ));
        let reconciler = Arc::new(Reconciler::new(
            service.clone(),
            gateway.clone(),
            webhook_secret,
        ));

        let mut harness = Self {
            pool,
            store,
            gateway,
            clock,
            service,
            reconciler,
            start,
            haircut: 0,
        };
        harness.haircut = harness.add_service("Haircut", 10000).await;
        harness
    }

    pub fn state(&self, staff_api_token: &str) -> Arc<AppState> {
        Arc::new(AppState {
            db: self.pool.clone(),
            bookings: self.service.clone(),
            reconciler: self.reconciler.clone(),
            staff_api_token: staff_api_token.to_string(),
            started_at: Instant::now(),
        })
    }

    pub async fn add_service(&self, name: &str, price: i64) -> i64 {
        sqlx::query_scalar("INSERT INTO services (name, price) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(price)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    /// 45-minute slot for `BARBER` starting `offset` after the harness start.
    pub async fn add_slot(&self, offset: Duration) -> i64 {
        let start_at = self.start + offset;
        self.store
            .create_in_batches(&[NewSlot {
                provider_id: BARBER,
                start_at,
                end_at: start_at + Duration::minutes(45),
            }])
            .await
            .unwrap();
        sqlx::query_scalar("SELECT id FROM slots WHERE provider_id = ? AND start_at = ?")
            .bind(BARBER)
            .bind(start_at)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub fn request(&self, slot_id: i64, payment_percentage: u8) -> CreateBookingRequest {
        CreateBookingRequest {
            slot_id,
            service_ids: vec![self.haircut],
            payment_percentage,
            coupon_code: None,
        }
    }

    pub async fn create(&self, slot_id: i64, payment_percentage: u8) -> CreatedBooking {
        self.service
            .create(CLIENT, self.request(slot_id, payment_percentage))
            .await
            .unwrap()
    }

    pub async fn webhook(&self, external_id: &str) -> Result<WebhookOutcome, WebhookError> {
        let body = serde_json::json!({"type": "payment", "data": {"id": external_id}}).to_string();
        self.reconciler
            .handle_notification(body.as_bytes(), None, None)
            .await
    }

    /// Processor approves `payment` under `external_id` and notifies us.
    pub async fn pay(&self, external_id: &str, booking_id: i64, payment_id: i64) -> WebhookOutcome {
        self.gateway
            .set_payment(external_id, ProcessorStatus::Approved, booking_id, payment_id);
        self.webhook(external_id).await.unwrap()
    }

    pub async fn create_confirmed(&self, slot_id: i64, payment_percentage: u8) -> Booking {
        let created = self.create(slot_id, payment_percentage).await;
        let outcome = self
            .pay(
                &format!("mp-{}", created.payment.id),
                created.booking.id,
                created.payment.id,
            )
            .await;
        assert_eq!(outcome, WebhookOutcome::Applied);
        self.booking(created.booking.id).await
    }

    pub async fn booking(&self, booking_id: i64) -> Booking {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
            .bind(booking_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn payment(&self, payment_id: i64) -> Payment {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
            .bind(payment_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn coupon(&self, code: &str) -> Coupon {
        sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    /// Occupancy of `slot_id` as the live listing reports it.
    pub async fn is_booked(&self, slot_id: i64) -> bool {
        let slot = self.store.get(slot_id).await.unwrap().unwrap();
        let listed = self
            .service
            .slots_live(BARBER, slot.start_at, slot.start_at + Duration::minutes(1))
            .await
            .unwrap();
        listed
            .into_iter()
            .find(|s| s.id == slot_id)
            .map(|s| s.is_booked)
            .unwrap()
    }

    pub async fn holding_count(&self, slot_id: i64) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings
             WHERE slot_id = ? AND (status IN ('confirmed', 'completed', 'rescheduled')
                                    OR (status = 'pending_payment' AND expires_at > ?))",
        )
        .bind(slot_id)
        .bind(self.clock_now())
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.service.now()
    }
}
