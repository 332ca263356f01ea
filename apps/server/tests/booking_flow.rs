mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::*;
use std::sync::Arc;

use barber_server::{
    booking::{BookingService, Repositories},
    cache::TtlCache,
    config::{BookingPolicy, CacheConfig},
    error::BookingError,
    gateway::ProcessorStatus,
    models::*,
    notify::{BookingEvent, Notifier},
    repository::PaymentRepository,
    store::Store,
    webhook::{WebhookError, WebhookOutcome},
};

/// Payment storage whose intent bookkeeping always fails.
struct IntentLossStore(Store);

#[async_trait]
impl PaymentRepository for IntentLossStore {
    async fn find(&self, payment_id: i64) -> Result<Option<Payment>, BookingError> {
        PaymentRepository::find(&self.0, payment_id).await
    }

    async fn list_for_booking(&self, booking_id: i64) -> Result<Vec<Payment>, BookingError> {
        self.0.list_for_booking(booking_id).await
    }

    async fn attach_intent(&self, _: i64, _: &str, _: &str) -> Result<(), BookingError> {
        Err(BookingError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn mark_refunded(
        &self,
        payment_id: i64,
        external_id: &str,
    ) -> Result<Transition, BookingError> {
        self.0.mark_refunded(payment_id, external_id).await
    }
}

#[tokio::test]
async fn test_deposit_hold_confirmed_by_webhook() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;

    let created = h.create(slot, 50).await;
    assert_eq!(created.booking.status, BookingStatus::PendingPayment);
    assert_eq!(created.booking.total_amount, 10000);
    assert_eq!(created.booking.expires_at, Some(h.start + Duration::minutes(10)));
    assert_eq!(created.payment.amount, 5000);
    assert_eq!(created.payment.payment_type, PaymentType::Partial);
    assert_eq!(created.payment.status, PaymentStatus::Pending);
    assert!(created.redirect_url.contains(&created.payment.id.to_string()));
    assert!(h.is_booked(slot).await);

    let outcome = h
        .pay("mp-500", created.booking.id, created.payment.id)
        .await;
    assert_eq!(outcome, WebhookOutcome::Applied);

    let booking = h.booking(created.booking.id).await;
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.expires_at, None);

    let payment = h.payment(created.payment.id).await;
    assert_eq!(payment.status, PaymentStatus::Approved);
    assert_eq!(payment.external_transaction_id.as_deref(), Some("mp-500"));
    assert!(payment.paid_at.is_some());
    assert!(h.is_booked(slot).await);
}

#[tokio::test]
async fn test_full_payment_charges_total() {
    let h = Harness::new().await;
    let beard = h.add_service("Beard trim", 4500).await;
    let slot = h.add_slot(Duration::days(3)).await;

    let created = h
        .service
        .create(
            CLIENT,
            CreateBookingRequest {
                slot_id: slot,
                service_ids: vec![h.haircut, beard, h.haircut],
                payment_percentage: 100,
                coupon_code: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(created.booking.total_amount, 14500);
    assert_eq!(created.payment.amount, 14500);
    assert_eq!(created.payment.payment_type, PaymentType::Total);
}

#[tokio::test]
async fn test_unpaid_hold_expires_after_window() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let created = h.create(slot, 50).await;

    h.clock.advance(Duration::minutes(11));
    assert!(!h.is_booked(slot).await);

    let report = h.service.sweep_expired().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(h.booking(created.booking.id).await.status, BookingStatus::Expired);
    assert_eq!(
        h.payment(created.payment.id).await.status,
        PaymentStatus::Pending
    );
    assert!(!h.is_booked(slot).await);

    let again = h.service.sweep_expired().await.unwrap();
    assert_eq!(again, SweepReport::default());
}

#[tokio::test]
async fn test_sweep_releases_only_stale_holds() {
    let h = Harness::new().await;
    let stale_slot = h.add_slot(Duration::days(3)).await;
    let fresh_slot = h.add_slot(Duration::days(4)).await;
    let firm_slot = h.add_slot(Duration::days(5)).await;

    let stale = h.create(stale_slot, 50).await;
    let firm = h.create_confirmed(firm_slot, 100).await;
    h.clock.advance(Duration::minutes(8));
    let fresh = h.create(fresh_slot, 50).await;
    h.clock.advance(Duration::minutes(3));

    let report = h.service.sweep_expired().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(h.booking(stale.booking.id).await.status, BookingStatus::Expired);
    assert_eq!(
        h.booking(fresh.booking.id).await.status,
        BookingStatus::PendingPayment
    );
    assert_eq!(h.booking(firm.id).await.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn test_approval_after_expiry_does_not_resurrect() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let created = h.create(slot, 50).await;

    h.clock.advance(Duration::minutes(11));
    h.service.sweep_expired().await.unwrap();

    let outcome = h.pay("mp-late", created.booking.id, created.payment.id).await;
    assert_eq!(outcome, WebhookOutcome::AlreadyResolved);
    assert_eq!(h.booking(created.booking.id).await.status, BookingStatus::Expired);
    // The money still moved, so the payment is recorded for a refund.
    assert_eq!(
        h.payment(created.payment.id).await.status,
        PaymentStatus::Approved
    );
    assert!(!h.is_booked(slot).await);
}

#[tokio::test]
async fn test_approval_after_window_before_sweep_confirms() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let created = h.create(slot, 50).await;

    // Nobody took the slot in between, so the late payment still lands.
    h.clock.advance(Duration::minutes(11));
    let outcome = h.pay("mp-late", created.booking.id, created.payment.id).await;
    assert_eq!(outcome, WebhookOutcome::Applied);
    assert_eq!(h.booking(created.booking.id).await.status, BookingStatus::Confirmed);

    let report = h.service.sweep_expired().await.unwrap();
    assert_eq!(report.expired, 0);
    assert!(h.is_booked(slot).await);
}

#[tokio::test]
async fn test_stale_hold_does_not_block_new_booking() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let first = h.create(slot, 50).await;

    h.clock.advance(Duration::minutes(11));
    let second = h
        .service
        .create(OTHER_CLIENT, h.request(slot, 100))
        .await
        .unwrap();

    assert_eq!(h.booking(first.booking.id).await.status, BookingStatus::Expired);
    assert_eq!(second.booking.slot_id, slot);
    assert_eq!(h.holding_count(slot).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_holds_on_one_slot() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;

    let mut tasks = Vec::new();
    for client_id in 1..=10 {
        let service = h.service.clone();
        let req = h.request(slot, 50);
        tasks.push(tokio::spawn(async move { service.create(client_id, req).await }));
    }

    let mut won = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(BookingError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(conflicts, 9);
    assert_eq!(h.holding_count(slot).await, 1);
    assert_eq!(h.gateway.intent_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sweep_racing_webhook_stays_consistent() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let created = h.create(slot, 50).await;
    h.gateway.set_payment(
        "mp-race",
        ProcessorStatus::Approved,
        created.booking.id,
        created.payment.id,
    );
    h.clock.advance(Duration::minutes(11));

    let service = h.service.clone();
    let sweep = tokio::spawn(async move { service.sweep_expired().await });
    let reconciler = h.reconciler.clone();
    let webhook = tokio::spawn(async move {
        let body = br#"{"type":"payment","data":{"id":"mp-race"}}"#;
        reconciler.handle_notification(body, None, None).await
    });
    let report = sweep.await.unwrap().unwrap();
    let outcome = webhook.await.unwrap().unwrap();

    // Exactly one side wins and the slot agrees with the winner.
    match h.booking(created.booking.id).await.status {
        BookingStatus::Confirmed => {
            assert_eq!(outcome, WebhookOutcome::Applied);
            assert_eq!(report.expired, 0);
            assert!(h.is_booked(slot).await);
        }
        BookingStatus::Expired => {
            assert_eq!(outcome, WebhookOutcome::AlreadyResolved);
            assert_eq!(report.expired, 1);
            assert!(!h.is_booked(slot).await);
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(
        h.payment(created.payment.id).await.status,
        PaymentStatus::Approved
    );
}

#[tokio::test]
async fn test_webhook_replay_is_idempotent() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let created = h.create(slot, 100).await;
    let mut events = h.service.notifier().subscribe();

    let first = h.pay("mp-1", created.booking.id, created.payment.id).await;
    let second = h.webhook("mp-1").await.unwrap();
    assert_eq!(first, WebhookOutcome::Applied);
    assert_eq!(second, WebhookOutcome::AlreadyResolved);

    let mut confirmations = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, BookingEvent::Confirmed { .. }) {
            confirmations += 1;
        }
    }
    assert_eq!(confirmations, 1);
}

#[tokio::test]
async fn test_rejected_payment_releases_slot() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let created = h.create(slot, 50).await;

    h.gateway.set_payment(
        "mp-no",
        ProcessorStatus::Rejected,
        created.booking.id,
        created.payment.id,
    );
    assert_eq!(h.webhook("mp-no").await.unwrap(), WebhookOutcome::Applied);

    assert_eq!(h.booking(created.booking.id).await.status, BookingStatus::Rejected);
    assert_eq!(
        h.payment(created.payment.id).await.status,
        PaymentStatus::Rejected
    );
    assert!(!h.is_booked(slot).await);
}

#[tokio::test]
async fn test_pending_processor_status_changes_nothing() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let created = h.create(slot, 50).await;

    h.gateway.set_payment(
        "mp-wait",
        ProcessorStatus::Pending,
        created.booking.id,
        created.payment.id,
    );
    assert_eq!(h.webhook("mp-wait").await.unwrap(), WebhookOutcome::Pending);
    assert_eq!(
        h.booking(created.booking.id).await.status,
        BookingStatus::PendingPayment
    );
}

#[tokio::test]
async fn test_webhook_rejects_mismatched_metadata() {
    let h = Harness::new().await;
    let one = h.create(h.add_slot(Duration::days(3)).await, 50).await;
    let two = h.create(h.add_slot(Duration::days(4)).await, 50).await;

    h.gateway.set_payment(
        "mp-x",
        ProcessorStatus::Approved,
        one.booking.id,
        two.payment.id,
    );
    let err = h.webhook("mp-x").await.unwrap_err();
    assert!(matches!(err, WebhookError::MissingMetadata(_)));
    assert_eq!(
        h.booking(one.booking.id).await.status,
        BookingStatus::PendingPayment
    );
    assert_eq!(
        h.booking(two.booking.id).await.status,
        BookingStatus::PendingPayment
    );
}

#[tokio::test]
async fn test_webhook_unknown_and_foreign_notifications() {
    let h = Harness::new().await;

    let err = h.webhook("mp-missing").await.unwrap_err();
    assert!(matches!(err, WebhookError::ProcessorNotFound(_)));

    let body = br#"{"type":"merchant_order","data":{"id":"77"}}"#;
    let outcome = h.reconciler.handle_notification(body, None, None).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);
}

#[tokio::test]
async fn test_webhook_requires_signature_when_secret_set() {
    let h = Harness::with_webhook_secret("whsec").await;
    let slot = h.add_slot(Duration::days(3)).await;
    let created = h.create(slot, 50).await;
    h.gateway.set_payment(
        "mp-1",
        ProcessorStatus::Approved,
        created.booking.id,
        created.payment.id,
    );

    let err = h.webhook("mp-1").await.unwrap_err();
    assert!(matches!(err, WebhookError::Unauthorized));
    assert_eq!(
        h.booking(created.booking.id).await.status,
        BookingStatus::PendingPayment
    );
}

#[tokio::test]
async fn test_processor_failure_releases_hold() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;

    h.gateway.set_failing(true);
    let err = h.service.create(CLIENT, h.request(slot, 50)).await.unwrap_err();
    assert!(matches!(err, BookingError::ExternalService(_)));
    assert!(!h.is_booked(slot).await);

    h.gateway.set_failing(false);
    let created = h.create(slot, 50).await;
    assert_eq!(created.booking.slot_id, slot);
}

#[tokio::test]
async fn test_create_validation() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let past = h.add_slot(Duration::hours(-2)).await;
    let retired = h.add_service("Perm", 9000).await;
    sqlx::query("UPDATE services SET is_active = 0 WHERE id = ?")
        .bind(retired)
        .execute(&h.pool)
        .await
        .unwrap();

    let bad_percentage = h.service.create(CLIENT, h.request(slot, 30)).await;
    assert!(matches!(bad_percentage, Err(BookingError::Validation(_))));

    let missing_slot = h.service.create(CLIENT, h.request(9999, 50)).await;
    assert!(matches!(missing_slot, Err(BookingError::Validation(_))));

    let started = h.service.create(CLIENT, h.request(past, 50)).await;
    assert!(matches!(started, Err(BookingError::Validation(_))));

    for service_ids in [vec![], vec![h.haircut, 4242], vec![retired]] {
        let req = CreateBookingRequest {
            slot_id: slot,
            service_ids,
            payment_percentage: 50,
            coupon_code: None,
        };
        let result = h.service.create(CLIENT, req).await;
        assert!(matches!(result, Err(BookingError::Pricing(_))));
    }

    assert!(!h.is_booked(slot).await);
    assert_eq!(h.gateway.intent_count(), 0);
}

#[tokio::test]
async fn test_booking_visible_only_to_owner() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;
    let created = h.create(slot, 50).await;

    let view = h.service.get(CLIENT, created.booking.id).await.unwrap();
    assert_eq!(view.detail.booking.id, created.booking.id);
    assert_eq!(view.payments.len(), 1);

    let foreign = h.service.get(OTHER_CLIENT, created.booking.id).await;
    assert!(matches!(foreign, Err(BookingError::NotFound(_))));
}

#[tokio::test]
async fn test_hold_released_when_intent_cannot_be_stored() {
    let h = Harness::new().await;
    let slot = h.add_slot(Duration::days(3)).await;

    let repos = Repositories {
        payments: Arc::new(IntentLossStore(h.store.clone())),
        ..Repositories::from_store(h.store.clone())
    };
    let flaky = BookingService::new(
        repos,
        h.gateway.clone(),
        h.clock.clone(),
        TtlCache::new(CacheConfig::default()),
        Notifier::default(),
        BookingPolicy::default(),
    );

    let result = flaky.create(CLIENT, h.request(slot, 50)).await;
    assert!(matches!(result, Err(BookingError::Database(_))));
    assert!(!h.is_booked(slot).await);
    assert_eq!(h.holding_count(slot).await, 0);

    let retry = h.create(slot, 50).await;
    assert_eq!(retry.booking.slot_id, slot);
    assert!(h.is_booked(slot).await);
}
