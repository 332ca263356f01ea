mod common;

use chrono::Duration;
use common::*;
use std::sync::Arc;

use barber_server::{coupon::CouponEngine, error::BookingError, models::*};

async fn issue(h: &Harness, user_id: i64, pct: i64, validity_days: Option<i64>) -> Coupon {
    h.service
        .issue_coupon(IssueCouponRequest {
            user_id,
            discount_percentage: pct,
            validity_days,
        })
        .await
        .unwrap()
}

fn with_coupon(h: &Harness, slot_id: i64, code: &str) -> CreateBookingRequest {
    CreateBookingRequest {
        coupon_code: Some(code.to_string()),
        ..h.request(slot_id, 50)
    }
}

#[tokio::test]
async fn test_issued_coupon_shape() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 20, None).await;

    assert!(coupon.code.len() >= 10);
    assert!(coupon
        .code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    assert!(coupon.is_available);
    assert_eq!(coupon.expire_at, h.start + Duration::days(90));

    let bad = h
        .service
        .issue_coupon(IssueCouponRequest {
            user_id: CLIENT,
            discount_percentage: 0,
            validity_days: None,
        })
        .await;
    assert!(matches!(bad, Err(BookingError::Validation(_))));
}

#[tokio::test]
async fn test_coupon_discount_applied_once() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 20, None).await;
    let first_slot = h.add_slot(Duration::days(3)).await;
    let second_slot = h.add_slot(Duration::days(4)).await;

    // Codes are matched case-insensitively.
    let lowered = coupon.code.to_lowercase();
    let created = h
        .service
        .create(CLIENT, with_coupon(&h, first_slot, &lowered))
        .await
        .unwrap();
    assert_eq!(created.booking.total_amount, 8000);
    assert_eq!(created.booking.discount_amount, 2000);
    assert_eq!(created.booking.coupon_code.as_deref(), Some(coupon.code.as_str()));
    assert_eq!(created.payment.amount, 4000);
    assert!(!h.coupon(&coupon.code).await.is_available);

    let reuse = h
        .service
        .create(CLIENT, with_coupon(&h, second_slot, &coupon.code))
        .await;
    assert!(matches!(reuse, Err(BookingError::Conflict(_))));
    assert!(!h.is_booked(second_slot).await);
}

#[tokio::test]
async fn test_coupon_restored_when_hold_expires() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 20, None).await;
    let slot = h.add_slot(Duration::days(3)).await;

    h.service
        .create(CLIENT, with_coupon(&h, slot, &coupon.code))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(11));
    h.service.sweep_expired().await.unwrap();

    assert!(h.coupon(&coupon.code).await.is_available);
    let validated = h.service.validate_coupon(CLIENT, &coupon.code).await.unwrap();
    assert_eq!(validated.discount_percentage, 20);
}

#[tokio::test]
async fn test_coupon_restored_when_pending_hold_cancelled() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 10, None).await;
    let slot = h.add_slot(Duration::days(3)).await;

    let created = h
        .service
        .create(CLIENT, with_coupon(&h, slot, &coupon.code))
        .await
        .unwrap();
    h.service.cancel(CLIENT, created.booking.id).await.unwrap();

    assert!(h.coupon(&coupon.code).await.is_available);
}

#[tokio::test]
async fn test_coupon_stays_spent_after_confirmation() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 10, None).await;
    let slot = h.add_slot(Duration::days(3)).await;

    let created = h
        .service
        .create(CLIENT, with_coupon(&h, slot, &coupon.code))
        .await
        .unwrap();
    h.pay("mp-1", created.booking.id, created.payment.id).await;
    h.clock.advance(Duration::minutes(11));
    h.service.sweep_expired().await.unwrap();

    assert!(!h.coupon(&coupon.code).await.is_available);
}

#[tokio::test]
async fn test_coupon_of_other_client_is_not_found() {
    let h = Harness::new().await;
    let coupon = issue(&h, OTHER_CLIENT, 20, None).await;
    let slot = h.add_slot(Duration::days(3)).await;

    let result = h
        .service
        .create(CLIENT, with_coupon(&h, slot, &coupon.code))
        .await;
    assert!(matches!(result, Err(BookingError::NotFound(_))));
    assert!(h.coupon(&coupon.code).await.is_available);
}

#[tokio::test]
async fn test_expired_coupon_rejected() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 20, Some(1)).await;
    let slot = h.add_slot(Duration::days(3)).await;

    h.clock.advance(Duration::days(2));
    let result = h
        .service
        .create(CLIENT, with_coupon(&h, slot, &coupon.code))
        .await;
    assert!(matches!(result, Err(BookingError::Validation(_))));
}

#[tokio::test]
async fn test_full_discount_is_a_pricing_error() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 100, None).await;
    let slot = h.add_slot(Duration::days(3)).await;

    let result = h
        .service
        .create(CLIENT, with_coupon(&h, slot, &coupon.code))
        .await;
    assert!(matches!(result, Err(BookingError::Pricing(_))));
    assert!(h.coupon(&coupon.code).await.is_available);
}

#[tokio::test]
async fn test_engine_redeem_and_restore() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 25, None).await;
    let engine = CouponEngine::new(Arc::new(h.store.clone()), 10);
    let lowered = coupon.code.to_lowercase();

    assert!(engine.update_status(&lowered).await.unwrap());
    assert!(!engine.update_status(&coupon.code).await.unwrap());
    assert!(!h.coupon(&coupon.code).await.is_available);
    let spent = engine.validate(&coupon.code, CLIENT, h.clock_now()).await;
    assert!(matches!(spent, Err(BookingError::Conflict(_))));

    assert!(engine.restore(&lowered).await.unwrap());
    assert!(!engine.restore(&coupon.code).await.unwrap());
    let restored = engine
        .validate(&coupon.code, CLIENT, h.clock_now())
        .await
        .unwrap();
    assert!(restored.is_usable(h.clock_now()));
    assert!(!restored.is_usable(restored.expire_at));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemption_single_winner() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 15, None).await;

    let engine = Arc::new(CouponEngine::new(Arc::new(h.store.clone()), 10));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let code = coupon.code.clone();
        tasks.push(tokio::spawn(async move { engine.update_status(&code).await }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert!(!h.coupon(&coupon.code).await.is_available);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_share_one_coupon() {
    let h = Harness::new().await;
    let coupon = issue(&h, CLIENT, 15, None).await;

    let mut tasks = Vec::new();
    for day in 1..=4 {
        let slot = h.add_slot(Duration::days(day)).await;
        let service = h.service.clone();
        let req = with_coupon(&h, slot, &coupon.code);
        tasks.push(tokio::spawn(async move { service.create(CLIENT, req).await }));
    }

    let mut discounted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(created) => {
                assert_eq!(created.booking.discount_amount, 1500);
                discounted += 1;
            }
            Err(BookingError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(discounted, 1);
}
