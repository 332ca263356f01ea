use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::{auth::ClientId, error::BookingError, models::*, AppState};

type ApiResult<T> = Result<Json<ApiResponse<T>>, BookingError>;

/// Longest window a single availability request may span.
const MAX_RANGE_DAYS: i64 = 31;

// ── Endpoints ──

/// GET /api/services: active catalog entries.
pub async fn list_services(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Service>> {
    let services = state.bookings.list_services().await?;
    Ok(Json(ApiResponse::success(services)))
}

/// GET /api/slots?provider_id&start&end: slots with occupancy, served from cache.
pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> ApiResult<Vec<SlotWithStatus>> {
    if query.end - query.start > chrono::Duration::days(MAX_RANGE_DAYS) {
        return Err(BookingError::Validation(format!(
            "Range may span at most {} days",
            MAX_RANGE_DAYS
        )));
    }
    let slots = state
        .bookings
        .availability(query.provider_id, query.start, query.end)
        .await?;
    Ok(Json(ApiResponse::success(slots)))
}

/// POST /api/bookings: hold a slot and start the checkout.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    Json(body): Json<CreateBookingRequest>,
) -> ApiResult<CreatedBooking> {
    let created = state.bookings.create(client_id, body).await?;
    Ok(Json(ApiResponse::success(created)))
}

/// GET /api/bookings/{id}
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    Path(booking_id): Path<i64>,
) -> ApiResult<BookingWithPayments> {
    let booking = state.bookings.get(client_id, booking_id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

/// POST /api/bookings/{id}/reschedule
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    Path(booking_id): Path<i64>,
    Json(body): Json<RescheduleRequest>,
) -> ApiResult<RescheduleResponse> {
    let response = state
        .bookings
        .reschedule(client_id, booking_id, body.new_slot_id)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// GET /api/bookings/{id}/cancel-preview: what cancelling now would cost.
pub async fn cancel_preview(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    Path(booking_id): Path<i64>,
) -> ApiResult<CancelationResponse> {
    let response = state.bookings.preview_cancel(client_id, booking_id).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// POST /api/bookings/{id}/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    Path(booking_id): Path<i64>,
) -> ApiResult<CancelationResponse> {
    let response = state.bookings.cancel(client_id, booking_id).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// GET /api/coupons/{code}
pub async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    Path(code): Path<String>,
) -> ApiResult<Coupon> {
    let coupon = state.bookings.validate_coupon(client_id, &code).await?;
    Ok(Json(ApiResponse::success(coupon)))
}
