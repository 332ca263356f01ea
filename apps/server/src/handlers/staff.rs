use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;

use crate::{error::BookingError, models::*, AppState};

type ApiResult<T> = Result<Json<ApiResponse<T>>, BookingError>;

/// Most slots accepted in one request.
const MAX_SLOTS_PER_REQUEST: usize = 1000;

fn overlaps(a_start: DateTime<Utc>, a_end: DateTime<Utc>, b_start: DateTime<Utc>, b_end: DateTime<Utc>) -> bool {
    a_start < b_end && b_start < a_end
}

/// Rejects slots that are empty, overlap each other, or overlap an existing slot.
pub fn validate_new_slots(new: &[NewSlot], existing: &[SlotWithStatus]) -> Result<(), String> {
    for slot in new {
        if slot.start_at >= slot.end_at {
            return Err(format!("Slot starting {} must end after it starts", slot.start_at));
        }
    }

    let mut sorted: Vec<&NewSlot> = new.iter().collect();
    sorted.sort_by_key(|s| s.start_at);
    for pair in sorted.windows(2) {
        if overlaps(pair[0].start_at, pair[0].end_at, pair[1].start_at, pair[1].end_at) {
            return Err(format!(
                "Slots starting {} and {} overlap",
                pair[0].start_at, pair[1].start_at
            ));
        }
    }

    for slot in new {
        if let Some(clash) = existing
            .iter()
            .find(|e| overlaps(slot.start_at, slot.end_at, e.start_at, e.end_at))
        {
            return Err(format!(
                "Slot starting {} overlaps existing slot {}",
                slot.start_at, clash.id
            ));
        }
    }
    Ok(())
}

/// Back-to-back slots of `slot_minutes` between `open` and `close` on `date` (UTC).
pub fn plan_day(
    provider_id: i64,
    date: NaiveDate,
    open: NaiveTime,
    close: NaiveTime,
    slot_minutes: i64,
) -> Result<Vec<NewSlot>, String> {
    if !(5..=480).contains(&slot_minutes) {
        return Err("slot_minutes must be between 5 and 480".into());
    }
    if open >= close {
        return Err("open must be before close".into());
    }

    let length = Duration::minutes(slot_minutes);
    let close_at = date.and_time(close).and_utc();
    let mut start = date.and_time(open).and_utc();
    let mut slots = Vec::new();
    while start + length <= close_at {
        slots.push(NewSlot {
            provider_id,
            start_at: start,
            end_at: start + length,
        });
        start += length;
    }
    Ok(slots)
}

/// Existing slots that could overlap anything in `[start, end)`.
async fn existing_around(
    state: &AppState,
    provider_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<SlotWithStatus>, BookingError> {
    // No slot is longer than a day, so anything overlapping starts after start - 1 day.
    state
        .bookings
        .slots_live(provider_id, start - Duration::days(1), end)
        .await
}

// ── Endpoints ──

/// POST /api/staff/slots
pub async fn create_slots(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSlotsRequest>,
) -> ApiResult<SlotsCreated> {
    if body.slots.is_empty() {
        return Err(BookingError::Validation("No slots given".into()));
    }
    if body.slots.len() > MAX_SLOTS_PER_REQUEST {
        return Err(BookingError::Validation(format!(
            "At most {} slots per request",
            MAX_SLOTS_PER_REQUEST
        )));
    }

    let slots: Vec<NewSlot> = body
        .slots
        .iter()
        .map(|s| NewSlot {
            provider_id: body.provider_id,
            start_at: s.start_at,
            end_at: s.end_at,
        })
        .collect();
    for slot in &slots {
        if slot.end_at - slot.start_at > Duration::days(1) {
            return Err(BookingError::Validation("Slots may not exceed one day".into()));
        }
    }

    let mut range_start = slots[0].start_at;
    let mut range_end = slots[0].end_at;
    for slot in &slots {
        range_start = range_start.min(slot.start_at);
        range_end = range_end.max(slot.end_at);
    }

    let existing = existing_around(&state, body.provider_id, range_start, range_end).await?;
    validate_new_slots(&slots, &existing).map_err(BookingError::Validation)?;

    let created = state.bookings.create_slots(&slots).await?;
    Ok(Json(ApiResponse::success(SlotsCreated { created })))
}

/// POST /api/staff/slots/open-day: fill a working day, skipping slots already there.
pub async fn open_day(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OpenDayRequest>,
) -> ApiResult<Vec<SlotWithStatus>> {
    let planned = plan_day(
        body.provider_id,
        body.date,
        body.open,
        body.close,
        body.slot_minutes,
    )
    .map_err(BookingError::Validation)?;

    let day_start = body.date.and_time(NaiveTime::MIN).and_utc();
    let day_end = day_start + Duration::days(1);
    let existing = existing_around(&state, body.provider_id, day_start, day_end).await?;

    let fresh: Vec<NewSlot> = planned
        .into_iter()
        .filter(|p| {
            !existing
                .iter()
                .any(|e| overlaps(p.start_at, p.end_at, e.start_at, e.end_at))
        })
        .collect();

    if !fresh.is_empty() {
        state.bookings.create_slots(&fresh).await?;
    }
    tracing::info!(
        "Opened {} for provider {}: {} new slot(s)",
        body.date,
        body.provider_id,
        fresh.len()
    );

    let slots = state
        .bookings
        .slots_live(body.provider_id, day_start, day_end)
        .await?;
    Ok(Json(ApiResponse::success(slots)))
}

/// GET /api/staff/bookings/upcoming?provider_id&date&status
pub async fn upcoming(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UpcomingQuery>,
) -> ApiResult<Vec<BookingDetail>> {
    let bookings = state
        .bookings
        .upcoming(query.provider_id, query.date, query.status)
        .await?;
    Ok(Json(ApiResponse::success(bookings)))
}

/// GET /api/staff/bookings/pending
pub async fn pending(State(state): State<Arc<AppState>>) -> ApiResult<Vec<BookingDetail>> {
    let bookings = state.bookings.all_pending().await?;
    Ok(Json(ApiResponse::success(bookings)))
}

/// GET /api/staff/providers/{id}/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<i64>,
) -> ApiResult<BarberStats> {
    let stats = state.bookings.stats_by_barber(provider_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// POST /api/staff/bookings/{id}/complete
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<i64>,
) -> ApiResult<BookingDetail> {
    let booking = state.bookings.complete(booking_id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

/// POST /api/staff/coupons
pub async fn issue_coupon(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IssueCouponRequest>,
) -> ApiResult<Coupon> {
    let coupon = state.bookings.issue_coupon(body).await?;
    Ok(Json(ApiResponse::success(coupon)))
}
