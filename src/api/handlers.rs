use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::model::{Booking, Room, RoomId};

use super::dto::{BookingCreatedResponse, BookingView, CreateBookingRequest};
use super::error::ApiError;
use super::extract::Requester;
use super::AppState;

/// POST /bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Requester(requester_id): Requester,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingCreatedResponse>), ApiError> {
    let Json(body) = payload?;
    let (start, end) = body.interval_ms()?;
    let booking_id = state
        .admission
        .admit(requester_id, body.room_id, body.title, start, end)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(BookingCreatedResponse::created(booking_id)),
    ))
}

/// GET /bookings
pub async fn list_bookings(
    State(state): State<AppState>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let bookings = state.ledger.bookings().await;
    Ok(Json(views(bookings)?))
}

/// GET /rooms
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<Room>> {
    Json(state.ledger.rooms().await)
}

/// GET /rooms/{id}/bookings
pub async fn room_bookings(
    State(state): State<AppState>,
    Path(id): Path<RoomId>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let bookings = state.ledger.room_bookings(id).await?;
    Ok(Json(views(bookings)?))
}

fn views(bookings: Vec<Booking>) -> Result<Vec<BookingView>, ApiError> {
    bookings.into_iter().map(BookingView::try_from).collect()
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": state.ledger.room_count(),
    }))
}
