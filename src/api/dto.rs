use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{Booking, Ms, RequesterId, RoomId};

use super::error::ApiError;

/// POST /bookings body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub room_id: RoomId,
    #[serde(default)]
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl CreateBookingRequest {
    /// The requested interval in ledger milliseconds.
    ///
    /// Instants finer than a millisecond are refused, never truncated.
    pub fn interval_ms(&self) -> Result<(Ms, Ms), ApiError> {
        Ok((
            whole_millis(&self.start_time, "startTime")?,
            whole_millis(&self.end_time, "endTime")?,
        ))
    }
}

fn whole_millis(instant: &DateTime<Utc>, field: &str) -> Result<Ms, ApiError> {
    if instant.timestamp_subsec_nanos() % 1_000_000 != 0 {
        return Err(ApiError::BadRequest(format!(
            "{field} must have at most millisecond precision"
        )));
    }
    Ok(instant.timestamp_millis())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreatedResponse {
    pub status: String,
    pub booking_id: Ulid,
}

impl BookingCreatedResponse {
    pub fn created(booking_id: Ulid) -> Self {
        Self {
            status: "created".into(),
            booking_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Ulid,
    pub room_id: RoomId,
    pub user_id: RequesterId,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

fn to_datetime(ms: Ms) -> Result<DateTime<Utc>, ApiError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        tracing::error!("stored instant {ms} is outside the representable range");
        ApiError::Unavailable(format!("stored instant {ms} out of range"))
    })
}

impl TryFrom<Booking> for BookingView {
    type Error = ApiError;

    fn try_from(b: Booking) -> Result<Self, Self::Error> {
        Ok(Self {
            id: b.id,
            room_id: b.room_id,
            user_id: b.requester_id,
            title: b.title,
            start_time: to_datetime(b.span.start)?,
            end_time: to_datetime(b.span.end)?,
            created_at: to_datetime(b.created_at)?,
        })
    }
}
