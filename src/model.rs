use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Catalog key of a room.
pub type RoomId = i64;

/// Identity of an authenticated requester, as issued by the token service.
pub type RequesterId = i64;

/// The conflict rule: half-open `[a_start, a_end)` and `[b_start, b_end)` share an instant.
///
/// Touching endpoints do not overlap, so back-to-back bookings are allowed.
/// Every conflict decision in the ledger goes through this function.
pub fn overlaps(a_start: Ms, a_end: Ms, b_start: Ms, b_end: Ms) -> bool {
    a_start < b_end && b_start < a_end
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }
}

/// A bookable room. Read-only to admission; created by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub capacity: u32,
    pub description: String,
}

/// A committed reservation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: RoomId,
    pub requester_id: RequesterId,
    pub title: String,
    pub span: Span,
    pub created_at: Ms,
}

/// One admission attempt. Lives only for the duration of a commit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub room_id: RoomId,
    pub requester_id: RequesterId,
    pub title: String,
    pub start: Ms,
    pub end: Ms,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Committed bookings, sorted by `span.start`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Return only bookings whose span overlaps the query window.
    /// Binary search skips bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.overlaps(query))
    }
}

/// The WAL record format: flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: RoomId,
        name: String,
        capacity: u32,
        description: String,
    },
    BookingConfirmed {
        id: Ulid,
        room_id: RoomId,
        requester_id: RequesterId,
        title: String,
        span: Span,
        created_at: Ms,
    },
}

impl Event {
    pub fn booking(booking: &Booking) -> Self {
        Event::BookingConfirmed {
            id: booking.id,
            room_id: booking.room_id,
            requester_id: booking.requester_id,
            title: booking.title.clone(),
            span: booking.span,
            created_at: booking.created_at,
        }
    }

    pub fn room(room: &Room) -> Self {
        Event::RoomCreated {
            id: room.id,
            name: room.name.clone(),
            capacity: room.capacity,
            description: room.description.clone(),
        }
    }
}
