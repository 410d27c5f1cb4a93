use ulid::Ulid;

use crate::model::*;

use super::{Ledger, LedgerError};

impl Ledger {
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// All rooms, ordered by id.
    pub async fn rooms(&self) -> Vec<Room> {
        let mut rooms = Vec::with_capacity(self.rooms.len());
        for rs in self.snapshot_states() {
            rooms.push(rs.read().await.room.clone());
        }
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub async fn room(&self, id: RoomId) -> Option<Room> {
        let rs = self.room_state(id)?;
        let guard = rs.read().await;
        Some(guard.room.clone())
    }

    /// Every committed booking, ordered by room then start.
    pub async fn bookings(&self) -> Vec<Booking> {
        let mut bookings = Vec::new();
        for rs in self.snapshot_states() {
            bookings.extend(rs.read().await.bookings.iter().cloned());
        }
        bookings.sort_by_key(|b| (b.room_id, b.span.start));
        bookings
    }

    pub async fn room_bookings(&self, id: RoomId) -> Result<Vec<Booking>, LedgerError> {
        let rs = self.room_state(id).ok_or(LedgerError::RoomNotFound(id))?;
        let guard = rs.read().await;
        Ok(guard.bookings.clone())
    }

    pub async fn booking(&self, id: Ulid) -> Option<Booking> {
        let room_id = self.booking_to_room.get(&id).map(|e| *e.value())?;
        let rs = self.room_state(room_id)?;
        let guard = rs.read().await;
        guard.bookings.iter().find(|b| b.id == id).cloned()
    }

    /// Clone the room handles out so no DashMap shard lock is held across an await.
    fn snapshot_states(&self) -> Vec<super::SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }
}
