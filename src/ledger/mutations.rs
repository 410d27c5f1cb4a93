use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_request, validate_room};
use super::{Ledger, LedgerError, SharedRoomState, WalCommand};

impl Ledger {
    /// Register a room from the catalog.
    pub async fn create_room(&self, room: Room) -> Result<(), LedgerError> {
        validate_room(&room)?;
        let _catalog = self.catalog_lock.lock().await;
        if self.rooms.contains_key(&room.id) {
            return Err(LedgerError::RoomExists(room.id));
        }
        if self.rooms.len() >= MAX_ROOMS {
            return Err(LedgerError::LimitExceeded("too many rooms"));
        }

        let deadline = Instant::now() + self.options.commit_timeout;
        self.wal_append(Event::room(&room), deadline).await?;
        info!("room {} ({}) registered", room.id, room.name);
        self.rooms.insert(room.id, Arc::new(RwLock::new(RoomState::new(room))));
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(self.rooms.len() as f64);
        Ok(())
    }

    /// Conflict-checked insertion of one booking.
    ///
    /// Behaves as if serializable per room: the room's write lock is held
    /// from the conflict scan until the booking is durable and applied, so two
    /// overlapping proposals can never both pass the scan. Either exactly one
    /// booking is added or nothing changes.
    pub async fn try_commit(&self, request: BookingRequest) -> Result<Ulid, LedgerError> {
        let span = validate_request(&request)?;
        let rs = self
            .room_state(request.room_id)
            .ok_or(LedgerError::RoomNotFound(request.room_id))?;

        // The locked section runs on its own task: a dropped caller must not
        // leave a WAL record without the matching in-memory booking.
        let ledger = self.clone();
        tokio::spawn(async move { ledger.commit_exclusive(rs, request, span).await })
            .await
            .map_err(|e| LedgerError::WalError(format!("commit task failed: {e}")))?
    }

    async fn commit_exclusive(
        &self,
        rs: SharedRoomState,
        request: BookingRequest,
        span: Span,
    ) -> Result<Ulid, LedgerError> {
        let wait_start = Instant::now();
        let mut guard = tokio::time::timeout(self.options.lock_timeout, rs.write_owned())
            .await
            .map_err(|_| LedgerError::LockTimeout(self.options.lock_timeout))?;
        metrics::histogram!(crate::observability::ROOM_LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());

        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(LedgerError::LimitExceeded("too many bookings on room"));
        }
        check_no_conflict(&guard, &span)?;

        let booking = Booking {
            id: Ulid::new(),
            room_id: request.room_id,
            requester_id: request.requester_id,
            title: request.title,
            span,
            created_at: now_ms(),
        };
        let deadline = Instant::now() + self.options.commit_timeout;
        self.wal_append(Event::booking(&booking), deadline).await?;

        let id = booking.id;
        debug!("booking {id} committed on room {}", booking.room_id);
        self.index_booking(&mut guard, booking);
        Ok(id)
    }

    /// Rewrite the WAL as the minimal event set for the current state.
    ///
    /// Holds the catalog lock and every room's read lock from snapshot to
    /// swap, so no commit can land between the two.
    pub async fn compact_wal(&self) -> Result<(), LedgerError> {
        let _catalog = self.catalog_lock.lock().await;

        let mut ids: Vec<RoomId> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rs) = self.room_state(id) {
                guards.push(rs.read_owned().await);
            }
        }

        let mut events = Vec::new();
        for guard in &guards {
            events.push(Event::room(&guard.room));
            events.extend(guard.bookings.iter().map(Event::booking));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| LedgerError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| LedgerError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| LedgerError::WalError(e.to_string()))?;

        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
