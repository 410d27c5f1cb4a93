mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::LedgerError;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// The single mutation path for bookings.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn try_commit(&self, request: BookingRequest) -> Result<Ulid, LedgerError>;
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerOptions {
    /// Max wait for a room's exclusive lock.
    pub lock_timeout: Duration,
    /// Max wait, once the lock is held, for the WAL writer to pick up the append.
    pub commit_timeout: Duration,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            commit_timeout: Duration::from_secs(5),
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append(PendingAppend),
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

pub(super) struct PendingAppend {
    event: Event,
    /// Appends not yet written by this instant are refused, never written late.
    deadline: Instant,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain all immediately available Appends (the batch window).
/// 3. Refuse appends whose deadline already passed.
/// 4. Write the rest as one all-or-nothing batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append(first) => {
                let mut batch = vec![first];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append(next)) => batch.push(next),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    let now = Instant::now();
    let (live, expired): (Vec<_>, Vec<_>) = batch
        .into_iter()
        .partition(|p| p.deadline > now && !p.response.is_closed());

    if !expired.is_empty() {
        warn!("refusing {} WAL appends past their commit deadline", expired.len());
        metrics::counter!(crate::observability::WAL_APPENDS_EXPIRED_TOTAL)
            .increment(expired.len() as u64);
    }
    for p in expired {
        let _ = p.response.send(Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "commit deadline passed before write",
        )));
    }
    if live.is_empty() {
        return;
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(live.len() as f64);
    let flush_start = Instant::now();
    let result = wal.append_batch(live.iter().map(|p| &p.event));
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        error!("WAL batch of {} appends failed: {e}", live.len());
    }

    for p in live {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = p.response.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append(_) => unreachable!("appends are batched by the writer loop"),
    }
}

/// Authoritative store of rooms and their committed bookings.
///
/// Each room sits behind its own `RwLock`; commits take the room's write lock
/// for the whole check-then-insert sequence, so rooms never contend with each
/// other. Cloning is cheap and shares the same state.
#[derive(Clone)]
pub struct Ledger {
    rooms: Arc<DashMap<RoomId, SharedRoomState>>,
    /// Reverse lookup: booking id → room id
    booking_to_room: Arc<DashMap<Ulid, RoomId>>,
    /// Serializes catalog changes against compaction snapshots.
    catalog_lock: Arc<Mutex<()>>,
    wal_tx: mpsc::Sender<WalCommand>,
    options: LedgerOptions,
}

impl Ledger {
    /// Replay the WAL at `wal_path` and start the group-commit writer.
    pub fn open(wal_path: &Path, options: LedgerOptions) -> io::Result<Self> {
        let (wal, events) = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        // Build plain states first; nothing else can see them yet.
        let mut states: HashMap<RoomId, RoomState> = HashMap::new();
        let booking_to_room = DashMap::new();
        for event in events.iter() {
            match event {
                Event::RoomCreated { id, name, capacity, description } => {
                    states.entry(*id).or_insert_with(|| {
                        RoomState::new(Room {
                            id: *id,
                            name: name.clone(),
                            capacity: *capacity,
                            description: description.clone(),
                        })
                    });
                }
                Event::BookingConfirmed { id, room_id, requester_id, title, span, created_at } => {
                    let Some(rs) = states.get_mut(room_id) else {
                        warn!("replay: booking {id} references unknown room {room_id}, skipped");
                        continue;
                    };
                    if Span::try_new(span.start, span.end).is_none() {
                        warn!("replay: booking {id} has an empty interval, skipped");
                        continue;
                    }
                    if booking_to_room.contains_key(id) {
                        warn!("replay: booking {id} appears twice, later copy skipped");
                        continue;
                    }
                    // The log must never resurrect a double booking.
                    if let Some(existing) = rs.overlapping(span).next() {
                        warn!(
                            "replay: booking {id} overlaps {} in room {room_id}, skipped",
                            existing.id
                        );
                        continue;
                    }
                    rs.insert_booking(Booking {
                        id: *id,
                        room_id: *room_id,
                        requester_id: *requester_id,
                        title: title.clone(),
                        span: *span,
                        created_at: *created_at,
                    });
                    booking_to_room.insert(*id, *room_id);
                }
            }
        }

        let rooms = DashMap::new();
        for (id, rs) in states {
            rooms.insert(id, Arc::new(RwLock::new(rs)));
        }
        info!(
            "ledger replayed {} events: {} rooms, {} bookings",
            events.len(),
            rooms.len(),
            booking_to_room.len()
        );
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(rooms.len() as f64);

        Ok(Self {
            rooms: Arc::new(rooms),
            booking_to_room: Arc::new(booking_to_room),
            catalog_lock: Arc::new(Mutex::new(())),
            wal_tx,
            options,
        })
    }

    pub fn options(&self) -> LedgerOptions {
        self.options
    }

    pub fn room_state(&self, id: RoomId) -> Option<SharedRoomState> {
        self.rooms.get(&id).map(|e| e.value().clone())
    }

    /// Write an event through the group-commit writer and wait for its fsync.
    ///
    /// Only the hand-off is bounded by `deadline`. Once the writer accepts the
    /// append it always answers, and the answer is what the caller must act on.
    async fn wal_append(&self, event: Event, deadline: Instant) -> Result<(), LedgerError> {
        let (tx, rx) = oneshot::channel();
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.wal_tx
            .send_timeout(
                WalCommand::Append(PendingAppend {
                    event,
                    deadline,
                    response: tx,
                }),
                remaining,
            )
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => {
                    LedgerError::CommitTimeout(self.options.commit_timeout)
                }
                SendTimeoutError::Closed(_) => LedgerError::WalError("WAL writer shut down".into()),
            })?;
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => {
                Err(LedgerError::CommitTimeout(self.options.commit_timeout))
            }
            Ok(Err(e)) => Err(LedgerError::WalError(e.to_string())),
            Err(_) => Err(LedgerError::WalError("WAL writer dropped response".into())),
        }
    }

    fn index_booking(&self, rs: &mut RoomState, booking: Booking) {
        self.booking_to_room.insert(booking.id, booking.room_id);
        rs.insert_booking(booking);
    }
}

#[async_trait]
impl BookingLedger for Ledger {
    async fn try_commit(&self, request: BookingRequest) -> Result<Ulid, LedgerError> {
        Ledger::try_commit(self, request).await
    }
}
