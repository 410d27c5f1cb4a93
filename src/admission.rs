//! Booking admission: the single entry point per booking request.
//!
//! Stateless. Validates the proposed interval, hands the attempt to the
//! ledger, and folds ledger failures into the four outcomes callers act on.
//! Nothing is retried here; callers may retry `Unavailable` with backoff and
//! should not retry `Conflict`.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info};
use ulid::Ulid;

use crate::ledger::{BookingLedger, LedgerError};
use crate::model::{BookingRequest, Ms, RequesterId, RoomId};
use crate::observability::{ADMISSIONS_TOTAL, ADMISSION_DURATION_SECONDS, outcome_label};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("start time must be before end time")]
    InvalidInterval,
    #[error("booking rejected: {0}")]
    Rejected(&'static str),
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("room is already booked for an overlapping time")]
    Conflict,
    #[error("booking store unavailable: {0}")]
    Unavailable(String),
}

impl AdmissionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdmissionError::Unavailable(_))
    }
}

impl From<LedgerError> for AdmissionError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidInterval { .. } => AdmissionError::InvalidInterval,
            LedgerError::LimitExceeded(reason) => AdmissionError::Rejected(reason),
            LedgerError::RoomNotFound(id) => AdmissionError::RoomNotFound(id),
            LedgerError::Conflict(_) => AdmissionError::Conflict,
            LedgerError::RoomExists(_)
            | LedgerError::LockTimeout(_)
            | LedgerError::CommitTimeout(_)
            | LedgerError::WalError(_) => AdmissionError::Unavailable(e.to_string()),
        }
    }
}

pub struct AdmissionService {
    ledger: Arc<dyn BookingLedger>,
}

impl AdmissionService {
    pub fn new(ledger: Arc<dyn BookingLedger>) -> Self {
        Self { ledger }
    }

    /// Admit or reject one booking attempt by `requester_id`.
    pub async fn admit(
        &self,
        requester_id: RequesterId,
        room_id: RoomId,
        title: String,
        start: Ms,
        end: Ms,
    ) -> Result<Ulid, AdmissionError> {
        let started = Instant::now();
        let result = self
            .validate_and_commit(BookingRequest {
                room_id,
                requester_id,
                title,
                start,
                end,
            })
            .await;

        let outcome = outcome_label(&result);
        metrics::counter!(ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(ADMISSION_DURATION_SECONDS, "outcome" => outcome)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(id) => info!("booking {id} created on room {room_id} for requester {requester_id}"),
            Err(AdmissionError::Unavailable(reason)) => {
                error!("booking on room {room_id} for requester {requester_id} failed: {reason}")
            }
            Err(e) => debug!("booking on room {room_id} for requester {requester_id} refused: {e}"),
        }
        result
    }

    async fn validate_and_commit(&self, request: BookingRequest) -> Result<Ulid, AdmissionError> {
        if request.start >= request.end {
            return Err(AdmissionError::InvalidInterval);
        }
        Ok(self.ledger.try_commit(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    use crate::ledger::{Ledger, LedgerOptions};
    use crate::model::Room;

    const H: Ms = 3_600_000;

    /// Answers every commit with a canned result and records what it saw.
    struct ScriptedLedger {
        calls: AtomicUsize,
        seen: Mutex<Vec<BookingRequest>>,
        answer: fn() -> Result<Ulid, LedgerError>,
    }

    impl ScriptedLedger {
        fn new(answer: fn() -> Result<Ulid, LedgerError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                answer,
            })
        }
    }

    #[async_trait]
    impl BookingLedger for ScriptedLedger {
        async fn try_commit(&self, request: BookingRequest) -> Result<Ulid, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request);
            (self.answer)()
        }
    }

    #[tokio::test]
    async fn empty_interval_never_reaches_ledger() {
        let ledger = ScriptedLedger::new(|| Ok(Ulid::new()));
        let service = AdmissionService::new(ledger.clone());

        let result = service.admit(7, 1, "x".into(), H, H).await;
        assert!(matches!(result, Err(AdmissionError::InvalidInterval)));
        let result = service.admit(7, 1, "x".into(), 2 * H, H).await;
        assert!(matches!(result, Err(AdmissionError::InvalidInterval)));
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn requester_is_passed_through_explicitly() {
        let ledger = ScriptedLedger::new(|| Ok(Ulid::new()));
        let service = AdmissionService::new(ledger.clone());

        assert_ok!(service.admit(42, 3, "retro".into(), 0, H).await);
        let seen = ledger.seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[BookingRequest {
                room_id: 3,
                requester_id: 42,
                title: "retro".into(),
                start: 0,
                end: H,
            }]
        );
    }

    #[tokio::test]
    async fn ledger_outcomes_are_mapped() {
        let cases: [(fn() -> Result<Ulid, LedgerError>, &str); 6] = [
            (|| Err(LedgerError::Conflict(Ulid::new())), "conflict"),
            (|| Err(LedgerError::RoomNotFound(5)), "not_found"),
            (|| Err(LedgerError::LimitExceeded("title too long")), "rejected"),
            (|| Err(LedgerError::LockTimeout(Duration::from_secs(5))), "unavailable"),
            (|| Err(LedgerError::CommitTimeout(Duration::from_secs(5))), "unavailable"),
            (|| Err(LedgerError::WalError("disk full".into())), "unavailable"),
        ];
        for (answer, expected) in cases {
            let service = AdmissionService::new(ScriptedLedger::new(answer));
            let result = service.admit(1, 5, "x".into(), 0, H).await;
            assert_eq!(outcome_label(&result), expected);
        }
    }

    #[tokio::test]
    async fn only_unavailable_is_retryable() {
        let service = AdmissionService::new(ScriptedLedger::new(|| {
            Err(LedgerError::WalError("fsync failed".into()))
        }));
        let err = assert_err!(service.admit(1, 1, "x".into(), 0, H).await);
        assert!(err.is_retryable());

        let service =
            AdmissionService::new(ScriptedLedger::new(|| Err(LedgerError::Conflict(Ulid::new()))));
        let err = assert_err!(service.admit(1, 1, "x".into(), 0, H).await);
        assert!(!err.is_retryable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_admissions_through_real_ledger() {
        let dir = std::env::temp_dir().join("roomledger_test_admission");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("concurrent.wal");
        let _ = std::fs::remove_file(&path);

        let ledger = Ledger::open(&path, LedgerOptions::default()).unwrap();
        ledger
            .create_room(Room {
                id: 1,
                name: "Boardroom".into(),
                capacity: 12,
                description: String::new(),
            })
            .await
            .unwrap();
        let service = Arc::new(AdmissionService::new(Arc::new(ledger)));

        let attempts = (0..20).map(|requester| {
            let service = service.clone();
            async move { service.admit(requester, 1, "offsite".into(), H, 2 * H).await }
        });
        let results = futures::future::join_all(attempts).await;

        let created = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(AdmissionError::Conflict)))
            .count();
        assert_eq!(created, 1);
        assert_eq!(conflicts, 19);
    }
}
