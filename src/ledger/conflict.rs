use crate::limits::*;
use crate::model::*;

use super::LedgerError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Shape checks that need no lock: ordering, timestamp range, width, title.
pub(crate) fn validate_request(request: &BookingRequest) -> Result<Span, LedgerError> {
    let span = Span::try_new(request.start, request.end).ok_or(LedgerError::InvalidInterval {
        start: request.start,
        end: request.end,
    })?;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(LedgerError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(LedgerError::LimitExceeded("span too wide"));
    }
    if request.title.len() > MAX_TITLE_LEN {
        return Err(LedgerError::LimitExceeded("title too long"));
    }
    Ok(span)
}

pub(crate) fn validate_room(room: &Room) -> Result<(), LedgerError> {
    if room.name.len() > MAX_NAME_LEN {
        return Err(LedgerError::LimitExceeded("room name too long"));
    }
    if room.description.len() > MAX_DESCRIPTION_LEN {
        return Err(LedgerError::LimitExceeded("room description too long"));
    }
    Ok(())
}

/// First committed booking overlapping `span`, if any. Caller holds the room lock.
pub(crate) fn check_no_conflict(rs: &RoomState, span: &Span) -> Result<(), LedgerError> {
    match rs.overlapping(span).next() {
        Some(existing) => Err(LedgerError::Conflict(existing.id)),
        None => Ok(()),
    }
}
