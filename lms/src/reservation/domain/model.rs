use std::fmt;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::core::library::LibraryResult;
use crate::utils::date::serializer;

// ReservationToken identifies one reservation instance of a book. A new token is minted every
// time a book moves to Reserved, so a stale expiry can never revert a newer reservation.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct ReservationToken(Uuid);

impl ReservationToken {
    pub(crate) fn mint() -> Self {
        ReservationToken(Uuid::new_v4())
    }
}

impl Display for ReservationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Reservation is the catalog's record of the reservation currently pending on a book
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub token: ReservationToken,
    pub book_id: i64,
    pub patron_id: i64,
    #[serde(with = "serializer")]
    pub reserved_at: NaiveDateTime,
    #[serde(with = "serializer")]
    pub expires_at: NaiveDateTime,
}

impl Reservation {
    pub(crate) fn new(book_id: i64, patron_id: i64, ttl: Duration) -> Self {
        let now = Utc::now().naive_utc();
        let ttl = chrono::Duration::milliseconds(ttl.as_millis().min(i64::MAX as u128) as i64);
        Self {
            token: ReservationToken::mint(),
            book_id,
            patron_id,
            reserved_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(NaiveDateTime::MAX),
        }
    }
}

// ReservationRequest is what a submitter enqueues for the reservation worker
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub book_id: i64,
    pub patron_id: i64,
}

impl ReservationRequest {
    pub fn new(book_id: i64, patron_id: i64) -> Self {
        Self {
            book_id,
            patron_id,
        }
    }
}

// ReservationOutcome is reported by the worker for every request it took off its queue
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationOutcome {
    pub request: ReservationRequest,
    pub result: LibraryResult<ReservationToken>,
}

impl ReservationOutcome {
    pub fn is_reserved(&self) -> bool {
        self.result.is_ok()
    }
}
