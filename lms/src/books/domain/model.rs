use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::books::domain::Book;
use crate::core::domain::Identifiable;
use crate::core::library::{BookStatus, LibraryError, LibraryResult};
use crate::utils::date::serializer;

// BookEntity is the catalog's authoritative record of a lendable book. Only the catalog
// service holds these; everybody else sees BookDto snapshots.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub(crate) struct BookEntity {
    pub book_id: i64,
    pub version: i64,
    pub title: String,
    pub author: String,
    pub book_status: BookStatus,
    #[serde(with = "serializer")]
    pub created_at: NaiveDateTime,
    #[serde(with = "serializer")]
    pub updated_at: NaiveDateTime,
}

impl BookEntity {
    pub fn new(book_id: i64, title: &str, author: &str) -> Self {
        Self {
            book_id,
            version: 0,
            title: title.to_string(),
            author: author.to_string(),
            book_status: BookStatus::Available,
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        }
    }

    // moves the book along one edge of the lending graph and bumps its version
    pub fn transition(&mut self, next: BookStatus) -> LibraryResult<()> {
        if !self.book_status.can_transition_to(next) {
            return Err(LibraryError::invalid_state(format!("book {} cannot move from {} to {}",
                                                           self.book_id, self.book_status, next).as_str(),
                                                   Some(self.book_status)));
        }
        self.book_status = next;
        self.version += 1;
        self.updated_at = Utc::now().naive_utc();
        Ok(())
    }
}

impl Identifiable for BookEntity {
    fn id(&self) -> i64 {
        self.book_id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl Book for BookEntity {
    fn status(&self) -> BookStatus {
        self.book_status
    }
}
