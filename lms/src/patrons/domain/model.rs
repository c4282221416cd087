use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::domain::Identifiable;
use crate::patrons::Patron;
use crate::utils::date::serializer;

// PatronEntity abstracts a library member and the books currently lent to the member, in the
// order they were borrowed.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub(crate) struct PatronEntity {
    pub patron_id: i64,
    pub version: i64,
    pub name: String,
    pub borrowed: Vec<i64>,
    #[serde(with = "serializer")]
    pub created_at: NaiveDateTime,
    #[serde(with = "serializer")]
    pub updated_at: NaiveDateTime,
}

impl PatronEntity {
    pub fn new(patron_id: i64, name: &str) -> Self {
        Self {
            patron_id,
            version: 0,
            name: name.to_string(),
            borrowed: vec![],
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        }
    }

    // returns false when the book is already on the list
    pub fn lend(&mut self, book_id: i64) -> bool {
        if self.holds(book_id) {
            return false;
        }
        self.borrowed.push(book_id);
        self.touch();
        true
    }

    // returns false when the patron does not hold the book
    pub fn take_back(&mut self, book_id: i64) -> bool {
        match self.borrowed.iter().position(|id| *id == book_id) {
            Some(ndx) => {
                self.borrowed.remove(ndx);
                self.touch();
                true
            }
            None => false,
        }
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now().naive_utc();
    }
}

impl Identifiable for PatronEntity {
    fn id(&self) -> i64 {
        self.patron_id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl Patron for PatronEntity {
    fn borrowed(&self) -> &[i64] {
        self.borrowed.as_slice()
    }
}
