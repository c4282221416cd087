use crate::core::domain::Identifiable;

pub mod domain;
pub mod dto;

pub trait Patron: Identifiable {
    fn borrowed(&self) -> &[i64];

    fn holds(&self, book_id: i64) -> bool {
        self.borrowed().contains(&book_id)
    }
}
