pub mod service;

use async_trait::async_trait;
use crate::books::dto::BookDto;
use crate::core::library::LibraryResult;
use crate::patrons::dto::PatronDto;
use crate::reservation::domain::model::{Reservation, ReservationToken};

/// CatalogService is the only component that mutates books and patrons. Every method runs under
/// the same exclusion point, so no caller ever observes a half applied transition.
#[async_trait]
pub trait CatalogService: Sync + Send {
    /// Adds or replaces a book; the stored copy always starts out Available.
    async fn add_book(&self, book: &BookDto) -> BookDto;
    /// Removes a book that is not currently borrowed.
    async fn remove_book(&self, book_id: i64) -> LibraryResult<()>;
    /// Registers a member; members are never created as a side effect of borrowing.
    async fn add_patron(&self, patron: &PatronDto) -> LibraryResult<PatronDto>;
    /// Lends an Available or Reserved book, consuming any pending reservation.
    async fn borrow_book(&self, book_id: i64, patron_id: i64) -> LibraryResult<BookDto>;
    /// Takes a book back from the member holding it.
    async fn return_book(&self, book_id: i64, patron_id: i64) -> LibraryResult<BookDto>;
    /// Reserves an Available book and arms its expiry timer.
    async fn reserve_book(&self, book_id: i64, patron_id: i64) -> LibraryResult<ReservationToken>;
    /// Lends a reserved book to the member who reserved it, proven by the reservation token.
    async fn checkout_reservation(&self, book_id: i64, patron_id: i64, token: ReservationToken) -> LibraryResult<BookDto>;
    /// Releases a reservation before it expires.
    async fn cancel_reservation(&self, book_id: i64, token: ReservationToken) -> LibraryResult<BookDto>;
    /// Reverts a reservation iff `token` is still current. Returns false for a superseded token.
    async fn expire_reservation(&self, book_id: i64, token: ReservationToken) -> bool;
    async fn list_available(&self) -> Vec<BookDto>;
    async fn list_borrowed(&self, patron_id: i64) -> Vec<BookDto>;
    async fn find_book_by_id(&self, book_id: i64) -> LibraryResult<BookDto>;
    async fn find_patron_by_id(&self, patron_id: i64) -> LibraryResult<PatronDto>;
    async fn find_reservation(&self, book_id: i64) -> Option<Reservation>;
}
