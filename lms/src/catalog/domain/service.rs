use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use crate::books::domain::Book;
use crate::books::domain::model::BookEntity;
use crate::books::dto::BookDto;
use crate::catalog::domain::CatalogService;
use crate::core::domain::Configuration;
use crate::core::events::{DomainEvent, DomainEventType};
use crate::core::library::{BookStatus, LibraryError, LibraryResult};
use crate::gateway::events::EventPublisher;
use crate::patrons::Patron;
use crate::patrons::domain::model::PatronEntity;
use crate::patrons::dto::PatronDto;
use crate::reservation::domain::model::{Reservation, ReservationToken};
use crate::reservation::scheduler::{ExpiryHandle, ExpiryHandler};

// CatalogState is everything guarded by the catalog lock
#[derive(Debug, Default)]
pub(crate) struct CatalogState {
    pub(crate) books: HashMap<i64, BookEntity>,
    pub(crate) patrons: HashMap<i64, PatronEntity>,
    // at most one pending reservation per book, present iff the book is Reserved
    pub(crate) reservations: HashMap<i64, Reservation>,
}

impl CatalogState {
    fn current_reservation(&self, book_id: i64, token: ReservationToken) -> LibraryResult<&Reservation> {
        let status = self.books.get(&book_id).map(|b| b.book_status);
        match self.reservations.get(&book_id) {
            Some(reservation) if reservation.token == token => Ok(reservation),
            _ => Err(LibraryError::invalid_state(
                format!("reservation {} is no longer current for book {}", token, book_id).as_str(), status)),
        }
    }
}

pub(crate) struct CatalogServiceImpl {
    branch_id: String,
    reservation_ttl: Duration,
    state: Mutex<CatalogState>,
    expiry: ExpiryHandle,
    events_publisher: Box<dyn EventPublisher>,
}

impl CatalogServiceImpl {
    pub(crate) fn new(config: &Configuration, expiry: ExpiryHandle,
                      events_publisher: Box<dyn EventPublisher>) -> Self {
        Self {
            branch_id: config.branch_id.to_string(),
            reservation_ttl: config.reservation_ttl(),
            state: Mutex::new(CatalogState::default()),
            expiry,
            events_publisher,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &Mutex<CatalogState> {
        &self.state
    }

    // events go out after the lock is released; a failed publish never undoes a transition
    async fn publish(&self, event: serde_json::Result<DomainEvent>) {
        let res = match event {
            Ok(mut event) => {
                event.metadata.insert("branch_id".to_string(), self.branch_id.to_string());
                self.events_publisher.publish(&event).await
            }
            Err(err) => Err(LibraryError::from(err)),
        };
        if let Err(err) = res {
            warn!(error = %err, "failed to publish domain event");
        }
    }

    fn lend(state: &mut CatalogState, book_id: i64, patron_id: i64) -> LibraryResult<(BookDto, Option<Reservation>)> {
        let book = state.books.get_mut(&book_id).ok_or_else(|| LibraryError::item_not_found(
            format!("book with id {} not found", book_id).as_str()))?;
        if book.book_status == BookStatus::Borrowed {
            return Err(LibraryError::invalid_state(
                format!("book {} is already borrowed", book_id).as_str(), Some(book.book_status)));
        }
        let patron = state.patrons.get_mut(&patron_id).ok_or_else(|| LibraryError::holder_not_found(
            format!("patron with id {} not found", patron_id).as_str()))?;
        book.transition(BookStatus::Borrowed)?;
        patron.lend(book_id);
        let consumed = state.reservations.remove(&book_id);
        Ok((BookDto::from(&*book), consumed))
    }

    // detaches a book from whoever refers to it so it can be replaced or dropped
    fn detach(&self, state: &mut CatalogState, book_id: i64) {
        if let Some(reservation) = state.reservations.remove(&book_id) {
            self.expiry.cancel(book_id, reservation.token);
        }
        for patron in state.patrons.values_mut() {
            patron.take_back(book_id);
        }
    }
}

#[async_trait]
impl CatalogService for CatalogServiceImpl {
    async fn add_book(&self, book: &BookDto) -> BookDto {
        let added = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if state.books.contains_key(&book.book_id) {
                self.detach(state, book.book_id);
            }
            let mut entity = BookEntity::from(book);
            entity.book_status = BookStatus::Available;
            let added = BookDto::from(&entity);
            state.books.insert(book.book_id, entity);
            added
        };
        self.publish(DomainEvent::book(DomainEventType::Added, added.book_id, None, &added)).await;
        added
    }

    async fn remove_book(&self, book_id: i64) -> LibraryResult<()> {
        let removed = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let book = state.books.get(&book_id).ok_or_else(|| LibraryError::item_not_found(
                format!("book with id {} not found", book_id).as_str()))?;
            if book.book_status == BookStatus::Borrowed {
                return Err(LibraryError::invalid_state(
                    format!("book {} is borrowed and cannot be removed", book_id).as_str(), Some(book.book_status)));
            }
            self.detach(state, book_id);
            state.books.remove(&book_id)
        };
        if let Some(removed) = removed {
            self.publish(DomainEvent::book(DomainEventType::Removed, book_id, None, &BookDto::from(&removed))).await;
        }
        Ok(())
    }

    async fn add_patron(&self, patron: &PatronDto) -> LibraryResult<PatronDto> {
        let added = {
            let mut state = self.state.lock().await;
            if state.patrons.contains_key(&patron.patron_id) {
                return Err(LibraryError::duplicate_key(
                    format!("patron with id {} already exists", patron.patron_id).as_str()));
            }
            let entity = PatronEntity::from(patron);
            let added = PatronDto::from(&entity);
            state.patrons.insert(patron.patron_id, entity);
            added
        };
        self.publish(DomainEvent::patron(DomainEventType::Added, added.patron_id, &added)).await;
        Ok(added)
    }

    async fn borrow_book(&self, book_id: i64, patron_id: i64) -> LibraryResult<BookDto> {
        let (book, consumed) = {
            let mut state = self.state.lock().await;
            Self::lend(&mut state, book_id, patron_id)?
        };
        if let Some(reservation) = consumed {
            self.expiry.cancel(book_id, reservation.token);
        }
        self.publish(DomainEvent::book(DomainEventType::Borrowed, book_id, Some(patron_id), &book)).await;
        Ok(book)
    }

    async fn return_book(&self, book_id: i64, patron_id: i64) -> LibraryResult<BookDto> {
        let book = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let patron = state.patrons.get_mut(&patron_id).ok_or_else(|| LibraryError::holder_not_found(
                format!("patron with id {} not found", patron_id).as_str()))?;
            if !patron.holds(book_id) {
                return Err(LibraryError::not_held_by_holder(
                    format!("book {} is not held by patron {}", book_id, patron_id).as_str()));
            }
            let book = state.books.get_mut(&book_id).ok_or_else(|| LibraryError::item_not_found(
                format!("book with id {} not found", book_id).as_str()))?;
            book.transition(BookStatus::Available)?;
            patron.take_back(book_id);
            BookDto::from(&*book)
        };
        self.publish(DomainEvent::book(DomainEventType::Returned, book_id, Some(patron_id), &book)).await;
        Ok(book)
    }

    async fn reserve_book(&self, book_id: i64, patron_id: i64) -> LibraryResult<ReservationToken> {
        let reservation = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let book = state.books.get_mut(&book_id).ok_or_else(|| LibraryError::item_not_found(
                format!("book with id {} not found", book_id).as_str()))?;
            if !book.is_available() {
                return Err(LibraryError::already_unavailable(
                    format!("book {} already borrowed or reserved", book_id).as_str(), book.book_status));
            }
            let reservation = Reservation::new(book_id, patron_id, self.reservation_ttl);
            // arm the timer before the transition so a stopped scheduler leaves the book untouched
            self.expiry.schedule(book_id, reservation.token, self.reservation_ttl)?;
            book.transition(BookStatus::Reserved)?;
            state.reservations.insert(book_id, reservation.clone());
            reservation
        };
        debug!(book_id, patron_id, token = %reservation.token, "book reserved");
        self.publish(DomainEvent::book(DomainEventType::Reserved, book_id, Some(patron_id), &reservation)).await;
        Ok(reservation.token)
    }

    async fn checkout_reservation(&self, book_id: i64, patron_id: i64, token: ReservationToken) -> LibraryResult<BookDto> {
        let book = {
            let mut state = self.state.lock().await;
            let reservation = state.current_reservation(book_id, token)?;
            if reservation.patron_id != patron_id {
                return Err(LibraryError::invalid_state(
                    format!("book {} is reserved by another patron", book_id).as_str(), Some(BookStatus::Reserved)));
            }
            let (book, _) = Self::lend(&mut state, book_id, patron_id)?;
            book
        };
        self.expiry.cancel(book_id, token);
        self.publish(DomainEvent::book(DomainEventType::Borrowed, book_id, Some(patron_id), &book)).await;
        Ok(book)
    }

    async fn cancel_reservation(&self, book_id: i64, token: ReservationToken) -> LibraryResult<BookDto> {
        let (book, reservation) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.current_reservation(book_id, token)?;
            let book = state.books.get_mut(&book_id).ok_or_else(|| LibraryError::item_not_found(
                format!("book with id {} not found", book_id).as_str()))?;
            book.transition(BookStatus::Available)?;
            let book = BookDto::from(&*book);
            (book, state.reservations.remove(&book_id))
        };
        self.expiry.cancel(book_id, token);
        if let Some(reservation) = reservation {
            self.publish(DomainEvent::book(DomainEventType::Released, book_id, Some(reservation.patron_id), &book)).await;
        }
        Ok(book)
    }

    async fn expire_reservation(&self, book_id: i64, token: ReservationToken) -> bool {
        let expired = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if state.current_reservation(book_id, token).is_err() {
                return false;
            }
            let Some(book) = state.books.get_mut(&book_id) else {
                return false;
            };
            if book.transition(BookStatus::Available).is_err() {
                return false;
            }
            let book = BookDto::from(&*book);
            state.reservations.remove(&book_id).map(|r| (book, r))
        };
        match expired {
            Some((book, reservation)) => {
                self.publish(DomainEvent::book(DomainEventType::Expired, book_id, Some(reservation.patron_id), &book)).await;
                true
            }
            None => false,
        }
    }

    async fn list_available(&self) -> Vec<BookDto> {
        let state = self.state.lock().await;
        let mut available: Vec<BookDto> = state.books.values()
            .filter(|b| b.is_available())
            .map(BookDto::from)
            .collect();
        available.sort_by_key(|b| b.book_id);
        available
    }

    async fn list_borrowed(&self, patron_id: i64) -> Vec<BookDto> {
        let state = self.state.lock().await;
        match state.patrons.get(&patron_id) {
            Some(patron) => patron.borrowed().iter()
                .filter_map(|id| state.books.get(id))
                .map(BookDto::from)
                .collect(),
            None => vec![],
        }
    }

    async fn find_book_by_id(&self, book_id: i64) -> LibraryResult<BookDto> {
        let state = self.state.lock().await;
        state.books.get(&book_id).map(BookDto::from).ok_or_else(|| LibraryError::item_not_found(
            format!("book with id {} not found", book_id).as_str()))
    }

    async fn find_patron_by_id(&self, patron_id: i64) -> LibraryResult<PatronDto> {
        let state = self.state.lock().await;
        state.patrons.get(&patron_id).map(PatronDto::from).ok_or_else(|| LibraryError::holder_not_found(
            format!("patron with id {} not found", patron_id).as_str()))
    }

    async fn find_reservation(&self, book_id: i64) -> Option<Reservation> {
        let state = self.state.lock().await;
        state.reservations.get(&book_id).cloned()
    }
}

#[async_trait]
impl ExpiryHandler for CatalogServiceImpl {
    async fn expire(&self, book_id: i64, token: ReservationToken) -> bool {
        self.expire_reservation(book_id, token).await
    }
}
