use std::fmt;
use std::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum LibraryError {
    ItemNotFound {
        message: String,
    },
    HolderNotFound {
        message: String,
    },
    // The requested transition is not an edge of the status graph, or the reservation token
    // presented is no longer the current one.
    InvalidState {
        message: String,
        status: Option<BookStatus>,
    },
    AlreadyUnavailable {
        message: String,
        status: BookStatus,
    },
    NotHeldByHolder {
        message: String,
    },
    DuplicateKey {
        message: String,
    },
    // This is a retry-able error, which indicates that the reservation queue of the worker that
    // owns the book is full. The caller can resubmit with or without a backoff.
    QueueFull {
        message: String,
        retryable: bool,
    },
    Cancelled {
        message: String,
    },
    Serialization {
        message: String,
    },
    Configuration {
        message: String,
    },
}

impl LibraryError {
    pub fn item_not_found(message: &str) -> LibraryError {
        LibraryError::ItemNotFound { message: message.to_string() }
    }

    pub fn holder_not_found(message: &str) -> LibraryError {
        LibraryError::HolderNotFound { message: message.to_string() }
    }

    pub fn invalid_state(message: &str, status: Option<BookStatus>) -> LibraryError {
        LibraryError::InvalidState { message: message.to_string(), status }
    }

    pub fn already_unavailable(message: &str, status: BookStatus) -> LibraryError {
        LibraryError::AlreadyUnavailable { message: message.to_string(), status }
    }

    pub fn not_held_by_holder(message: &str) -> LibraryError {
        LibraryError::NotHeldByHolder { message: message.to_string() }
    }

    pub fn duplicate_key(message: &str) -> LibraryError {
        LibraryError::DuplicateKey { message: message.to_string() }
    }

    pub fn queue_full(message: &str) -> LibraryError {
        LibraryError::QueueFull { message: message.to_string(), retryable: true }
    }

    pub fn cancelled(message: &str) -> LibraryError {
        LibraryError::Cancelled { message: message.to_string() }
    }

    pub fn serialization(message: &str) -> LibraryError {
        LibraryError::Serialization { message: message.to_string() }
    }

    pub fn configuration(message: &str) -> LibraryError {
        LibraryError::Configuration { message: message.to_string() }
    }

    pub fn retryable(&self) -> bool {
        match self {
            LibraryError::ItemNotFound { .. } => { false }
            LibraryError::HolderNotFound { .. } => { false }
            LibraryError::InvalidState { .. } => { false }
            LibraryError::AlreadyUnavailable { .. } => { false }
            LibraryError::NotHeldByHolder { .. } => { false }
            LibraryError::DuplicateKey { .. } => { false }
            LibraryError::QueueFull { retryable, .. } => { *retryable }
            LibraryError::Cancelled { .. } => { false }
            LibraryError::Serialization { .. } => { false }
            LibraryError::Configuration { .. } => { false }
        }
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::serialization(
            format!("serde json parsing {:?}", err).as_str())
    }
}

impl From<config::ConfigError> for LibraryError {
    fn from(err: config::ConfigError) -> Self {
        LibraryError::configuration(
            format!("failed to load configuration {}", err).as_str())
    }
}

impl Display for LibraryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::ItemNotFound { message } => {
                write!(f, "{}", message)
            }
            LibraryError::HolderNotFound { message } => {
                write!(f, "{}", message)
            }
            LibraryError::InvalidState { message, status } => {
                write!(f, "{} {:?}", message, status)
            }
            LibraryError::AlreadyUnavailable { message, status } => {
                write!(f, "{} {}", message, status)
            }
            LibraryError::NotHeldByHolder { message } => {
                write!(f, "{}", message)
            }
            LibraryError::DuplicateKey { message } => {
                write!(f, "{}", message)
            }
            LibraryError::QueueFull { message, retryable } => {
                write!(f, "{} {}", message, retryable)
            }
            LibraryError::Cancelled { message } => {
                write!(f, "{}", message)
            }
            LibraryError::Serialization { message } => {
                write!(f, "{}", message)
            }
            LibraryError::Configuration { message } => {
                write!(f, "{}", message)
            }
        }
    }
}

impl std::error::Error for LibraryError {}

/// A specialized Result type for the lending engine.
pub type LibraryResult<T> = Result<T, LibraryError>;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum BookStatus {
    Available,
    Reserved,
    Borrowed,
}

impl BookStatus {
    // Edges of the lending graph; every transition in the catalog goes through this check.
    pub fn can_transition_to(&self, next: BookStatus) -> bool {
        matches!((self, next),
            (BookStatus::Available, BookStatus::Reserved) |
            (BookStatus::Available, BookStatus::Borrowed) |
            (BookStatus::Reserved, BookStatus::Available) |
            (BookStatus::Reserved, BookStatus::Borrowed) |
            (BookStatus::Borrowed, BookStatus::Available))
    }
}

impl Display for BookStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            BookStatus::Available => write!(f, "Available"),
            BookStatus::Reserved => write!(f, "Reserved"),
            BookStatus::Borrowed => write!(f, "Borrowed"),
        }
    }
}
