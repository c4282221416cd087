use std::collections::HashMap;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::utils::date::serializer;

// DomainEventType defines type of event for lending changes
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum DomainEventType {
    Added,
    Removed,
    Reserved,
    Released,
    Expired,
    Borrowed,
    Returned,
}

// DomainEvent abstracts domain event for catalog changes
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: String,
    pub name: String,
    pub group: String,
    pub key: String,
    pub kind: DomainEventType,
    pub metadata: HashMap<String, String>,
    pub json_data: String,
    #[serde(with = "serializer")]
    pub created_at: NaiveDateTime,
}

impl DomainEvent {
    pub fn new<T: Serialize>(name: &str, group: &str, key: &str, kind: DomainEventType,
                             metadata: &HashMap<String, String>, data: &T) -> serde_json::Result<Self> {
        let json = serde_json::to_string(&data)?;
        Ok(DomainEvent {
            event_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            group: group.to_string(),
            key: key.to_string(),
            kind,
            metadata: metadata.clone(),
            json_data: json,
            created_at: Utc::now().naive_utc(),
        })
    }

    pub fn book<T: Serialize>(kind: DomainEventType, book_id: i64, patron_id: Option<i64>, data: &T) -> serde_json::Result<Self> {
        let mut metadata = HashMap::new();
        if let Some(patron_id) = patron_id {
            metadata.insert("patron_id".to_string(), patron_id.to_string());
        }
        let name = format!("book_{:?}", kind).to_lowercase();
        Self::new(name.as_str(), "books", book_id.to_string().as_str(), kind, &metadata, data)
    }

    pub fn patron<T: Serialize>(kind: DomainEventType, patron_id: i64, data: &T) -> serde_json::Result<Self> {
        let name = format!("patron_{:?}", kind).to_lowercase();
        Self::new(name.as_str(), "patrons", patron_id.to_string().as_str(), kind, &HashMap::new(), data)
    }
}
