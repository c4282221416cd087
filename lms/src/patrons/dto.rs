use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use crate::core::domain::Identifiable;
use crate::patrons::Patron;
use crate::patrons::domain::model::PatronEntity;
use crate::utils::date::serializer;

// PatronDto is the snapshot of a library member handed out by the catalog service.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PatronDto {
    pub patron_id: i64,
    pub version: i64,
    pub name: String,
    pub borrowed: Vec<i64>,
    #[serde(with = "serializer")]
    pub created_at: NaiveDateTime,
    #[serde(with = "serializer")]
    pub updated_at: NaiveDateTime,
}

impl PatronDto {
    pub fn new(patron_id: i64, name: &str) -> Self {
        PatronDto::from(&PatronEntity::new(patron_id, name))
    }
}

impl Identifiable for PatronDto {
    fn id(&self) -> i64 {
        self.patron_id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl Patron for PatronDto {
    fn borrowed(&self) -> &[i64] {
        self.borrowed.as_slice()
    }
}

impl From<&PatronEntity> for PatronDto {
    fn from(other: &PatronEntity) -> Self {
        Self {
            patron_id: other.patron_id,
            version: other.version,
            name: other.name.to_string(),
            borrowed: other.borrowed.clone(),
            created_at: other.created_at,
            updated_at: other.updated_at,
        }
    }
}

impl From<&PatronDto> for PatronEntity {
    // a new member never starts out holding books; lending goes through the catalog
    fn from(other: &PatronDto) -> Self {
        Self {
            patron_id: other.patron_id,
            version: other.version,
            name: other.name.to_string(),
            borrowed: vec![],
            created_at: other.created_at,
            updated_at: other.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::patrons::Patron;
    use crate::patrons::domain::model::PatronEntity;
    use crate::patrons::dto::PatronDto;
    use crate::utils::date::DATE_FMT;

    #[tokio::test]
    async fn test_should_build_patron() {
        let patron = PatronDto::new(102, "Sara");
        assert_eq!(102, patron.patron_id);
        assert_eq!("Sara", patron.name.as_str());
        assert!(!patron.holds(1));
    }

    #[tokio::test]
    async fn test_should_drop_borrowed_books_on_registration() {
        let mut patron = PatronDto::new(102, "Sara");
        patron.borrowed = vec![1, 2];
        let entity = PatronEntity::from(&patron);
        assert!(entity.borrowed.is_empty());
    }

    #[tokio::test]
    async fn test_should_convert_entity() {
        let mut entity = PatronEntity::new(103, "Liya");
        entity.lend(5);
        let dto = PatronDto::from(&entity);
        assert_eq!(vec![5], dto.borrowed);
        assert!(dto.holds(5));
    }

    #[tokio::test]
    async fn test_should_serialize_dates_like_books() {
        let patron = PatronDto::new(101, "Abebe");
        let json = serde_json::to_value(&patron).expect("should serialize");
        let expected = patron.created_at.format(DATE_FMT).to_string();
        assert_eq!(Some(expected.as_str()), json["created_at"].as_str());
        let loaded: PatronDto = serde_json::from_value(json).expect("should deserialize");
        assert_eq!(patron, loaded);
    }
}
