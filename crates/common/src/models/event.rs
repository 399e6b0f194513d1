//! Calendar events and their typed references to remote catalog entities

use serde::{Deserialize, Serialize};

use super::book::BookMetadata;

/// A date-keyed literary calendar event
///
/// `month`/`day` form the recurring MM-DD key; `year` is informational only
/// (age and jubilee computation), never part of identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub month: u32,
    pub day: u32,
    pub event_type: EventType,
    pub year: Option<i32>,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Birthday,
    Death,
    Custom,
    MemorableDay,
    Anniversary,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Birthday => "birthday",
            EventType::Death => "death",
            EventType::Custom => "custom",
            EventType::MemorableDay => "memorable_day",
            EventType::Anniversary => "anniversary",
        }
    }

    /// Parse a stored type string; unknown values collapse to `Custom`
    pub fn parse(value: &str) -> Self {
        match value {
            "birthday" => EventType::Birthday,
            "death" => EventType::Death,
            "memorable_day" => EventType::MemorableDay,
            "anniversary" => EventType::Anniversary,
            _ => EventType::Custom,
        }
    }
}

/// A typed pointer from an event to a remote catalog entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub reference_type: ReferenceType,
    /// Opaque remote identifier, minted by the catalog
    pub uuid: Option<String>,
    /// Human-readable remote identifier, preferred over uuid for URLs
    pub slug: Option<String>,
    pub name: String,
    /// Lower value = higher precedence
    pub priority: i32,
    pub metadata: BookMetadata,
}

impl Reference {
    /// Identifier used when building a link for this reference
    pub fn link_identifier(&self) -> Option<&str> {
        non_empty(self.slug.as_deref()).or_else(|| non_empty(self.uuid.as_deref()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Author,
    Book,
    Tag,
    Category,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Author => "author",
            ReferenceType::Book => "book",
            ReferenceType::Tag => "tag",
            ReferenceType::Category => "category",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "author" => Some(ReferenceType::Author),
            "book" => Some(ReferenceType::Book),
            "tag" => Some(ReferenceType::Tag),
            "category" => Some(ReferenceType::Category),
            _ => None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        for ty in [
            EventType::Birthday,
            EventType::Death,
            EventType::Custom,
            EventType::MemorableDay,
            EventType::Anniversary,
        ] {
            assert_eq!(EventType::parse(ty.as_str()), ty);
        }
        assert_eq!(EventType::parse("book_published"), EventType::Custom);
    }

    #[test]
    fn test_link_identifier_prefers_slug() {
        let reference = Reference {
            reference_type: ReferenceType::Author,
            uuid: Some("uuid-1".into()),
            slug: Some("tolstoy".into()),
            name: "Лев Толстой".into(),
            priority: 0,
            metadata: BookMetadata::default(),
        };
        assert_eq!(reference.link_identifier(), Some("tolstoy"));

        let uuid_only = Reference {
            slug: Some(String::new()),
            ..reference
        };
        assert_eq!(uuid_only.link_identifier(), Some("uuid-1"));
    }
}
