//! Event store over embedded sqlite
//!
//! Provides:
//! - The read contract consumed by the digest pipeline
//! - A repository over an sqlx sqlite pool with idempotent schema setup
//! - Seed helpers used by imports and tests

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::errors::Result;
use crate::models::{BookMetadata, Event, EventType, JubileeRecord, Reference, ReferenceType};

/// Read contract of the persistent event store
#[async_trait]
pub trait EventStore: Send + Sync {
    /// All events for one MM-DD key, in stable store order
    async fn events_for_date(&self, month: u32, day: u32) -> Result<Vec<Event>>;

    /// Round-number anniversaries for a target year
    async fn jubilees_for_year(&self, year: i32) -> Result<Vec<JubileeRecord>>;
}

/// Sqlite-backed event store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the configured database file
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(path = %config.path, "Event store opened");
        Ok(Self { pool })
    }

    /// An isolated in-memory store for tests
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_date TEXT NOT NULL,
                event_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                year INTEGER,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS event_references (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL,
                reference_type TEXT NOT NULL,
                reference_uuid TEXT,
                reference_slug TEXT,
                reference_name TEXT,
                priority INTEGER DEFAULT 0,
                metadata TEXT,
                FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_event_date ON events(event_date)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_event_type ON events(event_type)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reference_event ON event_references(event_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an event row; returns its id
    pub async fn add_event(
        &self,
        month: u32,
        day: u32,
        event_type: EventType,
        title: &str,
        description: Option<&str>,
        year: Option<i32>,
    ) -> Result<i64> {
        let event_date = format!("{:02}-{:02}", month, day);
        let result = sqlx::query(
            "INSERT INTO events (event_date, event_type, title, description, year)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&event_date)
        .bind(event_type.as_str())
        .bind(title)
        .bind(description)
        .bind(year)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Attach a reference to an event; returns the reference id
    pub async fn add_reference(&self, event_id: i64, reference: &Reference) -> Result<i64> {
        let metadata = serde_json::to_string(&reference.metadata)?;
        let result = sqlx::query(
            "INSERT INTO event_references
                 (event_id, reference_type, reference_uuid, reference_slug,
                  reference_name, priority, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(event_id)
        .bind(reference.reference_type.as_str())
        .bind(reference.uuid.as_deref())
        .bind(reference.slug.as_deref())
        .bind(&reference.name)
        .bind(reference.priority)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Connectivity probe
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn references_for_event(&self, event_id: i64) -> Result<Vec<Reference>> {
        let rows = sqlx::query(
            "SELECT reference_type, reference_uuid, reference_slug,
                    reference_name, priority, metadata
             FROM event_references
             WHERE event_id = ?1
             ORDER BY priority, id",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        let mut references = Vec::with_capacity(rows.len());
        for row in rows {
            let type_str: String = row.try_get("reference_type")?;
            let Some(reference_type) = ReferenceType::parse(&type_str) else {
                debug!(event_id, reference_type = %type_str, "Skipping unknown reference type");
                continue;
            };

            let metadata = row
                .try_get::<Option<String>, _>("metadata")?
                .map(|raw| BookMetadata::parse(&raw))
                .unwrap_or_default();

            references.push(Reference {
                reference_type,
                uuid: none_if_empty(row.try_get("reference_uuid")?),
                slug: none_if_empty(row.try_get("reference_slug")?),
                name: row
                    .try_get::<Option<String>, _>("reference_name")?
                    .unwrap_or_default(),
                priority: row.try_get::<i64, _>("priority")? as i32,
                metadata,
            });
        }
        Ok(references)
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn events_for_date(&self, month: u32, day: u32) -> Result<Vec<Event>> {
        let event_date = format!("{:02}-{:02}", month, day);
        let rows = sqlx::query(
            "SELECT id, title, description, event_type, year
             FROM events
             WHERE event_date = ?1
             ORDER BY event_type, year DESC",
        )
        .bind(&event_date)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let type_str: String = row.try_get("event_type")?;
            events.push(Event {
                id,
                title: row.try_get("title")?,
                description: none_if_empty(row.try_get("description")?),
                month,
                day,
                event_type: EventType::parse(&type_str),
                year: row.try_get::<Option<i64>, _>("year")?.map(|y| y as i32),
                references: self.references_for_event(id).await?,
            });
        }
        Ok(events)
    }

    async fn jubilees_for_year(&self, year: i32) -> Result<Vec<JubileeRecord>> {
        let rows = sqlx::query(
            "SELECT id, title, event_date, year
             FROM events
             WHERE event_type IN ('birthday', 'anniversary') AND year IS NOT NULL
             ORDER BY event_date",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::new();
        for row in rows {
            let birth_year: i64 = row.try_get("year")?;
            let age = year - birth_year as i32;
            if age <= 0 || age % 5 != 0 {
                continue;
            }

            let id: i64 = row.try_get("id")?;
            let (month, day) = parse_month_day(&row.try_get::<String, _>("event_date")?);
            records.push(JubileeRecord {
                title: row.try_get("title")?,
                month,
                day,
                age,
                references: self.references_for_event(id).await?,
            });
        }
        Ok(records)
    }
}

fn none_if_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn parse_month_day(event_date: &str) -> (Option<u32>, Option<u32>) {
    let mut parts = event_date.splitn(2, '-');
    let month = parts
        .next()
        .and_then(|m| m.parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m));
    let day = parts
        .next()
        .and_then(|d| d.parse::<u32>().ok())
        .filter(|d| (1..=31).contains(d));
    (month, day)
}
