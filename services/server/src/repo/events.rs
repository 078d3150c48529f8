//! Event Log (C1): append-only store, ordered reads by `fetched_at`.

use chrono::{DateTime, Utc};
use feed_protocol::{Event, Kind, Level, Source};
use sqlx::PgPool;
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;
const DEFAULT_LIST_SINCE_LIMIT: u32 = 500;

struct EventRow {
    id: Uuid,
    source: i16,
    kind: i16,
    title: String,
    body: Option<String>,
    fetched_at: DateTime<Utc>,
    occurred_at: Option<DateTime<Utc>>,
    region_text: Option<String>,
    level: i16,
    payload: Option<serde_json::Value>,
}

impl TryFrom<EventRow> for Event {
    type Error = sqlx::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let source = Source::try_from(row.source)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let kind =
            Kind::try_from(row.kind).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let level =
            Level::try_from(row.level).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Event {
            id: row.id,
            source,
            kind,
            title: row.title,
            body: row.body,
            fetched_at: row.fetched_at,
            occurred_at: row.occurred_at,
            region_text: row.region_text,
            level,
            payload: row.payload,
        })
    }
}

/// Atomically persists one row. Fails only on I/O or a duplicate id.
pub async fn insert(pool: &PgPool, event: &Event) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"INSERT INTO events (id, source, kind, title, body, fetched_at, occurred_at, region_text, level, payload)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        event.id,
        i16::from(event.source),
        i16::from(event.kind),
        event.title,
        event.body,
        event.fetched_at,
        event.occurred_at,
        event.region_text,
        i16::from(event.level),
        event.payload,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Event>, sqlx::Error> {
    let row = sqlx::query_as!(
        EventRow,
        r#"SELECT id, source, kind, title, body, fetched_at, occurred_at, region_text, level, payload
           FROM events WHERE id = $1"#,
        id
    )
    .fetch_optional(pool)
    .await?;
    row.map(Event::try_from).transpose()
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub limit: Option<u32>,
    pub kind: Option<i16>,
    pub source: Option<i16>,
}

/// Ordered by `fetched_at DESC`, ties broken by `id DESC` for determinism.
/// Filters are ANDed; an absent filter applies no predicate on that column.
pub async fn list(pool: &PgPool, filter: ListFilter) -> Result<Vec<Event>, sqlx::Error> {
    let limit = i64::from(
        filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT),
    );
    let rows = sqlx::query_as!(
        EventRow,
        r#"SELECT id, source, kind, title, body, fetched_at, occurred_at, region_text, level, payload
           FROM events
           WHERE ($1::smallint IS NULL OR kind = $1)
             AND ($2::smallint IS NULL OR source = $2)
           ORDER BY fetched_at DESC, id DESC
           LIMIT $3"#,
        filter.kind,
        filter.source,
        limit,
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Event::try_from).collect()
}

/// Returns rows with `fetched_at > since`, ascending, ties broken by `id ASC`,
/// capped at `limit`. Resumable: the caller's next `since` is the last
/// returned row's `fetched_at`.
pub async fn list_since(
    pool: &PgPool,
    since: DateTime<Utc>,
    limit: Option<u32>,
) -> Result<Vec<Event>, sqlx::Error> {
    let limit = i64::from(limit.unwrap_or(DEFAULT_LIST_SINCE_LIMIT));
    let rows = sqlx::query_as!(
        EventRow,
        r#"SELECT id, source, kind, title, body, fetched_at, occurred_at, region_text, level, payload
           FROM events
           WHERE fetched_at > $1
           ORDER BY fetched_at ASC, id ASC
           LIMIT $2"#,
        since,
        limit,
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Event::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_protocol::NewEvent;

    fn make_event(kind: Kind, level: Level, fetched_at: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::now_v7(),
            source: Source::TextAlert,
            kind,
            title: "title".to_owned(),
            body: None,
            fetched_at,
            occurred_at: None,
            region_text: None,
            level,
            payload: None,
        }
    }

    #[test]
    fn list_filter_defaults_are_none() {
        let filter = ListFilter::default();
        assert!(filter.limit.is_none());
        assert!(filter.kind.is_none());
        assert!(filter.source.is_none());
    }

    #[test]
    fn event_from_new_event_carries_level_and_kind() {
        let event = make_event(Kind::Earthquake, Level::Severe, Utc::now());
        let new_event = NewEvent {
            kind: event.kind,
            title: event.title.clone(),
            body: None,
            occurred_at: None,
            region_text: None,
            level: event.level,
            payload: None,
        };
        assert_eq!(new_event.kind, Kind::Earthquake);
        assert_eq!(new_event.level, Level::Severe);
    }
}
