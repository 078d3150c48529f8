//! Checkpoint Store (C2): per-source opaque resumable state. Never parsed by
//! the framework; upsert is the only write path.

use chrono::{DateTime, Utc};
use feed_protocol::{Checkpoint, Source};
use sqlx::PgPool;

struct CheckpointRow {
    source: i16,
    state: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = sqlx::Error;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        let source =
            Source::try_from(row.source).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Checkpoint {
            source,
            state: row.state,
            updated_at: row.updated_at,
        })
    }
}

pub async fn get(pool: &PgPool, source: Source) -> Result<Option<Checkpoint>, sqlx::Error> {
    let row = sqlx::query_as!(
        CheckpointRow,
        "SELECT source, state, updated_at FROM ingest_checkpoints WHERE source = $1",
        i16::from(source),
    )
    .fetch_optional(pool)
    .await?;
    row.map(Checkpoint::try_from).transpose()
}

pub async fn upsert(
    pool: &PgPool,
    source: Source,
    state: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"INSERT INTO ingest_checkpoints (source, state, updated_at) VALUES ($1, $2, now())
           ON CONFLICT (source) DO UPDATE SET state = EXCLUDED.state, updated_at = now()"#,
        i16::from(source),
        state,
    )
    .execute(pool)
    .await?;
    Ok(())
}
