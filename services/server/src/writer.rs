//! Event Writer (C9): the single path by which a freshly produced event is
//! persisted and announced. Persistence and announcement are deliberately
//! sequenced — a publish failure never rolls back the insert, and never
//! propagates to the caller (spec §4.3, §4.8).

use crate::bus::EventBus;
use crate::repo;
use feed_protocol::Event;
use sqlx::PgPool;

/// Persists `event`, then best-effort announces it on the event bus.
/// Returns `Err` only when the insert itself fails; the caller is expected
/// to treat that as "this event never happened" and must not advance a
/// checkpoint past it.
pub async fn append(pool: &PgPool, bus: &EventBus, event: &Event) -> Result<(), sqlx::Error> {
    repo::events::insert(pool, event).await?;
    bus.publish(event.id).await;
    Ok(())
}
