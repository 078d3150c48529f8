//! Ingest Worker (C8): executes one `IngestJob` end to end — resolve the
//! adapter, take the single-flight guard, load the checkpoint, run the
//! adapter, write each event, and advance the checkpoint only if every
//! write succeeded (spec §4.8).

use crate::bus::EventBus;
use crate::state::AppState;
use crate::{repo, writer};
use feed_protocol::{Event, IngestJob};
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;
use tracing::{error, info, warn};

/// Persists a single event. The real implementation is `writer::append`;
/// tests substitute a sink that fails partway through a batch to exercise
/// the checkpoint-not-advanced-on-partial-failure invariant without needing
/// a contrived primary-key collision.
pub trait EventSink: Send + Sync {
    fn write<'a>(&'a self, event: Event) -> Pin<Box<dyn Future<Output = Result<(), sqlx::Error>> + Send + 'a>>;
}

struct PoolSink<'a> {
    pool: &'a PgPool,
    bus: &'a EventBus,
}

impl EventSink for PoolSink<'_> {
    fn write<'a>(&'a self, event: Event) -> Pin<Box<dyn Future<Output = Result<(), sqlx::Error>> + Send + 'a>> {
        Box::pin(async move { writer::append(self.pool, self.bus, &event).await })
    }
}

pub async fn run_job(state: &AppState, job: IngestJob) {
    let source = job.source;

    let Some(adapter) = state.registry.get(source) else {
        warn!(?source, "no adapter registered for source, dropping job");
        return;
    };

    if !state.try_acquire_inflight(source).await {
        info!(?source, "poll already in flight, skipping this fire");
        return;
    }

    let outcome = poll_source(state, source, adapter).await;
    state.release_inflight(source).await;

    if let Err(err) = outcome {
        error!(?source, error = %err, "ingest job failed");
        if let Err(queue_err) = state.queue.report_failure(job).await {
            error!(?source, error = %queue_err, "failed to enqueue retry/dead-letter");
        }
    }
}

/// Runs one adapter poll to completion: load checkpoint, run the adapter,
/// write every event, advance the checkpoint only if every write
/// succeeded. Takes the adapter as a trait object (rather than resolving
/// it from the registry itself) so tests can exercise this against a
/// fake adapter without a live registry.
pub async fn poll_source(
    state: &AppState,
    source: feed_protocol::Source,
    adapter: &dyn crate::adapters::SourceAdapter,
) -> Result<(), sqlx::Error> {
    let sink = PoolSink {
        pool: &state.pool,
        bus: &state.bus,
    };
    poll_source_with_sink(&state.pool, &sink, source, adapter).await
}

/// Generalization of `poll_source` over any `EventSink`, so tests can inject
/// a sink that fails on a chosen event within a batch.
pub async fn poll_source_with_sink(
    pool: &PgPool,
    sink: &dyn EventSink,
    source: feed_protocol::Source,
    adapter: &dyn crate::adapters::SourceAdapter,
) -> Result<(), sqlx::Error> {
    let checkpoint = repo::checkpoints::get(pool, source).await?;
    let prior_state = checkpoint.and_then(|c| c.state);

    let outcome = adapter.run(prior_state).await;
    let fetched_at = chrono::Utc::now();

    for new_event in outcome.events {
        let event = Event {
            id: feed_protocol::ids::new_event_id(),
            source,
            kind: new_event.kind,
            title: new_event.title,
            body: new_event.body,
            fetched_at,
            occurred_at: new_event.occurred_at,
            region_text: new_event.region_text,
            level: new_event.level,
            payload: new_event.payload,
        };
        sink.write(event).await?;
    }

    repo::checkpoints::upsert(pool, source, outcome.next_state.as_deref()).await?;
    Ok(())
}

/// Pulls jobs off the queue forever; intended to be spawned once per
/// instance alongside `JobQueue::drive_forever`.
pub async fn drive_forever(state: AppState) {
    loop {
        match state.queue.dequeue().await {
            Ok(Some(job)) => run_job(&state, job).await,
            Ok(None) => {}
            Err(err) => {
                error!(error = %err, "failed to dequeue ingest job");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}
