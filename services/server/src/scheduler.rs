//! Ingest Scheduler (C7): at startup, registers every known source's
//! repeatable poll interval with the Job Queue. The queue itself is what
//! ticks — this module only seeds it once.

use crate::queue::JobQueue;
use crate::registry::SourceRegistry;
use tracing::{error, warn};

pub async fn register_all(queue: &JobQueue, registry: &SourceRegistry) {
    for adapter in registry.list() {
        let interval_sec = adapter.poll_interval_sec();
        if interval_sec == 0 {
            warn!(source = ?adapter.source_id(), "adapter has a non-positive poll interval, skipping registration");
            continue;
        }
        let interval_ms = i64::try_from(interval_sec)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        if let Err(err) = queue
            .schedule_repeatable(adapter.source_id(), interval_ms)
            .await
        {
            error!(source = ?adapter.source_id(), error = %err, "failed to register repeatable job");
        }
    }
}
