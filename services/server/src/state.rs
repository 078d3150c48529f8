use crate::bus::EventBus;
use crate::hub::SseHub;
use crate::queue::JobQueue;
use crate::registry::SourceRegistry;
use feed_protocol::Source;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything a request handler or background task needs. Cloning an
/// `AppState` only clones `Arc`s/the pool's internal handle — cheap, the
/// way axum expects `State<AppState>` to behave.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub bus: Arc<EventBus>,
    pub queue: Arc<JobQueue>,
    pub registry: Arc<SourceRegistry>,
    pub hub: Arc<SseHub>,
    inflight: Arc<Mutex<HashSet<Source>>>,
}

impl AppState {
    #[must_use]
    pub fn new(
        pool: PgPool,
        bus: Arc<EventBus>,
        queue: Arc<JobQueue>,
        registry: Arc<SourceRegistry>,
        hub: Arc<SseHub>,
    ) -> Self {
        Self {
            pool,
            bus,
            queue,
            registry,
            hub,
            inflight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Single-flight guard (spec §4.8 step 2): only one poll of a given
    /// source may run at a time. Returns `true` if the caller won the
    /// right to run it.
    pub async fn try_acquire_inflight(&self, source: Source) -> bool {
        self.inflight.lock().await.insert(source)
    }

    pub async fn release_inflight(&self, source: Source) {
        self.inflight.lock().await.remove(&source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inflight_guard_rejects_concurrent_acquire_for_same_source() {
        let inflight: Arc<Mutex<HashSet<Source>>> = Arc::new(Mutex::new(HashSet::new()));
        assert!(inflight.lock().await.insert(Source::QuakeBulletin));
        assert!(!inflight.lock().await.insert(Source::QuakeBulletin));
        inflight.lock().await.remove(&Source::QuakeBulletin);
        assert!(inflight.lock().await.insert(Source::QuakeBulletin));
    }
}
