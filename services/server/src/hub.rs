//! SSE Hub (C10): instance-local fan-out of live events to open
//! `/events/stream` connections (spec §5 — SSE subscriber sets are
//! instance-local; cross-instance fan-out happens one layer down, through
//! the Event Bus). `start` subscribes once to the bus; each HTTP handler
//! calls `add_client` to register a connection and get back a stream.

use crate::bus::EventBus;
use crate::repo;
use axum::response::sse;
use chrono::{DateTime, Utc};
use feed_protocol::Event;
use futures_util::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use sqlx::PgPool;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use uuid::Uuid;

const CLIENT_BUFFER: usize = 256;

type ClientMap = Arc<RwLock<HashMap<Uuid, mpsc::Sender<Event>>>>;

pub struct SseHub {
    pool: PgPool,
    bus: Arc<EventBus>,
    clients: ClientMap,
    unsubscribe: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    started: AtomicBool,
}

impl SseHub {
    #[must_use]
    pub fn new(pool: PgPool, bus: Arc<EventBus>) -> Self {
        Self {
            pool,
            bus,
            clients: Arc::new(RwLock::new(HashMap::new())),
            unsubscribe: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Idempotent: subscribes to the event bus once. Safe to call more than
    /// once across retries.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let pool = self.pool.clone();
        let clients = self.clients.clone();
        let unsubscribe = self.bus.subscribe(move |event_id| {
            let pool = pool.clone();
            let clients = clients.clone();
            tokio::spawn(async move {
                match repo::events::get_by_id(&pool, event_id).await {
                    Ok(Some(event)) => broadcast(&clients, event).await,
                    Ok(None) => warn!(%event_id, "bus announced an event id with no matching row"),
                    Err(err) => error!(%event_id, error = %err, "failed to load event for broadcast"),
                }
            });
        });
        *self.unsubscribe.lock().await = Some(Box::new(unsubscribe));
    }

    pub async fn stop(&self) {
        if let Some(unsubscribe) = self.unsubscribe.lock().await.take() {
            unsubscribe();
        }
        self.clients.write().await.clear();
        self.started.store(false, Ordering::SeqCst);
    }

    /// Registers a new subscriber and returns its stream. When `since` is
    /// present, catch-up rows are queued onto the same channel ahead of
    /// whatever arrives live.
    pub async fn add_client(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> impl Stream<Item = Result<sse::Event, std::convert::Infallible>> {
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let client_id = Uuid::new_v4();
        self.clients.write().await.insert(client_id, tx.clone());

        if let Some(since) = since {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                match repo::events::list_since(&pool, since, None).await {
                    Ok(events) => {
                        for event in events {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(err) => warn!(error = %err, "catch-up query failed"),
                }
            });
        }

        ClientStream {
            inner: ReceiverStream::new(rx),
            _guard: ClientGuard {
                id: client_id,
                clients: self.clients.clone(),
            },
        }
    }
}

async fn broadcast(clients: &ClientMap, event: Event) {
    let senders: Vec<(Uuid, mpsc::Sender<Event>)> = clients
        .read()
        .await
        .iter()
        .map(|(id, tx)| (*id, tx.clone()))
        .collect();

    let mut dead = Vec::new();
    for (id, tx) in senders {
        if tx.send(event.clone()).await.is_err() {
            dead.push(id);
        }
    }
    if !dead.is_empty() {
        let mut map = clients.write().await;
        for id in dead {
            map.remove(&id);
        }
    }
}

fn to_sse_event(event: &Event) -> sse::Event {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_owned());
    sse::Event::default()
        .id(event.id.to_string())
        .event("event")
        .data(payload)
}

struct ClientGuard {
    id: Uuid,
    clients: ClientMap,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let id = self.id;
        let clients = self.clients.clone();
        tokio::spawn(async move {
            clients.write().await.remove(&id);
        });
    }
}

struct ClientStream {
    inner: ReceiverStream<Event>,
    _guard: ClientGuard,
}

impl Stream for ClientStream {
    type Item = Result<sse::Event, std::convert::Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner)
            .poll_next(cx)
            .map(|maybe_event| maybe_event.map(|event| Ok(to_sse_event(&event))))
    }
}
