//! Event Bus (C3): cross-instance notification of freshly inserted event
//! ids over Redis pub/sub. A single dedicated subscriber connection
//! rebroadcasts parsed ids on an in-process `tokio::sync::broadcast`
//! channel, so each `subscribe` call doesn't open its own Redis connection.

use feed_protocol::{BusMessage, BUS_CHANNEL};
use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

pub struct EventBus {
    publish_conn: tokio::sync::Mutex<redis::aio::MultiplexedConnection>,
    tx: broadcast::Sender<Uuid>,
    subscriber_handle: JoinHandle<()>,
}

impl EventBus {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let publish_conn = client.get_multiplexed_async_connection().await?;
        let (tx, _rx) = broadcast::channel(4096);

        let subscriber_handle = {
            let tx = tx.clone();
            let client = client.clone();
            tokio::spawn(async move {
                run_subscriber(client, tx).await;
            })
        };

        Ok(Self {
            publish_conn: tokio::sync::Mutex::new(publish_conn),
            tx,
            subscriber_handle,
        })
    }

    /// Fire-and-forget best-effort publish; failures are logged but never
    /// fail the enclosing insert (spec §4.3).
    pub async fn publish(&self, event_id: Uuid) {
        let payload = match serde_json::to_string(&BusMessage { event_id }) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to encode bus message");
                return;
            }
        };
        let mut conn = self.publish_conn.lock().await;
        if let Err(err) = conn.publish::<_, _, ()>(BUS_CHANNEL, payload).await {
            warn!(error = %err, "failed to publish to event bus");
        }
    }

    /// Delivers each received event id to `handler`. Returns an unsubscribe
    /// closure that stops forwarding to this handler.
    pub fn subscribe(&self, handler: impl Fn(Uuid) + Send + 'static) -> impl FnOnce() {
        let mut rx = self.tx.subscribe();
        let handle = tokio::spawn(async move {
            while let Ok(event_id) = rx.recv().await {
                handler(event_id);
            }
        });
        move || handle.abort()
    }

    pub async fn shutdown(&self) {
        self.subscriber_handle.abort();
    }
}

async fn run_subscriber(client: redis::Client, tx: broadcast::Sender<Uuid>) {
    let mut pubsub = match client.get_async_pubsub().await {
        Ok(pubsub) => pubsub,
        Err(err) => {
            error!(error = %err, "event bus subscribe failed at startup");
            return;
        }
    };

    if let Err(err) = pubsub.subscribe(BUS_CHANNEL).await {
        error!(error = %err, "event bus subscribe failed at startup");
        return;
    }

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "malformed bus message payload");
                continue;
            }
        };
        match serde_json::from_str::<BusMessage>(&payload) {
            Ok(parsed) => {
                let _ = tx.send(parsed.event_id);
            }
            Err(err) => {
                warn!(error = %err, payload = %payload, "dropping malformed bus message");
            }
        }
    }
}
