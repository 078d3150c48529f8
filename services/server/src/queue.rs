//! Job Queue (C4): a durable, repeatable-job scheduler over Redis
//! primitives. Repeatable jobs are tracked in a ZSET keyed by next-fire
//! time; a per-fire `SET NX` lock ensures only one instance executes a
//! given scheduled fire even with multiple instances ticking concurrently.
//! Failures retry up to 3 times with exponential backoff before moving to
//! a dead-letter list.

use chrono::Utc;
use feed_protocol::{IngestJob, Source, INGEST_QUEUE};
use redis::AsyncCommands;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

const SCHEDULE_KEY: &str = "ingest:schedule";
const INTERVALS_KEY: &str = "ingest:intervals";
const RETRY_KEY: &str = "ingest:retry";
const DEAD_LETTER_KEY: &str = "ingest:dead";
const LOCK_TTL_MS: usize = 30_000;
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: i64 = 5_000;
const TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEQUEUE_TIMEOUT_SECS: f64 = 5.0;

pub struct JobQueue {
    conn: tokio::sync::Mutex<redis::aio::MultiplexedConnection>,
    instance_id: String,
}

impl JobQueue {
    pub async fn connect(redis_url: &str, instance_id: impl Into<String>) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn: tokio::sync::Mutex::new(conn),
            instance_id: instance_id.into(),
        })
    }

    /// Registers (or idempotently re-registers) a repeatable job. Only the
    /// interval is overwritten on re-registration; the existing next-fire
    /// time is preserved (spec §4.4: "replaces the schedule idempotently").
    pub async fn schedule_repeatable(&self, source: Source, interval_ms: i64) -> redis::RedisResult<()> {
        let mut conn = self.conn.lock().await;
        let member = source.code().to_string();
        let _: () = conn.hset(INTERVALS_KEY, &member, interval_ms).await?;
        let now_ms = Utc::now().timestamp_millis();
        // ZADD NX: only set the next-fire time if this member is absent.
        let _: () = redis::cmd("ZADD")
            .arg(SCHEDULE_KEY)
            .arg("NX")
            .arg(now_ms + interval_ms)
            .arg(&member)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    /// One scheduler tick: fires every due member, advances its next-fire
    /// time, and pushes a job envelope — but only for the instance that
    /// wins the per-fire lock.
    pub async fn tick(&self) -> redis::RedisResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<(String, f64)> = {
            let mut conn = self.conn.lock().await;
            conn.zrangebyscore_withscores(SCHEDULE_KEY, "-inf", now_ms)
                .await?
        };

        for (member, score) in due {
            let lock_key = format!("ingest:lock:{member}:{}", score as i64);
            let won: bool = {
                let mut conn = self.conn.lock().await;
                let reply: Option<String> = redis::cmd("SET")
                    .arg(&lock_key)
                    .arg(&self.instance_id)
                    .arg("NX")
                    .arg("PX")
                    .arg(LOCK_TTL_MS)
                    .query_async(&mut *conn)
                    .await
                    .unwrap_or(None);
                reply.is_some()
            };
            if !won {
                continue;
            }

            let interval_ms: i64 = {
                let mut conn = self.conn.lock().await;
                conn.hget(INTERVALS_KEY, &member).await.unwrap_or(0)
            };
            if interval_ms <= 0 {
                continue;
            }

            let Ok(source_code) = member.parse::<i16>() else {
                warn!(member = %member, "unparseable schedule member");
                continue;
            };
            let Ok(source) = Source::try_from(source_code) else {
                warn!(code = source_code, "schedule member is not a known source");
                continue;
            };

            let mut conn = self.conn.lock().await;
            let _: () = conn
                .zadd(SCHEDULE_KEY, &member, now_ms + interval_ms)
                .await?;
            let job = IngestJob { source, attempt: 0 };
            let payload = serde_json::to_string(&job).expect("IngestJob always serializes");
            let _: () = conn.rpush(INGEST_QUEUE, payload).await?;
        }
        Ok(())
    }

    /// Moves due retry entries back onto the live queue.
    pub async fn move_due_retries(&self) -> redis::RedisResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let mut conn = self.conn.lock().await;
        let due: Vec<String> = conn.zrangebyscore(RETRY_KEY, "-inf", now_ms).await?;
        for payload in due {
            let _: () = conn.zrem(RETRY_KEY, &payload).await?;
            let _: () = conn.rpush(INGEST_QUEUE, &payload).await?;
        }
        Ok(())
    }

    pub async fn dequeue(&self) -> redis::RedisResult<Option<IngestJob>> {
        let mut conn = self.conn.lock().await;
        let result: Option<(String, String)> =
            conn.blpop(INGEST_QUEUE, DEQUEUE_TIMEOUT_SECS).await?;
        drop(conn);
        match result {
            Some((_, payload)) => match serde_json::from_str(&payload) {
                Ok(job) => Ok(Some(job)),
                Err(err) => {
                    error!(error = %err, payload = %payload, "dropping malformed queue payload");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// On failure: retried with exponential backoff up to `MAX_ATTEMPTS`,
    /// then moved to the dead-letter list and retained for inspection.
    pub async fn report_failure(&self, job: IngestJob) -> redis::RedisResult<()> {
        let mut conn = self.conn.lock().await;
        if job.attempt + 1 >= MAX_ATTEMPTS {
            let payload = serde_json::to_string(&job).expect("IngestJob always serializes");
            let _: () = conn.rpush(DEAD_LETTER_KEY, payload).await?;
            return Ok(());
        }
        let next_attempt = IngestJob {
            source: job.source,
            attempt: job.attempt + 1,
        };
        let backoff_ms = BASE_BACKOFF_MS * 2i64.pow(job.attempt);
        let score = Utc::now().timestamp_millis() + backoff_ms;
        let payload = serde_json::to_string(&next_attempt).expect("IngestJob always serializes");
        let _: () = conn.zadd(RETRY_KEY, payload, score).await?;
        Ok(())
    }

    /// Runs the scheduler tick and retry mover forever; intended to be
    /// spawned once per instance.
    pub async fn drive_forever(&self) {
        loop {
            if let Err(err) = self.tick().await {
                error!(error = %err, "scheduler tick failed");
            }
            if let Err(err) = self.move_due_retries().await {
                error!(error = %err, "retry mover failed");
            }
            sleep(TICK_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_from_5_seconds() {
        assert_eq!(BASE_BACKOFF_MS * 2i64.pow(0), 5_000);
        assert_eq!(BASE_BACKOFF_MS * 2i64.pow(1), 10_000);
        assert_eq!(BASE_BACKOFF_MS * 2i64.pow(2), 20_000);
    }

    #[test]
    fn max_attempts_matches_spec_retry_budget() {
        assert_eq!(MAX_ATTEMPTS, 3);
    }
}
