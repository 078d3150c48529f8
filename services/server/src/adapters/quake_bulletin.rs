//! `quake_bulletin`: a JSON API of numbered bulletins. Dedup pattern 1 —
//! monotone scalar watermark (spec §4.5, §8 S1).

use super::{AdapterFuture, FETCH_TIMEOUT};
use chrono::Utc;
use feed_protocol::{AdapterRunOutcome, Kind, Level, NewEvent, Source};
use serde::Deserialize;
use tracing::warn;

const DEFAULT_ENDPOINT: &str = "https://example.invalid/quake-bulletins";

#[derive(Debug, Deserialize)]
struct Bulletin {
    serial: i64,
    title: String,
    #[serde(default)]
    magnitude: Option<f64>,
}

pub struct QuakeBulletinAdapter {
    endpoint: String,
    client: reqwest::Client,
}

impl Default for QuakeBulletinAdapter {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            client: reqwest::Client::new(),
        }
    }
}

fn apply_dedup(prior_state: Option<&str>, mut bulletins: Vec<Bulletin>) -> AdapterRunOutcome {
    let watermark: i64 = prior_state.and_then(|s| s.parse().ok()).unwrap_or(0);
    bulletins.sort_by_key(|b| b.serial);

    let mut max_serial = watermark;
    let mut events = Vec::new();
    for bulletin in bulletins {
        if bulletin.serial <= watermark {
            continue;
        }
        max_serial = max_serial.max(bulletin.serial);
        events.push(NewEvent {
            kind: Kind::Earthquake,
            title: bulletin.title,
            body: None,
            occurred_at: Some(Utc::now()),
            region_text: None,
            level: Level::Moderate,
            payload: bulletin
                .magnitude
                .map(|m| serde_json::json!({ "magnitude": m, "serial": bulletin.serial })),
        });
    }

    AdapterRunOutcome {
        events,
        next_state: Some(max_serial.to_string()),
    }
}

impl super::SourceAdapter for QuakeBulletinAdapter {
    fn source_id(&self) -> Source {
        Source::QuakeBulletin
    }

    fn poll_interval_sec(&self) -> u64 {
        30
    }

    fn run<'a>(&'a self, prior_state: Option<String>) -> AdapterFuture<'a> {
        Box::pin(async move {
            let fetch = self.client.get(&self.endpoint).timeout(FETCH_TIMEOUT).send();
            let response = match tokio::time::timeout(FETCH_TIMEOUT, fetch).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    warn!(source = "quake_bulletin", error = %err, "fetch failed");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
                Err(_) => {
                    warn!(source = "quake_bulletin", "fetch timed out");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            let bulletins: Vec<Bulletin> = match response.json().await {
                Ok(bulletins) => bulletins,
                Err(err) => {
                    warn!(source = "quake_bulletin", error = %err, "malformed response body");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            apply_dedup(prior_state.as_deref(), bulletins)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulletin(serial: i64) -> Bulletin {
        Bulletin {
            serial,
            title: format!("bulletin {serial}"),
            magnitude: Some(3.0),
        }
    }

    #[test]
    fn run_1_inserts_two_events_and_advances_watermark_to_101() {
        let outcome = apply_dedup(None, vec![bulletin(100), bulletin(101)]);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.next_state.as_deref(), Some("101"));
    }

    #[test]
    fn run_2_inserts_only_new_serials_and_advances_to_103() {
        let outcome = apply_dedup(Some("101"), vec![bulletin(101), bulletin(102), bulletin(103)]);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.next_state.as_deref(), Some("103"));
    }

    #[test]
    fn unchanged_feed_on_second_run_emits_nothing() {
        let outcome = apply_dedup(Some("103"), vec![bulletin(101), bulletin(102), bulletin(103)]);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.next_state.as_deref(), Some("103"));
    }
}
