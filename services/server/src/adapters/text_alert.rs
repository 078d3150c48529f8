//! `text_alert`: a short text-message alert feed (tsunami / civil-defense
//! style bulletins). Dedup pattern 3 — seen-set with TTL (spec §4.5, §8 S3).

use super::{text, AdapterFuture, FETCH_TIMEOUT};
use chrono::{DateTime, Duration, Utc};
use feed_protocol::{AdapterRunOutcome, Kind, Level, NewEvent, Source};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

const SEEN_TTL: Duration = Duration::hours(24);
const DEFAULT_ENDPOINT: &str = "https://example.invalid/text-alerts";

#[derive(Debug, Deserialize)]
struct FeedItem {
    id: String,
    text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenState {
    seen: HashMap<String, DateTime<Utc>>,
}

pub struct TextAlertAdapter {
    endpoint: String,
    client: reqwest::Client,
}

impl Default for TextAlertAdapter {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            client: reqwest::Client::new(),
        }
    }
}

fn parse_state(raw: Option<&str>) -> SeenState {
    raw.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// Prunes entries older than the TTL, emits events for unseen ids, and
/// returns the updated state serialized back to JSON.
fn apply_dedup(prior_state: Option<&str>, items: Vec<FeedItem>, now: DateTime<Utc>) -> AdapterRunOutcome {
    let mut state = parse_state(prior_state);
    state.seen.retain(|_, seen_at| now - *seen_at < SEEN_TTL);

    let mut events = Vec::new();
    for item in items {
        if state.seen.contains_key(&item.id) {
            continue;
        }
        let text = text::normalize_whitespace(&item.text);
        events.push(NewEvent {
            kind: Kind::Other,
            title: text.clone(),
            body: None,
            occurred_at: Some(now),
            region_text: None,
            level: Level::Minor,
            payload: Some(serde_json::json!({ "alert_id": item.id })),
        });
        state.seen.insert(item.id, now);
    }

    let next_state = serde_json::to_string(&state).ok();
    AdapterRunOutcome { events, next_state }
}

impl super::SourceAdapter for TextAlertAdapter {
    fn source_id(&self) -> Source {
        Source::TextAlert
    }

    fn poll_interval_sec(&self) -> u64 {
        60
    }

    fn run<'a>(&'a self, prior_state: Option<String>) -> AdapterFuture<'a> {
        Box::pin(async move {
            let fetch = self.client.get(&self.endpoint).timeout(FETCH_TIMEOUT).send();
            let response = match tokio::time::timeout(FETCH_TIMEOUT, fetch).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    warn!(source = "text_alert", error = %err, "fetch failed");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
                Err(_) => {
                    warn!(source = "text_alert", "fetch timed out");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            let items: Vec<FeedItem> = match response.json().await {
                Ok(items) => items,
                Err(err) => {
                    warn!(source = "text_alert", error = %err, "malformed response body");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            apply_dedup(prior_state.as_deref(), items, Utc::now())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, text: &str) -> FeedItem {
        FeedItem {
            id: id.to_owned(),
            text: text.to_owned(),
        }
    }

    #[test]
    fn first_run_emits_all_unseen_items() {
        let outcome = apply_dedup(None, vec![item("A", "alert a"), item("B", "alert b")], Utc::now());
        assert_eq!(outcome.events.len(), 2);
    }

    #[test]
    fn second_run_on_same_items_emits_nothing() {
        let now = Utc::now();
        let first = apply_dedup(None, vec![item("A", "alert a")], now);
        let second = apply_dedup(first.next_state.as_deref(), vec![item("A", "alert a")], now);
        assert!(second.events.is_empty());
    }

    #[test]
    fn ttl_prunes_stale_entries_but_keeps_fresh_ones() {
        let t0 = Utc::now();
        let mut state = SeenState::default();
        state.seen.insert("A".to_owned(), t0 - Duration::hours(24) - Duration::seconds(1));
        state.seen.insert("B".to_owned(), t0);
        let raw = serde_json::to_string(&state).unwrap();

        let outcome = apply_dedup(Some(&raw), vec![], t0);
        let next: SeenState = serde_json::from_str(&outcome.next_state.unwrap()).unwrap();

        assert!(!next.seen.contains_key("A"));
        assert!(next.seen.contains_key("B"));
    }
}
