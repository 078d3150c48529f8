//! `weather_warning`: a JSON/CSV hybrid API gated by `KMA_API_KEY`. Maps a
//! severity vocabulary onto the 5-level enum and trims a stray trailing `=`
//! CSV cell artifact (spec §4.5, §9). Dedup pattern 3 — seen-set with TTL.

use super::{text, time, AdapterFuture, FETCH_TIMEOUT};
use chrono::{DateTime, Duration, Utc};
use feed_protocol::{AdapterRunOutcome, Kind, Level, NewEvent, Source};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

const SEEN_TTL: Duration = Duration::days(2);
const DEFAULT_ENDPOINT: &str = "https://example.invalid/weather-warnings.csv";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenState {
    seen: HashMap<String, DateTime<Utc>>,
}

struct WarningRow {
    id: String,
    area: String,
    severity_label: String,
    issued_at_kst: String,
}

fn severity_to_level(label: &str) -> Option<Level> {
    match label {
        "주의보" => Some(Level::Minor),
        "예비특보" => Some(Level::Moderate),
        "경보" => Some(Level::Severe),
        "특보" => Some(Level::Critical),
        _ => None,
    }
}

/// Parses one CSV line of the form `id,area,severity,issuedAt,=` —
/// the trailing `=` is a stray artifact trimmed away (spec §9).
fn parse_csv_row(line: &str) -> Option<WarningRow> {
    let cells: Vec<&str> = line.split(',').map(str::trim).collect();
    if cells.len() < 4 {
        return None;
    }
    Some(WarningRow {
        id: cells[0].to_owned(),
        area: cells[1].to_owned(),
        severity_label: cells[2].to_owned(),
        issued_at_kst: text::trim_trailing_equals(cells[3]).to_owned(),
    })
}

fn apply_dedup(prior_state: Option<&str>, csv_body: &str, now: DateTime<Utc>) -> AdapterRunOutcome {
    let mut state: SeenState = prior_state
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    state.seen.retain(|_, seen_at| now - *seen_at < SEEN_TTL);

    let mut events = Vec::new();
    for line in csv_body.lines() {
        let Some(row) = parse_csv_row(line) else {
            continue;
        };
        if state.seen.contains_key(&row.id) {
            continue;
        }
        let Some(level) = severity_to_level(&row.severity_label) else {
            warn!(source = "weather_warning", label = %row.severity_label, "unrecognized severity label");
            continue;
        };

        let occurred_at = time::parse_kst_iso_local(&row.issued_at_kst);
        events.push(NewEvent {
            kind: Kind::WeatherWarning,
            title: format!("{} {}", row.area, row.severity_label),
            body: None,
            occurred_at,
            region_text: Some(row.area.clone()),
            level,
            payload: Some(serde_json::json!({ "warningId": row.id.clone() })),
        });
        state.seen.insert(row.id, now);
    }

    AdapterRunOutcome {
        events,
        next_state: serde_json::to_string(&state).ok(),
    }
}

pub struct WeatherWarningAdapter {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl WeatherWarningAdapter {
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

impl super::SourceAdapter for WeatherWarningAdapter {
    fn source_id(&self) -> Source {
        Source::WeatherWarning
    }

    fn poll_interval_sec(&self) -> u64 {
        300
    }

    fn run<'a>(&'a self, prior_state: Option<String>) -> AdapterFuture<'a> {
        Box::pin(async move {
            let Some(api_key) = &self.api_key else {
                warn!(source = "weather_warning", "KMA_API_KEY not configured, skipping poll");
                return AdapterRunOutcome::unchanged(prior_state);
            };

            let fetch = self
                .client
                .get(&self.endpoint)
                .query(&[("authKey", api_key.as_str())])
                .timeout(FETCH_TIMEOUT)
                .send();
            let response = match tokio::time::timeout(FETCH_TIMEOUT, fetch).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    warn!(source = "weather_warning", error = %err, "fetch failed");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
                Err(_) => {
                    warn!(source = "weather_warning", "fetch timed out");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(source = "weather_warning", error = %err, "malformed response body");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            apply_dedup(prior_state.as_deref(), &body, Utc::now())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_row_and_trims_trailing_equals_cell() {
        let row = parse_csv_row("W1,서울,경보,2025-12-25T05:14:43,=").unwrap();
        assert_eq!(row.issued_at_kst, "2025-12-25T05:14:43");
    }

    #[test]
    fn severity_vocabulary_maps_to_expected_levels() {
        assert_eq!(severity_to_level("주의보"), Some(Level::Minor));
        assert_eq!(severity_to_level("경보"), Some(Level::Severe));
        assert_eq!(severity_to_level("특보"), Some(Level::Critical));
        assert_eq!(severity_to_level("unknown"), None);
    }

    #[test]
    fn dedup_skips_previously_seen_warning_ids() {
        let now = Utc::now();
        let csv = "W1,서울,경보,2025-12-25T05:14:43,=";
        let first = apply_dedup(None, csv, now);
        assert_eq!(first.events.len(), 1);
        let second = apply_dedup(first.next_state.as_deref(), csv, now);
        assert!(second.events.is_empty());
    }
}
