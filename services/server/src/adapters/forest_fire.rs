//! `forest_fire`: seen-set dedup keyed by incident id. Repeat alerts on an
//! already-seen incident are downgraded to `Info` unless the progress code
//! is unrecognized, in which case it is treated as non-level-boosting
//! (spec §4.5, §9 open question).

use super::{AdapterFuture, FETCH_TIMEOUT};
use chrono::Utc;
use feed_protocol::{AdapterRunOutcome, Kind, Level, NewEvent, Source};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

const DEFAULT_ENDPOINT: &str = "https://example.invalid/forest-fire-incidents";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgressCode {
    Reported,
    InProgress,
    Completed,
    Unknown,
}

impl ProgressCode {
    fn parse(raw: &str) -> Self {
        match raw {
            "1" | "reported" => ProgressCode::Reported,
            "2" | "in_progress" => ProgressCode::InProgress,
            "3" | "completed" => ProgressCode::Completed,
            _ => ProgressCode::Unknown,
        }
    }

    fn level_for(self, already_seen: bool) -> Level {
        if already_seen {
            return Level::Info;
        }
        match self {
            ProgressCode::Reported | ProgressCode::InProgress => Level::Severe,
            ProgressCode::Completed => Level::Info,
            ProgressCode::Unknown => Level::Info,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IncidentRow {
    incident_id: String,
    area: String,
    progress_code: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenState {
    seen: HashSet<String>,
}

fn apply_dedup(prior_state: Option<&str>, incidents: Vec<IncidentRow>) -> AdapterRunOutcome {
    let mut state: SeenState = prior_state
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    let mut events = Vec::new();
    for incident in incidents {
        let already_seen = state.seen.contains(&incident.incident_id);
        let progress = ProgressCode::parse(&incident.progress_code);
        let level = progress.level_for(already_seen);

        events.push(NewEvent {
            kind: Kind::ForestFire,
            title: format!("{} 산불", incident.area),
            body: None,
            occurred_at: Some(Utc::now()),
            region_text: Some(incident.area.clone()),
            level,
            payload: Some(serde_json::json!({
                "incidentId": incident.incident_id.clone(),
                "progressCode": incident.progress_code,
            })),
        });
        state.seen.insert(incident.incident_id);
    }

    AdapterRunOutcome {
        events,
        next_state: serde_json::to_string(&state).ok(),
    }
}

pub struct ForestFireAdapter {
    endpoint: String,
    client: reqwest::Client,
}

impl Default for ForestFireAdapter {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            client: reqwest::Client::new(),
        }
    }
}

impl super::SourceAdapter for ForestFireAdapter {
    fn source_id(&self) -> Source {
        Source::ForestFire
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
                    warn!(source = "forest_fire", error = %err, "fetch failed");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
                Err(_) => {
                    warn!(source = "forest_fire", "fetch timed out");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            let incidents: Vec<IncidentRow> = match response.json().await {
                Ok(incidents) => incidents,
                Err(err) => {
                    warn!(source = "forest_fire", error = %err, "malformed response body");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            apply_dedup(prior_state.as_deref(), incidents)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident(id: &str, progress: &str) -> IncidentRow {
        IncidentRow {
            incident_id: id.to_owned(),
            area: "강원 동해".to_owned(),
            progress_code: progress.to_owned(),
        }
    }

    #[test]
    fn first_alert_for_in_progress_incident_is_severe() {
        let outcome = apply_dedup(None, vec![incident("F1", "in_progress")]);
        assert_eq!(outcome.events[0].level, Level::Severe);
    }

    #[test]
    fn repeat_alert_on_seen_incident_is_downgraded_to_info() {
        let first = apply_dedup(None, vec![incident("F1", "in_progress")]);
        let second = apply_dedup(first.next_state.as_deref(), vec![incident("F1", "in_progress")]);
        assert_eq!(second.events[0].level, Level::Info);
    }

    #[test]
    fn unknown_progress_code_is_non_level_boosting() {
        let outcome = apply_dedup(None, vec![incident("F2", "bogus-code")]);
        assert_eq!(outcome.events[0].level, Level::Info);
    }
}
