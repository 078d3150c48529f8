//! `regional_notice`: a single-block HTML dashboard notice. Dedup pattern 2 —
//! content hash of the last snapshot (spec §4.5, §8 S2).

use super::{text, time, AdapterFuture, FETCH_TIMEOUT};
use feed_protocol::{AdapterRunOutcome, Kind, Level, NewEvent, Source};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::warn;

const DEFAULT_ENDPOINT: &str = "https://example.invalid/regional-notice";

static NOTICE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<ts>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})\s+(?P<region>.+?)\s+\(규모:(?P<mag>[\d.]+)\s*/\s*깊이:(?P<depth>[\d.]+)km\)",
    )
    .expect("static regex is valid")
});

pub struct RegionalNoticeAdapter {
    endpoint: String,
    client: reqwest::Client,
}

impl Default for RegionalNoticeAdapter {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            client: reqwest::Client::new(),
        }
    }
}

struct ParsedNotice {
    occurred_at: Option<chrono::DateTime<chrono::Utc>>,
    region: String,
    magnitude: f64,
    depth_km: f64,
}

fn extract_notice_text(html: &str) -> Option<String> {
    let selector = Selector::parse("p").ok()?;
    let document = Html::parse_fragment(html);
    let text = document.select(&selector).next()?.text().collect::<String>();
    Some(text::decode_html_entities(&text))
}

fn parse_notice(raw_text: &str) -> Option<ParsedNotice> {
    let normalized = text::normalize_whitespace(raw_text);
    let captures = NOTICE_PATTERN.captures(&normalized)?;
    let occurred_at = time::parse_kst_datetime(&captures["ts"]);
    let magnitude: f64 = captures["mag"].parse().ok()?;
    let depth_km: f64 = captures["depth"].parse().ok()?;
    Some(ParsedNotice {
        occurred_at,
        region: captures["region"].to_owned(),
        magnitude,
        depth_km,
    })
}

/// Emits an event only when the normalized snapshot text differs from the
/// prior run's stored snapshot.
fn apply_dedup(prior_state: Option<&str>, html: &str) -> AdapterRunOutcome {
    let Some(raw_text) = extract_notice_text(html) else {
        return AdapterRunOutcome::unchanged(prior_state.map(str::to_owned));
    };
    let normalized = text::normalize_whitespace(&raw_text);

    if prior_state == Some(normalized.as_str()) {
        return AdapterRunOutcome::unchanged(Some(normalized));
    }

    let Some(notice) = parse_notice(&raw_text) else {
        return AdapterRunOutcome::unchanged(prior_state.map(str::to_owned));
    };

    let title = format!("{} 지역 규모 {} 미소지진", notice.region, notice.magnitude);
    let event = NewEvent {
        kind: Kind::Earthquake,
        title,
        body: None,
        occurred_at: notice.occurred_at,
        region_text: Some(notice.region),
        level: Level::Info,
        payload: Some(serde_json::json!({
            "magnitude": notice.magnitude,
            "depthKm": notice.depth_km,
        })),
    };

    AdapterRunOutcome {
        events: vec![event],
        next_state: Some(normalized),
    }
}

impl super::SourceAdapter for RegionalNoticeAdapter {
    fn source_id(&self) -> Source {
        Source::RegionalNotice
    }

    fn poll_interval_sec(&self) -> u64 {
        120
    }

    fn run<'a>(&'a self, prior_state: Option<String>) -> AdapterFuture<'a> {
        Box::pin(async move {
            let fetch = self.client.get(&self.endpoint).timeout(FETCH_TIMEOUT).send();
            let response = match tokio::time::timeout(FETCH_TIMEOUT, fetch).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    warn!(source = "regional_notice", error = %err, "fetch failed");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
                Err(_) => {
                    warn!(source = "regional_notice", "fetch timed out");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            let html = match response.text().await {
                Ok(html) => html,
                Err(err) => {
                    warn!(source = "regional_notice", error = %err, "malformed response body");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            apply_dedup(prior_state.as_deref(), &html)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTICE_HTML: &str =
        "<p>2025/12/25 05:14:43 경남 밀양시 동쪽 15km (규모:1.5 / 깊이:8km)</p>";

    #[test]
    fn run_1_emits_expected_event_shape() {
        let outcome = apply_dedup(None, NOTICE_HTML);
        assert_eq!(outcome.events.len(), 1);
        let event = &outcome.events[0];
        assert_eq!(event.title, "경남 밀양시 동쪽 15km 지역 규모 1.5 미소지진");
        assert_eq!(
            event.occurred_at,
            Some(
                chrono::DateTime::parse_from_rfc3339("2025-12-24T20:14:43Z")
                    .unwrap()
                    .with_timezone(&chrono::Utc)
            )
        );
        assert_eq!(
            event.payload.as_ref().unwrap().get("depthKm").unwrap(),
            &serde_json::json!(8.0)
        );
    }

    #[test]
    fn run_2_on_identical_html_emits_nothing() {
        let first = apply_dedup(None, NOTICE_HTML);
        let second = apply_dedup(first.next_state.as_deref(), NOTICE_HTML);
        assert!(second.events.is_empty());
        assert_eq!(second.next_state, first.next_state);
    }
}
