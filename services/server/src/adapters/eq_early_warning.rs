//! `eq_early_warning`: the binary earthquake early-warning stream. Maintains
//! a clock-offset estimate and decodes a fixed, bit-packed frame (spec
//! §4.5).

use super::{AdapterFuture, FETCH_TIMEOUT};
use chrono::{DateTime, TimeZone, Utc};
use feed_protocol::{AdapterRunOutcome, Kind, Level, NewEvent, Source};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://example.invalid/pews";
const SIM_BASE_URL: &str = "https://example.invalid/pews-sim";
const DEFAULT_HEADER_LEN: usize = 4;
const SIM_HEADER_LEN: usize = 1;
const TRAILER_TEXT_LEN: usize = 60;
const TRAILER_PACKED_LEN: usize = 15;

/// Fixed 17-region roster; the affected-regions mask has one bit per entry.
const REGIONS: [&str; 17] = [
    "서울", "부산", "대구", "인천", "광주", "대전", "울산", "세종", "경기", "강원", "충북",
    "충남", "전북", "전남", "경북", "경남", "제주",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NoEvent,
    FastInfo,
    Detail,
}

fn read_bits(buf: &[u8], start_bit: usize, width: usize) -> u64 {
    let mut value: u64 = 0;
    for i in 0..width {
        let bit_index = start_bit + i;
        let byte_index = bit_index / 8;
        let bit_in_byte = 7 - (bit_index % 8);
        let bit = (buf[byte_index] >> bit_in_byte) & 1;
        value = (value << 1) | u64::from(bit);
    }
    value
}

fn phase_from_header(header: &[u8]) -> Phase {
    // bit index 0 is reserved/unmapped (spec §9 open question).
    let bit1 = read_bits(header, 1, 1);
    let bit2 = read_bits(header, 2, 1);
    if bit1 == 0 {
        Phase::NoEvent
    } else if bit2 == 0 {
        Phase::FastInfo
    } else {
        Phase::Detail
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub phase: Phase,
    pub lat: f64,
    pub lon: f64,
    pub magnitude: f64,
    pub depth_km: f64,
    pub occurred_at: Option<DateTime<Utc>>,
    pub eqk_id: u64,
    pub intensity: u64,
    pub affected_regions: Vec<&'static str>,
}

fn decode_trailer(packed: &[u8]) -> DecodedFrame {
    let lat_raw = read_bits(packed, 0, 10);
    let lon_raw = read_bits(packed, 10, 10);
    let mag_raw = read_bits(packed, 20, 7);
    let depth_raw = read_bits(packed, 27, 10);
    let unix_seconds = read_bits(packed, 37, 32);
    let eqk_id = read_bits(packed, 69, 26);
    let intensity = read_bits(packed, 95, 4);
    let regions_mask = read_bits(packed, 99, 17);

    let affected_regions = REGIONS
        .iter()
        .enumerate()
        .filter(|(i, _)| (regions_mask >> (16 - i)) & 1 == 1)
        .map(|(_, name)| *name)
        .collect();

    DecodedFrame {
        phase: Phase::NoEvent, // filled in by caller from the header
        lat: 30.0 + (lat_raw as f64) / 100.0,
        lon: 124.0 + (lon_raw as f64) / 100.0,
        magnitude: (mag_raw as f64) / 10.0,
        depth_km: (depth_raw as f64) / 10.0,
        occurred_at: Utc.timestamp_opt(unix_seconds as i64, 0).single(),
        eqk_id,
        intensity,
        affected_regions,
    }
}

/// Parses header + trailer(60 text + 15 packed) into a `DecodedFrame`, or
/// `None` if the buffer is too short for the configured header length.
fn parse_frame(data: &[u8], header_len: usize) -> Option<DecodedFrame> {
    let total_len = header_len + TRAILER_TEXT_LEN + TRAILER_PACKED_LEN;
    if data.len() < total_len {
        return None;
    }
    let header = &data[..header_len];
    let packed = &data[header_len + TRAILER_TEXT_LEN..total_len];

    let phase = phase_from_header(header);
    let mut frame = decode_trailer(packed);
    frame.phase = phase;
    Some(frame)
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
struct DedupState {
    last_eqk_id: Option<u64>,
    last_phase: Option<u8>,
}

fn phase_code(phase: Phase) -> u8 {
    match phase {
        Phase::NoEvent => 1,
        Phase::FastInfo => 2,
        Phase::Detail => 3,
    }
}

fn level_for_phase(phase: Phase, is_repeat_for_incident: bool) -> Level {
    if is_repeat_for_incident {
        // Second phase for the same incident: downgrade to avoid re-alerting.
        return Level::Info;
    }
    match phase {
        Phase::NoEvent => Level::Info,
        Phase::FastInfo => Level::Severe,
        Phase::Detail => Level::Critical,
    }
}

fn build_event(frame: &DecodedFrame, is_repeat_for_incident: bool) -> NewEvent {
    let region_text = if frame.affected_regions.is_empty() {
        None
    } else {
        Some(frame.affected_regions.join(", "))
    };
    NewEvent {
        kind: Kind::EarthquakeEarlyWarning,
        title: format!("지진조기경보 M{:.1} (ID {})", frame.magnitude, frame.eqk_id),
        body: None,
        occurred_at: frame.occurred_at,
        region_text,
        level: level_for_phase(frame.phase, is_repeat_for_incident),
        payload: Some(serde_json::json!({
            "eqkId": frame.eqk_id,
            "lat": frame.lat,
            "lon": frame.lon,
            "magnitude": frame.magnitude,
            "depthKm": frame.depth_km,
            "intensity": frame.intensity,
            "phase": phase_code(frame.phase),
            "affectedRegions": frame.affected_regions,
        })),
    }
}

/// Suppresses emission when the incoming `(eqkId, phase)` matches the stored
/// pair; only phase >= 2 (fast-info, detail) yields events.
fn apply_dedup(prior_state: Option<&str>, frame: DecodedFrame) -> AdapterRunOutcome {
    let state: DedupState = prior_state
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    if matches!(frame.phase, Phase::NoEvent) {
        return AdapterRunOutcome::unchanged(prior_state.map(str::to_owned));
    }

    let phase_code = phase_code(frame.phase);
    if state.last_eqk_id == Some(frame.eqk_id) && state.last_phase == Some(phase_code) {
        return AdapterRunOutcome::unchanged(prior_state.map(str::to_owned));
    }

    let is_repeat_for_incident = state.last_eqk_id == Some(frame.eqk_id);
    let event = build_event(&frame, is_repeat_for_incident);

    let next_state = DedupState {
        last_eqk_id: Some(frame.eqk_id),
        last_phase: Some(phase_code),
    };

    AdapterRunOutcome {
        events: vec![event],
        next_state: serde_json::to_string(&next_state).ok(),
    }
}

/// Replays a single historical event: holds the URL timestamp fixed at
/// `start_at` minus the wall-clock instant the replay began, for a 5-minute
/// window, and filters decoded frames down to `eqk_id` (spec §4.5).
struct ReplayWindow {
    eqk_id: u64,
    offset_seconds: i64,
    window_end: DateTime<Utc>,
}

impl ReplayWindow {
    fn parse(sim: &crate::config::SimulationConfig) -> Option<Self> {
        let eqk_id = sim.eqk_id.parse::<u64>().ok()?;
        let start_at = DateTime::parse_from_rfc3339(&sim.start_at)
            .ok()?
            .with_timezone(&Utc);
        let now = Utc::now();
        Some(Self {
            eqk_id,
            offset_seconds: (start_at - now).num_seconds(),
            window_end: now + chrono::Duration::minutes(5),
        })
    }

    fn active(&self) -> bool {
        Utc::now() < self.window_end
    }

    fn url_timestamp(&self) -> String {
        let adjusted = Utc::now() + chrono::Duration::seconds(self.offset_seconds);
        let decisecond = adjusted.timestamp_subsec_millis() / 100;
        format!("{}.{}", adjusted.format("%Y%m%d%H%M%S"), decisecond)
    }
}

/// Clock-offset estimate updated from server response headers, clamped
/// non-negative (spec §4.5).
struct ClockOffset {
    seconds: AtomicI64,
}

impl ClockOffset {
    fn new() -> Self {
        Self {
            seconds: AtomicI64::new(0),
        }
    }

    fn update_from_headers(&self, server_time_header: Option<&str>) {
        let Some(raw) = server_time_header else {
            return;
        };
        let Ok(server_epoch) = raw.trim().parse::<i64>() else {
            return;
        };
        let local_epoch = Utc::now().timestamp();
        let offset = (server_epoch - local_epoch).max(0);
        self.seconds.store(offset, Ordering::Relaxed);
    }

    fn url_timestamp(&self) -> String {
        let offset = self.seconds.load(Ordering::Relaxed);
        let adjusted = Utc::now() + chrono::Duration::seconds(offset);
        let decisecond = adjusted.timestamp_subsec_millis() / 100;
        format!("{}.{}", adjusted.format("%Y%m%d%H%M%S"), decisecond)
    }
}

pub struct EqEarlyWarningAdapter {
    base_url: String,
    header_len: usize,
    clock_offset: ClockOffset,
    client: reqwest::Client,
    replay: Option<ReplayWindow>,
}

impl EqEarlyWarningAdapter {
    #[must_use]
    pub fn new(simulation: Option<&crate::config::SimulationConfig>) -> Self {
        let replay = simulation.and_then(|sim| {
            let window = ReplayWindow::parse(sim);
            if window.is_none() {
                warn!(
                    eqk_id = %sim.eqk_id,
                    start_at = %sim.start_at,
                    "failed to parse simulation replay window, falling back to live offset sync"
                );
            }
            window
        });
        let (base_url, header_len) = if simulation.is_some() {
            (SIM_BASE_URL.to_owned(), SIM_HEADER_LEN)
        } else {
            (DEFAULT_BASE_URL.to_owned(), DEFAULT_HEADER_LEN)
        };
        Self {
            base_url,
            header_len,
            clock_offset: ClockOffset::new(),
            client: reqwest::Client::new(),
            replay,
        }
    }
}

impl super::SourceAdapter for EqEarlyWarningAdapter {
    fn source_id(&self) -> Source {
        Source::EqEarlyWarning
    }

    fn poll_interval_sec(&self) -> u64 {
        5
    }

    fn run<'a>(&'a self, prior_state: Option<String>) -> AdapterFuture<'a> {
        Box::pin(async move {
            let replay = self.replay.as_ref().filter(|r| r.active());

            let url_timestamp = replay.map_or_else(|| self.clock_offset.url_timestamp(), ReplayWindow::url_timestamp);
            let url = format!("{}/{}", self.base_url, url_timestamp);
            let fetch = self.client.get(&url).timeout(FETCH_TIMEOUT).send();
            let response = match tokio::time::timeout(FETCH_TIMEOUT, fetch).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    warn!(source = "eq_early_warning", error = %err, "fetch failed");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
                Err(_) => {
                    warn!(source = "eq_early_warning", "fetch timed out");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            // A live replay window holds its own fixed offset; don't let a
            // real server's clock header overwrite it mid-replay.
            if replay.is_none() {
                let server_time = response
                    .headers()
                    .get("ST")
                    .or_else(|| response.headers().get("Date"))
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                self.clock_offset.update_from_headers(server_time.as_deref());
            }

            let bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(source = "eq_early_warning", error = %err, "malformed response body");
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            };

            let Some(frame) = parse_frame(&bytes, self.header_len) else {
                warn!(source = "eq_early_warning", "frame too short to decode");
                return AdapterRunOutcome::unchanged(prior_state);
            };

            if let Some(replay) = replay {
                if frame.eqk_id != replay.eqk_id {
                    return AdapterRunOutcome::unchanged(prior_state);
                }
            }

            apply_dedup(prior_state.as_deref(), frame)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_bits(buf: &mut [u8], start_bit: usize, width: usize, value: u64) {
        for i in 0..width {
            let bit = (value >> (width - 1 - i)) & 1;
            let bit_index = start_bit + i;
            let byte_index = bit_index / 8;
            let bit_in_byte = 7 - (bit_index % 8);
            if bit == 1 {
                buf[byte_index] |= 1 << bit_in_byte;
            }
        }
    }

    fn make_trailer(phase_bits: (u64, u64), eqk_id: u64, mag_x10: u64, depth_x10: u64) -> (Vec<u8>, Vec<u8>) {
        let mut header = vec![0u8; DEFAULT_HEADER_LEN];
        write_bits(&mut header, 1, 1, phase_bits.0);
        write_bits(&mut header, 2, 1, phase_bits.1);

        let mut packed = vec![0u8; TRAILER_PACKED_LEN];
        write_bits(&mut packed, 0, 10, 500); // lat raw
        write_bits(&mut packed, 10, 10, 600); // lon raw
        write_bits(&mut packed, 20, 7, mag_x10);
        write_bits(&mut packed, 27, 10, depth_x10);
        write_bits(&mut packed, 37, 32, 1_700_000_000);
        write_bits(&mut packed, 69, 26, eqk_id);
        write_bits(&mut packed, 95, 4, 5);
        write_bits(&mut packed, 99, 17, 0b1000_0000_0000_0000_0);

        (header, packed)
    }

    fn make_frame(phase_bits: (u64, u64), eqk_id: u64) -> Vec<u8> {
        let (header, packed) = make_trailer(phase_bits, eqk_id, 45, 80);
        let mut frame = header;
        frame.extend(std::iter::repeat(b' ').take(TRAILER_TEXT_LEN));
        frame.extend(packed);
        frame
    }

    #[test]
    fn phase_1_frame_parses_as_no_event() {
        let data = make_frame((0, 0), 1);
        let frame = parse_frame(&data, DEFAULT_HEADER_LEN).unwrap();
        assert_eq!(frame.phase, Phase::NoEvent);
    }

    #[test]
    fn phase_1_emits_zero_events_regardless_of_trailer() {
        let data = make_frame((0, 0), 99);
        let frame = parse_frame(&data, DEFAULT_HEADER_LEN).unwrap();
        let outcome = apply_dedup(None, frame);
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn phase_2_and_3_decode_expected_lat_lon_mag_depth() {
        let data = make_frame((1, 1), 42);
        let frame = parse_frame(&data, DEFAULT_HEADER_LEN).unwrap();
        assert_eq!(frame.phase, Phase::Detail);
        assert_eq!(frame.lat, 35.0);
        assert_eq!(frame.lon, 130.0);
        assert_eq!(frame.magnitude, 4.5);
        assert_eq!(frame.depth_km, 8.0);
        assert_eq!(frame.eqk_id, 42);
        assert_eq!(frame.affected_regions, vec!["서울"]);
    }

    #[test]
    fn repeat_phase_for_same_incident_is_suppressed() {
        let data = make_frame((1, 0), 7);
        let frame1 = parse_frame(&data, DEFAULT_HEADER_LEN).unwrap();
        let first = apply_dedup(None, frame1);
        assert_eq!(first.events.len(), 1);

        let frame2 = parse_frame(&data, DEFAULT_HEADER_LEN).unwrap();
        let second = apply_dedup(first.next_state.as_deref(), frame2);
        assert!(second.events.is_empty());
    }

    #[test]
    fn replay_window_warps_offset_to_land_on_start_at() {
        let start_at = Utc::now() - chrono::Duration::hours(2);
        let sim = crate::config::SimulationConfig {
            eqk_id: "42".to_owned(),
            start_at: start_at.to_rfc3339(),
        };
        let window = ReplayWindow::parse(&sim).unwrap();
        assert!(window.active());
        assert_eq!(window.eqk_id, 42);

        let stamped = window.url_timestamp();
        let seconds_part = stamped.split('.').next().unwrap();
        let parsed = chrono::NaiveDateTime::parse_from_str(seconds_part, "%Y%m%d%H%M%S")
            .unwrap()
            .and_utc();
        assert!((parsed - start_at).num_seconds().abs() <= 1);
    }

    #[test]
    fn replay_window_rejects_malformed_inputs() {
        let bad_id = crate::config::SimulationConfig {
            eqk_id: "not-a-number".to_owned(),
            start_at: Utc::now().to_rfc3339(),
        };
        assert!(ReplayWindow::parse(&bad_id).is_none());

        let bad_timestamp = crate::config::SimulationConfig {
            eqk_id: "42".to_owned(),
            start_at: "not-a-timestamp".to_owned(),
        };
        assert!(ReplayWindow::parse(&bad_timestamp).is_none());
    }

    #[test]
    fn second_phase_for_same_incident_downgrades_to_info() {
        let fast_info = make_frame((1, 0), 7);
        let frame1 = parse_frame(&fast_info, DEFAULT_HEADER_LEN).unwrap();
        let first = apply_dedup(None, frame1);

        let detail = make_frame((1, 1), 7);
        let frame2 = parse_frame(&detail, DEFAULT_HEADER_LEN).unwrap();
        let second = apply_dedup(first.next_state.as_deref(), frame2);

        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].level, Level::Info);
    }
}
