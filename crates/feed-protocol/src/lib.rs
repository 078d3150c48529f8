// feed-protocol: shared wire and domain types for the disaster/safety event feed.
//
// Kept intentionally free of any I/O — this crate only describes the shapes
// that cross a boundary (HTTP JSON, the Redis event bus, the job queue, the
// database row shape), so every other crate can agree on them without a
// circular dependency.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use uuid::Uuid;

pub mod ids;

// ---------------------------------------------------------------------------
// Enums: Source, Kind, Level
// ---------------------------------------------------------------------------

/// Which adapter produced an event. Stored as a small integer in the database;
/// serializes to/from that same integer over JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Source {
    TextAlert,
    QuakeBulletin,
    RegionalNotice,
    WeatherWarning,
    ForestFire,
    EqEarlyWarning,
}

impl Source {
    #[must_use]
    pub fn code(self) -> i16 {
        match self {
            Source::TextAlert => 1,
            Source::QuakeBulletin => 2,
            Source::RegionalNotice => 3,
            Source::WeatherWarning => 4,
            Source::ForestFire => 5,
            Source::EqEarlyWarning => 6,
        }
    }

    #[must_use]
    pub fn job_id(self) -> String {
        format!("ingest:{}", self.code())
    }

    pub const ALL: [Source; 6] = [
        Source::TextAlert,
        Source::QuakeBulletin,
        Source::RegionalNotice,
        Source::WeatherWarning,
        Source::ForestFire,
        Source::EqEarlyWarning,
    ];
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized source code {0}")]
pub struct UnknownSourceCode(pub i16);

impl TryFrom<i16> for Source {
    type Error = UnknownSourceCode;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Source::ALL
            .into_iter()
            .find(|s| s.code() == value)
            .ok_or(UnknownSourceCode(value))
    }
}

impl From<Source> for i16 {
    fn from(value: Source) -> Self {
        value.code()
    }
}

/// Event category. ~36 values per the spec; `Other` is an explicit escape
/// hatch for codes this build doesn't know about and is not counted among
/// the ~36.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Kind {
    Other,
    Earthquake,
    EarthquakeEarlyWarning,
    Tsunami,
    VolcanicActivity,
    Landslide,
    Sinkhole,
    Fire,
    ForestFire,
    WildfireSmoke,
    IndustrialFire,
    Explosion,
    Flood,
    FlashFlood,
    HeavyRain,
    Drought,
    Typhoon,
    TropicalStorm,
    StrongWind,
    Tornado,
    Hail,
    Snowstorm,
    ColdWave,
    HeatWave,
    Lightning,
    Fog,
    AirQuality,
    ChemicalSpill,
    RadiationLeak,
    GasLeak,
    StormSurge,
    HighWaves,
    Avalanche,
    PowerOutage,
    WaterSupplyDisruption,
    BuildingCollapse,
    PublicHealthEmergency,
}

impl Kind {
    #[must_use]
    pub fn code(self) -> i16 {
        match self {
            Kind::Other => 0,
            Kind::Earthquake => 1,
            Kind::EarthquakeEarlyWarning => 2,
            Kind::Tsunami => 3,
            Kind::VolcanicActivity => 4,
            Kind::Landslide => 5,
            Kind::Sinkhole => 6,
            Kind::Fire => 7,
            Kind::ForestFire => 8,
            Kind::WildfireSmoke => 9,
            Kind::IndustrialFire => 10,
            Kind::Explosion => 11,
            Kind::Flood => 12,
            Kind::FlashFlood => 13,
            Kind::HeavyRain => 14,
            Kind::Drought => 15,
            Kind::Typhoon => 16,
            Kind::TropicalStorm => 17,
            Kind::StrongWind => 18,
            Kind::Tornado => 19,
            Kind::Hail => 20,
            Kind::Snowstorm => 21,
            Kind::ColdWave => 22,
            Kind::HeatWave => 23,
            Kind::Lightning => 24,
            Kind::Fog => 25,
            Kind::AirQuality => 26,
            Kind::ChemicalSpill => 27,
            Kind::RadiationLeak => 28,
            Kind::GasLeak => 29,
            Kind::StormSurge => 30,
            Kind::HighWaves => 31,
            Kind::Avalanche => 32,
            Kind::PowerOutage => 33,
            Kind::WaterSupplyDisruption => 34,
            Kind::BuildingCollapse => 35,
            Kind::PublicHealthEmergency => 36,
        }
    }

    pub const ALL: [Kind; 37] = [
        Kind::Other,
        Kind::Earthquake,
        Kind::EarthquakeEarlyWarning,
        Kind::Tsunami,
        Kind::VolcanicActivity,
        Kind::Landslide,
        Kind::Sinkhole,
        Kind::Fire,
        Kind::ForestFire,
        Kind::WildfireSmoke,
        Kind::IndustrialFire,
        Kind::Explosion,
        Kind::Flood,
        Kind::FlashFlood,
        Kind::HeavyRain,
        Kind::Drought,
        Kind::Typhoon,
        Kind::TropicalStorm,
        Kind::StrongWind,
        Kind::Tornado,
        Kind::Hail,
        Kind::Snowstorm,
        Kind::ColdWave,
        Kind::HeatWave,
        Kind::Lightning,
        Kind::Fog,
        Kind::AirQuality,
        Kind::ChemicalSpill,
        Kind::RadiationLeak,
        Kind::GasLeak,
        Kind::StormSurge,
        Kind::HighWaves,
        Kind::Avalanche,
        Kind::PowerOutage,
        Kind::WaterSupplyDisruption,
        Kind::BuildingCollapse,
        Kind::PublicHealthEmergency,
    ];
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized kind code {0}")]
pub struct UnknownKindCode(pub i16);

impl TryFrom<i16> for Kind {
    type Error = UnknownKindCode;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Kind::ALL
            .into_iter()
            .find(|k| k.code() == value)
            .ok_or(UnknownKindCode(value))
    }
}

impl From<Kind> for i16 {
    fn from(value: Kind) -> Self {
        value.code()
    }
}

/// Severity, 1..5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Level {
    Info = 1,
    Minor = 2,
    Moderate = 3,
    Severe = 4,
    Critical = 5,
}

#[derive(Debug, thiserror::Error)]
#[error("level must be 1..=5, got {0}")]
pub struct InvalidLevel(pub i16);

impl TryFrom<i16> for Level {
    type Error = InvalidLevel;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Level::Info),
            2 => Ok(Level::Minor),
            3 => Ok(Level::Moderate),
            4 => Ok(Level::Severe),
            5 => Ok(Level::Critical),
            other => Err(InvalidLevel(other)),
        }
    }
}

impl From<Level> for i16 {
    fn from(value: Level) -> Self {
        value as i16
    }
}

// ---------------------------------------------------------------------------
// Event record
// ---------------------------------------------------------------------------

/// A fully-materialized, immutable event row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub source: Source,
    pub kind: Kind,
    pub title: String,
    pub body: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub occurred_at: Option<chrono::DateTime<chrono::Utc>>,
    pub region_text: Option<String>,
    pub level: Level,
    pub payload: Option<serde_json::Value>,
}

/// What an adapter hands back before the framework assigns `id`, `source`,
/// and `fetched_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub kind: Kind,
    pub title: String,
    pub body: Option<String>,
    pub occurred_at: Option<chrono::DateTime<chrono::Utc>>,
    pub region_text: Option<String>,
    pub level: Level,
    pub payload: Option<serde_json::Value>,
}

/// Result of one `SourceAdapter::run` invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterRunOutcome {
    pub events: Vec<NewEvent>,
    pub next_state: Option<String>,
}

impl AdapterRunOutcome {
    #[must_use]
    pub fn unchanged(prior_state: Option<String>) -> Self {
        Self {
            events: Vec::new(),
            next_state: prior_state,
        }
    }
}

/// Per-source resumable checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source: Source,
    pub state: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// ---------------------------------------------------------------------------
// HTTP contract
// ---------------------------------------------------------------------------

/// Query params for `GET /events`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEventsQuery {
    pub limit: Option<u32>,
    pub kind: Option<i16>,
    pub source: Option<i16>,
}

/// Query params for `GET /events/stream`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
}

/// Frozen HTTP error envelope used by all non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Event bus wire format
// ---------------------------------------------------------------------------

pub const BUS_CHANNEL: &str = "events:new";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub event_id: Uuid,
}

// ---------------------------------------------------------------------------
// Job queue wire format
// ---------------------------------------------------------------------------

pub const INGEST_QUEUE: &str = "ingest";
pub const INGEST_JOB_NAME: &str = "poll-source";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestJob {
    pub source: Source,
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_code_roundtrips_for_every_variant() {
        for source in Source::ALL {
            let code: i16 = source.into();
            assert_eq!(Source::try_from(code).unwrap(), source);
        }
    }

    #[test]
    fn kind_code_roundtrips_for_every_variant() {
        for kind in Kind::ALL {
            let code: i16 = kind.into();
            assert_eq!(Kind::try_from(code).unwrap(), kind);
        }
    }

    #[test]
    fn kind_count_matches_spec_budget() {
        // "Other" is an explicit escape hatch, not counted among the ~36.
        assert_eq!(Kind::ALL.len() - 1, 36);
    }

    #[test]
    fn level_rejects_out_of_range_codes() {
        assert!(Level::try_from(0).is_err());
        assert!(Level::try_from(6).is_err());
        assert!(Level::try_from(3).is_ok());
    }

    #[test]
    fn event_dto_serializes_nulls_verbatim() {
        let event = Event {
            id: Uuid::nil(),
            source: Source::TextAlert,
            kind: Kind::Earthquake,
            title: "title".to_owned(),
            body: None,
            fetched_at: chrono::Utc::now(),
            occurred_at: None,
            region_text: None,
            level: Level::Info,
            payload: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("body").unwrap().is_null());
        assert!(json.get("occurred_at").unwrap().is_null());
        assert!(json.get("region_text").unwrap().is_null());
        assert!(json.get("payload").unwrap().is_null());
    }

    #[test]
    fn job_id_format_matches_wire_contract() {
        assert_eq!(Source::QuakeBulletin.job_id(), "ingest:2");
    }
}
