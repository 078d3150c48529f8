//! Timestamp parsing helpers. Sources emit `+09:00` local time; adapters
//! convert to UTC, rejecting malformed input as `None` rather than raising
//! (spec §4.5).

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

const KST_OFFSET_SECONDS: i32 = 9 * 3600;

/// Parses `"YYYY/MM/DD HH:MM:SS"` in KST and converts to UTC.
pub fn parse_kst_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y/%m/%d %H:%M:%S").ok()?;
    kst_to_utc(naive)
}

/// Parses `"YYYY-MM-DDTHH:MM:SS"` in KST and converts to UTC.
pub fn parse_kst_iso_local(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S").ok()?;
    kst_to_utc(naive)
}

fn kst_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    let offset = FixedOffset::east_opt(KST_OFFSET_SECONDS)?;
    let local = offset.from_local_datetime(&naive).single()?;
    Some(local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_kst_slash_format_to_utc() {
        let parsed = parse_kst_datetime("2025/12/25 05:14:43").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 12, 24, 20, 14, 43).unwrap());
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert!(parse_kst_datetime("not-a-date").is_none());
        assert!(parse_kst_datetime("").is_none());
    }
}
