//! Time-ordered event ids.
//!
//! Event ids are UUIDv7: the first 48 bits are a millisecond Unix timestamp,
//! the rest is random. That keeps `ORDER BY fetched_at DESC` monotonic with
//! `id` as a tiebreaker even for two events fetched in the same millisecond,
//! without a database sequence shared across instances.

use uuid::Uuid;

#[must_use]
pub fn new_event_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_ids_are_non_decreasing() {
        let a = new_event_id();
        let b = new_event_id();
        assert!(b >= a);
    }

    #[test]
    fn ids_are_version_7() {
        let id = new_event_id();
        assert_eq!(id.get_version_num(), 7);
    }
}
