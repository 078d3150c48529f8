/// Structural validation tests for the PostgreSQL migration file.
///
/// These tests validate the SQL migration schema by parsing and checking that
/// all required tables, columns, constraints, and indexes are present.
///
/// NOTE: Full migration execution testing requires a PostgreSQL container
/// (e.g., testcontainers-rs) and is deferred to the integration test phase.
const MIGRATION_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/0001_init.sql");

fn read_migration() -> String {
    std::fs::read_to_string(MIGRATION_PATH)
        .expect("Migration file should exist at services/server/migrations/0001_init.sql")
}

#[test]
fn migration_file_exists_and_is_nonempty() {
    let sql = read_migration();
    assert!(!sql.trim().is_empty(), "Migration file must not be empty");
}

#[test]
fn contains_events_table() {
    let sql = read_migration();
    assert!(
        sql.contains("CREATE TABLE events"),
        "Migration must define events table"
    );
}

#[test]
fn contains_ingest_checkpoints_table() {
    let sql = read_migration();
    assert!(
        sql.contains("CREATE TABLE ingest_checkpoints"),
        "Migration must define ingest_checkpoints table"
    );
}

// ---------------------------------------------------------------------------
// events columns and constraints
// ---------------------------------------------------------------------------

#[test]
fn events_has_uuid_pk() {
    let sql = read_migration();
    assert!(
        sql.contains("id UUID PRIMARY KEY"),
        "events must have id UUID PRIMARY KEY"
    );
}

#[test]
fn events_has_source_and_kind_smallints() {
    let sql = read_migration();
    assert!(
        sql.contains("source SMALLINT NOT NULL"),
        "events must have source SMALLINT NOT NULL"
    );
    assert!(
        sql.contains("kind SMALLINT NOT NULL"),
        "events must have kind SMALLINT NOT NULL"
    );
}

#[test]
fn events_has_title_not_null() {
    let sql = read_migration();
    assert!(
        sql.contains("title TEXT NOT NULL"),
        "events must have title TEXT NOT NULL"
    );
}

#[test]
fn events_has_nullable_body_and_region_and_occurred_at() {
    let sql = read_migration();
    assert!(sql.contains("body TEXT"), "events must have a body column");
    assert!(
        sql.contains("occurred_at TIMESTAMPTZ"),
        "events must have an occurred_at column"
    );
    assert!(
        sql.contains("region_text TEXT"),
        "events must have a region_text column"
    );
}

#[test]
fn events_has_fetched_at_not_null() {
    let sql = read_migration();
    assert!(
        sql.contains("fetched_at TIMESTAMPTZ NOT NULL"),
        "events must have fetched_at TIMESTAMPTZ NOT NULL"
    );
}

#[test]
fn events_level_is_bounded_one_to_five() {
    let sql = read_migration();
    assert!(
        sql.contains("CHECK (level BETWEEN 1 AND 5)"),
        "events.level must be constrained to 1..=5"
    );
}

#[test]
fn events_has_payload_jsonb() {
    let sql = read_migration();
    assert!(
        sql.contains("payload JSONB"),
        "events must have a payload JSONB column"
    );
}

#[test]
fn events_has_fetched_at_index_for_ordered_reads() {
    let sql = read_migration();
    assert!(
        sql.contains("events_fetched_at_idx") && sql.contains("fetched_at DESC"),
        "events must be indexed on fetched_at DESC for list/list_since ordering"
    );
}

#[test]
fn events_has_kind_and_source_filter_indexes() {
    let sql = read_migration();
    assert!(
        sql.contains("events_kind_fetched_at_idx"),
        "events must be indexed on (kind, fetched_at) for the kind filter"
    );
    assert!(
        sql.contains("events_source_fetched_at_idx"),
        "events must be indexed on (source, fetched_at) for the source filter"
    );
}

// ---------------------------------------------------------------------------
// ingest_checkpoints columns and constraints
// ---------------------------------------------------------------------------

#[test]
fn ingest_checkpoints_keyed_by_source() {
    let sql = read_migration();
    assert!(
        sql.contains("source SMALLINT PRIMARY KEY"),
        "ingest_checkpoints must be keyed by source SMALLINT PRIMARY KEY"
    );
}

#[test]
fn ingest_checkpoints_has_nullable_state_and_updated_at() {
    let sql = read_migration();
    assert!(
        sql.contains("state TEXT"),
        "ingest_checkpoints must have a nullable state column"
    );
    assert!(
        sql.contains("updated_at TIMESTAMPTZ NOT NULL"),
        "ingest_checkpoints must have updated_at TIMESTAMPTZ NOT NULL"
    );
}

#[test]
fn both_tables_defined() {
    let sql = read_migration();
    for table in ["events", "ingest_checkpoints"] {
        assert!(
            sql.contains(&format!("CREATE TABLE {table}")),
            "Migration must define {table} table"
        );
    }
}
