//! SQL schema for the Guardian SQLite store.
//!
//! Executed once at connection startup. Every statement is idempotent.

/// Tables exposed to queries and writes. Identifiers in queries are checked
/// against the columns of these tables before any SQL is built.
pub const TABLES: [&str; 3] = ["profiles", "entry", "events"];

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Account profiles; may be entirely unpopulated.
CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY,
    full_name   TEXT,
    department  TEXT,
    course      TEXT,
    roll_no     TEXT
);

-- Tracked identities. Columns are loosely typed on purpose: rows arrive from
-- several feeds and are canonicalised on read.
CREATE TABLE IF NOT EXISTS entry (
    entry_id          TEXT PRIMARY KEY,
    user_id           TEXT,            -- profiles.id, when known
    primary_name      TEXT,            -- feed-supplied name, below the profile's
    status            TEXT,
    last_seen         TEXT,
    location          TEXT,            -- plain name or JSON-encoded object
    aliases           TEXT,            -- JSON array or comma-separated
    confidence_score  REAL,
    card_id           TEXT,
    device_hash       TEXT
);

CREATE TABLE IF NOT EXISTS events (
    id           TEXT PRIMARY KEY,
    event_type   TEXT,
    entry_time   TEXT,
    created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    details      TEXT,
    location_id  TEXT,
    user_id      TEXT,
    severity     TEXT,
    source       TEXT
);

CREATE INDEX IF NOT EXISTS entry_user_idx   ON entry(user_id);
CREATE INDEX IF NOT EXISTS events_user_idx  ON events(user_id);
CREATE INDEX IF NOT EXISTS events_time_idx  ON events(entry_time);

PRAGMA user_version = 1;
";
