//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Compass database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Learned action-sequence patterns, one row per (domain, signature)
CREATE TABLE IF NOT EXISTS patterns (
    domain TEXT NOT NULL,
    signature TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0,
    sample_size INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    avg_value REAL NOT NULL DEFAULT 0,
    shared INTEGER NOT NULL DEFAULT 0,
    source_domain TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (domain, signature)
);

CREATE INDEX IF NOT EXISTS idx_patterns_domain ON patterns(domain);

-- Per-domain planning characteristics used for similarity search
CREATE TABLE IF NOT EXISTS domain_descriptors (
    domain TEXT PRIMARY KEY,
    avg_lookahead REAL NOT NULL,
    branching_factor REAL NOT NULL,
    plan_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

-- Historical crawl records read by the domain profiler
CREATE TABLE IF NOT EXISTS crawl_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    url TEXT NOT NULL,
    hub_type TEXT,
    link_count INTEGER NOT NULL DEFAULT 0,
    crawled_at TEXT NOT NULL,
    UNIQUE(domain, url)
);

CREATE INDEX IF NOT EXISTS idx_crawl_records_domain ON crawl_records(domain);

-- Expected vs. actual action durations for cost calibration
CREATE TABLE IF NOT EXISTS cost_observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action_type TEXT NOT NULL,
    expected_ms REAL,
    actual_ms REAL NOT NULL,
    observed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cost_observations_type ON cost_observations(action_type);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", get_schema_version())?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
