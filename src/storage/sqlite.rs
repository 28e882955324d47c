//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the store traits.
//! The connection sits behind a mutex so one store can be shared by every
//! crawl job in the process; each mutation is one statement, so no lock is
//! held across a job's lifetime.

use crate::config::StorageConfig;
use crate::model::{ActionType, CostObservation, PatternSignature};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{HistoryStore, PatternStore, StorageError, StorageResult};
use crate::storage::{
    DomainAggregates, DomainDescriptor, KnownHub, Pattern, ShareOutcome, SimilarityBands,
    COST_OBSERVATION_WINDOW, MIN_PATTERN_SAMPLES,
};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const PATTERN_COLUMNS: &str = "domain, signature, confidence, sample_size, success_count,
     failure_count, avg_value, shared, source_domain";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates a store at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `busy_timeout` - How long a statement waits for a lock held by
    ///   another connection
    pub fn new(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while another job writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(busy_timeout)?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens the store a configuration points at
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        Self::new(
            Path::new(&config.database_path),
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    /// Creates an in-memory store (for tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

fn pattern_from_row(row: &Row<'_>) -> rusqlite::Result<Pattern> {
    let signature_text: String = row.get(1)?;
    let signature = signature_text
        .parse::<PatternSignature>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?;

    Ok(Pattern {
        domain: row.get(0)?,
        signature,
        confidence: row.get(2)?,
        sample_size: row.get(3)?,
        success_count: row.get(4)?,
        failure_count: row.get(5)?,
        avg_value: row.get(6)?,
        shared: row.get(7)?,
        source_domain: row.get(8)?,
    })
}

impl PatternStore for SqliteStore {
    // ===== Outcomes =====

    fn record_outcome(
        &self,
        domain: &str,
        signature: &PatternSignature,
        success: bool,
        value: f64,
    ) -> StorageResult<()> {
        let value = if value.is_finite() { value } else { 0.0 };
        let (successes, failures) = if success { (1, 0) } else { (0, 1) };
        let now = Utc::now().to_rfc3339();

        // Single statement: counters are incremented in place so concurrent
        // jobs finishing on the same domain never lose an update. A local
        // outcome landing on a transferred row replaces the transferred prior.
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO patterns (domain, signature, confidence, sample_size, success_count,
                 failure_count, avg_value, shared, source_domain, created_at, updated_at)
             VALUES (?1, ?2, ?3 / 3.0, 1, ?3, ?4, ?5, 0, NULL, ?6, ?6)
             ON CONFLICT(domain, signature) DO UPDATE SET
                 confidence = CASE WHEN shared = 1 THEN excluded.confidence
                     ELSE (success_count + excluded.success_count) * 1.0 / (sample_size + 3) END,
                 avg_value = CASE WHEN shared = 1 THEN excluded.avg_value
                     ELSE (avg_value * sample_size + excluded.avg_value) / (sample_size + 1) END,
                 success_count = CASE WHEN shared = 1 THEN excluded.success_count
                     ELSE success_count + excluded.success_count END,
                 failure_count = CASE WHEN shared = 1 THEN excluded.failure_count
                     ELSE failure_count + excluded.failure_count END,
                 sample_size = CASE WHEN shared = 1 THEN 1 ELSE sample_size + 1 END,
                 shared = 0,
                 source_domain = NULL,
                 updated_at = excluded.updated_at",
            params![domain, signature.to_string(), successes, failures, value, now],
        )?;

        tracing::trace!(
            "Recorded {} outcome for {} on {} (value {:.1})",
            if success { "success" } else { "failure" },
            signature,
            domain,
            value
        );

        Ok(())
    }

    // ===== Queries =====

    fn query_good_patterns(
        &self,
        domain: &str,
        min_success_rate: f64,
        min_avg_value: f64,
    ) -> StorageResult<Vec<Pattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patterns
             WHERE domain = ?1
               AND sample_size >= ?2
               AND success_count * 1.0 / sample_size >= ?3
               AND avg_value >= ?4
             ORDER BY confidence DESC, sample_size DESC, signature ASC",
            PATTERN_COLUMNS
        ))?;

        let patterns = stmt
            .query_map(
                params![domain, MIN_PATTERN_SAMPLES, min_success_rate, min_avg_value],
                pattern_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    fn get_pattern(
        &self,
        domain: &str,
        signature: &PatternSignature,
    ) -> StorageResult<Option<Pattern>> {
        let conn = self.conn()?;
        let pattern = conn
            .query_row(
                &format!(
                    "SELECT {} FROM patterns WHERE domain = ?1 AND signature = ?2",
                    PATTERN_COLUMNS
                ),
                params![domain, signature.to_string()],
                pattern_from_row,
            )
            .optional()?;

        Ok(pattern)
    }

    fn list_patterns(&self, domain: &str) -> StorageResult<Vec<Pattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patterns WHERE domain = ?1 ORDER BY signature ASC",
            PATTERN_COLUMNS
        ))?;

        let patterns = stmt
            .query_map(params![domain], pattern_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    // ===== Cross-domain transfer =====

    fn find_similar_domains(
        &self,
        domain: &str,
        max_results: usize,
        bands: SimilarityBands,
    ) -> StorageResult<Vec<String>> {
        let Some(descriptor) = self.domain_descriptor(domain)? else {
            return Ok(Vec::new());
        };

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT domain FROM domain_descriptors
             WHERE domain != ?1
               AND ABS(avg_lookahead - ?2) <= ?3
               AND ABS(branching_factor - ?4) <= ?5
             ORDER BY ABS(avg_lookahead - ?2) + ABS(branching_factor - ?4) ASC, domain ASC
             LIMIT ?6",
        )?;

        let domains = stmt
            .query_map(
                params![
                    domain,
                    descriptor.avg_lookahead,
                    bands.lookahead,
                    descriptor.branching_factor,
                    bands.branching,
                    max_results as i64
                ],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(domains)
    }

    fn share_pattern(
        &self,
        target_domain: &str,
        pattern: &Pattern,
        decay: f64,
    ) -> StorageResult<ShareOutcome> {
        if target_domain == pattern.domain {
            tracing::warn!(
                "Refusing to share pattern {} from {} into itself",
                pattern.signature,
                target_domain
            );
            return Ok(ShareOutcome::Rejected);
        }

        let decay = decay.clamp(0.0, 1.0);
        let confidence = pattern.confidence * decay;
        let signature = pattern.signature.to_string();
        let now = Utc::now().to_rfc3339();

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO patterns (domain, signature, confidence, sample_size, success_count,
                 failure_count, avg_value, shared, source_domain, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?9)
             ON CONFLICT(domain, signature) DO NOTHING",
            params![
                target_domain,
                signature,
                confidence,
                pattern.sample_size,
                pattern.success_count,
                pattern.failure_count,
                pattern.avg_value,
                pattern.domain,
                now
            ],
        )?;

        if inserted == 1 {
            return Ok(ShareOutcome::Inserted);
        }

        let existing_shared: Option<bool> = conn
            .query_row(
                "SELECT shared FROM patterns WHERE domain = ?1 AND signature = ?2",
                params![target_domain, signature],
                |row| row.get(0),
            )
            .optional()?;

        match existing_shared {
            Some(true) => Ok(ShareOutcome::AlreadyShared),
            _ => {
                tracing::warn!(
                    "Rejected transfer of {} from {} to {}: locally learned pattern exists",
                    signature,
                    pattern.domain,
                    target_domain
                );
                Ok(ShareOutcome::Rejected)
            }
        }
    }

    // ===== Domain descriptors =====

    fn record_domain_descriptor(
        &self,
        domain: &str,
        lookahead: usize,
        branching_factor: usize,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO domain_descriptors (domain, avg_lookahead, branching_factor, plan_count, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(domain) DO UPDATE SET
                 avg_lookahead = (avg_lookahead * plan_count + excluded.avg_lookahead) / (plan_count + 1),
                 branching_factor = (branching_factor * plan_count + excluded.branching_factor) / (plan_count + 1),
                 plan_count = plan_count + 1,
                 updated_at = excluded.updated_at",
            params![domain, lookahead as f64, branching_factor as f64, now],
        )?;
        Ok(())
    }

    fn domain_descriptor(&self, domain: &str) -> StorageResult<Option<DomainDescriptor>> {
        let conn = self.conn()?;
        let descriptor = conn
            .query_row(
                "SELECT domain, avg_lookahead, branching_factor, plan_count
                 FROM domain_descriptors WHERE domain = ?1",
                params![domain],
                |row| {
                    Ok(DomainDescriptor {
                        domain: row.get(0)?,
                        avg_lookahead: row.get(1)?,
                        branching_factor: row.get(2)?,
                        plan_count: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?;

        Ok(descriptor)
    }
}

impl HistoryStore for SqliteStore {
    fn domain_aggregates(&self, domain: &str) -> StorageResult<Option<DomainAggregates>> {
        let conn = self.conn()?;
        let (page_count, hub_type_count, avg_links): (i64, i64, Option<f64>) = conn.query_row(
            "SELECT COUNT(DISTINCT url), COUNT(DISTINCT hub_type), AVG(link_count)
             FROM crawl_records WHERE domain = ?1",
            params![domain],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        if page_count == 0 {
            return Ok(None);
        }

        Ok(Some(DomainAggregates {
            page_count: page_count as u64,
            hub_type_count: hub_type_count as u64,
            avg_links_per_page: avg_links.unwrap_or(0.0),
        }))
    }

    fn known_hubs(&self, domain: &str) -> StorageResult<Vec<KnownHub>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT url, hub_type FROM crawl_records
             WHERE domain = ?1 AND hub_type IS NOT NULL
             ORDER BY url ASC",
        )?;

        let hubs = stmt
            .query_map(params![domain], |row| {
                Ok(KnownHub {
                    url: row.get(0)?,
                    hub_type: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(hubs)
    }

    fn record_crawl_page(
        &self,
        domain: &str,
        url: &str,
        hub_type: Option<&str>,
        link_count: u32,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO crawl_records (domain, url, hub_type, link_count, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![domain, url, hub_type, link_count, now],
        )?;
        Ok(())
    }

    fn record_cost_observation(&self, observation: &CostObservation) -> StorageResult<()> {
        let kind = observation.action_type.as_str();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO cost_observations (action_type, expected_ms, actual_ms, observed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                kind,
                observation.expected_cost_ms,
                observation.actual_cost_ms,
                observation.timestamp.to_rfc3339()
            ],
        )?;
        tx.execute(
            "DELETE FROM cost_observations
             WHERE action_type = ?1 AND id NOT IN (
                 SELECT id FROM cost_observations WHERE action_type = ?1
                 ORDER BY id DESC LIMIT ?2
             )",
            params![kind, COST_OBSERVATION_WINDOW],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn average_cost(&self, kind: ActionType) -> StorageResult<Option<(f64, u64)>> {
        let conn = self.conn()?;
        let (avg, count): (Option<f64>, i64) = conn.query_row(
            "SELECT AVG(actual_ms), COUNT(*) FROM (
                 SELECT actual_ms FROM cost_observations WHERE action_type = ?1
                 ORDER BY id DESC LIMIT ?2
             )",
            params![kind.as_str(), COST_OBSERVATION_WINDOW],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(avg.filter(|_| count > 0).map(|a| (a, count as u64)))
    }
}
