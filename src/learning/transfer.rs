use crate::config::SharingConfig;
use crate::storage::{PatternStore, ShareOutcome, SimilarityBands, StorageResult};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use std::sync::Arc;

/// Counts from one transfer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub inserted: usize,
    pub already_shared: usize,
    pub rejected: usize,
}

impl TransferReport {
    fn add(&mut self, outcome: ShareOutcome) {
        match outcome {
            ShareOutcome::Inserted => self.inserted += 1,
            ShareOutcome::AlreadyShared => self.already_shared += 1,
            ShareOutcome::Rejected => self.rejected += 1,
        }
    }

    fn merge(&mut self, other: TransferReport) {
        self.inserted += other.inserted;
        self.already_shared += other.already_shared;
        self.rejected += other.rejected;
    }
}

/// Moves good patterns between similar domains
pub struct PatternTransfer {
    patterns: Arc<dyn PatternStore>,
    telemetry: Arc<dyn TelemetrySink>,
    sharing: SharingConfig,
    min_success_rate: f64,
    min_avg_value: f64,
}

impl PatternTransfer {
    pub fn new(
        patterns: Arc<dyn PatternStore>,
        telemetry: Arc<dyn TelemetrySink>,
        sharing: SharingConfig,
        min_success_rate: f64,
        min_avg_value: f64,
    ) -> Self {
        Self {
            patterns,
            telemetry,
            sharing,
            min_success_rate,
            min_avg_value,
        }
    }

    fn bands(&self) -> SimilarityBands {
        SimilarityBands {
            lookahead: self.sharing.lookahead_tolerance,
            branching: self.sharing.branching_tolerance,
        }
    }

    /// Shares every good pattern of `source` into `target`
    ///
    /// Locally learned rows in `target` are never touched.
    pub fn share_between(&self, source: &str, target: &str) -> StorageResult<TransferReport> {
        let mut report = TransferReport::default();
        let good =
            self.patterns
                .query_good_patterns(source, self.min_success_rate, self.min_avg_value)?;

        for pattern in good {
            let outcome =
                self.patterns
                    .share_pattern(target, &pattern, self.sharing.transfer_decay)?;

            if outcome == ShareOutcome::Inserted {
                self.telemetry.emit(&TelemetryEvent::PatternTransferred {
                    source_domain: source.to_string(),
                    target_domain: target.to_string(),
                    signature: pattern.signature.clone(),
                    confidence: pattern.confidence * self.sharing.transfer_decay.clamp(0.0, 1.0),
                });
            }
            report.add(outcome);
        }

        Ok(report)
    }

    /// Seeds a domain with patterns from its most similar domains
    ///
    /// Failures against one source domain are logged and skipped.
    pub fn bootstrap(&self, domain: &str) -> TransferReport {
        let similar = match self.patterns.find_similar_domains(
            domain,
            self.sharing.max_similar_domains,
            self.bands(),
        ) {
            Ok(similar) => similar,
            Err(e) => {
                tracing::warn!("Failed to find domains similar to {}: {}", domain, e);
                return TransferReport::default();
            }
        };

        let mut report = TransferReport::default();
        for source in &similar {
            match self.share_between(source, domain) {
                Ok(partial) => report.merge(partial),
                Err(e) => tracing::warn!("Failed to transfer patterns {} -> {}: {}", source, domain, e),
            }
        }

        if report.inserted > 0 {
            tracing::info!(
                "Bootstrapped {} with {} patterns from {} similar domains",
                domain,
                report.inserted,
                similar.len()
            );
        }

        report
    }
}
