use crate::model::{Action, ActionType, Candidate, CrawlState};
use crate::storage::{KnownHub, Pattern};
use std::collections::HashSet;

/// Lookahead for a coverage target
pub fn lookahead_for_target(articles_target: u64) -> usize {
    if articles_target < 1_000 {
        3
    } else if articles_target < 10_000 {
        5
    } else {
        7
    }
}

/// Branching factor for a domain's hub diversity
pub fn branching_for_hub_types(hub_type_count: u64) -> usize {
    if hub_type_count < 5 {
        5
    } else if hub_type_count < 15 {
        10
    } else {
        15
    }
}

/// Synthesizes candidates from patterns that repeat one hub-targeted type
///
/// Each qualifying pattern yields candidates of its type for known hubs that
/// are neither explored nor already offered, capped per pattern.
pub fn synthesize_pattern_candidates(
    patterns: &[Pattern],
    hubs: &[KnownHub],
    state: &CrawlState,
    existing: &[Candidate],
    max_per_pattern: usize,
) -> Vec<Candidate> {
    let mut taken: HashSet<(ActionType, String)> = existing
        .iter()
        .map(|c| (c.action.kind(), c.action.target().to_string()))
        .collect();
    let mut synthesized = Vec::new();

    for pattern in patterns {
        let Some(kind) = pattern.signature.repeated_kind() else {
            continue;
        };
        if !kind.targets_hubs() {
            continue;
        }

        let estimated_articles = pattern.avg_value.max(0.0).round() as u32;
        let mut added = 0;

        for hub in hubs {
            if added >= max_per_pattern {
                break;
            }
            if state.is_explored(&hub.url) {
                continue;
            }
            if !taken.insert((kind, hub.url.clone())) {
                continue;
            }

            synthesized.push(Candidate::pattern_learned(
                Action::new(kind, hub.url.clone(), estimated_articles, 1),
                pattern.avg_value,
                pattern.confidence,
            ));
            added += 1;
        }

        if added > 0 {
            tracing::debug!(
                "Pattern {} ({:.2} confidence) seeded {} candidates",
                pattern.signature,
                pattern.confidence,
                added
            );
        }
    }

    synthesized
}
