use crate::model::{PatternSignature, StepResult};
use std::collections::BTreeMap;

/// Outcome of one pattern signature over a finished execution
#[derive(Debug, Clone, PartialEq)]
pub struct PatternOutcome {
    pub signature: PatternSignature,
    pub success: bool,

    /// Mean summed actual value of the signature's windows
    pub value: f64,

    /// Number of windows that matched the signature
    pub occurrences: usize,
}

#[derive(Default)]
struct WindowTally {
    ratio_sum: f64,
    value_sum: f64,
    count: usize,
}

/// Reduces executed steps into one outcome per distinct signature
///
/// Every contiguous run of `1..=max_window` results is a window; its
/// signature is the sequence of action types. A signature succeeds when the
/// mean performance ratio of its windows reaches `success_ratio`.
///
/// # Arguments
///
/// * `results` - Step results in execution order
/// * `max_window` - Longest window considered
/// * `success_ratio` - Mean ratio at which a signature counts as a success
///
/// # Returns
///
/// Outcomes ordered by signature
pub fn reduce_outcomes(
    results: &[StepResult],
    max_window: usize,
    success_ratio: f64,
) -> Vec<PatternOutcome> {
    let mut tallies: BTreeMap<PatternSignature, WindowTally> = BTreeMap::new();

    for len in 1..=max_window.min(results.len()) {
        for window in results.windows(len) {
            let signature = PatternSignature::new(window.iter().map(|r| r.action_type).collect());
            let ratio = window.iter().map(|r| r.performance_ratio).sum::<f64>() / len as f64;
            let value = window.iter().map(|r| r.actual_value).sum::<f64>();

            let tally = tallies.entry(signature).or_default();
            tally.ratio_sum += ratio;
            tally.value_sum += value;
            tally.count += 1;
        }
    }

    tallies
        .into_iter()
        .map(|(signature, tally)| {
            let count = tally.count as f64;
            PatternOutcome {
                signature,
                success: tally.ratio_sum / count >= success_ratio,
                value: tally.value_sum / count,
                occurrences: tally.count,
            }
        })
        .collect()
}
