use serde::Serialize;
use std::fmt;

/// Lifecycle phase of a plan execution
///
/// ```text
/// Planning → Executing → StepEvaluating → Adjusting → ReplanCheck → Planning
///                 ↑              │             │            │
///                 └──────────────┴─────────────┴────────────┘
/// ```
///
/// Any non-terminal phase may move to `Aborted`; `Completed` is reached
/// from evaluation, adjustment, or the re-plan check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionPhase {
    Planning,
    Executing,
    StepEvaluating,
    Adjusting,
    ReplanCheck,
    Completed,
    Aborted,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::StepEvaluating => "step-evaluating",
            Self::Adjusting => "adjusting",
            Self::ReplanCheck => "replan-check",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Returns true if moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: ExecutionPhase) -> bool {
        use ExecutionPhase::*;

        if self.is_terminal() {
            return false;
        }
        if next == Aborted {
            return true;
        }

        matches!(
            (self, next),
            (Planning, Executing)
                | (Planning, Completed)
                | (Executing, StepEvaluating)
                | (StepEvaluating, Adjusting)
                | (StepEvaluating, ReplanCheck)
                | (StepEvaluating, Executing)
                | (StepEvaluating, Completed)
                | (Adjusting, ReplanCheck)
                | (Adjusting, Executing)
                | (Adjusting, Completed)
                | (ReplanCheck, Planning)
                | (ReplanCheck, Executing)
                | (ReplanCheck, Completed)
        )
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
