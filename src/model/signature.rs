use crate::model::ActionType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '→';

/// Ordered list of action types identifying a learned pattern
///
/// Rendered as `explore-hub→explore-hub→history` in storage and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternSignature(Vec<ActionType>);

impl PatternSignature {
    pub fn new(kinds: Vec<ActionType>) -> Self {
        Self(kinds)
    }

    pub fn kinds(&self) -> &[ActionType] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the repeated action type if the signature repeats one type
    ///
    /// Only signatures of at least two steps count as repetition.
    pub fn repeated_kind(&self) -> Option<ActionType> {
        let first = *self.0.first()?;
        if self.0.len() >= 2 && self.0.iter().all(|k| *k == first) {
            Some(first)
        } else {
            None
        }
    }
}

impl fmt::Display for PatternSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kind) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            write!(f, "{}", kind)?;
        }
        Ok(())
    }
}

impl FromStr for PatternSignature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty pattern signature".to_string());
        }

        s.split(SEPARATOR)
            .map(|part| {
                ActionType::parse(part.trim())
                    .ok_or_else(|| format!("unknown action type '{}' in signature", part))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}
