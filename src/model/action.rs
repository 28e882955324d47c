/// Crawl action definitions
///
/// An action is one unit of crawl work the planner can schedule. Actions are
/// immutable once built; the planner and controller only wrap them.
use crate::model::StepSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::{Position, Url};

/// Kind of crawl work an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    /// Fetch a hub page (section front, topic index) and harvest its links
    ExploreHub,

    /// Replay an archive or history path of a hub
    History,

    /// Seed further crawling from a just-discovered article
    AdaptiveSeed,

    /// Walk a sitemap listing
    Sitemap,
}

impl ActionType {
    /// Returns the storage representation of the action type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExploreHub => "explore-hub",
            Self::History => "history",
            Self::AdaptiveSeed => "adaptive-seed",
            Self::Sitemap => "sitemap",
        }
    }

    /// Parses an action type from its storage representation
    ///
    /// Returns None if the string doesn't match any known type.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "explore-hub" => Some(Self::ExploreHub),
            "history" => Some(Self::History),
            "adaptive-seed" => Some(Self::AdaptiveSeed),
            "sitemap" => Some(Self::Sitemap),
            _ => None,
        }
    }

    /// Returns true if actions of this type are aimed at a known hub
    ///
    /// Hub-targeted types can be synthesized for unexplored hubs of a domain;
    /// adaptive seeds only exist once an article has been discovered.
    pub fn targets_hubs(&self) -> bool {
        match self {
            Self::ExploreHub | Self::History => true,
            Self::AdaptiveSeed | Self::Sitemap => false,
        }
    }

    /// Returns all action types
    pub fn all() -> [Self; 4] {
        [
            Self::ExploreHub,
            Self::History,
            Self::AdaptiveSeed,
            Self::Sitemap,
        ]
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate unit of crawl work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    kind: ActionType,
    target: String,
    estimated_articles: u32,
    estimated_requests: u32,
}

impl Action {
    pub fn new(
        kind: ActionType,
        target: impl Into<String>,
        estimated_articles: u32,
        estimated_requests: u32,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            estimated_articles,
            estimated_requests,
        }
    }

    pub fn kind(&self) -> ActionType {
        self.kind
    }

    /// URL or path descriptor the action operates on
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn estimated_articles(&self) -> u32 {
        self.estimated_articles
    }

    pub fn estimated_requests(&self) -> u32 {
        self.estimated_requests
    }

    /// Builds the same action aimed at the next page of its target
    ///
    /// The page number is carried in a `page` query parameter. Absolute URLs
    /// keep their origin; path descriptors stay relative.
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_compass::model::{Action, ActionType};
    ///
    /// let action = Action::new(ActionType::ExploreHub, "https://example.com/news", 40, 1);
    /// let next = action.next_page_variant().unwrap();
    /// assert_eq!(next.target(), "https://example.com/news?page=2");
    ///
    /// let next = next.next_page_variant().unwrap();
    /// assert_eq!(next.target(), "https://example.com/news?page=3");
    /// ```
    pub fn next_page_variant(&self) -> Option<Action> {
        let target = next_page_target(&self.target)?;
        Some(Self {
            target,
            ..self.clone()
        })
    }
}

/// Computes the next-page target for a URL or path descriptor
fn next_page_target(target: &str) -> Option<String> {
    match Url::parse(target) {
        Ok(url) => Some(with_next_page(url).to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse("https://relative.invalid/").ok()?;
            let url = base.join(target).ok()?;
            let next = with_next_page(url);
            Some(next[Position::BeforePath..].to_string())
        }
        Err(_) => None,
    }
}

fn with_next_page(mut url: Url) -> Url {
    let mut page = 1u32;
    let mut retained = Vec::new();

    for (key, value) in url.query_pairs() {
        if key == "page" {
            page = value.parse().unwrap_or(1);
        } else {
            retained.push((key.into_owned(), value.into_owned()));
        }
    }

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("page", &page.saturating_add(1).to_string());
    }

    url
}

/// Base heuristic signals attached to a candidate before scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseHeuristics {
    /// The action fills a known coverage gap
    pub fills_coverage_gap: bool,

    /// Confidence of the pattern this candidate was derived from
    pub pattern_confidence: Option<f64>,

    /// Additive adjustment learned during execution for this action type
    pub adjustment: f64,
}

/// An action offered to the planner together with its predicted payoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub action: Action,
    pub expected_value: f64,
    #[serde(default)]
    pub heuristics: BaseHeuristics,
    #[serde(default)]
    pub source: StepSource,
}

impl Candidate {
    /// Creates a search candidate whose expected value is its article estimate
    pub fn new(action: Action) -> Self {
        let expected_value = f64::from(action.estimated_articles());
        Self {
            action,
            expected_value,
            heuristics: BaseHeuristics::default(),
            source: StepSource::SearchGenerated,
        }
    }

    /// Creates a candidate derived from a learned pattern
    pub fn pattern_learned(action: Action, expected_value: f64, confidence: f64) -> Self {
        Self {
            action,
            expected_value,
            heuristics: BaseHeuristics {
                pattern_confidence: Some(confidence),
                ..BaseHeuristics::default()
            },
            source: StepSource::PatternLearned,
        }
    }

    pub fn with_expected_value(mut self, expected_value: f64) -> Self {
        self.expected_value = expected_value;
        self
    }

    /// Marks the candidate as filling a known coverage gap
    pub fn filling_gap(mut self) -> Self {
        self.heuristics.fills_coverage_gap = true;
        self
    }
}
