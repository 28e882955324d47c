//! Branch-and-bound plan search
//!
//! The search tree lives in an arena of nodes that point at their parent by
//! index. Each node extends its parent's path by one candidate; paths are
//! valued by the depth-discounted sum of step priorities.

use crate::model::{Candidate, SearchStats, StepSource};
use std::cmp::Ordering;

const EPSILON: f64 = 1e-9;

/// A candidate after scoring
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub priority: f64,
    pub expected_cost_ms: Option<f64>,
}

impl ScoredCandidate {
    /// Search objective contribution of the candidate
    ///
    /// The priority already folds in the weighted expected value.
    pub fn utility(&self) -> f64 {
        self.priority
    }

    fn is_pattern_learned(&self) -> bool {
        self.candidate.source == StepSource::PatternLearned
    }

    fn requests(&self) -> u64 {
        u64::from(self.candidate.action.estimated_requests())
    }
}

/// Bounds for one search
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub lookahead: usize,
    pub branching: usize,
    pub discount: f64,
    pub request_budget: Option<u64>,
    pub max_nodes: usize,
}

/// Best path found, as indices into the scored candidates
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub path: Vec<usize>,
    pub stats: SearchStats,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    parent: Option<usize>,
    candidate: Option<usize>,
    depth: usize,
    value: f64,
    requests: u64,
    pattern_steps: usize,
}

impl Node {
    fn root() -> Self {
        Self {
            parent: None,
            candidate: None,
            depth: 0,
            value: 0.0,
            requests: 0,
            pattern_steps: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PathScore {
    value: f64,
    depth: usize,
    pattern_steps: usize,
}

impl PathScore {
    /// Higher value wins; equal values prefer shallower, then more
    /// pattern-derived paths
    fn beats(&self, other: &PathScore) -> bool {
        if self.value > other.value + EPSILON {
            return true;
        }
        if self.value < other.value - EPSILON {
            return false;
        }
        match self.depth.cmp(&other.depth) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.pattern_steps > other.pattern_steps,
        }
    }
}

/// Deterministic ranking: priority, then pattern-learned first, then target
fn rank(candidates: &[ScoredCandidate]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        let (ca, cb) = (&candidates[a], &candidates[b]);
        cb.utility()
            .total_cmp(&ca.utility())
            .then_with(|| cb.is_pattern_learned().cmp(&ca.is_pattern_learned()))
            .then_with(|| ca.candidate.action.target().cmp(cb.candidate.action.target()))
            .then_with(|| ca.candidate.action.kind().cmp(&cb.candidate.action.kind()))
            .then_with(|| a.cmp(&b))
    });
    order
}

struct Search<'a> {
    candidates: &'a [ScoredCandidate],
    order: Vec<usize>,
    params: SearchParams,
    arena: Vec<Node>,
    stats: SearchStats,
    best: Option<(PathScore, Vec<usize>)>,
}

impl<'a> Search<'a> {
    fn used(&self, mut idx: usize) -> Vec<bool> {
        let mut used = vec![false; self.candidates.len()];
        loop {
            let node = &self.arena[idx];
            if let Some(c) = node.candidate {
                used[c] = true;
            }
            match node.parent {
                Some(parent) => idx = parent,
                None => return used,
            }
        }
    }

    fn path(&self, mut idx: usize) -> Vec<usize> {
        let mut path = Vec::with_capacity(self.arena[idx].depth);
        loop {
            let node = &self.arena[idx];
            if let Some(c) = node.candidate {
                path.push(c);
            }
            match node.parent {
                Some(parent) => idx = parent,
                None => break,
            }
        }
        path.reverse();
        path
    }

    fn fits_budget(&self, requests: u64, candidate: &ScoredCandidate) -> bool {
        match self.params.request_budget {
            Some(budget) => requests + candidate.requests() <= budget,
            None => true,
        }
    }

    /// Best `branching` unused candidates that are worth taking and fit the budget
    fn children(&self, node: &Node, used: &[bool]) -> Vec<usize> {
        self.order
            .iter()
            .copied()
            .filter(|&c| !used[c])
            .filter(|&c| self.candidates[c].utility() > 0.0)
            .filter(|&c| self.fits_budget(node.requests, &self.candidates[c]))
            .take(self.params.branching)
            .collect()
    }

    /// Optimistic value of any completion of `node`
    fn bound(&self, node: &Node, used: &[bool]) -> f64 {
        let remaining = self.params.lookahead.saturating_sub(node.depth);
        let mut weight = self.params.discount.powi(node.depth as i32);
        let mut bound = node.value;

        for &c in self
            .order
            .iter()
            .filter(|&&c| !used[c] && self.candidates[c].utility() > 0.0)
            .take(remaining)
        {
            bound += weight * self.candidates[c].utility();
            weight *= self.params.discount;
        }
        bound
    }

    fn consider(&mut self, idx: usize) {
        let node = self.arena[idx];
        if node.depth == 0 {
            return;
        }
        let score = PathScore {
            value: node.value,
            depth: node.depth,
            pattern_steps: node.pattern_steps,
        };
        let improves = match &self.best {
            Some((best, _)) => score.beats(best),
            None => true,
        };
        if improves {
            tracing::trace!(
                "New incumbent: value {:.2} at depth {} ({} pattern steps)",
                score.value,
                score.depth,
                score.pattern_steps
            );
            self.best = Some((score, self.path(idx)));
        }
    }

    fn can_beat_incumbent(&self, node: &Node, bound: f64) -> bool {
        let Some((best, _)) = &self.best else {
            return true;
        };
        if bound > best.value + EPSILON {
            return true;
        }
        if bound < best.value - EPSILON {
            return false;
        }
        // Equal optimistic value only wins on the tie-break
        node.depth < best.depth
    }

    /// Seeds the incumbent with the greedy path
    fn greedy(&mut self) {
        let mut used = vec![false; self.candidates.len()];
        let mut node = Node::root();
        let mut path = Vec::new();
        let mut weight = 1.0;

        while node.depth < self.params.lookahead {
            let Some(&next) = self.children(&node, &used).first() else {
                break;
            };
            let candidate = &self.candidates[next];
            used[next] = true;
            path.push(next);
            node.depth += 1;
            node.value += weight * candidate.utility();
            node.requests += candidate.requests();
            if candidate.is_pattern_learned() {
                node.pattern_steps += 1;
            }
            weight *= self.params.discount;
        }

        if !path.is_empty() {
            let score = PathScore {
                value: node.value,
                depth: node.depth,
                pattern_steps: node.pattern_steps,
            };
            self.best = Some((score, path));
        }
    }

    fn run(&mut self) {
        self.greedy();

        self.arena.push(Node::root());
        let mut stack = vec![0usize];

        while let Some(idx) = stack.pop() {
            let node = self.arena[idx];
            let used = self.used(idx);

            let children = if node.depth < self.params.lookahead {
                self.children(&node, &used)
            } else {
                Vec::new()
            };

            if children.is_empty() {
                self.consider(idx);
                continue;
            }

            let bound = self.bound(&node, &used);
            if !self.can_beat_incumbent(&node, bound) {
                self.stats.nodes_pruned += 1;
                continue;
            }

            self.stats.nodes_expanded += 1;
            let weight = self.params.discount.powi(node.depth as i32);
            let mut new_nodes = Vec::with_capacity(children.len());

            for c in children {
                if self.arena.len() >= self.params.max_nodes {
                    self.stats.truncated = true;
                    break;
                }
                let candidate = &self.candidates[c];
                self.arena.push(Node {
                    parent: Some(idx),
                    candidate: Some(c),
                    depth: node.depth + 1,
                    value: node.value + weight * candidate.utility(),
                    requests: node.requests + candidate.requests(),
                    pattern_steps: node.pattern_steps + usize::from(candidate.is_pattern_learned()),
                });
                new_nodes.push(self.arena.len() - 1);
            }

            // Best child is explored first
            stack.extend(new_nodes.into_iter().rev());

            if self.stats.truncated {
                tracing::debug!(
                    "Plan search hit the node cap ({}), keeping best path so far",
                    self.params.max_nodes
                );
                break;
            }
        }
    }
}

/// Finds the best path through the scored candidates
pub fn search(candidates: &[ScoredCandidate], params: SearchParams) -> SearchOutcome {
    if candidates.is_empty() || params.lookahead == 0 || params.branching == 0 {
        return SearchOutcome::default();
    }

    let mut search = Search {
        candidates,
        order: rank(candidates),
        params,
        arena: Vec::new(),
        stats: SearchStats::default(),
        best: None,
    };
    search.run();

    tracing::trace!(
        "Plan search: {} expanded, {} pruned, {} nodes{}",
        search.stats.nodes_expanded,
        search.stats.nodes_pruned,
        search.arena.len(),
        if search.stats.truncated { " (truncated)" } else { "" }
    );

    SearchOutcome {
        path: search.best.map(|(_, path)| path).unwrap_or_default(),
        stats: search.stats,
    }
}
