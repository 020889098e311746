//! Requirements: conditions on upstream filter outcomes

use crate::id::ComponentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// "Filter `filter` produced outcome `category`"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Outcome {
    pub filter: ComponentId,
    pub category: String,
}

impl Outcome {
    pub fn new(filter: ComponentId, category: impl Into<String>) -> Self {
        Self {
            filter,
            category: category.into(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.filter, self.category)
    }
}

/// Condition a stage's participation is tied to
///
/// The absence of a requirement (`Option::None` wherever one is stored)
/// means the stage always applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// A single outcome
    Outcome(Outcome),

    /// Every listed outcome (logical AND)
    All { outcomes: Vec<Outcome> },
}

impl Requirement {
    pub fn outcome(filter: ComponentId, category: impl Into<String>) -> Self {
        Self::Outcome(Outcome::new(filter, category))
    }

    /// Compound requirement; a single atom collapses to `Outcome`
    pub fn all(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let mut outcomes: Vec<Outcome> = outcomes.into_iter().collect();
        if outcomes.len() == 1 {
            return Self::Outcome(outcomes.remove(0));
        }
        Self::All { outcomes }
    }

    /// Every outcome atom
    pub fn outcomes(&self) -> Vec<&Outcome> {
        match self {
            Self::Outcome(outcome) => vec![outcome],
            Self::All { outcomes } => outcomes.iter().collect(),
        }
    }

    /// Filters this requirement depends on, in declaration order without duplicates
    pub fn filters(&self) -> Vec<ComponentId> {
        let mut filters = Vec::new();
        for outcome in self.outcomes() {
            if !filters.contains(&outcome.filter) {
                filters.push(outcome.filter);
            }
        }
        filters
    }

    /// Whether any atom refers to an outcome of `filter`
    pub fn references(&self, filter: ComponentId) -> bool {
        self.outcomes().iter().any(|o| o.filter == filter)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outcome(outcome) => write!(f, "{}", outcome),
            Self::All { outcomes } => {
                let parts: Vec<String> = outcomes.iter().map(|o| o.to_string()).collect();
                write!(f, "{}", parts.join(" AND "))
            }
        }
    }
}
