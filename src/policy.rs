//! Priority-list decision policy

use crate::stats::{Condition, StateView};
use serde::{Deserialize, Serialize};

/// One user-editable priority entry: use `ability` when `condition` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityRule {
    pub ability: String,
    #[serde(default)]
    pub condition: Condition,
}

/// Outcome of a decision point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Cast(String),
    /// No rule matched a usable ability. Not an error: the engine advances
    /// time to the next state-changing instant instead of busy-polling.
    Wait,
}

/// Ordered rule list evaluated top to bottom at each decision point.
#[derive(Debug, Clone, Default)]
pub struct DecisionPolicy {
    rules: Vec<PriorityRule>,
}

impl DecisionPolicy {
    pub fn new(rules: Vec<PriorityRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PriorityRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose condition holds and whose ability `usable` accepts
    /// (affordable, off cooldown, not casting) wins.
    pub fn decide<F>(&self, view: &dyn StateView, mut usable: F) -> Decision
    where
        F: FnMut(&str) -> bool,
    {
        for rule in &self.rules {
            if rule.condition.holds(view) && usable(&rule.ability) {
                return Decision::Cast(rule.ability.clone());
            }
        }
        Decision::Wait
    }
}
