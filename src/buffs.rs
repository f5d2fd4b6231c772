//! Timed buff/debuff tracking with per-definition stacking rules

use crate::stats::StatDelta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_max_stacks() -> u32 {
    1
}

/// What happens when an already-active buff is applied again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum StackingRule {
    /// Reset the duration and bump the stack count up to `max_stacks`.
    Refresh {
        #[serde(default = "default_max_stacks")]
        max_stacks: u32,
    },
    /// Each application is an independent instance with its own expiry.
    StackIndependent,
}

impl Default for StackingRule {
    fn default() -> Self {
        StackingRule::Refresh { max_stacks: 1 }
    }
}

/// Immutable buff template, shared read-only across trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuffDefinition {
    pub id: String,
    pub duration: f64,
    #[serde(default)]
    pub stacking: StackingRule,
    /// Fractional damage bonus per stack. Bonuses from the same buff id are
    /// additive; bonuses from different ids multiply.
    #[serde(default)]
    pub damage_multiplier: f64,
    #[serde(default)]
    pub stats: StatDelta,
}

/// Declaration-ordered, id-indexed set of buff definitions.
#[derive(Debug, Clone, Default)]
pub struct BuffCatalog {
    defs: Vec<BuffDefinition>,
    index: HashMap<String, usize>,
}

impl BuffCatalog {
    pub fn new(defs: Vec<BuffDefinition>) -> Self {
        let index = defs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
        Self { defs, index }
    }

    pub fn get(&self, id: &str) -> Option<(usize, &BuffDefinition)> {
        self.index.get(id).map(|&i| (i, &self.defs[i]))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }
}

/// One live application of a buff.
#[derive(Debug, Clone)]
pub struct BuffInstance {
    pub id: String,
    pub decl_index: usize,
    pub remaining: f64,
    pub stacks: u32,
    pub magnitude: f64,
}

/// Active buff set for one character state. Instances are kept ordered by
/// declaration index so simultaneous expiries resolve deterministically.
#[derive(Debug, Clone, Default)]
pub struct BuffTracker {
    active: Vec<BuffInstance>,
}

impl BuffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `def` per its stacking rule. A non-stacking buff never ends up
    /// with two simultaneous instances.
    pub fn apply(&mut self, decl_index: usize, def: &BuffDefinition) {
        match def.stacking {
            StackingRule::Refresh { max_stacks } => {
                if let Some(existing) = self.active.iter_mut().find(|b| b.id == def.id) {
                    existing.remaining = def.duration;
                    existing.stacks = (existing.stacks + 1).min(max_stacks.max(1));
                    return;
                }
                self.insert(BuffInstance {
                    id: def.id.clone(),
                    decl_index,
                    remaining: def.duration,
                    stacks: 1,
                    magnitude: def.damage_multiplier,
                });
            }
            StackingRule::StackIndependent => {
                self.insert(BuffInstance {
                    id: def.id.clone(),
                    decl_index,
                    remaining: def.duration,
                    stacks: 1,
                    magnitude: def.damage_multiplier,
                });
            }
        }
    }

    fn insert(&mut self, instance: BuffInstance) {
        // Stable position by declaration index; later applications of the
        // same definition land after earlier ones.
        let pos = self
            .active
            .iter()
            .position(|b| b.decl_index > instance.decl_index)
            .unwrap_or(self.active.len());
        self.active.insert(pos, instance);
    }

    /// Advance all durations by `elapsed`, removing expired instances.
    /// Returned ids are in declaration order.
    pub fn tick(&mut self, elapsed: f64) -> Vec<String> {
        if elapsed <= 0.0 {
            return Vec::new();
        }
        let mut expired = Vec::new();
        self.active.retain_mut(|b| {
            b.remaining -= elapsed;
            if b.remaining <= 1e-9 {
                expired.push(b.id.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.iter().any(|b| b.id == id)
    }

    pub fn remaining(&self, id: &str) -> Option<f64> {
        self.active
            .iter()
            .filter(|b| b.id == id)
            .map(|b| b.remaining)
            .fold(None, |acc, r| Some(acc.map_or(r, |a: f64| a.max(r))))
    }

    /// Seconds until the next expiry, if any buff is active.
    pub fn next_expiry(&self) -> Option<f64> {
        self.active
            .iter()
            .map(|b| b.remaining)
            .fold(None, |acc, r| Some(acc.map_or(r, |a: f64| a.min(r))))
    }

    /// Combined damage multiplier: additive within a buff id, multiplicative
    /// across different ids.
    pub fn damage_multiplier(&self) -> f64 {
        let mut per_source: HashMap<&str, f64> = HashMap::new();
        for b in &self.active {
            *per_source.entry(b.id.as_str()).or_insert(0.0) += b.magnitude * b.stacks as f64;
        }
        per_source.values().fold(1.0, |acc, bonus| acc * (1.0 + bonus))
    }

    /// Stat deltas granted by active buffs, scaled by stack count.
    pub fn stat_deltas(&self, catalog: &BuffCatalog) -> Vec<StatDelta> {
        self.active
            .iter()
            .filter_map(|b| catalog.get(&b.id).map(|(_, def)| (b, def)))
            .map(|(b, def)| {
                let s = b.stacks as f64;
                StatDelta {
                    attack_power: def.stats.attack_power * s,
                    crit_chance: def.stats.crit_chance * s,
                    hit_chance: def.stats.hit_chance * s,
                    haste: def.stats.haste * s,
                    armor_pen: def.stats.armor_pen * s,
                    energy_regen: def.stats.energy_regen * s,
                }
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn stacks(&self, id: &str) -> u32 {
        self.active.iter().filter(|b| b.id == id).map(|b| b.stacks).sum()
    }
}
