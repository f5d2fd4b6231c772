//! Stat resolution: base stats + gear/consumable contributions + buff deltas
//! folded into one immutable snapshot

use serde::{Deserialize, Serialize};

/// Read-only view of the character state that conditions are evaluated
/// against. Implemented by the engine; kept as a trait so contributions and
/// policy rules stay pure.
pub trait StateView {
    fn stealthed(&self) -> bool;
    fn execute_phase(&self) -> bool;
    fn buff_active(&self, id: &str) -> bool;
    /// Longest remaining duration across active instances of `id`.
    fn buff_remaining(&self, id: &str) -> Option<f64>;
    fn energy(&self) -> f64;
    fn combo_points(&self) -> u32;
}

/// Tagged predicate attached to stat contributions and priority rules.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Always,
    Stealthed,
    ExecutePhase,
    BuffActive {
        buff: String,
    },
    BuffMissing {
        buff: String,
    },
    BuffRemainingBelow {
        buff: String,
        seconds: f64,
    },
    EnergyAtLeast {
        amount: f64,
    },
    EnergyBelow {
        amount: f64,
    },
    ComboPointsAtLeast {
        count: u32,
    },
    All {
        conditions: Vec<Condition>,
    },
}

impl Condition {
    pub fn holds(&self, view: &dyn StateView) -> bool {
        match self {
            Condition::Always => true,
            Condition::Stealthed => view.stealthed(),
            Condition::ExecutePhase => view.execute_phase(),
            Condition::BuffActive { buff } => view.buff_active(buff),
            Condition::BuffMissing { buff } => !view.buff_active(buff),
            Condition::BuffRemainingBelow { buff, seconds } => match view.buff_remaining(buff) {
                Some(remaining) => remaining < *seconds,
                None => true,
            },
            Condition::EnergyAtLeast { amount } => view.energy() >= *amount,
            Condition::EnergyBelow { amount } => view.energy() < *amount,
            Condition::ComboPointsAtLeast { count } => view.combo_points() >= *count,
            Condition::All { conditions } => conditions.iter().all(|c| c.holds(view)),
        }
    }
}

/// Additive stat deltas contributed by one item, consumable, talent or buff.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatDelta {
    pub attack_power: f64,
    pub crit_chance: f64,
    pub hit_chance: f64,
    pub haste: f64,
    pub armor_pen: f64,
    pub energy_regen: f64,
}

/// One named stat contribution, included only while its condition holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatContribution {
    pub source: String,
    #[serde(default)]
    pub condition: Condition,
    pub stats: StatDelta,
}

/// Base character stats before any contribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseStats {
    pub attack_power: f64,
    pub crit_chance: f64,
    pub hit_chance: f64,
    pub haste: f64,
    pub armor_pen: f64,
    /// Energy per second before haste scaling.
    pub energy_regen: f64,
}

impl Default for BaseStats {
    fn default() -> Self {
        Self {
            attack_power: 0.0,
            crit_chance: 0.0,
            hit_chance: 0.0,
            haste: 0.0,
            armor_pen: 0.0,
            energy_regen: 10.0,
        }
    }
}

/// Fully resolved stats ready for combat math. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatSnapshot {
    pub attack_power: f64,
    pub crit_chance: f64,
    pub hit_chance: f64,
    pub haste: f64,
    pub armor_pen: f64,
    /// Final energy per second, haste already applied.
    pub energy_regen: f64,
}

/// Pure fold of base stats, conditional contributions and buff-granted deltas
/// into a snapshot. Re-invoked whenever the active buff set changes.
pub fn resolve(
    base: &BaseStats,
    contributions: &[StatContribution],
    buff_deltas: &[StatDelta],
    view: &dyn StateView,
) -> StatSnapshot {
    let mut attack_power = base.attack_power;
    let mut crit_chance = base.crit_chance;
    let mut hit_chance = base.hit_chance;
    let mut haste = base.haste;
    let mut armor_pen = base.armor_pen;
    let mut regen = base.energy_regen;

    let included = contributions
        .iter()
        .filter(|c| c.condition.holds(view))
        .map(|c| &c.stats);

    for delta in included.chain(buff_deltas.iter()) {
        attack_power += delta.attack_power;
        crit_chance += delta.crit_chance;
        hit_chance += delta.hit_chance;
        haste += delta.haste;
        armor_pen += delta.armor_pen;
        regen += delta.energy_regen;
    }

    StatSnapshot {
        attack_power,
        crit_chance,
        hit_chance,
        haste,
        armor_pen,
        energy_regen: regen * (1.0 + haste),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hand-rolled view for leaf-module tests; the real one lives in the engine.
    pub(crate) struct FakeView {
        pub stealthed: bool,
        pub execute: bool,
        pub energy: f64,
        pub combo: u32,
        pub buffs: Vec<(String, f64)>,
    }

    impl Default for FakeView {
        fn default() -> Self {
            Self {
                stealthed: false,
                execute: false,
                energy: 0.0,
                combo: 0,
                buffs: Vec::new(),
            }
        }
    }

    impl StateView for FakeView {
        fn stealthed(&self) -> bool {
            self.stealthed
        }
        fn execute_phase(&self) -> bool {
            self.execute
        }
        fn buff_active(&self, id: &str) -> bool {
            self.buffs.iter().any(|(b, _)| b == id)
        }
        fn buff_remaining(&self, id: &str) -> Option<f64> {
            self.buffs.iter().find(|(b, _)| b == id).map(|(_, r)| *r)
        }
        fn energy(&self) -> f64 {
            self.energy
        }
        fn combo_points(&self) -> u32 {
            self.combo
        }
    }

    fn ap_contribution(source: &str, condition: Condition, ap: f64) -> StatContribution {
        StatContribution {
            source: source.into(),
            condition,
            stats: StatDelta {
                attack_power: ap,
                ..Default::default()
            },
        }
    }

    #[test]
    fn unconditional_contributions_always_included() {
        let base = BaseStats {
            attack_power: 100.0,
            ..Default::default()
        };
        let contribs = vec![ap_contribution("ring", Condition::Always, 40.0)];
        let snap = resolve(&base, &contribs, &[], &FakeView::default());
        assert_eq!(snap.attack_power, 140.0);
    }

    #[test]
    fn conditional_contribution_excluded_when_condition_fails() {
        let base = BaseStats {
            energy_regen: 0.0,
            ..Default::default()
        };
        let contribs = vec![ap_contribution("ambush_oil", Condition::Stealthed, 50.0)];

        let snap = resolve(&base, &contribs, &[], &FakeView::default());
        assert_eq!(snap.attack_power, 0.0);

        let stealthed = FakeView {
            stealthed: true,
            ..Default::default()
        };
        let snap = resolve(&base, &contribs, &[], &stealthed);
        assert_eq!(snap.attack_power, 50.0);
    }

    #[test]
    fn execute_phase_contribution() {
        let base = BaseStats::default();
        let contribs = vec![ap_contribution("executioner", Condition::ExecutePhase, 30.0)];
        let view = FakeView {
            execute: true,
            ..Default::default()
        };
        assert_eq!(resolve(&base, &contribs, &[], &view).attack_power, 30.0);
    }

    #[test]
    fn haste_scales_energy_regen() {
        let base = BaseStats {
            energy_regen: 10.0,
            ..Default::default()
        };
        let haste_buff = StatDelta {
            haste: 0.2,
            ..Default::default()
        };
        let snap = resolve(&base, &[], &[haste_buff], &FakeView::default());
        assert!((snap.energy_regen - 12.0).abs() < 1e-12);
    }

    #[test]
    fn buff_remaining_below_holds_when_buff_missing() {
        let cond = Condition::BuffRemainingBelow {
            buff: "blade_rush".into(),
            seconds: 3.0,
        };
        assert!(cond.holds(&FakeView::default()));

        let view = FakeView {
            buffs: vec![("blade_rush".into(), 10.0)],
            ..Default::default()
        };
        assert!(!cond.holds(&view));
    }

    #[test]
    fn all_combinator_requires_every_condition() {
        let cond = Condition::All {
            conditions: vec![
                Condition::EnergyAtLeast { amount: 30.0 },
                Condition::ComboPointsAtLeast { count: 4 },
            ],
        };
        let view = FakeView {
            energy: 50.0,
            combo: 3,
            ..Default::default()
        };
        assert!(!cond.holds(&view));
        let view = FakeView {
            energy: 50.0,
            combo: 5,
            ..Default::default()
        };
        assert!(cond.holds(&view));
    }
}
