//! Simulation configuration loaded from YAML or JSON files

use crate::ability::{AbilityDefinition, AbilityEffect};
use crate::buffs::{BuffDefinition, StackingRule};
use crate::error::{ConfigError, FieldError};
use crate::policy::PriorityRule;
use crate::stats::{BaseStats, StatContribution};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_duration() -> f64 {
    180.0
}

fn default_energy_cap() -> f64 {
    100.0
}

fn default_combo_max() -> u32 {
    5
}

fn default_gcd() -> f64 {
    1.0
}

fn default_trials() -> usize {
    1000
}

fn default_base_miss() -> f64 {
    0.08
}

fn default_dodge() -> f64 {
    0.065
}

/// The flat target abstraction: avoidance and mitigation knobs only, no
/// health model or positioning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub armor: f64,
    /// Base chance to miss before +hit from gear.
    pub miss_chance: f64,
    pub dodge_chance: f64,
    /// Zero when attacking from behind, the usual melee position.
    pub parry_chance: f64,
    /// Crit chance suppressed by target defense skill.
    pub crit_suppression: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            armor: 0.0,
            miss_chance: default_base_miss(),
            dodge_chance: default_dodge(),
            parry_chance: 0.0,
            crit_suppression: 0.0,
        }
    }
}

/// Encounter timing. The execute flag is time-based: active during the final
/// `execute_window_secs` of the fight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterConfig {
    pub duration_secs: f64,
    pub execute_window_secs: f64,
    pub target: TargetConfig,
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration(),
            execute_window_secs: 0.0,
            target: TargetConfig::default(),
        }
    }
}

/// Effect fired by a chance-on-hit proc source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcEffect {
    ApplyBuff { buff: String },
    GenerateEnergy { amount: f64 },
}

/// A passive proc source (weapon enchant, set bonus) rolled on every landed
/// hit or crit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcDefinition {
    pub id: String,
    /// Per-landed-hit trigger chance in [0, 1].
    pub chance: f64,
    pub effect: ProcEffect,
}

/// Full simulation input as supplied by the gear/config layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub encounter: EncounterConfig,
    #[serde(default)]
    pub base_stats: BaseStats,
    #[serde(default = "default_energy_cap")]
    pub energy_cap: f64,
    #[serde(default = "default_energy_cap")]
    pub starting_energy: f64,
    #[serde(default = "default_combo_max")]
    pub combo_point_max: u32,
    #[serde(default = "default_gcd")]
    pub gcd_secs: f64,
    /// Start the fight from stealth; stealth breaks on the first ability.
    #[serde(default)]
    pub start_stealthed: bool,
    /// Item, consumable and talent stat contributions, possibly conditional.
    #[serde(default)]
    pub contributions: Vec<StatContribution>,
    #[serde(default)]
    pub buffs: Vec<BuffDefinition>,
    pub abilities: Vec<AbilityDefinition>,
    #[serde(default)]
    pub procs: Vec<ProcDefinition>,
    /// User-editable ability priority, evaluated top to bottom.
    pub priority: Vec<PriorityRule>,
    #[serde(default = "default_trials")]
    pub trials: usize,
    /// Fixed master seed for reproducible runs; `None` draws from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationConfig {
    /// Load from a YAML or JSON file, decided by extension like the rest of
    /// the tooling expects.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path)?;
        let path_str = path.as_ref().to_string_lossy().to_lowercase();

        if path_str.ends_with(".json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate every field before any trial executes. All problems are
    /// collected so the caller can report them together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.encounter.duration_secs <= 0.0 {
            errors.push(FieldError::new(
                "encounter.duration_secs",
                "must be positive",
            ));
        }
        if self.encounter.execute_window_secs < 0.0 {
            errors.push(FieldError::new(
                "encounter.execute_window_secs",
                "must not be negative",
            ));
        }
        if self.encounter.duration_secs > 0.0
            && self.encounter.execute_window_secs > self.encounter.duration_secs
        {
            errors.push(FieldError::new(
                "encounter.execute_window_secs",
                "must not exceed the encounter duration",
            ));
        }
        for (name, value) in [
            ("encounter.target.miss_chance", self.encounter.target.miss_chance),
            ("encounter.target.dodge_chance", self.encounter.target.dodge_chance),
            ("encounter.target.parry_chance", self.encounter.target.parry_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(FieldError::new(name, "must be within [0, 1]"));
            }
        }
        if self.encounter.target.armor < 0.0 {
            errors.push(FieldError::new("encounter.target.armor", "must not be negative"));
        }

        if self.energy_cap <= 0.0 {
            errors.push(FieldError::new("energy_cap", "must be positive"));
        }
        if self.starting_energy < 0.0 || self.starting_energy > self.energy_cap {
            errors.push(FieldError::new(
                "starting_energy",
                "must be within [0, energy_cap]",
            ));
        }
        if self.combo_point_max == 0 {
            errors.push(FieldError::new("combo_point_max", "must be at least 1"));
        }
        if self.gcd_secs <= 0.0 {
            errors.push(FieldError::new("gcd_secs", "must be positive"));
        }
        if self.trials == 0 {
            errors.push(FieldError::new("trials", "must be at least 1"));
        }

        for buff in &self.buffs {
            let field = format!("buffs.{}", buff.id);
            if buff.duration <= 0.0 {
                errors.push(FieldError::new(&field, "duration must be positive"));
            }
            if let StackingRule::Refresh { max_stacks } = buff.stacking {
                if max_stacks == 0 {
                    errors.push(FieldError::new(&field, "max_stacks must be at least 1"));
                }
            }
        }

        for ability in &self.abilities {
            let field = format!("abilities.{}", ability.id);
            if ability.energy_cost < 0.0 {
                errors.push(FieldError::new(&field, "energy_cost must not be negative"));
            }
            if ability.cooldown < 0.0 {
                errors.push(FieldError::new(&field, "cooldown must not be negative"));
            }
            if ability.cast_time < 0.0 {
                errors.push(FieldError::new(&field, "cast_time must not be negative"));
            }
            if ability.effects.is_empty() {
                errors.push(FieldError::new(&field, "must declare at least one effect"));
            }
            // An instant, free, off-GCD, cooldown-less ability would let the
            // policy act forever at one timestamp.
            if !ability.on_gcd
                && ability.energy_cost == 0.0
                && ability.cooldown == 0.0
                && ability.cast_time == 0.0
            {
                errors.push(FieldError::new(
                    &field,
                    "off-GCD ability needs a cost, cooldown or cast time",
                ));
            }
            for effect in &ability.effects {
                match effect {
                    AbilityEffect::Damage { coefficient, crit_multiplier, .. } => {
                        if *coefficient < 0.0 {
                            errors.push(FieldError::new(&field, "damage coefficient must not be negative"));
                        }
                        if *crit_multiplier < 1.0 {
                            errors.push(FieldError::new(&field, "crit_multiplier must be at least 1"));
                        }
                    }
                    AbilityEffect::ApplyBuff { buff } => {
                        if !self.buffs.iter().any(|b| &b.id == buff) {
                            errors.push(FieldError::new(
                                &field,
                                format!("references undefined buff `{buff}`"),
                            ));
                        }
                    }
                    AbilityEffect::GenerateEnergy { amount } => {
                        if *amount <= 0.0 {
                            errors.push(FieldError::new(&field, "generated energy must be positive"));
                        }
                    }
                }
            }
        }

        for proc in &self.procs {
            let field = format!("procs.{}", proc.id);
            if !(0.0..=1.0).contains(&proc.chance) {
                errors.push(FieldError::new(&field, "chance must be within [0, 1]"));
            }
            if let ProcEffect::ApplyBuff { buff } = &proc.effect {
                if !self.buffs.iter().any(|b| &b.id == buff) {
                    errors.push(FieldError::new(
                        &field,
                        format!("references undefined buff `{buff}`"),
                    ));
                }
            }
        }

        for (i, rule) in self.priority.iter().enumerate() {
            if !self.abilities.iter().any(|a| a.id == rule.ability) {
                errors.push(FieldError::new(
                    format!("priority[{i}]"),
                    format!("references undefined ability `{}`", rule.ability),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}
