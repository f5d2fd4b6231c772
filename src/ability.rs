//! Static ability definitions and the read-only catalog

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_crit_multiplier() -> f64 {
    2.0
}

fn default_on_gcd() -> bool {
    true
}

/// A single effect produced when an ability lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbilityEffect {
    /// Direct damage: `coefficient + combo points × coefficient_per_combo +
    /// attack power × ap_scaling`, then crit and buff multipliers.
    Damage {
        coefficient: f64,
        #[serde(default)]
        ap_scaling: f64,
        #[serde(default)]
        coefficient_per_combo: f64,
        #[serde(default = "default_crit_multiplier")]
        crit_multiplier: f64,
    },
    ApplyBuff {
        buff: String,
    },
    GenerateEnergy {
        amount: f64,
    },
}

/// Immutable ability template. Shared read-only across all trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityDefinition {
    pub id: String,
    #[serde(default)]
    pub energy_cost: f64,
    /// 0 = no cooldown.
    #[serde(default)]
    pub cooldown: f64,
    /// 0 = instant.
    #[serde(default)]
    pub cast_time: f64,
    #[serde(default = "default_on_gcd")]
    pub on_gcd: bool,
    /// Combo points granted on a landed use (builders).
    #[serde(default)]
    pub combo_points_granted: u32,
    /// Finishers consume the combo pool after their effects resolve.
    #[serde(default)]
    pub finisher: bool,
    pub effects: Vec<AbilityEffect>,
}

impl AbilityDefinition {
    pub fn deals_damage(&self) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e, AbilityEffect::Damage { .. }))
    }
}

/// Read-only id → definition mapping, passed by reference into the engine.
#[derive(Debug, Clone, Default)]
pub struct AbilityCatalog {
    defs: Vec<AbilityDefinition>,
    index: HashMap<String, usize>,
}

impl AbilityCatalog {
    pub fn new(defs: Vec<AbilityDefinition>) -> Self {
        let index = defs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
        Self { defs, index }
    }

    pub fn get(&self, id: &str) -> Option<&AbilityDefinition> {
        self.index.get(id).map(|&i| &self.defs[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbilityDefinition> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup_by_id() {
        let catalog = AbilityCatalog::new(vec![AbilityDefinition {
            id: "sinister_strike".into(),
            energy_cost: 40.0,
            cooldown: 0.0,
            cast_time: 0.0,
            on_gcd: true,
            combo_points_granted: 1,
            finisher: false,
            effects: vec![AbilityEffect::Damage {
                coefficient: 68.0,
                ap_scaling: 0.15,
                coefficient_per_combo: 0.0,
                crit_multiplier: 2.0,
            }],
        }]);
        assert!(catalog.contains("sinister_strike"));
        assert!(catalog.get("eviscerate").is_none());
        assert!(catalog.get("sinister_strike").unwrap().deals_damage());
    }

    #[test]
    fn defaults_from_minimal_yaml() {
        let yaml = r#"
id: backstab
energy_cost: 60
effects:
  - kind: damage
    coefficient: 120
    ap_scaling: 0.2
"#;
        let def: AbilityDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.on_gcd);
        assert_eq!(def.cooldown, 0.0);
        assert_eq!(def.cast_time, 0.0);
        assert!(!def.finisher);
        match &def.effects[0] {
            AbilityEffect::Damage { crit_multiplier, .. } => assert_eq!(*crit_multiplier, 2.0),
            other => panic!("unexpected effect {other:?}"),
        }
    }
}
