//! Trial orchestration and statistical aggregation

use crate::ability::AbilityCatalog;
use crate::buffs::BuffCatalog;
use crate::config::SimulationConfig;
use crate::engine::{AttackOutcome, DamageRecord, SimulationEngine, TrialResult};
use crate::error::{ConfigError, SimError};
use crate::policy::DecisionPolicy;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// splitmix64 finalizer, used to derive well-spread per-trial seeds from a
/// master seed plus trial index.
fn mix_seed(master: u64, index: u64) -> u64 {
    let mut z = master.wrapping_add(index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Validated configuration plus the read-only catalogs shared by every trial.
pub struct SimSetup {
    pub config: SimulationConfig,
    abilities: AbilityCatalog,
    buffs: BuffCatalog,
    policy: DecisionPolicy,
}

impl SimSetup {
    /// Validates the configuration up front; no trial runs on bad input.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let abilities = AbilityCatalog::new(config.abilities.clone());
        let buffs = BuffCatalog::new(config.buffs.clone());
        let policy = DecisionPolicy::new(config.priority.clone());
        Ok(Self {
            config,
            abilities,
            buffs,
            policy,
        })
    }

    fn trial_rng(&self, index: u64) -> SmallRng {
        match self.config.seed {
            Some(master) => SmallRng::seed_from_u64(mix_seed(master, index)),
            None => SmallRng::from_entropy(),
        }
    }

    /// Run one independent trial with its own derived RNG stream.
    pub fn run_trial(&self, index: u64) -> Result<TrialResult, SimError> {
        let mut rng = self.trial_rng(index);
        let engine =
            SimulationEngine::new(&self.config, &self.abilities, &self.buffs, &self.policy);
        engine.run(&mut rng)
    }
}

/// Per-ability usage and damage totals across all completed trials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbilityBreakdown {
    pub casts: u64,
    pub hits: u64,
    pub crits: u64,
    pub misses: u64,
    pub dodges: u64,
    pub parries: u64,
    pub total_damage: f64,
    /// Fraction of all damage dealt by this ability.
    pub damage_share: f64,
}

/// Immutable result summary handed to the reporting layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimSummary {
    pub trials_requested: usize,
    pub trials_completed: usize,
    pub trials_failed: usize,
    pub cancelled: bool,
    pub encounter_duration: f64,
    pub mean_dps: f64,
    pub std_dev_dps: f64,
    /// Standard error of the mean; shrinks as trial count grows.
    pub std_error_dps: f64,
    pub min_dps: f64,
    pub max_dps: f64,
    pub mean_total_damage: f64,
    pub breakdown: BTreeMap<String, AbilityBreakdown>,
    /// Full damage log of one representative (first completed) trial.
    pub timeline: Vec<DamageRecord>,
    /// Diagnostics for trials excluded from aggregation.
    pub failures: Vec<String>,
}

impl SimSummary {
    pub fn from_results(
        duration: f64,
        requested: usize,
        results: &[Result<TrialResult, SimError>],
        cancelled: bool,
    ) -> Self {
        let completed: Vec<&TrialResult> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        let failures: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().err().map(|e| e.to_string()))
            .collect();
        for failure in &failures {
            warn!(%failure, "trial excluded from aggregation");
        }

        if completed.is_empty() {
            return Self {
                trials_requested: requested,
                trials_failed: failures.len(),
                cancelled,
                encounter_duration: duration,
                failures,
                ..Default::default()
            };
        }

        let n = completed.len() as f64;
        let dps: Vec<f64> = completed.iter().map(|t| t.dps()).collect();
        let mean_dps = dps.iter().sum::<f64>() / n;
        let variance = dps.iter().map(|d| (d - mean_dps).powi(2)).sum::<f64>() / n;
        let std_dev_dps = variance.sqrt();

        let mut breakdown: BTreeMap<String, AbilityBreakdown> = BTreeMap::new();
        let mut all_damage = 0.0;
        for trial in &completed {
            for (ability, count) in &trial.casts {
                breakdown.entry(ability.clone()).or_default().casts += count;
            }
            for record in &trial.records {
                let entry = breakdown.entry(record.ability.clone()).or_default();
                match record.outcome {
                    AttackOutcome::Hit => entry.hits += 1,
                    AttackOutcome::Crit => entry.crits += 1,
                    AttackOutcome::Miss => entry.misses += 1,
                    AttackOutcome::Dodge => entry.dodges += 1,
                    AttackOutcome::Parry => entry.parries += 1,
                }
                entry.total_damage += record.amount;
                all_damage += record.amount;
            }
        }
        if all_damage > 0.0 {
            for entry in breakdown.values_mut() {
                entry.damage_share = entry.total_damage / all_damage;
            }
        }

        Self {
            trials_requested: requested,
            trials_completed: completed.len(),
            trials_failed: failures.len(),
            cancelled,
            encounter_duration: duration,
            mean_dps,
            std_dev_dps,
            std_error_dps: std_dev_dps / n.sqrt(),
            min_dps: dps.iter().cloned().fold(f64::INFINITY, f64::min),
            max_dps: dps.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            mean_total_damage: completed.iter().map(|t| t.total_damage).sum::<f64>() / n,
            breakdown,
            timeline: completed[0].records.clone(),
            failures,
        }
    }
}

/// Run trials one after another, checking for cancellation between trials.
pub fn run_trials_sequential(
    setup: &SimSetup,
    count: usize,
    cancel: &AtomicBool,
) -> Vec<Result<TrialResult, SimError>> {
    let mut results = Vec::with_capacity(count);
    for i in 0..count {
        if cancel.load(Ordering::Relaxed) {
            debug!(completed = i, "cancelled between trials");
            break;
        }
        results.push(setup.run_trial(i as u64));
    }
    results
}

/// Run trials across a worker pool. Trials share only read-only setup data;
/// cancellation is honored at trial granularity.
pub fn run_trials_parallel(
    setup: &SimSetup,
    count: usize,
    cancel: &AtomicBool,
) -> Vec<Result<TrialResult, SimError>> {
    let num_threads = num_cpus::get().min(8);
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap_or_else(|_| ThreadPoolBuilder::new().build().unwrap());

    pool.install(|| {
        (0..count)
            .into_par_iter()
            .filter_map(|i| {
                if cancel.load(Ordering::Relaxed) {
                    None
                } else {
                    Some(setup.run_trial(i as u64))
                }
            })
            .collect()
    })
}

/// Validate, run every configured trial and reduce into a summary.
pub fn run_and_aggregate(
    config: SimulationConfig,
    parallel: bool,
) -> Result<SimSummary, ConfigError> {
    let setup = SimSetup::new(config)?;
    let cancel = AtomicBool::new(false);
    Ok(run_with_cancel(&setup, parallel, &cancel))
}

/// Like [`run_and_aggregate`] but with an externally owned cancel flag, for
/// callers that need start/stop control. Partial results from completed
/// trials remain valid after cancellation.
pub fn run_with_cancel(setup: &SimSetup, parallel: bool, cancel: &AtomicBool) -> SimSummary {
    let count = setup.config.trials;
    let results = if parallel {
        run_trials_parallel(setup, count, cancel)
    } else {
        run_trials_sequential(setup, count, cancel)
    };
    SimSummary::from_results(
        setup.config.encounter.duration_secs,
        count,
        &results,
        cancel.load(Ordering::Relaxed),
    )
}
