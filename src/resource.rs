//! Energy and combo point pools

/// Raised by [`ResourcePool::spend`] when the requested amount exceeds the
/// current energy. The decision policy checks affordability before choosing an
/// ability, so the engine treats this as an internal consistency fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsufficientEnergy {
    pub needed: f64,
    pub available: f64,
}

/// Spendable energy plus the discrete combo point pool that gates finishers.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    energy: f64,
    cap: f64,
    /// Energy per second, haste already folded in by the stat resolver.
    regen_per_sec: f64,
    combo_points: u32,
    combo_max: u32,
}

impl ResourcePool {
    pub fn new(starting_energy: f64, cap: f64, regen_per_sec: f64, combo_max: u32) -> Self {
        Self {
            energy: starting_energy.clamp(0.0, cap),
            cap,
            regen_per_sec,
            combo_points: 0,
            combo_max,
        }
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn cap(&self) -> f64 {
        self.cap
    }

    pub fn combo_points(&self) -> u32 {
        self.combo_points
    }

    pub fn regen_per_sec(&self) -> f64 {
        self.regen_per_sec
    }

    /// Called whenever the stat snapshot changes (haste affects regen).
    pub fn set_regen_rate(&mut self, regen_per_sec: f64) {
        self.regen_per_sec = regen_per_sec.max(0.0);
    }

    /// Time-proportional regeneration, capped at the pool maximum.
    pub fn regenerate(&mut self, elapsed: f64) {
        if elapsed > 0.0 {
            self.energy = (self.energy + self.regen_per_sec * elapsed).min(self.cap);
        }
    }

    pub fn spend(&mut self, amount: f64) -> Result<(), InsufficientEnergy> {
        // Tolerance for regen amounts computed from float wake-up times.
        if amount > self.energy + 1e-9 {
            return Err(InsufficientEnergy {
                needed: amount,
                available: self.energy,
            });
        }
        self.energy = (self.energy - amount).max(0.0);
        Ok(())
    }

    /// Flat energy gain from abilities or procs, capped at the maximum.
    pub fn generate(&mut self, amount: f64) {
        self.energy = (self.energy + amount).min(self.cap).max(0.0);
    }

    pub fn add_combo_points(&mut self, count: u32) {
        self.combo_points = (self.combo_points + count).min(self.combo_max);
    }

    /// Finishers consume the whole combo pool.
    pub fn reset_combo_points(&mut self) {
        self.combo_points = 0;
    }

    /// Seconds until the pool reaches `target` at the current regen rate.
    /// `None` when already there or when regen is stalled.
    pub fn time_until(&self, target: f64) -> Option<f64> {
        if self.energy >= target {
            return None;
        }
        if self.regen_per_sec <= 0.0 {
            return None;
        }
        Some((target.min(self.cap) - self.energy) / self.regen_per_sec)
    }
}
