//! Periodic gait phase scheduler (wave generator).
//!
//! Maintains one normalized cycle counter in `[0, 1)` advancing by
//! `dt / period` each tick. Each leg's stance/swing status follows from its
//! fixed phase offset and the pattern's duty ratio: a leg is in stance while
//! its offset-adjusted phase lies in `[0, duty)`, in swing otherwise, with
//! the phase renormalized to `[0, 1)` inside the active segment.
//!
//! No solver and no runtime failure modes; invalid timing tables are
//! rejected when the scheduler is constructed.

use strider_core::config::{GaitConfig, PatternParams};
use strider_core::error::ConfigError;
use strider_core::types::{ContactState, LegPhase, LEG_COUNT};

// ---------------------------------------------------------------------------
// GaitPattern
// ---------------------------------------------------------------------------

/// Supported gait patterns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GaitPattern {
    /// All feet on the ground (duty ratio 1). Used while standing and by the
    /// posture/balance modes.
    #[default]
    FullStance,
    /// Diagonal pairs alternate, half a cycle apart.
    Trot,
    /// One foot in swing at a time.
    Walk,
}

impl GaitPattern {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FullStance => "full-stance",
            Self::Trot => "trot",
            Self::Walk => "walk",
        }
    }
}

// ---------------------------------------------------------------------------
// PhaseScheduler
// ---------------------------------------------------------------------------

/// Wave generator producing per-leg contact state from one cycle counter.
#[derive(Clone, Debug)]
pub struct PhaseScheduler {
    trot: PatternParams,
    walk: PatternParams,

    pattern: GaitPattern,
    params: PatternParams,
    /// Normalized cycle position in `[0, 1)`.
    cycle: f64,
    /// Bumped on every pattern switch so downstream consumers drop their
    /// per-segment memory.
    epoch: u64,
    pending: Option<GaitPattern>,
}

impl PhaseScheduler {
    /// Build a scheduler from the gait table, starting in `initial`.
    ///
    /// # Errors
    ///
    /// Rejects invalid timing tables (non-positive period, duty ratio
    /// outside `(0, 1]`, offsets outside `[0, 1)`).
    pub fn new(config: &GaitConfig, initial: GaitPattern) -> Result<Self, ConfigError> {
        config.trot.validate()?;
        config.walk.validate()?;
        let mut scheduler = Self {
            trot: config.trot,
            walk: config.walk,
            pattern: initial,
            params: full_stance_params(&config.trot),
            cycle: 0.0,
            epoch: 0,
            pending: None,
        };
        scheduler.params = scheduler.params_for(initial);
        Ok(scheduler)
    }

    /// The active pattern.
    #[must_use]
    pub const fn pattern(&self) -> GaitPattern {
        self.pattern
    }

    /// Normalized cycle position in `[0, 1)`.
    #[must_use]
    pub const fn cycle(&self) -> f64 {
        self.cycle
    }

    /// Epoch counter, bumped on every pattern switch.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Timing of the active pattern.
    #[must_use]
    pub const fn params(&self) -> &PatternParams {
        &self.params
    }

    /// Request a pattern switch. Applied atomically at the next
    /// [`advance`](Self::advance): the cycle restarts from zero rather than
    /// re-interpreting mid-cycle phases under the new table, and the epoch
    /// bump tells the planner to re-anchor any interrupted swing.
    pub fn request_pattern(&mut self, pattern: GaitPattern) {
        if pattern != self.pattern {
            self.pending = Some(pattern);
        } else {
            self.pending = None;
        }
    }

    /// Restart the cycle from zero without changing the pattern.
    pub fn reset(&mut self) {
        self.cycle = 0.0;
        self.epoch += 1;
    }

    /// Advance the cycle by `dt` seconds and emit the contact state.
    pub fn advance(&mut self, dt: f64) -> ContactState {
        if let Some(pattern) = self.pending.take() {
            self.pattern = pattern;
            self.params = self.params_for(pattern);
            self.cycle = 0.0;
            self.epoch += 1;
        } else {
            self.cycle = (self.cycle + dt / self.params.period).rem_euclid(1.0);
        }
        self.contact_state()
    }

    /// Contact state at the current cycle position, without advancing.
    #[must_use]
    pub fn contact_state(&self) -> ContactState {
        let mut legs = [LegPhase::default(); LEG_COUNT];
        let duty = self.params.duty_ratio;

        for (i, leg) in legs.iter_mut().enumerate() {
            let raw = (self.cycle + self.params.offsets[i]).rem_euclid(1.0);
            if duty >= 1.0 || raw < duty {
                leg.stance = true;
                leg.phase = if duty >= 1.0 { raw } else { raw / duty };
            } else {
                leg.stance = false;
                leg.phase = (raw - duty) / (1.0 - duty);
            }
        }

        ContactState {
            legs,
            stance_duration: self.params.stance_duration(),
            swing_duration: self.params.swing_duration(),
            epoch: self.epoch,
        }
    }

    fn params_for(&self, pattern: GaitPattern) -> PatternParams {
        match pattern {
            GaitPattern::FullStance => full_stance_params(&self.trot),
            GaitPattern::Trot => self.trot,
            GaitPattern::Walk => self.walk,
        }
    }
}

/// Full-stance timing: duty ratio 1, everything else irrelevant. The period
/// is borrowed from the trot table so the cycle counter keeps a sane rate.
fn full_stance_params(trot: &PatternParams) -> PatternParams {
    PatternParams {
        period: trot.period,
        duty_ratio: 1.0,
        offsets: [0.0; LEG_COUNT],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
