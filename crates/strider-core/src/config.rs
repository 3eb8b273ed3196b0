//! Load-time configuration for the control core.
//!
//! Everything here is injected at startup and immutable for the process
//! lifetime: robot geometry, the gait pattern table, controller gains, QP
//! bounds and estimator covariances. Invalid values are rejected by
//! [`StriderConfig::validate`] before the core ever ticks.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{LegId, LEG_COUNT};

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_dt() -> f64 {
    0.002
}
const fn default_max_stale_ticks() -> u32 {
    25
}
const fn default_max_tilt() -> f64 {
    0.6
}
const fn default_max_velocity() -> f64 {
    4.0
}
const fn default_max_consecutive_failures() -> u32 {
    50
}
const fn default_stand_seconds() -> f64 {
    1.2
}
const fn default_joint_kp() -> f64 {
    180.0
}
const fn default_joint_kd() -> f64 {
    8.0
}
const fn default_passive_kd() -> f64 {
    6.0
}
const fn default_stance_kd() -> f64 {
    0.8
}
const fn default_swing_joint_kp() -> f64 {
    15.0
}
const fn default_swing_joint_kd() -> f64 {
    1.2
}

const fn default_mass() -> f64 {
    12.0
}
const fn default_inertia() -> [f64; 3] {
    [0.13, 0.25, 0.28]
}
const fn default_body_half_length() -> f64 {
    0.19
}
const fn default_body_half_width() -> f64 {
    0.05
}
const fn default_abduction_offset() -> f64 {
    0.08
}
const fn default_thigh_length() -> f64 {
    0.21
}
const fn default_calf_length() -> f64 {
    0.21
}
const fn default_stand_height() -> f64 {
    0.31
}
const fn default_max_reach() -> f64 {
    0.18
}

const fn default_trot() -> PatternParams {
    PatternParams {
        period: 0.5,
        duty_ratio: 0.5,
        offsets: [0.0, 0.5, 0.5, 0.0],
    }
}
const fn default_walk() -> PatternParams {
    PatternParams {
        period: 0.9,
        duty_ratio: 0.75,
        offsets: [0.0, 0.5, 0.75, 0.25],
    }
}
const fn default_step_height() -> f64 {
    0.06
}
const fn default_placement_gain() -> f64 {
    0.5
}
const fn default_true() -> bool {
    true
}
const fn default_swing_kp() -> [f64; 3] {
    [220.0, 220.0, 220.0]
}
const fn default_swing_kd() -> [f64; 3] {
    [12.0, 12.0, 12.0]
}

const fn default_kp_position() -> [f64; 3] {
    [60.0, 60.0, 90.0]
}
const fn default_kd_position() -> [f64; 3] {
    [10.0, 10.0, 14.0]
}
const fn default_kp_orientation() -> [f64; 3] {
    [140.0, 140.0, 90.0]
}
const fn default_kd_orientation() -> [f64; 3] {
    [6.0, 6.0, 6.0]
}
const fn default_wrench_weights() -> [f64; 6] {
    [1.0, 1.0, 5.0, 10.0, 10.0, 4.0]
}
const fn default_force_weight() -> f64 {
    1e-4
}
const fn default_smoothness_weight() -> f64 {
    1e-3
}
const fn default_friction_coeff() -> f64 {
    0.45
}
const fn default_min_normal_force() -> f64 {
    5.0
}
const fn default_max_normal_force() -> f64 {
    160.0
}
const fn default_max_iterations() -> u32 {
    60
}

const fn default_process_noise_position() -> f64 {
    2e-4
}
const fn default_process_noise_velocity() -> f64 {
    1e-2
}
const fn default_measurement_noise_position() -> f64 {
    1e-3
}
const fn default_measurement_noise_velocity() -> f64 {
    0.1
}
const fn default_initial_covariance() -> f64 {
    1.0
}
const fn default_max_covariance_trace() -> f64 {
    1e4
}
const fn default_gravity() -> f64 {
    9.81
}

// ---------------------------------------------------------------------------
// ControlConfig
// ---------------------------------------------------------------------------

/// Loop timing, servo gains and safety bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Control tick period in seconds (default 0.002 = 500 Hz).
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Consecutive ticks the loop tolerates without a fresh sensor sample
    /// before escalating to the safety path.
    #[serde(default = "default_max_stale_ticks")]
    pub max_stale_ticks: u32,

    /// Combined roll/pitch magnitude (rad) above which the safety monitor
    /// forces Passive.
    #[serde(default = "default_max_tilt")]
    pub max_tilt: f64,

    /// Estimated body speed (m/s) above which the velocity estimate is
    /// considered divergent.
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,

    /// Consecutive degraded balance solves before a forced Passive
    /// transition.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Duration of the fixed-stand joint interpolation, seconds.
    #[serde(default = "default_stand_seconds")]
    pub stand_seconds: f64,

    /// Joint-space proportional gain for position-servo modes, Nm/rad.
    #[serde(default = "default_joint_kp")]
    pub joint_kp: f64,

    /// Joint-space derivative gain for position-servo modes, Nm·s/rad.
    #[serde(default = "default_joint_kd")]
    pub joint_kd: f64,

    /// Damping gain applied in Passive mode, Nm·s/rad.
    #[serde(default = "default_passive_kd")]
    pub passive_kd: f64,

    /// Joint damping added alongside stance feed-forward torques.
    #[serde(default = "default_stance_kd")]
    pub stance_kd: f64,

    /// Joint servo proportional gain backing up the Cartesian swing
    /// tracking, Nm/rad. Small: the Cartesian PD does the work.
    #[serde(default = "default_swing_joint_kp")]
    pub swing_joint_kp: f64,

    /// Joint servo derivative gain for swing legs, Nm·s/rad.
    #[serde(default = "default_swing_joint_kd")]
    pub swing_joint_kd: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            max_stale_ticks: default_max_stale_ticks(),
            max_tilt: default_max_tilt(),
            max_velocity: default_max_velocity(),
            max_consecutive_failures: default_max_consecutive_failures(),
            stand_seconds: default_stand_seconds(),
            joint_kp: default_joint_kp(),
            joint_kd: default_joint_kd(),
            passive_kd: default_passive_kd(),
            stance_kd: default_stance_kd(),
            swing_joint_kp: default_swing_joint_kp(),
            swing_joint_kd: default_swing_joint_kd(),
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dt <= 0.0 || !self.dt.is_finite() {
            return Err(ConfigError::InvalidDt(self.dt));
        }
        if self.stand_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "stand_seconds",
                message: "must be > 0".into(),
            });
        }
        if self.max_tilt <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "max_tilt",
                message: "must be > 0".into(),
            });
        }
        if self.joint_kp < 0.0 || self.joint_kd < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "joint_kp/joint_kd",
                message: "gains must be non-negative".into(),
            });
        }
        Ok(())
    }

    /// Fixed-stand interpolation length in ticks (at least one).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn stand_ticks(&self) -> u64 {
        ((self.stand_seconds / self.dt).round() as u64).max(1)
    }
}

// ---------------------------------------------------------------------------
// RobotConfig
// ---------------------------------------------------------------------------

/// Robot geometry and inertial parameters.
///
/// The leg model is a 3-DoF chain: abduction about x, then hip and knee
/// about y, with the abduction link offset laterally and thigh/calf
/// extending downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Total mass, kg.
    #[serde(default = "default_mass")]
    pub mass: f64,

    /// Diagonal body inertia about the center of mass, kg·m².
    #[serde(default = "default_inertia")]
    pub inertia: [f64; 3],

    /// Hip pivot x offset from body center, m.
    #[serde(default = "default_body_half_length")]
    pub body_half_length: f64,

    /// Hip pivot y offset from body center, m.
    #[serde(default = "default_body_half_width")]
    pub body_half_width: f64,

    /// Abduction link length (lateral hip offset), m.
    #[serde(default = "default_abduction_offset")]
    pub abduction_offset: f64,

    /// Thigh link length, m.
    #[serde(default = "default_thigh_length")]
    pub thigh_length: f64,

    /// Calf link length, m.
    #[serde(default = "default_calf_length")]
    pub calf_length: f64,

    /// Nominal standing body height above ground, m.
    #[serde(default = "default_stand_height")]
    pub stand_height: f64,

    /// Maximum horizontal foot-placement radius from the hip, m.
    #[serde(default = "default_max_reach")]
    pub max_reach: f64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            mass: default_mass(),
            inertia: default_inertia(),
            body_half_length: default_body_half_length(),
            body_half_width: default_body_half_width(),
            abduction_offset: default_abduction_offset(),
            thigh_length: default_thigh_length(),
            calf_length: default_calf_length(),
            stand_height: default_stand_height(),
            max_reach: default_max_reach(),
        }
    }
}

impl RobotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mass <= 0.0 {
            return Err(ConfigError::DegenerateGeometry("non-positive mass".into()));
        }
        if self.inertia.iter().any(|&i| i <= 0.0) {
            return Err(ConfigError::DegenerateGeometry(
                "non-positive inertia component".into(),
            ));
        }
        if self.thigh_length <= 0.0 || self.calf_length <= 0.0 || self.abduction_offset < 0.0 {
            return Err(ConfigError::DegenerateGeometry(
                "non-positive leg link length".into(),
            ));
        }
        if self.body_half_length <= 0.0 || self.body_half_width <= 0.0 {
            return Err(ConfigError::DegenerateGeometry(
                "non-positive body dimension".into(),
            ));
        }
        let max_leg = self.thigh_length + self.calf_length;
        if self.stand_height <= 0.0 || self.stand_height >= max_leg {
            return Err(ConfigError::DegenerateGeometry(format!(
                "stand height {} outside reachable range (0, {max_leg})",
                self.stand_height
            )));
        }
        if self.max_reach <= 0.0 {
            return Err(ConfigError::DegenerateGeometry(
                "non-positive max reach".into(),
            ));
        }
        Ok(())
    }

    /// Hip pivot position in the body frame.
    #[must_use]
    pub fn hip_position(&self, leg: LegId) -> Vector3<f64> {
        Vector3::new(
            leg.fore_sign() * self.body_half_length,
            leg.side_sign() * self.body_half_width,
            0.0,
        )
    }

    /// Nominal stance foot position in the body frame: laterally offset by
    /// the abduction link, directly below the hip at stand height.
    #[must_use]
    pub fn nominal_foot_position(&self, leg: LegId) -> Vector3<f64> {
        let hip = self.hip_position(leg);
        Vector3::new(
            hip.x,
            hip.y + leg.side_sign() * self.abduction_offset,
            -self.stand_height,
        )
    }

    /// Diagonal inertia tensor.
    #[must_use]
    pub fn inertia_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::new(
            self.inertia[0],
            self.inertia[1],
            self.inertia[2],
        ))
    }
}

// ---------------------------------------------------------------------------
// GaitConfig
// ---------------------------------------------------------------------------

/// Timing table for one periodic gait pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternParams {
    /// Full cycle period, seconds.
    pub period: f64,
    /// Fraction of the cycle each leg spends in stance, `(0, 1]`.
    pub duty_ratio: f64,
    /// Per-leg phase offsets in `[0, 1)`, indexed by [`LegId`].
    pub offsets: [f64; LEG_COUNT],
}

impl PatternParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period <= 0.0 || !self.period.is_finite() {
            return Err(ConfigError::InvalidPeriod(self.period));
        }
        if self.duty_ratio <= 0.0 || self.duty_ratio > 1.0 {
            return Err(ConfigError::InvalidDutyRatio(self.duty_ratio));
        }
        for (leg, &offset) in self.offsets.iter().enumerate() {
            if !(0.0..1.0).contains(&offset) {
                return Err(ConfigError::InvalidPhaseOffset { leg, offset });
            }
        }
        Ok(())
    }

    /// Stance segment duration, seconds.
    #[must_use]
    pub fn stance_duration(&self) -> f64 {
        self.duty_ratio * self.period
    }

    /// Swing segment duration, seconds.
    #[must_use]
    pub fn swing_duration(&self) -> f64 {
        (1.0 - self.duty_ratio) * self.period
    }
}

/// Gait pattern table and swing-trajectory parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaitConfig {
    /// Trot timing: diagonal pairs half a cycle apart.
    #[serde(default = "default_trot")]
    pub trot: PatternParams,

    /// Walk timing: one foot in swing at a time.
    #[serde(default = "default_walk")]
    pub walk: PatternParams,

    /// Peak swing-foot clearance above the ground, m.
    #[serde(default = "default_step_height")]
    pub step_height: f64,

    /// Feedback gain on body-velocity error in the touchdown heuristic.
    /// With `capture_point_scaling` set this is multiplied by
    /// sqrt(height / g); otherwise it is used as a plain constant.
    #[serde(default = "default_placement_gain")]
    pub placement_gain: f64,

    /// Scale the feedback gain by the inverted-pendulum capture-point
    /// factor sqrt(height / g).
    #[serde(default = "default_true")]
    pub capture_point_scaling: bool,

    /// Cartesian proportional gains for swing-foot tracking, N/m.
    #[serde(default = "default_swing_kp")]
    pub swing_kp: [f64; 3],

    /// Cartesian derivative gains for swing-foot tracking, N·s/m.
    #[serde(default = "default_swing_kd")]
    pub swing_kd: [f64; 3],
}

impl Default for GaitConfig {
    fn default() -> Self {
        Self {
            trot: default_trot(),
            walk: default_walk(),
            step_height: default_step_height(),
            placement_gain: default_placement_gain(),
            capture_point_scaling: default_true(),
            swing_kp: default_swing_kp(),
            swing_kd: default_swing_kd(),
        }
    }
}

impl GaitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trot.validate()?;
        self.walk.validate()?;
        if self.step_height <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "step_height",
                message: "must be > 0".into(),
            });
        }
        if self.placement_gain < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "placement_gain",
                message: "must be non-negative".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BalanceConfig
// ---------------------------------------------------------------------------

/// Wrench PD gains and contact-force QP parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceConfig {
    /// Proportional gains on body position error, per axis (1/s²).
    #[serde(default = "default_kp_position")]
    pub kp_position: [f64; 3],

    /// Derivative gains on body velocity error, per axis (1/s).
    #[serde(default = "default_kd_position")]
    pub kd_position: [f64; 3],

    /// Proportional gains on body orientation error, per axis.
    #[serde(default = "default_kp_orientation")]
    pub kp_orientation: [f64; 3],

    /// Derivative gains on body angular-velocity error, per axis.
    #[serde(default = "default_kd_orientation")]
    pub kd_orientation: [f64; 3],

    /// Diagonal weights on the six wrench-tracking residuals.
    #[serde(default = "default_wrench_weights")]
    pub wrench_weights: [f64; 6],

    /// Absolute force magnitude regularization weight.
    #[serde(default = "default_force_weight")]
    pub force_weight: f64,

    /// Tick-to-tick force smoothness regularization weight.
    #[serde(default = "default_smoothness_weight")]
    pub smoothness_weight: f64,

    /// Coulomb friction coefficient of the ground contact.
    #[serde(default = "default_friction_coeff")]
    pub friction_coeff: f64,

    /// Normal-force floor per stance leg, N. Non-zero to avoid unloading
    /// and slipping chatter.
    #[serde(default = "default_min_normal_force")]
    pub min_normal_force: f64,

    /// Normal-force ceiling per stance leg, N.
    #[serde(default = "default_max_normal_force")]
    pub max_normal_force: f64,

    /// QP iteration bound; the solve reports infeasible rather than
    /// overrunning the loop deadline.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            kp_position: default_kp_position(),
            kd_position: default_kd_position(),
            kp_orientation: default_kp_orientation(),
            kd_orientation: default_kd_orientation(),
            wrench_weights: default_wrench_weights(),
            force_weight: default_force_weight(),
            smoothness_weight: default_smoothness_weight(),
            friction_coeff: default_friction_coeff(),
            min_normal_force: default_min_normal_force(),
            max_normal_force: default_max_normal_force(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl BalanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.friction_coeff <= 0.0 {
            return Err(ConfigError::InvalidFriction(self.friction_coeff));
        }
        if self.min_normal_force <= 0.0 || self.min_normal_force >= self.max_normal_force {
            return Err(ConfigError::InvalidForceBounds {
                min: self.min_normal_force,
                max: self.max_normal_force,
            });
        }
        if self.force_weight < 0.0 || self.smoothness_weight < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "force_weight/smoothness_weight",
                message: "must be non-negative".into(),
            });
        }
        if self.wrench_weights.iter().any(|&w| w < 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "wrench_weights",
                message: "must be non-negative".into(),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_iterations",
                message: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EstimatorConfig
// ---------------------------------------------------------------------------

/// Process/measurement noise and conditioning bounds for the body-state
/// Kalman filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Position process noise density.
    #[serde(default = "default_process_noise_position")]
    pub process_noise_position: f64,

    /// Velocity process noise density.
    #[serde(default = "default_process_noise_velocity")]
    pub process_noise_velocity: f64,

    /// Stance-foot position measurement noise.
    #[serde(default = "default_measurement_noise_position")]
    pub measurement_noise_position: f64,

    /// Stance-foot velocity measurement noise.
    #[serde(default = "default_measurement_noise_velocity")]
    pub measurement_noise_velocity: f64,

    /// Initial (and reset) covariance diagonal.
    #[serde(default = "default_initial_covariance")]
    pub initial_covariance: f64,

    /// Covariance trace above which the filter resets itself.
    #[serde(default = "default_max_covariance_trace")]
    pub max_covariance_trace: f64,

    /// Gravitational acceleration magnitude, m/s².
    #[serde(default = "default_gravity")]
    pub gravity: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            process_noise_position: default_process_noise_position(),
            process_noise_velocity: default_process_noise_velocity(),
            measurement_noise_position: default_measurement_noise_position(),
            measurement_noise_velocity: default_measurement_noise_velocity(),
            initial_covariance: default_initial_covariance(),
            max_covariance_trace: default_max_covariance_trace(),
            gravity: default_gravity(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, f64); 6] = [
            ("process_noise_position", self.process_noise_position),
            ("process_noise_velocity", self.process_noise_velocity),
            ("measurement_noise_position", self.measurement_noise_position),
            ("measurement_noise_velocity", self.measurement_noise_velocity),
            ("initial_covariance", self.initial_covariance),
            ("max_covariance_trace", self.max_covariance_trace),
        ];
        for (name, value) in checks {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::InvalidNoise { name, value });
            }
        }
        if self.gravity <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "gravity",
                message: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StriderConfig
// ---------------------------------------------------------------------------

/// Complete core configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StriderConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub gait: GaitConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
}

impl StriderConfig {
    /// Validate every section. The core must not start on `Err`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control.validate()?;
        self.robot.validate()?;
        self.gait.validate()?;
        self.balance.validate()?;
        self.estimator.validate()?;
        Ok(())
    }

    /// Load from a TOML file and validate.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StriderConfig::default().validate().is_ok());
    }

    #[test]
    fn control_rejects_non_positive_dt() {
        let cfg = ControlConfig {
            dt: 0.0,
            ..ControlConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidDt(_))));
    }

    #[test]
    fn control_stand_ticks_rounds() {
        let cfg = ControlConfig {
            dt: 0.002,
            stand_seconds: 1.0,
            ..ControlConfig::default()
        };
        assert_eq!(cfg.stand_ticks(), 500);
    }

    #[test]
    fn pattern_rejects_bad_period() {
        let params = PatternParams {
            period: -0.5,
            ..default_trot()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn pattern_rejects_bad_duty() {
        for duty in [0.0, -0.1, 1.01] {
            let params = PatternParams {
                duty_ratio: duty,
                ..default_trot()
            };
            assert!(matches!(
                params.validate(),
                Err(ConfigError::InvalidDutyRatio(_))
            ));
        }
    }

    #[test]
    fn pattern_rejects_offset_out_of_range() {
        let params = PatternParams {
            offsets: [0.0, 0.5, 1.0, 0.0],
            ..default_trot()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidPhaseOffset { leg: 2, .. })
        ));
    }

    #[test]
    fn pattern_segment_durations() {
        let trot = default_trot();
        assert!((trot.stance_duration() - 0.25).abs() < 1e-12);
        assert!((trot.swing_duration() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn robot_rejects_unreachable_stand_height() {
        let cfg = RobotConfig {
            stand_height: 0.45,
            thigh_length: 0.21,
            calf_length: 0.21,
            ..RobotConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn robot_hip_positions_mirrored() {
        let cfg = RobotConfig::default();
        let fr = cfg.hip_position(LegId::FrontRight);
        let fl = cfg.hip_position(LegId::FrontLeft);
        let rr = cfg.hip_position(LegId::RearRight);
        assert!((fr.x - fl.x).abs() < 1e-12);
        assert!((fr.y + fl.y).abs() < 1e-12);
        assert!((fr.x + rr.x).abs() < 1e-12);
    }

    #[test]
    fn robot_nominal_feet_below_hips() {
        let cfg = RobotConfig::default();
        for leg in LegId::ALL {
            let foot = cfg.nominal_foot_position(leg);
            let hip = cfg.hip_position(leg);
            assert!((foot.x - hip.x).abs() < 1e-12);
            assert!((foot.z + cfg.stand_height).abs() < 1e-12);
            assert!(foot.y.abs() > hip.y.abs());
        }
    }

    #[test]
    fn balance_rejects_zero_min_force() {
        let cfg = BalanceConfig {
            min_normal_force: 0.0,
            ..BalanceConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidForceBounds { .. })
        ));
    }

    #[test]
    fn balance_rejects_inverted_bounds() {
        let cfg = BalanceConfig {
            min_normal_force: 200.0,
            max_normal_force: 100.0,
            ..BalanceConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidForceBounds { .. })
        ));
    }

    #[test]
    fn estimator_rejects_non_positive_noise() {
        let cfg = EstimatorConfig {
            measurement_noise_position: 0.0,
            ..EstimatorConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidNoise {
                name: "measurement_noise_position",
                ..
            })
        ));
    }

    #[test]
    fn toml_roundtrip_with_overrides() {
        let toml_str = r"
            [control]
            dt = 0.004
            max_stale_ticks = 10

            [robot]
            mass = 9.5
            stand_height = 0.28

            [gait.trot]
            period = 0.4
            duty_ratio = 0.5
            offsets = [0.0, 0.5, 0.5, 0.0]

            [balance]
            friction_coeff = 0.6

            [estimator]
            gravity = 9.8
        ";
        let cfg: StriderConfig = toml::from_str(toml_str).unwrap();
        assert!((cfg.control.dt - 0.004).abs() < f64::EPSILON);
        assert_eq!(cfg.control.max_stale_ticks, 10);
        assert!((cfg.robot.mass - 9.5).abs() < f64::EPSILON);
        assert!((cfg.gait.trot.period - 0.4).abs() < f64::EPSILON);
        assert!((cfg.balance.friction_coeff - 0.6).abs() < f64::EPSILON);
        assert!((cfg.estimator.gravity - 9.8).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_empty_uses_defaults() {
        let cfg: StriderConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, StriderConfig::default());
    }

    #[test]
    fn from_file_rejects_invalid() {
        let dir = std::env::temp_dir().join("strider_test_config_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(
            &path,
            r"
            [gait.trot]
            period = -1.0
            duty_ratio = 0.5
            offsets = [0.0, 0.5, 0.5, 0.0]
        ",
        )
        .unwrap();

        assert!(StriderConfig::from_file(&path).is_err());

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn from_file_not_found() {
        assert!(StriderConfig::from_file("/nonexistent/strider.toml").is_err());
    }
}
