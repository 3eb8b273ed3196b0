//! Body position/velocity Kalman filter.
//!
//! State is `[position, velocity]` (6 elements). Orientation is taken
//! directly from the IMU attitude — it is directly observable and drift-free
//! over the horizon that matters for balance, so filtering it would add
//! latency for nothing.
//!
//! Process model: integrate world-frame acceleration derived from the IMU
//! specific force. Measurement model: each stance foot is assumed pinned to
//! the ground at its touchdown point, so leg forward kinematics observes the
//! body position and velocity relative to that foot. Swing legs contribute
//! nothing; with zero stance legs the filter runs prediction-only.
//!
//! This is a pure computation layer: sensor samples in, a [`BodyState`] out.
//! Nothing here touches I/O, so the filter can be unit-tested tick by tick
//! with synthetic data.

use nalgebra::{Matrix6, Vector3, Vector6};

use strider_core::config::{EstimatorConfig, RobotConfig};
use strider_core::types::{BodyState, ContactState, LegId, SensorSample, LEG_COUNT};
use strider_kinematics::LegKinematics;

/// Filter health for the current tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimatorStatus {
    /// Predict + correct ran normally.
    Nominal,
    /// No stance legs this tick; correction skipped.
    PredictionOnly,
    /// Covariance conditioning degraded and was reset to the default.
    CovarianceReset,
}

/// Kalman filter fusing IMU acceleration with contact-leg kinematics.
#[derive(Clone, Debug)]
pub struct StateEstimator {
    config: EstimatorConfig,
    legs: [LegKinematics; LEG_COUNT],

    position: Vector3<f64>,
    velocity: Vector3<f64>,
    covariance: Matrix6<f64>,

    /// World-frame touchdown anchor per leg, captured on the swing-to-stance
    /// transition and held while the leg stays loaded.
    anchors: [Option<Vector3<f64>>; LEG_COUNT],
    initialized: bool,
    status: EstimatorStatus,
}

impl StateEstimator {
    #[must_use]
    pub fn new(config: EstimatorConfig, robot: &RobotConfig) -> Self {
        let legs = LegId::ALL.map(|leg| LegKinematics::new(robot, leg));
        let covariance = Matrix6::identity() * config.initial_covariance;
        Self {
            config,
            legs,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            covariance,
            anchors: [None; LEG_COUNT],
            initialized: false,
            status: EstimatorStatus::Nominal,
        }
    }

    /// Filter health from the most recent update.
    #[must_use]
    pub const fn status(&self) -> EstimatorStatus {
        self.status
    }

    /// Current state as a [`BodyState`] snapshot.
    #[must_use]
    pub fn body_state(&self, sample: &SensorSample) -> BodyState {
        BodyState {
            position: self.position,
            velocity: self.velocity,
            orientation: sample.imu.orientation,
            angular_velocity: sample.imu.angular_velocity,
        }
    }

    /// Drop all filter state. The next update re-initializes from kinematics.
    pub fn reset(&mut self) {
        self.position = Vector3::zeros();
        self.velocity = Vector3::zeros();
        self.covariance = Matrix6::identity() * self.config.initial_covariance;
        self.anchors = [None; LEG_COUNT];
        self.initialized = false;
        self.status = EstimatorStatus::Nominal;
    }

    /// Run one predict/correct cycle and return the fused body state.
    ///
    /// Must be called exactly once per control tick, before anything
    /// downstream reads the body state.
    pub fn update(
        &mut self,
        sample: &SensorSample,
        contact: &ContactState,
        dt: f64,
    ) -> BodyState {
        let rotation = sample.imu.orientation;

        if !self.initialized {
            self.initialize(sample, contact);
        }

        // --- Predict ---
        // World acceleration from the specific force; at rest this cancels
        // to zero.
        let gravity = Vector3::new(0.0, 0.0, -self.config.gravity);
        let accel = rotation * sample.imu.linear_acceleration + gravity;

        self.position += self.velocity * dt + accel * (0.5 * dt * dt);
        self.velocity += accel * dt;

        let mut f = Matrix6::identity();
        f.fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(nalgebra::Matrix3::identity() * dt));
        let mut q = Matrix6::zeros();
        for i in 0..3 {
            q[(i, i)] = self.config.process_noise_position * dt;
            q[(i + 3, i + 3)] = self.config.process_noise_velocity * dt;
        }
        self.covariance = f * self.covariance * f.transpose() + q;

        // --- Correct, one stance leg at a time ---
        self.refresh_anchors(sample, contact);

        let omega_world = rotation * sample.imu.angular_velocity;
        let mut corrected = false;

        for leg in LegId::ALL {
            if !contact.in_stance(leg) {
                continue;
            }
            let Some(anchor) = self.anchors[leg.index()] else {
                continue;
            };

            let kin = &self.legs[leg.index()];
            let q_leg = sample.leg_angles(leg);
            let qd_leg = sample.leg_velocities(leg);

            let foot_body = rotation * kin.foot_position_body(&q_leg);
            let foot_rate = rotation * kin.foot_velocity(&q_leg, &qd_leg);

            // Pinned foot: body position is anchor minus the leg vector, and
            // the leg motion observed at the foot mirrors the body velocity.
            let p_obs = anchor - foot_body;
            let v_obs = -(foot_rate + omega_world.cross(&foot_body));

            let mut innovation = Vector6::zeros();
            innovation.fixed_rows_mut::<3>(0).copy_from(&(p_obs - self.position));
            innovation.fixed_rows_mut::<3>(3).copy_from(&(v_obs - self.velocity));

            let mut noise = Matrix6::zeros();
            for i in 0..3 {
                noise[(i, i)] = self.config.measurement_noise_position;
                noise[(i + 3, i + 3)] = self.config.measurement_noise_velocity;
            }

            // H = I for this observation, so the update simplifies to
            // K = P (P + R)^-1.
            let s = self.covariance + noise;
            let Some(s_inv) = s.try_inverse() else {
                continue;
            };
            let gain = self.covariance * s_inv;

            let dx = gain * innovation;
            self.position += dx.fixed_rows::<3>(0).into_owned();
            self.velocity += dx.fixed_rows::<3>(3).into_owned();
            self.covariance = (Matrix6::identity() - gain) * self.covariance;
            corrected = true;
        }

        self.condition_covariance(corrected);
        self.body_state(sample)
    }

    /// Seed position so the stance feet sit at their current kinematic
    /// heights, with zero initial velocity.
    fn initialize(&mut self, sample: &SensorSample, contact: &ContactState) {
        let rotation = sample.imu.orientation;
        let mut height_sum = 0.0;
        let mut count = 0usize;

        for leg in LegId::ALL {
            if contact.in_stance(leg) {
                let q_leg = sample.leg_angles(leg);
                let foot = rotation * self.legs[leg.index()].foot_position_body(&q_leg);
                height_sum += -foot.z;
                count += 1;
            }
        }

        self.position = Vector3::new(
            0.0,
            0.0,
            if count > 0 {
                height_sum / count as f64
            } else {
                0.0
            },
        );
        self.velocity = Vector3::zeros();
        self.initialized = true;
    }

    /// Capture touchdown anchors on swing-to-stance transitions and drop
    /// anchors for legs that lifted off.
    fn refresh_anchors(&mut self, sample: &SensorSample, contact: &ContactState) {
        let rotation = sample.imu.orientation;
        for leg in LegId::ALL {
            let idx = leg.index();
            if contact.in_stance(leg) {
                if self.anchors[idx].is_none() {
                    let q_leg = sample.leg_angles(leg);
                    let foot_world =
                        self.position + rotation * self.legs[idx].foot_position_body(&q_leg);
                    self.anchors[idx] = Some(foot_world);
                }
            } else {
                self.anchors[idx] = None;
            }
        }
    }

    /// Symmetrize and sanity-check the covariance; reset on degradation.
    fn condition_covariance(&mut self, corrected: bool) {
        self.covariance = (self.covariance + self.covariance.transpose()) * 0.5;

        let trace = self.covariance.trace();
        if !trace.is_finite() || trace > self.config.max_covariance_trace || trace < 0.0 {
            self.covariance = Matrix6::identity() * self.config.initial_covariance;
            self.status = EstimatorStatus::CovarianceReset;
        } else if corrected {
            self.status = EstimatorStatus::Nominal;
        } else {
            self.status = EstimatorStatus::PredictionOnly;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strider_core::config::StriderConfig;
    use strider_core::types::{ContactState, LegPhase};

    /// Sample with all legs in the nominal stance pose and a resting IMU.
    fn standing_sample() -> SensorSample {
        let config = RobotConfig::default();
        let mut sample = SensorSample::default();
        for leg in LegId::ALL {
            let kin = LegKinematics::new(&config, leg);
            let q = kin.joint_angles(&config.nominal_foot_position(leg));
            let base = leg.joint_base();
            for j in 0..3 {
                sample.joints[base + j].position = q[j];
                sample.joints[base + j].velocity = 0.0;
            }
        }
        sample
    }

    fn full_stance() -> ContactState {
        ContactState::default()
    }

    fn flight() -> ContactState {
        ContactState {
            legs: [LegPhase {
                stance: false,
                phase: 0.5,
            }; LEG_COUNT],
            ..ContactState::default()
        }
    }

    fn estimator() -> StateEstimator {
        let cfg = StriderConfig::default();
        StateEstimator::new(cfg.estimator, &cfg.robot)
    }

    #[test]
    fn initializes_to_kinematic_height() {
        let mut est = estimator();
        let sample = standing_sample();
        let body = est.update(&sample, &full_stance(), 0.002);

        let expected = RobotConfig::default().stand_height;
        assert_relative_eq!(body.position.z, expected, epsilon = 1e-3);
        assert_eq!(est.status(), EstimatorStatus::Nominal);
    }

    #[test]
    fn velocity_error_converges_to_zero() {
        let mut est = estimator();
        let sample = standing_sample();
        let contact = full_stance();

        // Let it settle, then inject an arbitrary velocity error.
        est.update(&sample, &contact, 0.002);
        est.velocity = Vector3::new(1.5, -0.8, 0.4);

        for _ in 0..500 {
            est.update(&sample, &contact, 0.002);
        }
        assert!(
            est.velocity.norm() < 1e-3,
            "velocity did not converge: {:?}",
            est.velocity
        );
    }

    #[test]
    fn position_stable_under_constant_stance() {
        let mut est = estimator();
        let sample = standing_sample();
        let contact = full_stance();

        let first = est.update(&sample, &contact, 0.002);
        for _ in 0..200 {
            est.update(&sample, &contact, 0.002);
        }
        let last = est.body_state(&sample);
        assert_relative_eq!(last.position, first.position, epsilon = 1e-4);
    }

    #[test]
    fn flight_phase_runs_prediction_only() {
        let mut est = estimator();
        let sample = standing_sample();

        est.update(&sample, &full_stance(), 0.002);
        est.update(&sample, &flight(), 0.002);
        assert_eq!(est.status(), EstimatorStatus::PredictionOnly);
    }

    #[test]
    fn flight_phase_integrates_velocity() {
        let mut est = estimator();
        let sample = standing_sample();
        est.update(&sample, &full_stance(), 0.002);

        est.velocity = Vector3::new(1.0, 0.0, 0.0);
        let before = est.position.x;
        for _ in 0..100 {
            est.update(&sample, &flight(), 0.002);
        }
        // 100 ticks at 1 m/s and 2 ms: 0.2 m.
        assert_relative_eq!(est.position.x - before, 0.2, epsilon = 1e-9);
        // Nothing pulls velocity back without measurements.
        assert_relative_eq!(est.velocity.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn covariance_stays_symmetric() {
        let mut est = estimator();
        let sample = standing_sample();
        for _ in 0..50 {
            est.update(&sample, &full_stance(), 0.002);
        }
        let p = est.covariance;
        assert_relative_eq!(p, p.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn covariance_blowup_triggers_reset() {
        let mut est = estimator();
        let sample = standing_sample();
        est.update(&sample, &full_stance(), 0.002);

        est.covariance = Matrix6::identity() * 1e9;
        est.update(&sample, &flight(), 0.002);
        assert_eq!(est.status(), EstimatorStatus::CovarianceReset);
        assert!(est.covariance.trace() < est.config.max_covariance_trace);
    }

    #[test]
    fn nan_covariance_triggers_reset() {
        let mut est = estimator();
        let sample = standing_sample();
        est.update(&sample, &full_stance(), 0.002);

        est.covariance[(0, 0)] = f64::NAN;
        est.update(&sample, &full_stance(), 0.002);
        assert_eq!(est.status(), EstimatorStatus::CovarianceReset);
        assert!(est.covariance.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn anchors_follow_contact_transitions() {
        let mut est = estimator();
        let sample = standing_sample();

        est.update(&sample, &full_stance(), 0.002);
        assert!(est.anchors.iter().all(Option::is_some));

        est.update(&sample, &flight(), 0.002);
        assert!(est.anchors.iter().all(Option::is_none));

        est.update(&sample, &full_stance(), 0.002);
        assert!(est.anchors.iter().all(Option::is_some));
    }

    #[test]
    fn reset_clears_state() {
        let mut est = estimator();
        let sample = standing_sample();
        est.update(&sample, &full_stance(), 0.002);

        est.reset();
        assert!(est.position.norm() < f64::EPSILON);
        assert!(est.anchors.iter().all(Option::is_none));
        assert!(!est.initialized);
    }
}
