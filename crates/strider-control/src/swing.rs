//! Swing-foot trajectory generation and touchdown targeting.
//!
//! Touchdown points come from a Raibert-style heuristic: the nominal point
//! under the hip, shifted by a velocity feedforward over half the stance
//! duration and a feedback term on the body-velocity error, clamped to the
//! reachable radius around the hip.
//!
//! The swing profile is a cycloid in both the horizontal advance and the
//! vertical lift: position is continuous, velocity is zero at liftoff and
//! touchdown, and the foot lands exactly on the target at swing phase 1.

use nalgebra::{UnitQuaternion, Vector3};

use strider_core::config::{GaitConfig, RobotConfig};
use strider_core::types::{BodyState, ContactState, FootTarget, LegId, LEG_COUNT};

use std::f64::consts::TAU;

// ---------------------------------------------------------------------------
// Cycloid profile
// ---------------------------------------------------------------------------

/// Horizontal advance fraction at swing phase `t`: 0 at liftoff, 1 at
/// touchdown, zero slope at both ends.
fn cycloid_advance(t: f64) -> f64 {
    t - (TAU * t).sin() / TAU
}

/// Derivative of [`cycloid_advance`] with respect to the phase.
fn cycloid_advance_rate(t: f64) -> f64 {
    1.0 - (TAU * t).cos()
}

/// Vertical lift at swing phase `t`: 0 at both ends, `1` at mid-swing.
fn cycloid_lift(t: f64) -> f64 {
    0.5 * (1.0 - (TAU * t).cos())
}

/// Derivative of [`cycloid_lift`] with respect to the phase.
fn cycloid_lift_rate(t: f64) -> f64 {
    0.5 * TAU * (TAU * t).sin()
}

/// Swing-foot position at phase `t` in `[0, 1]`, from liftoff point to
/// touchdown target with `step_height` peak clearance.
#[must_use]
pub fn swing_foot_position(
    start: &Vector3<f64>,
    target: &Vector3<f64>,
    phase: f64,
    step_height: f64,
) -> Vector3<f64> {
    let t = phase.clamp(0.0, 1.0);
    let s = cycloid_advance(t);
    let mut pos = start + (target - start) * s;
    pos.z += step_height * cycloid_lift(t);
    pos
}

/// Swing-foot velocity at phase `t`, time-scaled by the swing duration.
#[must_use]
pub fn swing_foot_velocity(
    start: &Vector3<f64>,
    target: &Vector3<f64>,
    phase: f64,
    step_height: f64,
    swing_duration: f64,
) -> Vector3<f64> {
    if swing_duration <= f64::EPSILON {
        return Vector3::zeros();
    }
    let t = phase.clamp(0.0, 1.0);
    let inv = 1.0 / swing_duration;
    let mut vel = (target - start) * (cycloid_advance_rate(t) * inv);
    vel.z += step_height * cycloid_lift_rate(t) * inv;
    vel
}

// ---------------------------------------------------------------------------
// Touchdown heuristic
// ---------------------------------------------------------------------------

/// Raibert touchdown point for one leg.
///
/// `hip` is the hip's world position projected to the ground plane of the
/// liftoff point, `remaining_swing` the time left until touchdown.
#[allow(clippy::too_many_arguments)]
fn touchdown_target(
    hip: &Vector3<f64>,
    body_velocity: &Vector3<f64>,
    commanded_velocity: &Vector3<f64>,
    remaining_swing: f64,
    stance_duration: f64,
    feedback_gain: f64,
    max_reach: f64,
    ground_height: f64,
) -> Vector3<f64> {
    // Hip position when the foot comes down again.
    let hip_at_touchdown = hip + body_velocity * remaining_swing;
    // Symmetry feedforward over half the upcoming stance.
    let feedforward = commanded_velocity * (0.5 * stance_duration);
    // Velocity-error feedback pushes the foot under the excess momentum.
    let feedback = (body_velocity - commanded_velocity) * feedback_gain;

    let mut target = hip_at_touchdown + feedforward + feedback;

    // Keep the target inside the kinematic workspace.
    let offset = Vector3::new(target.x - hip.x, target.y - hip.y, 0.0);
    let dist = offset.norm();
    if dist > max_reach {
        let scale = max_reach / dist;
        target.x = hip.x + offset.x * scale;
        target.y = hip.y + offset.y * scale;
    }
    target.z = ground_height;
    target
}

// ---------------------------------------------------------------------------
// FootPlacementPlanner
// ---------------------------------------------------------------------------

/// Per-tick foot target generation for all four legs.
///
/// Stance legs hold their touchdown point with zero velocity; swing legs
/// follow a cycloid from the liftoff point to a continuously re-aimed
/// touchdown target. When the scheduler epoch changes mid-swing (gait
/// pattern switch), the trajectory start is re-anchored to the measured
/// foot position so the commanded position cannot jump.
#[derive(Clone, Debug)]
pub struct FootPlacementPlanner {
    step_height: f64,
    placement_gain: f64,
    capture_point_scaling: bool,
    max_reach: f64,
    gravity: f64,
    /// Nominal stance point of each leg in the body frame (ground-plane
    /// offsets; z is ignored).
    nominal: [Vector3<f64>; LEG_COUNT],

    swing_start: [Vector3<f64>; LEG_COUNT],
    target: [Vector3<f64>; LEG_COUNT],
    /// Touchdown point held while the leg is loaded.
    hold: [Vector3<f64>; LEG_COUNT],
    /// Ground height under each foot, latched at touchdown. Survives
    /// pattern switches so a mid-air re-anchor cannot raise the landing
    /// plane.
    ground_z: [f64; LEG_COUNT],
    prev_stance: [bool; LEG_COUNT],
    seen_epoch: Option<u64>,
}

impl FootPlacementPlanner {
    #[must_use]
    pub fn new(gait: &GaitConfig, robot: &RobotConfig, gravity: f64) -> Self {
        let nominal = LegId::ALL.map(|leg| robot.nominal_foot_position(leg));
        Self {
            step_height: gait.step_height,
            placement_gain: gait.placement_gain,
            capture_point_scaling: gait.capture_point_scaling,
            max_reach: robot.max_reach,
            gravity,
            nominal,
            swing_start: [Vector3::zeros(); LEG_COUNT],
            target: [Vector3::zeros(); LEG_COUNT],
            hold: [Vector3::zeros(); LEG_COUNT],
            ground_z: [0.0; LEG_COUNT],
            prev_stance: [true; LEG_COUNT],
            seen_epoch: None,
        }
    }

    /// Forget all per-segment state. The next plan call re-anchors from the
    /// measured foot positions.
    pub fn reset(&mut self) {
        self.seen_epoch = None;
    }

    /// Compute foot targets for this tick.
    ///
    /// `measured_feet` are the current world-frame foot positions from leg
    /// kinematics; they anchor touchdown holds and swing starts.
    pub fn plan(
        &mut self,
        contact: &ContactState,
        body: &BodyState,
        commanded_velocity: &Vector3<f64>,
        commanded_yaw_rate: f64,
        measured_feet: &[Vector3<f64>; LEG_COUNT],
    ) -> [FootTarget; LEG_COUNT] {
        // Pattern switch or first call: drop segment memory and re-anchor
        // everything to the measured feet.
        if self.seen_epoch != Some(contact.epoch) {
            let first = self.seen_epoch.is_none();
            self.seen_epoch = Some(contact.epoch);
            for i in 0..LEG_COUNT {
                self.hold[i] = measured_feet[i];
                self.swing_start[i] = measured_feet[i];
                self.target[i] = measured_feet[i];
                self.prev_stance[i] = contact.legs[i].stance;
                if first {
                    self.ground_z[i] = measured_feet[i].z;
                }
            }
        }

        let yaw = body.orientation.euler_angles().2;
        let yaw_rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw);

        let mut targets = [FootTarget::default(); LEG_COUNT];

        for leg in LegId::ALL {
            let i = leg.index();
            let in_stance = contact.legs[i].stance;

            if in_stance {
                if !self.prev_stance[i] {
                    // Touchdown: latch the point the foot actually reached.
                    self.hold[i] = measured_feet[i];
                    self.ground_z[i] = measured_feet[i].z;
                }
                targets[i] = FootTarget {
                    position: self.hold[i],
                    velocity: Vector3::zeros(),
                };
            } else {
                if self.prev_stance[i] {
                    // Liftoff: the trajectory starts where the foot stood.
                    self.swing_start[i] = measured_feet[i];
                }

                let swing_phase = contact.legs[i].phase;
                let remaining = (1.0 - swing_phase) * contact.swing_duration;

                // Commanded velocity at this hip, including the yaw-rate
                // contribution.
                let hip_body = self.nominal[i];
                let hip_world = body.position + yaw_rotation * hip_body;
                let spin = Vector3::new(0.0, 0.0, commanded_yaw_rate);
                let cmd_at_hip = commanded_velocity + spin.cross(&(yaw_rotation * hip_body));

                let gain = if self.capture_point_scaling {
                    self.placement_gain * (body.position.z.max(0.0) / self.gravity).sqrt()
                } else {
                    self.placement_gain
                };

                let hip_ground = Vector3::new(hip_world.x, hip_world.y, self.ground_z[i]);
                self.target[i] = touchdown_target(
                    &hip_ground,
                    &body.velocity,
                    &cmd_at_hip,
                    remaining,
                    contact.stance_duration,
                    gain,
                    self.max_reach,
                    self.ground_z[i],
                );

                targets[i] = FootTarget {
                    position: swing_foot_position(
                        &self.swing_start[i],
                        &self.target[i],
                        swing_phase,
                        self.step_height,
                    ),
                    velocity: swing_foot_velocity(
                        &self.swing_start[i],
                        &self.target[i],
                        swing_phase,
                        self.step_height,
                        contact.swing_duration,
                    ),
                };
            }
            self.prev_stance[i] = in_stance;
        }

        targets
    }

    /// Latest touchdown target per leg.
    #[must_use]
    pub const fn targets(&self) -> &[Vector3<f64>; LEG_COUNT] {
        &self.target
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strider_core::types::LegPhase;

    fn planner() -> FootPlacementPlanner {
        FootPlacementPlanner::new(&GaitConfig::default(), &RobotConfig::default(), 9.81)
    }

    fn standing_body() -> BodyState {
        BodyState {
            position: Vector3::new(0.0, 0.0, 0.31),
            ..BodyState::default()
        }
    }

    fn nominal_feet() -> [Vector3<f64>; LEG_COUNT] {
        let robot = RobotConfig::default();
        LegId::ALL.map(|leg| {
            let mut foot = robot.nominal_foot_position(leg);
            foot.z = 0.0;
            foot
        })
    }

    fn trot_contact(stance_fr: bool, phase: f64) -> ContactState {
        let mut legs = [LegPhase {
            stance: true,
            phase: 0.0,
        }; LEG_COUNT];
        // Diagonal pairs: FR/RL share a segment, FL/RR the other.
        for leg in [LegId::FrontRight, LegId::RearLeft] {
            legs[leg.index()] = LegPhase {
                stance: stance_fr,
                phase,
            };
        }
        for leg in [LegId::FrontLeft, LegId::RearRight] {
            legs[leg.index()] = LegPhase {
                stance: !stance_fr,
                phase,
            };
        }
        ContactState {
            legs,
            stance_duration: 0.25,
            swing_duration: 0.25,
            epoch: 0,
        }
    }

    // ---- Trajectory shape ----

    #[test]
    fn swing_starts_and_ends_on_anchors() {
        let start = Vector3::new(0.1, 0.05, 0.0);
        let target = Vector3::new(0.25, 0.02, 0.0);
        assert_relative_eq!(
            swing_foot_position(&start, &target, 0.0, 0.06),
            start,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            swing_foot_position(&start, &target, 1.0, 0.06),
            target,
            epsilon = 1e-12
        );
    }

    #[test]
    fn swing_peak_clearance_at_midpoint() {
        let start = Vector3::zeros();
        let target = Vector3::new(0.1, 0.0, 0.0);
        let pos = swing_foot_position(&start, &target, 0.5, 0.06);
        assert_relative_eq!(pos.z, 0.06, epsilon = 1e-12);
    }

    #[test]
    fn swing_velocity_zero_at_endpoints() {
        let start = Vector3::zeros();
        let target = Vector3::new(0.12, -0.03, 0.01);
        for phase in [0.0, 1.0] {
            let v = swing_foot_velocity(&start, &target, phase, 0.06, 0.25);
            assert_relative_eq!(v.norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn swing_position_is_continuous() {
        let start = Vector3::zeros();
        let target = Vector3::new(0.15, 0.0, 0.0);
        let mut prev = swing_foot_position(&start, &target, 0.0, 0.06);
        for k in 1..=200 {
            let t = k as f64 / 200.0;
            let pos = swing_foot_position(&start, &target, t, 0.06);
            assert!((pos - prev).norm() < 5e-3, "jump at phase {t}");
            prev = pos;
        }
    }

    #[test]
    fn swing_velocity_matches_position_slope() {
        let start = Vector3::zeros();
        let target = Vector3::new(0.15, -0.05, 0.0);
        let duration = 0.25;
        let h = 1e-6;
        for &t in &[0.2, 0.5, 0.8] {
            let v = swing_foot_velocity(&start, &target, t, 0.06, duration);
            let numeric = (swing_foot_position(&start, &target, t + h, 0.06)
                - swing_foot_position(&start, &target, t - h, 0.06))
                / (2.0 * h * duration);
            assert_relative_eq!(v, numeric, epsilon = 1e-5);
        }
    }

    // ---- Touchdown heuristic ----

    #[test]
    fn stationary_touchdown_is_under_hip() {
        let hip = Vector3::new(0.19, 0.13, 0.0);
        let target = touchdown_target(
            &hip,
            &Vector3::zeros(),
            &Vector3::zeros(),
            0.25,
            0.25,
            0.09,
            0.18,
            0.0,
        );
        assert_relative_eq!(target, hip, epsilon = 1e-12);
    }

    #[test]
    fn touchdown_leads_commanded_velocity() {
        let hip = Vector3::new(0.19, 0.13, 0.0);
        let cmd = Vector3::new(0.4, 0.0, 0.0);
        let target = touchdown_target(&hip, &cmd, &cmd, 0.25, 0.25, 0.09, 0.5, 0.0);
        // hip drift (0.4 * 0.25) plus feedforward (0.4 * 0.125), no feedback.
        assert_relative_eq!(target.x, hip.x + 0.1 + 0.05, epsilon = 1e-12);
    }

    #[test]
    fn touchdown_feedback_catches_excess_velocity() {
        let hip = Vector3::new(0.0, 0.0, 0.0);
        let body_vel = Vector3::new(0.6, 0.0, 0.0);
        let cmd = Vector3::new(0.3, 0.0, 0.0);
        let gain = 0.1;
        let with_error = touchdown_target(&hip, &body_vel, &cmd, 0.0, 0.0, gain, 0.5, 0.0);
        // Only the feedback term remains with zero durations.
        assert_relative_eq!(with_error.x, gain * 0.3, epsilon = 1e-12);
    }

    #[test]
    fn touchdown_clamped_to_reach_radius() {
        let hip = Vector3::new(0.0, 0.0, 0.0);
        let body_vel = Vector3::new(5.0, 0.0, 0.0);
        let max_reach = 0.18;
        let target = touchdown_target(
            &hip,
            &body_vel,
            &Vector3::zeros(),
            0.25,
            0.25,
            0.09,
            max_reach,
            0.0,
        );
        let offset = Vector3::new(target.x - hip.x, target.y - hip.y, 0.0);
        assert!(offset.norm() <= max_reach + 1e-12);
    }

    // ---- Planner state machine ----

    #[test]
    fn stance_legs_hold_measured_touchdown() {
        let mut planner = planner();
        let feet = nominal_feet();
        let body = standing_body();

        let contact = trot_contact(true, 0.1);
        let targets = planner.plan(&contact, &body, &Vector3::zeros(), 0.0, &feet);
        for leg in [LegId::FrontRight, LegId::RearLeft] {
            assert_relative_eq!(targets[leg.index()].position, feet[leg.index()], epsilon = 1e-12);
            assert_relative_eq!(
                targets[leg.index()].velocity.norm(),
                0.0,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn swing_leg_lifts_and_lands_on_target() {
        let mut planner = planner();
        let feet = nominal_feet();
        let body = standing_body();
        let leg = LegId::FrontLeft.index();

        // FL swings in this half of the trot cycle.
        let mut contact = trot_contact(true, 0.0);
        planner.plan(&contact, &body, &Vector3::zeros(), 0.0, &feet);

        contact = trot_contact(true, 0.5);
        let mid = planner.plan(&contact, &body, &Vector3::zeros(), 0.0, &feet);
        assert!(mid[leg].position.z > 0.01, "foot should be lifted");

        contact = trot_contact(true, 1.0);
        let end = planner.plan(&contact, &body, &Vector3::zeros(), 0.0, &feet);
        assert_relative_eq!(end[leg].position, planner.targets()[leg], epsilon = 1e-9);
        assert_relative_eq!(end[leg].velocity.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn epoch_change_reanchors_without_jump() {
        let mut planner = planner();
        let body = standing_body();
        let feet = nominal_feet();

        // Mid-swing for FL/RR.
        let contact = trot_contact(true, 0.6);
        let before = planner.plan(&contact, &body, &Vector3::zeros(), 0.0, &feet);

        // Pattern switch: epoch bumps and FL restarts a swing from phase 0.
        // The measured feet are wherever the previous command put them.
        let mut measured = feet;
        for leg in LegId::ALL {
            measured[leg.index()] = before[leg.index()].position;
        }
        let mut switched = trot_contact(true, 0.0);
        switched.epoch = contact.epoch + 1;

        let after = planner.plan(&switched, &body, &Vector3::zeros(), 0.0, &measured);
        for leg in LegId::ALL {
            let jump = (after[leg.index()].position - before[leg.index()].position).norm();
            assert!(jump < 1e-9, "{leg:?} jumped {jump} on pattern switch");
        }
    }

    #[test]
    fn forward_command_shifts_landing_forward() {
        let mut planner = planner();
        let feet = nominal_feet();
        let body = standing_body();
        let leg = LegId::FrontLeft.index();

        let contact = trot_contact(true, 0.0);
        planner.plan(&contact, &body, &Vector3::zeros(), 0.0, &feet);

        let moving = trot_contact(true, 0.4);
        planner.plan(&moving, &body, &Vector3::new(0.4, 0.0, 0.0), 0.0, &feet);
        assert!(
            planner.targets()[leg].x > feet[leg].x + 0.01,
            "landing target should lead the motion"
        );
    }

    #[test]
    fn landing_keeps_liftoff_height() {
        let mut planner = planner();
        let mut feet = nominal_feet();
        for foot in &mut feet {
            foot.z = 0.02;
        }
        let body = standing_body();

        let contact = trot_contact(true, 0.0);
        planner.plan(&contact, &body, &Vector3::zeros(), 0.0, &feet);
        let swing = trot_contact(true, 0.5);
        planner.plan(&swing, &body, &Vector3::zeros(), 0.0, &feet);

        assert_relative_eq!(
            planner.targets()[LegId::FrontLeft.index()].z,
            0.02,
            epsilon = 1e-12
        );
    }
}
