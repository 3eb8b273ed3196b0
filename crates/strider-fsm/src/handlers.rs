//! Per-mode behaviors.
//!
//! Every mode implements the same `enter`/`run`/`exit` interface and is
//! dispatched by an exhaustive match over the closed [`Mode`] set. The
//! gait modes (Trotting, StepTest, ExternalNavigation) share one pipeline:
//! advance the scheduler, plan foot targets, solve the balance QP, map
//! forces to torques. The standing modes bypass all of that and command
//! joint servos directly.

use nalgebra::{UnitQuaternion, Vector3};

use strider_control::balance::{desired_wrench, PoseTarget, SolveStatus};
use strider_control::gait::GaitPattern;
use strider_control::wbc::{stance_torques, swing_tracking_force, swing_torques};
use strider_control::{BalanceOptimizer, FootPlacementPlanner, PhaseScheduler};
use strider_core::config::StriderConfig;
use strider_core::types::{
    BodyState, ContactState, JointCommands, LegId, SensorSample, UserCommand, JOINT_COUNT,
    LEG_COUNT,
};
use strider_kinematics::LegKinematics;

use crate::mode::Mode;

/// Posture command clamp for the standing test modes, rad.
const MAX_POSTURE_ANGLE: f64 = 0.4;
/// Height command clamp, m.
const MAX_POSTURE_HEIGHT: f64 = 0.08;
/// Cartesian offset range of the swing test, m.
const SWING_TEST_RANGE: f64 = 0.1;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Borrowed view of the control context handed to mode behaviors.
pub(crate) struct Pipeline<'a> {
    pub config: &'a StriderConfig,
    pub legs: &'a [LegKinematics; LEG_COUNT],
    pub scheduler: &'a mut PhaseScheduler,
    pub planner: &'a mut FootPlacementPlanner,
    pub optimizer: &'a mut BalanceOptimizer,
    pub body: &'a BodyState,
    pub sample: &'a SensorSample,
    pub command: &'a UserCommand,
    /// Scheduler output for this tick; read by the estimator next tick.
    pub contact: &'a mut ContactState,
}

/// What a mode's run hook produced.
pub(crate) struct RunOutput {
    pub commands: JointCommands,
    /// Balance solve status, for modes that ran the optimizer.
    pub solve: Option<SolveStatus>,
}

impl RunOutput {
    fn servo_only(commands: JointCommands) -> Self {
        Self {
            commands,
            solve: None,
        }
    }
}

/// Uniform mode interface. The variant set is closed; dispatch is an
/// exhaustive match in [`ModeHandlers::behavior_mut`].
pub(crate) trait ModeBehavior {
    fn enter(&mut self, pipeline: &mut Pipeline<'_>);
    fn run(&mut self, pipeline: &mut Pipeline<'_>) -> RunOutput;
    fn exit(&mut self) {}
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// World-frame foot positions from leg kinematics and the estimated body
/// pose.
fn measured_feet_world(pipeline: &Pipeline<'_>) -> [Vector3<f64>; LEG_COUNT] {
    let rotation = pipeline.body.orientation;
    LegId::ALL.map(|leg| {
        let q = pipeline.sample.leg_angles(leg);
        pipeline.body.position + rotation * pipeline.legs[leg.index()].foot_position_body(&q)
    })
}

/// Advance the scheduler in full-stance for the non-gait modes.
fn advance_full_stance(pipeline: &mut Pipeline<'_>) {
    pipeline.scheduler.request_pattern(GaitPattern::FullStance);
    *pipeline.contact = pipeline.scheduler.advance(pipeline.config.control.dt);
}

/// Yaw-only version of the body orientation.
fn yaw_rotation(orientation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    let (_, _, yaw) = orientation.euler_angles();
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw)
}

/// One tick of the full gait pipeline: scheduler, planner, balance QP,
/// force-to-torque mapping. Shared by every gait mode; only the velocity
/// command source differs.
fn run_gait(pipeline: &mut Pipeline<'_>, velocity: Vector3<f64>, yaw_rate: f64) -> RunOutput {
    let dt = pipeline.config.control.dt;
    let contact = pipeline.scheduler.advance(dt);
    *pipeline.contact = contact;

    let feet = measured_feet_world(pipeline);
    let targets = pipeline
        .planner
        .plan(&contact, pipeline.body, &velocity, yaw_rate, &feet);

    // Track the commanded velocity at the standing height with a level body.
    let pose = PoseTarget {
        position: Vector3::new(
            pipeline.body.position.x,
            pipeline.body.position.y,
            pipeline.config.robot.stand_height,
        ),
        velocity,
        orientation: yaw_rotation(&pipeline.body.orientation),
        angular_velocity: Vector3::new(0.0, 0.0, yaw_rate),
    };
    let wrench = desired_wrench(
        &pipeline.config.balance,
        &pipeline.config.robot,
        pipeline.config.estimator.gravity,
        pipeline.body,
        &pose,
    );
    let solution = pipeline
        .optimizer
        .solve(&wrench, &contact, pipeline.body, &feet);

    let rotation = pipeline.body.orientation;
    let rotation_inv = rotation.inverse();
    let omega_world = rotation * pipeline.body.angular_velocity;
    let kp_cart = Vector3::from(pipeline.config.gait.swing_kp);
    let kd_cart = Vector3::from(pipeline.config.gait.swing_kd);

    let mut commands = JointCommands::zero();

    for leg in LegId::ALL {
        let i = leg.index();
        let kin = &pipeline.legs[i];
        let q = pipeline.sample.leg_angles(leg);
        let qd = pipeline.sample.leg_velocities(leg);
        let jacobian = kin.jacobian(&q);

        if contact.in_stance(leg) {
            let force_body = rotation_inv * solution.forces[i];
            let tau = stance_torques(&jacobian, &force_body);
            commands.set_leg_torque(leg, tau, pipeline.config.control.stance_kd);
        } else {
            let leg_world = rotation * kin.foot_position_body(&q);
            let foot_velocity =
                pipeline.body.velocity + omega_world.cross(&leg_world) + rotation * kin.foot_velocity(&q, &qd);

            let pos_err = targets[i].position - feet[i];
            let vel_err = targets[i].velocity - foot_velocity;
            let force_world = swing_tracking_force(&kp_cart, &kd_cart, &pos_err, &vel_err);
            let tau = swing_torques(&jacobian, &(rotation_inv * force_world));

            let q_des =
                kin.joint_angles(&(rotation_inv * (targets[i].position - pipeline.body.position)));
            let qd_des = kin.joint_velocities(
                &q,
                &(rotation_inv * (targets[i].velocity - pipeline.body.velocity)),
            );

            for (j, joint) in commands.leg_mut(leg).iter_mut().enumerate() {
                joint.position = q_des[j];
                joint.velocity = qd_des[j];
                joint.torque = tau[j];
                joint.kp = pipeline.config.control.swing_joint_kp;
                joint.kd = pipeline.config.control.swing_joint_kd;
            }
        }
    }

    RunOutput {
        commands,
        solve: Some(solution.status),
    }
}

/// Common entry for the gait modes: fresh trot cycle, fresh planner
/// anchors, no stale previous forces.
fn enter_gait(pipeline: &mut Pipeline<'_>) {
    pipeline.scheduler.request_pattern(GaitPattern::Trot);
    pipeline.planner.reset();
    pipeline.optimizer.reset();
}

// ---------------------------------------------------------------------------
// Passive
// ---------------------------------------------------------------------------

/// Zero torque, light joint damping.
#[derive(Debug, Default)]
pub(crate) struct PassiveMode;

impl ModeBehavior for PassiveMode {
    fn enter(&mut self, _pipeline: &mut Pipeline<'_>) {}

    fn run(&mut self, pipeline: &mut Pipeline<'_>) -> RunOutput {
        advance_full_stance(pipeline);
        RunOutput::servo_only(JointCommands::damping(pipeline.config.control.passive_kd))
    }
}

// ---------------------------------------------------------------------------
// FixedStand
// ---------------------------------------------------------------------------

/// Joint-space interpolation from the entry posture to the nominal stand.
#[derive(Debug, Default)]
pub(crate) struct FixedStandMode {
    start: [f64; JOINT_COUNT],
    target: [f64; JOINT_COUNT],
    elapsed: u64,
}

impl ModeBehavior for FixedStandMode {
    fn enter(&mut self, pipeline: &mut Pipeline<'_>) {
        for (j, joint) in pipeline.sample.joints.iter().enumerate() {
            self.start[j] = joint.position;
        }
        for leg in LegId::ALL {
            let target = pipeline.config.robot.nominal_foot_position(leg);
            let q = pipeline.legs[leg.index()].joint_angles(&target);
            let base = leg.joint_base();
            for j in 0..3 {
                self.target[base + j] = q[j];
            }
        }
        self.elapsed = 0;
    }

    fn run(&mut self, pipeline: &mut Pipeline<'_>) -> RunOutput {
        advance_full_stance(pipeline);

        let ticks = pipeline.config.control.stand_ticks();
        self.elapsed = (self.elapsed + 1).min(ticks);
        let alpha = self.elapsed as f64 / ticks as f64;

        let mut commands = JointCommands::zero();
        for (j, joint) in commands.joints.iter_mut().enumerate() {
            joint.position = self.start[j] + (self.target[j] - self.start[j]) * alpha;
            joint.kp = pipeline.config.control.joint_kp;
            joint.kd = pipeline.config.control.joint_kd;
        }
        RunOutput::servo_only(commands)
    }
}

impl FixedStandMode {
    /// True once the interpolation has reached the stand posture.
    pub(crate) fn settled(&self, config: &StriderConfig) -> bool {
        self.elapsed >= config.control.stand_ticks()
    }
}

// ---------------------------------------------------------------------------
// FreeStand
// ---------------------------------------------------------------------------

/// Posture-commanded standing: the user poses the body, the feet stay
/// pinned where they were on entry, and IK produces the joint targets.
#[derive(Debug)]
pub(crate) struct FreeStandMode {
    feet_world: [Vector3<f64>; LEG_COUNT],
    base_position: Vector3<f64>,
    base_yaw: f64,
}

impl Default for FreeStandMode {
    fn default() -> Self {
        Self {
            feet_world: [Vector3::zeros(); LEG_COUNT],
            base_position: Vector3::zeros(),
            base_yaw: 0.0,
        }
    }
}

impl ModeBehavior for FreeStandMode {
    fn enter(&mut self, pipeline: &mut Pipeline<'_>) {
        self.feet_world = measured_feet_world(pipeline);
        self.base_position = pipeline.body.position;
        self.base_yaw = pipeline.body.orientation.euler_angles().2;
    }

    fn run(&mut self, pipeline: &mut Pipeline<'_>) -> RunOutput {
        advance_full_stance(pipeline);

        let posture = pipeline.command.posture;
        let roll = posture.roll.clamp(-MAX_POSTURE_ANGLE, MAX_POSTURE_ANGLE);
        let pitch = posture.pitch.clamp(-MAX_POSTURE_ANGLE, MAX_POSTURE_ANGLE);
        let yaw = self.base_yaw + posture.yaw.clamp(-MAX_POSTURE_ANGLE, MAX_POSTURE_ANGLE);
        let height = pipeline.config.robot.stand_height
            + posture.height.clamp(-MAX_POSTURE_HEIGHT, MAX_POSTURE_HEIGHT);

        let desired_orientation = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
        let desired_position =
            Vector3::new(self.base_position.x, self.base_position.y, height);
        let world_to_body = desired_orientation.inverse();

        let mut commands = JointCommands::zero();
        for leg in LegId::ALL {
            let foot_body = world_to_body * (self.feet_world[leg.index()] - desired_position);
            let q = pipeline.legs[leg.index()].joint_angles(&foot_body);
            commands.set_leg_position(
                leg,
                q,
                Vector3::zeros(),
                pipeline.config.control.joint_kp,
                pipeline.config.control.joint_kd,
            );
        }
        RunOutput::servo_only(commands)
    }
}

// ---------------------------------------------------------------------------
// Gait modes
// ---------------------------------------------------------------------------

/// Velocity-commanded trot.
#[derive(Debug, Default)]
pub(crate) struct TrottingMode;

impl ModeBehavior for TrottingMode {
    fn enter(&mut self, pipeline: &mut Pipeline<'_>) {
        enter_gait(pipeline);
    }

    fn run(&mut self, pipeline: &mut Pipeline<'_>) -> RunOutput {
        let cmd = pipeline.command;
        let velocity = Vector3::new(cmd.velocity.x, cmd.velocity.y, 0.0);
        run_gait(pipeline, velocity, cmd.yaw_rate)
    }
}

/// Trot in place.
#[derive(Debug, Default)]
pub(crate) struct StepTestMode;

impl ModeBehavior for StepTestMode {
    fn enter(&mut self, pipeline: &mut Pipeline<'_>) {
        enter_gait(pipeline);
    }

    fn run(&mut self, pipeline: &mut Pipeline<'_>) -> RunOutput {
        run_gait(pipeline, Vector3::zeros(), 0.0)
    }
}

/// Trot driven by the external navigation stack.
#[derive(Debug, Default)]
pub(crate) struct ExternalNavigationMode;

impl ModeBehavior for ExternalNavigationMode {
    fn enter(&mut self, pipeline: &mut Pipeline<'_>) {
        enter_gait(pipeline);
    }

    fn run(&mut self, pipeline: &mut Pipeline<'_>) -> RunOutput {
        let cmd = pipeline.command;
        let velocity = Vector3::new(cmd.nav_velocity.x, cmd.nav_velocity.y, 0.0);
        run_gait(pipeline, velocity, cmd.nav_yaw_rate)
    }
}

// ---------------------------------------------------------------------------
// BalanceTest
// ---------------------------------------------------------------------------

/// Full-stance wrench regulation around the entry pose, bypassing the gait
/// chain entirely.
#[derive(Debug)]
pub(crate) struct BalanceTestMode {
    base_position: Vector3<f64>,
    base_yaw: f64,
}

impl Default for BalanceTestMode {
    fn default() -> Self {
        Self {
            base_position: Vector3::zeros(),
            base_yaw: 0.0,
        }
    }
}

impl ModeBehavior for BalanceTestMode {
    fn enter(&mut self, pipeline: &mut Pipeline<'_>) {
        self.base_position = pipeline.body.position;
        self.base_yaw = pipeline.body.orientation.euler_angles().2;
        pipeline.optimizer.reset();
    }

    fn run(&mut self, pipeline: &mut Pipeline<'_>) -> RunOutput {
        advance_full_stance(pipeline);
        let contact = *pipeline.contact;
        let feet = measured_feet_world(pipeline);

        let posture = pipeline.command.posture;
        let pose = PoseTarget {
            position: self.base_position
                + Vector3::new(
                    0.0,
                    0.0,
                    posture.height.clamp(-MAX_POSTURE_HEIGHT, MAX_POSTURE_HEIGHT),
                ),
            velocity: Vector3::zeros(),
            orientation: UnitQuaternion::from_euler_angles(
                posture.roll.clamp(-MAX_POSTURE_ANGLE, MAX_POSTURE_ANGLE),
                posture.pitch.clamp(-MAX_POSTURE_ANGLE, MAX_POSTURE_ANGLE),
                self.base_yaw + posture.yaw.clamp(-MAX_POSTURE_ANGLE, MAX_POSTURE_ANGLE),
            ),
            angular_velocity: Vector3::zeros(),
        };
        let wrench = desired_wrench(
            &pipeline.config.balance,
            &pipeline.config.robot,
            pipeline.config.estimator.gravity,
            pipeline.body,
            &pose,
        );
        let solution = pipeline
            .optimizer
            .solve(&wrench, &contact, pipeline.body, &feet);

        let rotation_inv = pipeline.body.orientation.inverse();
        let mut commands = JointCommands::zero();
        for leg in LegId::ALL {
            let q = pipeline.sample.leg_angles(leg);
            let jacobian = pipeline.legs[leg.index()].jacobian(&q);
            let force_body = rotation_inv * solution.forces[leg.index()];
            let tau = stance_torques(&jacobian, &force_body);
            commands.set_leg_torque(leg, tau, pipeline.config.control.stance_kd);
        }

        RunOutput {
            commands,
            solve: Some(solution.status),
        }
    }
}

// ---------------------------------------------------------------------------
// SwingTest
// ---------------------------------------------------------------------------

/// Cartesian position test of the front-right foot; the other legs hold
/// their entry posture. The planar velocity command doubles as a Cartesian
/// offset here, with the posture height command moving the foot vertically.
#[derive(Debug)]
pub(crate) struct SwingTestMode {
    held: [f64; JOINT_COUNT],
    base_foot_body: Vector3<f64>,
}

impl Default for SwingTestMode {
    fn default() -> Self {
        Self {
            held: [0.0; JOINT_COUNT],
            base_foot_body: Vector3::zeros(),
        }
    }
}

impl ModeBehavior for SwingTestMode {
    fn enter(&mut self, pipeline: &mut Pipeline<'_>) {
        for (j, joint) in pipeline.sample.joints.iter().enumerate() {
            self.held[j] = joint.position;
        }
        let q = pipeline.sample.leg_angles(LegId::FrontRight);
        self.base_foot_body = pipeline.legs[LegId::FrontRight.index()].foot_position_body(&q);
    }

    fn run(&mut self, pipeline: &mut Pipeline<'_>) -> RunOutput {
        advance_full_stance(pipeline);
        // The test leg is unloaded; the estimator must not anchor it.
        pipeline.contact.legs[LegId::FrontRight.index()].stance = false;
        pipeline.contact.legs[LegId::FrontRight.index()].phase = 0.0;

        let cmd = pipeline.command;
        let offset = Vector3::new(
            cmd.velocity.x.clamp(-SWING_TEST_RANGE, SWING_TEST_RANGE),
            cmd.velocity.y.clamp(-SWING_TEST_RANGE, SWING_TEST_RANGE),
            cmd.posture.height.clamp(-SWING_TEST_RANGE, SWING_TEST_RANGE),
        );
        let target_body = self.base_foot_body + offset;

        let mut commands = JointCommands::zero();

        // Held legs: position servo on the entry posture.
        for leg in [LegId::FrontLeft, LegId::RearRight, LegId::RearLeft] {
            let base = leg.joint_base();
            let q = Vector3::new(
                self.held[base],
                self.held[base + 1],
                self.held[base + 2],
            );
            commands.set_leg_position(
                leg,
                q,
                Vector3::zeros(),
                pipeline.config.control.joint_kp,
                pipeline.config.control.joint_kd,
            );
        }

        // Test leg: Cartesian PD toward the commanded point.
        let leg = LegId::FrontRight;
        let kin = &pipeline.legs[leg.index()];
        let q = pipeline.sample.leg_angles(leg);
        let qd = pipeline.sample.leg_velocities(leg);
        let jacobian = kin.jacobian(&q);

        let foot_body = kin.foot_position_body(&q);
        let pos_err = target_body - foot_body;
        let vel_err = -kin.foot_velocity(&q, &qd);
        let force = swing_tracking_force(
            &Vector3::from(pipeline.config.gait.swing_kp),
            &Vector3::from(pipeline.config.gait.swing_kd),
            &pos_err,
            &vel_err,
        );
        let tau = swing_torques(&jacobian, &force);
        let q_des = kin.joint_angles(&target_body);

        for (j, joint) in commands.leg_mut(leg).iter_mut().enumerate() {
            joint.position = q_des[j];
            joint.velocity = 0.0;
            joint.torque = tau[j];
            joint.kp = pipeline.config.control.swing_joint_kp;
            joint.kd = pipeline.config.control.swing_joint_kd;
        }

        RunOutput::servo_only(commands)
    }
}

// ---------------------------------------------------------------------------
// ModeHandlers
// ---------------------------------------------------------------------------

/// One instance of every mode behavior, dispatched by [`Mode`].
#[derive(Debug, Default)]
pub(crate) struct ModeHandlers {
    passive: PassiveMode,
    fixed_stand: FixedStandMode,
    free_stand: FreeStandMode,
    trotting: TrottingMode,
    balance_test: BalanceTestMode,
    swing_test: SwingTestMode,
    step_test: StepTestMode,
    external_navigation: ExternalNavigationMode,
}

impl ModeHandlers {
    /// Exhaustive dispatch from the mode tag to its behavior.
    pub fn behavior_mut(&mut self, mode: Mode) -> &mut dyn ModeBehavior {
        match mode {
            Mode::Passive => &mut self.passive,
            Mode::FixedStand => &mut self.fixed_stand,
            Mode::FreeStand => &mut self.free_stand,
            Mode::Trotting => &mut self.trotting,
            Mode::BalanceTest => &mut self.balance_test,
            Mode::SwingTest => &mut self.swing_test,
            Mode::StepTest => &mut self.step_test,
            Mode::ExternalNavigation => &mut self.external_navigation,
        }
    }

    /// Whether the fixed-stand interpolation has settled (used by callers
    /// sequencing stand-then-walk scripts).
    pub fn stand_settled(&self, config: &StriderConfig) -> bool {
        self.fixed_stand.settled(config)
    }
}
