//! The control context: one object owning all mutable control state,
//! driven by `tick()` once per control period.
//!
//! Tick order is fixed: staleness bookkeeping, state estimation, safety
//! checks, mode-transition resolution (emergency first), then the active
//! mode's run hook. Transition requests observed mid-tick apply at the
//! next tick boundary — `tick` resolves the mode once, up front, and runs
//! exactly one mode to completion.

use tracing::{info, warn};

use strider_control::balance::SolveStatus;
use strider_control::gait::GaitPattern;
use strider_control::{BalanceOptimizer, FootPlacementPlanner, PhaseScheduler};
use strider_core::config::StriderConfig;
use strider_core::error::StriderError;
use strider_core::time::{StalenessLevel, StalenessMonitor, TickClock};
use strider_core::types::{
    BodyState, ContactState, JointCommands, LegId, SensorSample, UserCommand, LEG_COUNT,
};
use strider_estimator::{EstimatorStatus, StateEstimator};
use strider_kinematics::LegKinematics;

use crate::handlers::{ModeHandlers, Pipeline};
use crate::mode::{transition_allowed, Mode};
use crate::safety::{SafetyEvent, SafetyMonitor};

// ---------------------------------------------------------------------------
// TickOutput
// ---------------------------------------------------------------------------

/// Degradation and health flags surfaced from one tick, for logging and
/// telemetry. None of these stop the loop.
#[derive(Clone, Debug)]
pub struct TickStatus {
    /// Balance solve outcome, if the active mode ran the optimizer.
    pub solve: Option<SolveStatus>,
    /// Estimator health.
    pub estimator: EstimatorStatus,
    /// Safety condition tripped this tick, if any.
    pub safety: Option<SafetyEvent>,
    /// Sensor-exchange freshness.
    pub staleness: StalenessLevel,
    /// Consecutive degraded balance solves so far.
    pub consecutive_failures: u32,
}

/// Everything one tick produces. The joint commands pass to the actuator
/// interface; the rest is observability.
#[derive(Clone, Debug)]
pub struct TickOutput {
    pub commands: JointCommands,
    pub mode: Mode,
    pub body: BodyState,
    pub status: TickStatus,
}

// ---------------------------------------------------------------------------
// ControlContext
// ---------------------------------------------------------------------------

/// Single owner of all mutable control-core state.
///
/// Nothing here is global: constructing two contexts gives two fully
/// independent controllers, which is what makes single-tick unit tests
/// deterministic.
pub struct ControlContext {
    config: StriderConfig,
    legs: [LegKinematics; LEG_COUNT],
    estimator: StateEstimator,
    scheduler: PhaseScheduler,
    planner: FootPlacementPlanner,
    optimizer: BalanceOptimizer,
    safety: SafetyMonitor,
    staleness: StalenessMonitor,
    clock: TickClock,
    handlers: ModeHandlers,

    mode: Mode,
    contact: ContactState,
    body: BodyState,
    last_commands: JointCommands,
    consecutive_failures: u32,
}

impl ControlContext {
    /// Build a controller from a validated configuration.
    ///
    /// # Errors
    ///
    /// Any configuration error prevents construction; the core never ticks
    /// with an invalid table.
    pub fn new(config: StriderConfig) -> Result<Self, StriderError> {
        config.validate()?;

        let legs = LegId::ALL.map(|leg| LegKinematics::new(&config.robot, leg));
        let estimator = StateEstimator::new(config.estimator.clone(), &config.robot);
        let scheduler = PhaseScheduler::new(&config.gait, GaitPattern::FullStance)?;
        let planner =
            FootPlacementPlanner::new(&config.gait, &config.robot, config.estimator.gravity);
        let optimizer = BalanceOptimizer::new(config.balance.clone());
        let safety = SafetyMonitor::new(&config.control);
        let staleness = StalenessMonitor::new(config.control.max_stale_ticks);
        let clock = TickClock::new(config.control.dt);

        Ok(Self {
            config,
            legs,
            estimator,
            scheduler,
            planner,
            optimizer,
            safety,
            staleness,
            clock,
            handlers: ModeHandlers::default(),
            mode: Mode::Passive,
            contact: ContactState::default(),
            body: BodyState::default(),
            last_commands: JointCommands::zero(),
            consecutive_failures: 0,
        })
    }

    /// Active mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Latest body-state estimate.
    #[must_use]
    pub const fn body(&self) -> &BodyState {
        &self.body
    }

    /// Latest scheduler output.
    #[must_use]
    pub const fn contact(&self) -> &ContactState {
        &self.contact
    }

    /// The immutable configuration.
    #[must_use]
    pub const fn config(&self) -> &StriderConfig {
        &self.config
    }

    /// Completed control ticks.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.clock.ticks()
    }

    /// The previous tick's joint commands.
    #[must_use]
    pub const fn last_commands(&self) -> &JointCommands {
        &self.last_commands
    }

    /// Whether the fixed-stand interpolation has settled (for scripted
    /// sequencing: stand, wait, then walk).
    #[must_use]
    pub fn stand_settled(&self) -> bool {
        self.mode == Mode::FixedStand && self.handlers.stand_settled(&self.config)
    }

    /// Run one control tick.
    pub fn tick(&mut self, command: &UserCommand, sample: &SensorSample) -> TickOutput {
        let dt = self.config.control.dt;

        // 1. Sensor freshness, then estimation against last tick's contact
        //    assignment.
        let staleness = self.staleness.observe(sample.fresh);
        self.body = self.estimator.update(sample, &self.contact, dt);
        let estimator_status = self.estimator.status();

        // 2. Safety checks on the fresh estimate.
        let safety = self.safety.check(&self.body, staleness);

        // 3. Resolve the next mode. Emergency and safety outrank everything;
        //    repeated solver failure escalates; user requests go through the
        //    transition table.
        let previous_mode = self.mode;
        let mut next_mode = previous_mode;

        if command.emergency_stop || safety.is_some() {
            if previous_mode != Mode::Passive {
                warn!(
                    mode = previous_mode.label(),
                    emergency = command.emergency_stop,
                    ?safety,
                    "forcing passive"
                );
            }
            next_mode = Mode::Passive;
        } else if self.consecutive_failures >= self.config.control.max_consecutive_failures
            && previous_mode != Mode::Passive
        {
            warn!(
                failures = self.consecutive_failures,
                "balance solve failing persistently; forcing passive"
            );
            next_mode = Mode::Passive;
        } else if let Some(request) = command.mode_request {
            let requested = Mode::from(request);
            if transition_allowed(previous_mode, requested) {
                next_mode = requested;
            }
        }

        // 4. Exit/enter hooks on a transition, then run the active mode.
        let output = {
            let mut pipeline = Pipeline {
                config: &self.config,
                legs: &self.legs,
                scheduler: &mut self.scheduler,
                planner: &mut self.planner,
                optimizer: &mut self.optimizer,
                body: &self.body,
                sample,
                command,
                contact: &mut self.contact,
            };

            if next_mode != previous_mode {
                self.handlers.behavior_mut(previous_mode).exit();
                self.handlers.behavior_mut(next_mode).enter(&mut pipeline);
                info!(
                    from = previous_mode.label(),
                    to = next_mode.label(),
                    "mode transition"
                );
            }

            self.handlers.behavior_mut(next_mode).run(&mut pipeline)
        };
        self.mode = next_mode;

        // 5. Degraded-solve accounting.
        self.consecutive_failures = match output.solve {
            Some(SolveStatus::Degraded) => self.consecutive_failures.saturating_add(1),
            _ => 0,
        };
        if next_mode == Mode::Passive {
            self.consecutive_failures = 0;
        }

        self.clock.advance();
        self.last_commands = output.commands;

        TickOutput {
            commands: output.commands,
            mode: self.mode,
            body: self.body.clone(),
            status: TickStatus {
                solve: output.solve,
                estimator: estimator_status,
                safety,
                staleness,
                consecutive_failures: self.consecutive_failures,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};
    use strider_core::types::{ModeRequest, JOINTS_PER_LEG};

    /// Joints posed at the nominal stand, resting IMU, fresh exchange.
    fn standing_sample(config: &StriderConfig) -> SensorSample {
        let mut sample = SensorSample::default();
        for leg in LegId::ALL {
            let kin = LegKinematics::new(&config.robot, leg);
            let q = kin.joint_angles(&config.robot.nominal_foot_position(leg));
            let base = leg.joint_base();
            for j in 0..JOINTS_PER_LEG {
                sample.joints[base + j].position = q[j];
            }
        }
        sample
    }

    fn context() -> ControlContext {
        ControlContext::new(StriderConfig::default()).unwrap()
    }

    fn request(mode: ModeRequest) -> UserCommand {
        UserCommand {
            mode_request: Some(mode),
            ..UserCommand::default()
        }
    }

    /// Drive the context into FixedStand and let the interpolation settle.
    fn stand_up(ctx: &mut ControlContext, sample: &SensorSample) {
        ctx.tick(&request(ModeRequest::FixedStand), sample);
        let ticks = ctx.config().control.stand_ticks();
        for _ in 0..ticks {
            ctx.tick(&UserCommand::default(), sample);
        }
        assert!(ctx.stand_settled());
    }

    #[test]
    fn rejects_invalid_configuration() {
        let mut config = StriderConfig::default();
        config.control.dt = -1.0;
        assert!(ControlContext::new(config).is_err());
    }

    #[test]
    fn starts_passive_with_damping_only() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        let out = ctx.tick(&UserCommand::default(), &sample);

        assert_eq!(out.mode, Mode::Passive);
        for joint in &out.commands.joints {
            assert!(joint.torque.abs() < f64::EPSILON);
            assert!(joint.kp.abs() < f64::EPSILON);
            assert!(joint.kd > 0.0);
        }
    }

    #[test]
    fn invalid_request_is_ignored() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        // Trotting straight from Passive is not in the table.
        let out = ctx.tick(&request(ModeRequest::Trotting), &sample);
        assert_eq!(out.mode, Mode::Passive);
    }

    #[test]
    fn fixed_stand_interpolates_to_nominal_pose() {
        let mut ctx = context();
        let config = ctx.config().clone();
        // Joints folded, not at the stand pose.
        let sample = SensorSample::default();

        let first = ctx.tick(&request(ModeRequest::FixedStand), &sample);
        assert_eq!(first.mode, Mode::FixedStand);
        // One tick in: commands barely moved from the snapshot.
        let ticks = config.control.stand_ticks() as f64;
        for joint in &first.commands.joints {
            assert!(joint.position.abs() <= 1.0 / ticks * 3.0 + 1e-9);
            assert!((joint.kp - config.control.joint_kp).abs() < f64::EPSILON);
        }

        for _ in 0..config.control.stand_ticks() {
            ctx.tick(&UserCommand::default(), &sample);
        }

        // Settled on the IK solution for the nominal feet.
        let out = ctx.tick(&UserCommand::default(), &sample);
        for leg in LegId::ALL {
            let kin = LegKinematics::new(&config.robot, leg);
            let expected = kin.joint_angles(&config.robot.nominal_foot_position(leg));
            let base = leg.joint_base();
            for j in 0..JOINTS_PER_LEG {
                assert!(
                    (out.commands.joints[base + j].position - expected[j]).abs() < 1e-9,
                    "leg {leg:?} joint {j}"
                );
            }
        }
    }

    #[test]
    fn emergency_reaches_passive_in_one_tick_from_any_mode() {
        let emergency = UserCommand {
            emergency_stop: true,
            ..UserCommand::default()
        };

        for target in [
            ModeRequest::FreeStand,
            ModeRequest::Trotting,
            ModeRequest::BalanceTest,
            ModeRequest::SwingTest,
            ModeRequest::StepTest,
            ModeRequest::ExternalNavigation,
        ] {
            let mut ctx = context();
            let sample = standing_sample(ctx.config());
            stand_up(&mut ctx, &sample);
            let entered = ctx.tick(&request(target), &sample);
            assert_eq!(entered.mode, Mode::from(target), "setup for {target:?}");

            // Emergency overrides a simultaneous conflicting request.
            let out = ctx.tick(
                &UserCommand {
                    mode_request: Some(ModeRequest::Trotting),
                    ..emergency
                },
                &sample,
            );
            assert_eq!(out.mode, Mode::Passive, "from {target:?}");
        }
    }

    #[test]
    fn excessive_tilt_forces_passive() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);

        let mut tilted = sample.clone();
        tilted.imu.orientation = UnitQuaternion::from_euler_angles(0.9, 0.0, 0.0);
        let out = ctx.tick(&UserCommand::default(), &tilted);
        assert_eq!(out.mode, Mode::Passive);
        assert!(matches!(
            out.status.safety,
            Some(SafetyEvent::ExcessiveTilt { .. })
        ));
    }

    #[test]
    fn sensor_staleness_escalates_to_passive() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);

        let mut stale = sample.clone();
        stale.fresh = false;

        let tolerance = ctx.config().control.max_stale_ticks;
        for i in 0..tolerance {
            let out = ctx.tick(&UserCommand::default(), &stale);
            assert_eq!(out.mode, Mode::FixedStand, "still tolerated at {i}");
        }
        let out = ctx.tick(&UserCommand::default(), &stale);
        assert_eq!(out.mode, Mode::Passive);
        assert!(matches!(
            out.status.safety,
            Some(SafetyEvent::SensorTimeout { .. })
        ));
    }

    #[test]
    fn persistent_solve_failure_escalates_to_passive() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);
        ctx.tick(&request(ModeRequest::Trotting), &sample);

        ctx.consecutive_failures = ctx.config().control.max_consecutive_failures;
        let out = ctx.tick(&UserCommand::default(), &sample);
        assert_eq!(out.mode, Mode::Passive);
        assert_eq!(out.status.consecutive_failures, 0);
    }

    #[test]
    fn trotting_alternates_contact_assignment() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);

        let out = ctx.tick(&request(ModeRequest::Trotting), &sample);
        assert_eq!(out.mode, Mode::Trotting);
        assert!(out.status.solve.is_some());

        // Over one trot period the FR leg must see both stance and swing.
        let period = ctx.config().gait.trot.period;
        let steps = (period / ctx.config().control.dt) as usize + 2;
        let mut saw_stance = false;
        let mut saw_swing = false;
        for _ in 0..steps {
            ctx.tick(&UserCommand::default(), &sample);
            if ctx.contact().in_stance(LegId::FrontRight) {
                saw_stance = true;
            } else {
                saw_swing = true;
            }
        }
        assert!(saw_stance && saw_swing);
    }

    #[test]
    fn trotting_commands_split_by_contact() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);
        ctx.tick(&request(ModeRequest::Trotting), &sample);

        // Advance a quarter period so the trot is mid-segment.
        let quarter = (ctx.config().gait.trot.period / ctx.config().control.dt / 4.0) as usize;
        let mut out = None;
        for _ in 0..quarter {
            out = Some(ctx.tick(&UserCommand::default(), &sample));
        }
        let out = out.unwrap();

        for leg in LegId::ALL {
            let base = leg.joint_base();
            if ctx.contact().in_stance(leg) {
                // Torque mode: no position gain.
                assert!(out.commands.joints[base].kp.abs() < f64::EPSILON, "{leg:?}");
            } else {
                // Swing servo tracks the trajectory.
                assert!(
                    (out.commands.joints[base].kp
                        - ctx.config().control.swing_joint_kp)
                        .abs()
                        < f64::EPSILON,
                    "{leg:?}"
                );
            }
        }
    }

    #[test]
    fn balance_test_commands_all_torque() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);

        let out = ctx.tick(&request(ModeRequest::BalanceTest), &sample);
        assert_eq!(out.mode, Mode::BalanceTest);
        assert!(out.status.solve.is_some());
        for joint in &out.commands.joints {
            assert!(joint.kp.abs() < f64::EPSILON);
        }
    }

    #[test]
    fn swing_test_unloads_front_right() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);

        ctx.tick(&request(ModeRequest::SwingTest), &sample);
        assert!(!ctx.contact().in_stance(LegId::FrontRight));
        assert!(ctx.contact().in_stance(LegId::FrontLeft));
    }

    #[test]
    fn step_test_runs_gait_in_place() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);

        let out = ctx.tick(&request(ModeRequest::StepTest), &sample);
        assert_eq!(out.mode, Mode::StepTest);
        assert!(out.status.solve.is_some());

        // Stepping in place still schedules swing segments.
        let period = ctx.config().gait.trot.period;
        let steps = (period / ctx.config().control.dt) as usize;
        let mut saw_swing = false;
        for _ in 0..steps {
            ctx.tick(&UserCommand::default(), &sample);
            if ctx.contact().stance_count() < 4 {
                saw_swing = true;
            }
        }
        assert!(saw_swing);
    }

    #[test]
    fn external_navigation_consumes_nav_velocity() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);

        let out = ctx.tick(&request(ModeRequest::ExternalNavigation), &sample);
        assert_eq!(out.mode, Mode::ExternalNavigation);
        assert!(out.status.solve.is_some());

        let nav = UserCommand {
            nav_velocity: Vector3::new(0.4, 0.0, 0.0),
            nav_yaw_rate: 0.1,
            ..UserCommand::default()
        };
        let out = ctx.tick(&nav, &sample);
        assert_eq!(out.mode, Mode::ExternalNavigation);
        assert!(out.status.solve.is_some());
    }

    #[test]
    fn recovery_path_passive_to_stand() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);
        ctx.tick(&request(ModeRequest::Trotting), &sample);

        // Drop to passive, then stand again.
        ctx.tick(
            &UserCommand {
                emergency_stop: true,
                ..UserCommand::default()
            },
            &sample,
        );
        assert_eq!(ctx.mode(), Mode::Passive);

        let out = ctx.tick(&request(ModeRequest::FixedStand), &sample);
        assert_eq!(out.mode, Mode::FixedStand);
    }

    #[test]
    fn body_state_updates_every_tick() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        let mut last_ticks = ctx.ticks();
        for _ in 0..5 {
            let out = ctx.tick(&UserCommand::default(), &sample);
            assert_eq!(ctx.ticks(), last_ticks + 1);
            last_ticks = ctx.ticks();
            assert!(out.body.position.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn free_stand_tracks_posture_command() {
        let mut ctx = context();
        let sample = standing_sample(ctx.config());
        stand_up(&mut ctx, &sample);

        ctx.tick(&request(ModeRequest::FreeStand), &sample);

        let neutral = ctx.tick(&UserCommand::default(), &sample);
        let mut posed = UserCommand::default();
        posed.posture.pitch = 0.2;
        let pitched = ctx.tick(&posed, &sample);

        // A pitch command must move the hip joints away from neutral.
        let diff: f64 = neutral
            .commands
            .joints
            .iter()
            .zip(pitched.commands.joints.iter())
            .map(|(a, b)| (a.position - b.position).abs())
            .sum();
        assert!(diff > 0.01, "posture command had no effect: {diff}");
    }
}
