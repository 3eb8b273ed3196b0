//! Core data model shared across the control pipeline.
//!
//! Every type here is a plain value: the control loop owns one copy of each
//! and mutates it in a fixed order per tick. Nothing in this module talks to
//! hardware; sensor snapshots come in from the transport collaborator and
//! joint commands go back out to it.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Number of legs.
pub const LEG_COUNT: usize = 4;

/// Actuated joints per leg: abduction, hip, knee.
pub const JOINTS_PER_LEG: usize = 3;

/// Total actuated joints.
pub const JOINT_COUNT: usize = LEG_COUNT * JOINTS_PER_LEG;

// ---------------------------------------------------------------------------
// LegId
// ---------------------------------------------------------------------------

/// Leg identifiers, in joint-vector order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegId {
    FrontRight = 0,
    FrontLeft = 1,
    RearRight = 2,
    RearLeft = 3,
}

impl LegId {
    /// All legs in index order.
    pub const ALL: [Self; LEG_COUNT] = [
        Self::FrontRight,
        Self::FrontLeft,
        Self::RearRight,
        Self::RearLeft,
    ];

    /// Index into per-leg arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// +1 for left legs, -1 for right legs (lateral mirror sign).
    #[must_use]
    pub const fn side_sign(self) -> f64 {
        match self {
            Self::FrontLeft | Self::RearLeft => 1.0,
            Self::FrontRight | Self::RearRight => -1.0,
        }
    }

    /// +1 for front legs, -1 for rear legs.
    #[must_use]
    pub const fn fore_sign(self) -> f64 {
        match self {
            Self::FrontRight | Self::FrontLeft => 1.0,
            Self::RearRight | Self::RearLeft => -1.0,
        }
    }

    /// First joint index of this leg in the flat joint vector.
    #[must_use]
    pub const fn joint_base(self) -> usize {
        self.index() * JOINTS_PER_LEG
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FrontRight => "FR",
            Self::FrontLeft => "FL",
            Self::RearRight => "RR",
            Self::RearLeft => "RL",
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor input
// ---------------------------------------------------------------------------

/// Measured state of one joint, read-only to the core.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointState {
    /// Joint angle in rad.
    pub position: f64,
    /// Joint angular velocity in rad/s.
    pub velocity: f64,
    /// Measured or estimated joint torque in Nm.
    pub torque: f64,
}

/// One IMU reading.
#[derive(Clone, Copy, Debug)]
pub struct ImuSample {
    /// Body orientation in the world frame.
    pub orientation: UnitQuaternion<f64>,
    /// Body angular velocity in the body frame, rad/s.
    pub angular_velocity: Vector3<f64>,
    /// Specific force in the body frame, m/s^2 (gravity not removed).
    pub linear_acceleration: Vector3<f64>,
}

impl Default for ImuSample {
    fn default() -> Self {
        Self {
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
            // At rest the accelerometer reads +g along body z.
            linear_acceleration: Vector3::new(0.0, 0.0, 9.81),
        }
    }
}

/// Read-only snapshot of all sensors for one tick.
#[derive(Clone, Debug)]
pub struct SensorSample {
    /// Per-joint measurements, `[leg][joint]` flattened via [`LegId::joint_base`].
    pub joints: [JointState; JOINT_COUNT],
    /// Inertial measurement.
    pub imu: ImuSample,
    /// Per-leg contact indicator from foot sensors, if the robot has them.
    /// `None` means the scheduler's planned contact state is trusted as-is.
    pub foot_contact: Option<[bool; LEG_COUNT]>,
    /// True if this snapshot is a fresh exchange with the transport layer,
    /// false if the previous sample was re-used.
    pub fresh: bool,
}

impl Default for SensorSample {
    fn default() -> Self {
        Self {
            joints: [JointState::default(); JOINT_COUNT],
            imu: ImuSample::default(),
            foot_contact: None,
            fresh: true,
        }
    }
}

impl SensorSample {
    /// Joint states of one leg, in (abduction, hip, knee) order.
    #[must_use]
    pub fn leg_joints(&self, leg: LegId) -> [JointState; JOINTS_PER_LEG] {
        let base = leg.joint_base();
        [
            self.joints[base],
            self.joints[base + 1],
            self.joints[base + 2],
        ]
    }

    /// Joint angles of one leg as a vector.
    #[must_use]
    pub fn leg_angles(&self, leg: LegId) -> Vector3<f64> {
        let q = self.leg_joints(leg);
        Vector3::new(q[0].position, q[1].position, q[2].position)
    }

    /// Joint velocities of one leg as a vector.
    #[must_use]
    pub fn leg_velocities(&self, leg: LegId) -> Vector3<f64> {
        let q = self.leg_joints(leg);
        Vector3::new(q[0].velocity, q[1].velocity, q[2].velocity)
    }
}

// ---------------------------------------------------------------------------
// BodyState
// ---------------------------------------------------------------------------

/// Estimated body state in the world/odometry frame.
///
/// Owned and mutated exclusively by the state estimator; everything
/// downstream reads it. Updated exactly once per tick.
#[derive(Clone, Debug)]
pub struct BodyState {
    /// Body position, m.
    pub position: Vector3<f64>,
    /// Body linear velocity, m/s.
    pub velocity: Vector3<f64>,
    /// Body orientation (world from body).
    pub orientation: UnitQuaternion<f64>,
    /// Body angular velocity in the body frame, rad/s.
    pub angular_velocity: Vector3<f64>,
}

impl Default for BodyState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
        }
    }
}

impl BodyState {
    /// Roll and pitch magnitude, rad. Used by the safety monitor.
    #[must_use]
    pub fn tilt(&self) -> f64 {
        let (roll, pitch, _yaw) = self.orientation.euler_angles();
        roll.hypot(pitch)
    }
}

// ---------------------------------------------------------------------------
// ContactState
// ---------------------------------------------------------------------------

/// Stance/swing status and segment-local phase of one leg.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LegPhase {
    /// True while the foot is assumed loaded on the ground.
    pub stance: bool,
    /// Phase normalized to `[0, 1)` within the current stance or swing
    /// segment. Continuous except on gait-pattern change or reset.
    pub phase: f64,
}

/// Output of the phase scheduler for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactState {
    /// Per-leg stance flag and segment phase.
    pub legs: [LegPhase; LEG_COUNT],
    /// Stance segment duration of the active pattern, seconds.
    pub stance_duration: f64,
    /// Swing segment duration of the active pattern, seconds (zero for a
    /// full-stance pattern).
    pub swing_duration: f64,
    /// Incremented whenever the pattern switches or the cycle is reset.
    /// Consumers drop per-segment memory when this changes.
    pub epoch: u64,
}

impl Default for ContactState {
    fn default() -> Self {
        Self {
            legs: [LegPhase {
                stance: true,
                phase: 0.0,
            }; LEG_COUNT],
            stance_duration: 0.0,
            swing_duration: 0.0,
            epoch: 0,
        }
    }
}

impl ContactState {
    /// Number of legs currently in stance.
    #[must_use]
    pub fn stance_count(&self) -> usize {
        self.legs.iter().filter(|l| l.stance).count()
    }

    /// Stance flag for one leg.
    #[must_use]
    pub fn in_stance(&self, leg: LegId) -> bool {
        self.legs[leg.index()].stance
    }

    /// Segment-local phase for one leg.
    #[must_use]
    pub fn phase(&self, leg: LegId) -> f64 {
        self.legs[leg.index()].phase
    }
}

// ---------------------------------------------------------------------------
// FootTarget
// ---------------------------------------------------------------------------

/// Desired Cartesian state of one foot in the world frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FootTarget {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// Wrench
// ---------------------------------------------------------------------------

/// Combined force and torque acting on the body, world frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Wrench {
    /// Force, N.
    pub force: Vector3<f64>,
    /// Torque about the body center, Nm.
    pub torque: Vector3<f64>,
}

impl Wrench {
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Pack as `[force; torque]` for cost construction.
    #[must_use]
    pub fn to_vector6(&self) -> nalgebra::Vector6<f64> {
        nalgebra::Vector6::new(
            self.force.x,
            self.force.y,
            self.force.z,
            self.torque.x,
            self.torque.y,
            self.torque.z,
        )
    }
}

// ---------------------------------------------------------------------------
// JointCommand
// ---------------------------------------------------------------------------

/// Actuator command for one joint: position/velocity targets, feed-forward
/// torque and servo gains. One record per joint per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointCommand {
    /// Target position, rad.
    pub position: f64,
    /// Target velocity, rad/s.
    pub velocity: f64,
    /// Feed-forward torque, Nm.
    pub torque: f64,
    /// Proportional gain, Nm/rad.
    pub kp: f64,
    /// Derivative gain, Nm·s/rad.
    pub kd: f64,
}

/// The full joint command set — the sole output artifact of a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointCommands {
    pub joints: [JointCommand; JOINT_COUNT],
}

impl JointCommands {
    /// All-zero command: zero torque, zero gains. The passive fallback.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Pure joint-space damping at the given gain, no position tracking.
    #[must_use]
    pub fn damping(kd: f64) -> Self {
        let mut cmd = Self::default();
        for joint in &mut cmd.joints {
            joint.kd = kd;
        }
        cmd
    }

    /// Mutable view of one leg's commands.
    pub fn leg_mut(&mut self, leg: LegId) -> &mut [JointCommand] {
        let base = leg.joint_base();
        &mut self.joints[base..base + JOINTS_PER_LEG]
    }

    /// Set one leg to position servo mode.
    pub fn set_leg_position(
        &mut self,
        leg: LegId,
        q: Vector3<f64>,
        qd: Vector3<f64>,
        kp: f64,
        kd: f64,
    ) {
        for (i, joint) in self.leg_mut(leg).iter_mut().enumerate() {
            joint.position = q[i];
            joint.velocity = qd[i];
            joint.torque = 0.0;
            joint.kp = kp;
            joint.kd = kd;
        }
    }

    /// Set one leg to feed-forward torque mode with velocity damping.
    pub fn set_leg_torque(&mut self, leg: LegId, tau: Vector3<f64>, kd: f64) {
        for (i, joint) in self.leg_mut(leg).iter_mut().enumerate() {
            joint.position = 0.0;
            joint.velocity = 0.0;
            joint.torque = tau[i];
            joint.kp = 0.0;
            joint.kd = kd;
        }
    }
}

// ---------------------------------------------------------------------------
// UserCommand
// ---------------------------------------------------------------------------

/// Discrete mode-change requests from the input device.
///
/// Mirrors the mode set one-to-one; the state machine validates each request
/// against its transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeRequest {
    Passive,
    FixedStand,
    FreeStand,
    Trotting,
    BalanceTest,
    SwingTest,
    StepTest,
    ExternalNavigation,
}

/// Body posture offsets for the free-stand and balance-test modes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PostureCommand {
    /// Roll offset, rad.
    pub roll: f64,
    /// Pitch offset, rad.
    pub pitch: f64,
    /// Yaw offset, rad.
    pub yaw: f64,
    /// Height offset from the configured stand height, m.
    pub height: f64,
}

/// User input sampled once per tick, last value wins.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UserCommand {
    /// Pending mode-change request, if any.
    pub mode_request: Option<ModeRequest>,
    /// Emergency stop. Evaluated before everything else, forces Passive.
    pub emergency_stop: bool,
    /// Commanded planar body velocity (x forward, y left), m/s.
    pub velocity: Vector3<f64>,
    /// Commanded yaw rate, rad/s.
    pub yaw_rate: f64,
    /// Posture offsets for the posture-driven modes.
    pub posture: PostureCommand,
    /// Velocity command from the external navigation stack, consumed only
    /// by the external-navigation mode.
    pub nav_velocity: Vector3<f64>,
    /// Yaw-rate command from the external navigation stack.
    pub nav_yaw_rate: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
