//! Deterministic surrogate plant for headless scenario runs.
//!
//! Stands in for the hardware/simulation transport collaborator: consumes
//! joint commands, integrates a minimal rigid-body model, and produces the
//! next sensor snapshot. Attitude is held level (no rotational dynamics) —
//! enough to close the loop for scripted scenarios, nowhere near a physics
//! engine, and deliberately kept outside the control core.
//!
//! Two support regimes per tick:
//! - Legs under joint servos (position gains set): joints track their
//!   targets with a rate limit; the body rests kinematically on the lowest
//!   feet.
//! - Legs under torque control (stance during gait/balance modes): the
//!   commanded torques are mapped back through the Jacobian to foot forces,
//!   the body integrates those forces, and the pinned feet dictate the
//!   joint angles by inverse kinematics.

use nalgebra::Vector3;

use strider_core::config::StriderConfig;
use strider_core::types::{
    ImuSample, JointCommands, LegId, SensorSample, JOINTS_PER_LEG, LEG_COUNT,
};
use strider_kinematics::LegKinematics;

/// Servo tracking rate limit, rad/s.
const SERVO_RATE: f64 = 12.0;
/// A leg is torque-controlled when its gains are zero and any feed-forward
/// torque is present.
const TORQUE_EPS: f64 = 1e-9;

pub struct SurrogatePlant {
    config: StriderConfig,
    legs: [LegKinematics; LEG_COUNT],

    position: Vector3<f64>,
    velocity: Vector3<f64>,
    accel: Vector3<f64>,
    joint_positions: [f64; 12],
    joint_velocities: [f64; 12],
    /// World anchor of each pinned stance foot.
    anchors: [Option<Vector3<f64>>; LEG_COUNT],
}

impl SurrogatePlant {
    /// Start with straight legs standing on flat ground.
    #[must_use]
    pub fn new(config: &StriderConfig) -> Self {
        let legs = LegId::ALL.map(|leg| LegKinematics::new(&config.robot, leg));
        let leg_length = config.robot.thigh_length + config.robot.calf_length;
        Self {
            config: config.clone(),
            legs,
            position: Vector3::new(0.0, 0.0, leg_length),
            velocity: Vector3::zeros(),
            accel: Vector3::zeros(),
            joint_positions: [0.0; 12],
            joint_velocities: [0.0; 12],
            anchors: [None; LEG_COUNT],
        }
    }

    /// True body position (ground truth, for scenario checks).
    #[must_use]
    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    /// True body velocity.
    #[must_use]
    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    /// Current sensor snapshot.
    #[must_use]
    pub fn sample(&self) -> SensorSample {
        let mut sample = SensorSample::default();
        for j in 0..12 {
            sample.joints[j].position = self.joint_positions[j];
            sample.joints[j].velocity = self.joint_velocities[j];
        }
        let gravity = self.config.estimator.gravity;
        sample.imu = ImuSample {
            orientation: nalgebra::UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
            // Specific force with a level body: world accel plus +g up.
            linear_acceleration: self.accel + Vector3::new(0.0, 0.0, gravity),
        };
        let mut contact = [false; LEG_COUNT];
        for leg in LegId::ALL {
            let foot = self.foot_world(leg);
            contact[leg.index()] = foot.z < 1e-3;
        }
        sample.foot_contact = Some(contact);
        sample
    }

    /// Apply one tick of joint commands and integrate.
    pub fn apply(&mut self, commands: &JointCommands, dt: f64) {
        let torque_legs = LegId::ALL.map(|leg| Self::is_torque_controlled(commands, leg));
        let any_torque = torque_legs.iter().any(|&t| t);

        let old_velocity = self.velocity;
        let old_joints = self.joint_positions;

        if any_torque {
            self.integrate_forces(commands, &torque_legs, dt);
        } else {
            self.track_servos(commands, dt);
            self.settle_on_feet(dt);
            self.anchors = [None; LEG_COUNT];
        }

        // Joint rates and the accelerometer by differentiation.
        for j in 0..12 {
            self.joint_velocities[j] = (self.joint_positions[j] - old_joints[j]) / dt;
        }
        self.accel = (self.velocity - old_velocity) / dt;
    }

    fn is_torque_controlled(commands: &JointCommands, leg: LegId) -> bool {
        let base = leg.joint_base();
        let joints = &commands.joints[base..base + JOINTS_PER_LEG];
        joints.iter().all(|j| j.kp.abs() < f64::EPSILON)
            && joints.iter().any(|j| j.torque.abs() > TORQUE_EPS)
    }

    fn foot_world(&self, leg: LegId) -> Vector3<f64> {
        let base = leg.joint_base();
        let q = Vector3::new(
            self.joint_positions[base],
            self.joint_positions[base + 1],
            self.joint_positions[base + 2],
        );
        self.position + self.legs[leg.index()].foot_position_body(&q)
    }

    /// Torque regime: recover foot forces from stance torques, integrate
    /// the body, pin stance feet, servo the rest.
    fn integrate_forces(
        &mut self,
        commands: &JointCommands,
        torque_legs: &[bool; LEG_COUNT],
        dt: f64,
    ) {
        let mass = self.config.robot.mass;
        let gravity = self.config.estimator.gravity;
        let mut total_force = Vector3::new(0.0, 0.0, -mass * gravity);

        for leg in LegId::ALL {
            let i = leg.index();
            if !torque_legs[i] {
                continue;
            }
            if self.anchors[i].is_none() {
                self.anchors[i] = Some(self.foot_world(leg));
            }

            let base = leg.joint_base();
            let q = Vector3::new(
                self.joint_positions[base],
                self.joint_positions[base + 1],
                self.joint_positions[base + 2],
            );
            let qd = Vector3::new(
                self.joint_velocities[base],
                self.joint_velocities[base + 1],
                self.joint_velocities[base + 2],
            );

            // Actuator law for torque mode: feed-forward minus damping.
            let mut tau = Vector3::zeros();
            for j in 0..JOINTS_PER_LEG {
                let cmd = commands.joints[base + j];
                tau[j] = cmd.torque - cmd.kd * qd[j];
            }

            // tau = J^T (-f)  =>  f = -(J^T)^-1 tau
            if let Some(jt_inv) = self.legs[i].jacobian(&q).transpose().try_inverse() {
                total_force += -(jt_inv * tau);
            }
        }

        self.velocity += total_force / mass * dt;
        self.position += self.velocity * dt;
        // The ground is rigid.
        if self.position.z < 0.05 {
            self.position.z = 0.05;
            self.velocity.z = self.velocity.z.max(0.0);
        }

        // Pinned stance feet dictate joint angles; swing legs servo.
        for leg in LegId::ALL {
            let i = leg.index();
            if torque_legs[i] {
                if let Some(anchor) = self.anchors[i] {
                    let q = self.legs[i].joint_angles(&(anchor - self.position));
                    let base = leg.joint_base();
                    for j in 0..JOINTS_PER_LEG {
                        self.joint_positions[base + j] = q[j];
                    }
                }
            } else {
                self.anchors[i] = None;
                self.track_leg_servo(commands, leg, dt);
            }
        }
    }

    /// Servo regime: all legs track their position targets.
    fn track_servos(&mut self, commands: &JointCommands, dt: f64) {
        for leg in LegId::ALL {
            self.track_leg_servo(commands, leg, dt);
        }
    }

    fn track_leg_servo(&mut self, commands: &JointCommands, leg: LegId, dt: f64) {
        let base = leg.joint_base();
        for j in 0..JOINTS_PER_LEG {
            let cmd = commands.joints[base + j];
            if cmd.kp.abs() < f64::EPSILON {
                // Passive/damped joint: hold.
                continue;
            }
            let error = cmd.position - self.joint_positions[base + j];
            let step = error.clamp(-SERVO_RATE * dt, SERVO_RATE * dt);
            self.joint_positions[base + j] += step;
        }
    }

    /// Kinematic support: the body rests on its lowest feet, no slip.
    fn settle_on_feet(&mut self, dt: f64) {
        let mut support = f64::NEG_INFINITY;
        for leg in LegId::ALL {
            let base = leg.joint_base();
            let q = Vector3::new(
                self.joint_positions[base],
                self.joint_positions[base + 1],
                self.joint_positions[base + 2],
            );
            let foot_body = self.legs[leg.index()].foot_position_body(&q);
            support = support.max(-foot_body.z);
        }
        if support.is_finite() {
            let new_z = support;
            self.velocity = Vector3::new(0.0, 0.0, (new_z - self.position.z) / dt);
            self.position.z = new_z;
        }
    }
}
