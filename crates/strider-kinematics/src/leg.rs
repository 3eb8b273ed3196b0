//! Closed-form kinematics for one 3-DoF leg.
//!
//! The chain is abduction (about x), hip pitch (about y), knee pitch
//! (about y), with the abduction link offset laterally and the thigh and
//! calf extending downward. Geometry is fixed configuration, so forward
//! kinematics, inverse kinematics and the 3×3 translational Jacobian are
//! all closed form — no model loading, no iteration.
//!
//! Everything here is a pure function of joint angles and geometry; the
//! struct holds only the per-leg constants.

use nalgebra::{Matrix3, Vector3};

use strider_core::config::RobotConfig;
use strider_core::types::LegId;

/// Numerical floor used when clamping targets into the workspace.
const WORKSPACE_EPS: f64 = 1e-6;

/// Kinematics of a single leg, expressed in the hip frame (axes parallel
/// to the body frame, origin at the hip pivot).
#[derive(Clone, Debug)]
pub struct LegKinematics {
    /// Lateral abduction offset with the side sign folded in.
    abd: f64,
    /// Thigh length.
    thigh: f64,
    /// Calf length.
    calf: f64,
    /// Hip pivot position in the body frame.
    hip_offset: Vector3<f64>,
}

impl LegKinematics {
    /// Build the kinematics for one leg from the robot geometry.
    #[must_use]
    pub fn new(config: &RobotConfig, leg: LegId) -> Self {
        Self {
            abd: leg.side_sign() * config.abduction_offset,
            thigh: config.thigh_length,
            calf: config.calf_length,
            hip_offset: config.hip_position(leg),
        }
    }

    /// Hip pivot position in the body frame.
    #[must_use]
    pub fn hip_offset(&self) -> Vector3<f64> {
        self.hip_offset
    }

    /// Maximum hip-to-foot distance.
    #[must_use]
    pub fn leg_length(&self) -> f64 {
        self.thigh + self.calf
    }

    /// Foot position in the hip frame for joint angles `q = (abd, hip, knee)`.
    #[must_use]
    pub fn foot_position_hip(&self, q: &Vector3<f64>) -> Vector3<f64> {
        let (s0, c0) = q[0].sin_cos();
        let (xp, zp) = self.planar_foot(q[1], q[2]);
        Vector3::new(
            xp,
            self.abd * c0 - zp * s0,
            self.abd * s0 + zp * c0,
        )
    }

    /// Foot position in the body frame.
    #[must_use]
    pub fn foot_position_body(&self, q: &Vector3<f64>) -> Vector3<f64> {
        self.hip_offset + self.foot_position_hip(q)
    }

    /// Translational Jacobian mapping joint rates to hip-frame foot velocity.
    ///
    /// Transposed, it maps a foot force to joint torques.
    #[must_use]
    pub fn jacobian(&self, q: &Vector3<f64>) -> Matrix3<f64> {
        let (s0, c0) = q[0].sin_cos();
        let (xp, zp) = self.planar_foot(q[1], q[2]);
        let c12 = (q[1] + q[2]).cos();
        let s12 = (q[1] + q[2]).sin();

        let py = self.abd * c0 - zp * s0;
        let pz = self.abd * s0 + zp * c0;

        Matrix3::new(
            0.0, zp, -self.calf * c12,
            -pz, s0 * xp, -s0 * self.calf * s12,
            py, -c0 * xp, c0 * self.calf * s12,
        )
    }

    /// Foot velocity in the hip frame: `J(q) * qd`.
    #[must_use]
    pub fn foot_velocity(&self, q: &Vector3<f64>, qd: &Vector3<f64>) -> Vector3<f64> {
        self.jacobian(q) * qd
    }

    /// Inverse kinematics for a body-frame foot target.
    ///
    /// Returns the knee-flexed solution. Targets outside the workspace are
    /// clamped to the nearest reachable configuration rather than rejected;
    /// the caller bounds its targets to the reach radius anyway.
    #[must_use]
    pub fn joint_angles(&self, foot_body: &Vector3<f64>) -> Vector3<f64> {
        let p = foot_body - self.hip_offset;

        // Lateral plane: recover abduction.
        let lat_sq = (p.y * p.y + p.z * p.z - self.abd * self.abd).max(WORKSPACE_EPS);
        let zp = -lat_sq.sqrt();
        let q0 = p.z.atan2(p.y) - zp.atan2(self.abd);

        // Sagittal plane: standard two-link solution for (u, v) = (-xp, -zp).
        let u = -p.x;
        let v = -zp;
        let reach_sq = u * u + v * v;
        let c2 = ((reach_sq - self.thigh * self.thigh - self.calf * self.calf)
            / (2.0 * self.thigh * self.calf))
            .clamp(-1.0, 1.0);
        let q2 = -c2.acos();
        let (s2, _) = q2.sin_cos();
        let q1 = u.atan2(v) - (self.calf * s2).atan2(self.thigh + self.calf * c2);

        Vector3::new(normalize_angle(q0), normalize_angle(q1), q2)
    }

    /// Joint rates realizing a hip-frame foot velocity: `J(q)^-1 * v`.
    ///
    /// Near a kinematic singularity (fully extended or folded leg) the
    /// Jacobian loses rank; the rates fall back to zero there instead of
    /// blowing up.
    #[must_use]
    pub fn joint_velocities(&self, q: &Vector3<f64>, foot_velocity: &Vector3<f64>) -> Vector3<f64> {
        self.jacobian(q)
            .try_inverse()
            .map_or_else(Vector3::zeros, |inv| inv * foot_velocity)
    }

    /// Planar (sagittal) foot coordinates before the abduction rotation.
    fn planar_foot(&self, q1: f64, q2: f64) -> (f64, f64) {
        let xp = -self.thigh * q1.sin() - self.calf * (q1 + q2).sin();
        let zp = -self.thigh * q1.cos() - self.calf * (q1 + q2).cos();
        (xp, zp)
    }
}

/// Wrap an angle into `(-pi, pi]`.
fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle % std::f64::consts::TAU;
    if wrapped > std::f64::consts::PI {
        wrapped - std::f64::consts::TAU
    } else if wrapped <= -std::f64::consts::PI {
        wrapped + std::f64::consts::TAU
    } else {
        wrapped
    }
}
