//! Whole-body mapping from foot forces to joint torques.
//!
//! Stance legs turn solved ground reaction forces into torques through the
//! leg Jacobian transpose; swing legs get a Cartesian PD force toward their
//! trajectory, mapped through the same transpose.
//!
//! All forces here are expressed in the body frame — the caller rotates
//! world-frame quantities before mapping, since the leg Jacobian lives in
//! the body/hip frame.

use nalgebra::{Matrix3, Vector3};

/// Stance torques for one leg: `tau = J^T (-f)`.
///
/// `f` is the ground reaction force acting *on* the foot; the actuators
/// must press the foot against the ground with the opposite force.
#[must_use]
pub fn stance_torques(jacobian: &Matrix3<f64>, force: &Vector3<f64>) -> Vector3<f64> {
    jacobian.transpose() * (-force)
}

/// Swing torques for one leg: `tau = J^T f`.
///
/// `f` is the virtual force pushing the foot along its trajectory.
#[must_use]
pub fn swing_torques(jacobian: &Matrix3<f64>, force: &Vector3<f64>) -> Vector3<f64> {
    jacobian.transpose() * force
}

/// Cartesian PD force tracking a swing-foot trajectory.
#[must_use]
pub fn swing_tracking_force(
    kp: &Vector3<f64>,
    kd: &Vector3<f64>,
    position_error: &Vector3<f64>,
    velocity_error: &Vector3<f64>,
) -> Vector3<f64> {
    kp.component_mul(position_error) + kd.component_mul(velocity_error)
}
