//! Contact-force balance optimizer.
//!
//! A PD law on body pose and velocity error produces a desired 6D wrench;
//! a per-tick quadratic program then distributes that wrench over the
//! stance-leg ground reaction forces:
//!
//! ```text
//! min  ||A f - w||^2_S + alpha ||f||^2 + lambda ||f - f_prev||^2
//! s.t. |f_x|, |f_y| <= mu f_z          (linearized friction pyramid)
//!      f_min <= f_z <= f_max           (unilateral, non-zero floor)
//! ```
//!
//! `A` maps each stance force to a net body wrench: identity rows for the
//! force balance, `skew(r_i)` rows for the moment of a force applied at
//! foot `i`. Swing legs are excluded from the decision vector entirely.
//!
//! The numeric solve is delegated to Clarabel behind this formulation
//! boundary, with a hard iteration bound so a pathological tick reports
//! infeasible instead of overrunning the loop deadline. Infeasibility is
//! recoverable: the previous solution is returned with a degraded flag.

use std::time::Instant;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::NonnegativeConeT,
};
use nalgebra::{DMatrix, DVector, Matrix3, UnitQuaternion, Vector3};
use tracing::warn;

use strider_core::config::{BalanceConfig, RobotConfig};
use strider_core::types::{BodyState, ContactState, LegId, Wrench, LEG_COUNT};

// ---------------------------------------------------------------------------
// Desired wrench
// ---------------------------------------------------------------------------

/// Body pose/velocity setpoint for the wrench PD law.
#[derive(Clone, Debug)]
pub struct PoseTarget {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    /// World-frame angular velocity target.
    pub angular_velocity: Vector3<f64>,
}

impl Default for PoseTarget {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
        }
    }
}

/// PD wrench on pose and velocity error, with gravity feed-forward so a
/// zero-error body still asks for its own weight.
#[must_use]
pub fn desired_wrench(
    config: &BalanceConfig,
    robot: &RobotConfig,
    gravity: f64,
    body: &BodyState,
    target: &PoseTarget,
) -> Wrench {
    let kp_p = Vector3::from(config.kp_position);
    let kd_p = Vector3::from(config.kd_position);
    let kp_o = Vector3::from(config.kp_orientation);
    let kd_o = Vector3::from(config.kd_orientation);

    let pos_err = target.position - body.position;
    let vel_err = target.velocity - body.velocity;
    let accel = kp_p.component_mul(&pos_err) + kd_p.component_mul(&vel_err);
    let force = robot.mass * (accel + Vector3::new(0.0, 0.0, gravity));

    // Orientation error as a world-frame rotation vector.
    let rot_err = (target.orientation * body.orientation.inverse()).scaled_axis();
    let omega_world = body.orientation * body.angular_velocity;
    let omega_err = target.angular_velocity - omega_world;
    let angular = kp_o.component_mul(&rot_err) + kd_o.component_mul(&omega_err);

    let rotation = body.orientation.to_rotation_matrix();
    let inertia_world = rotation * robot.inertia_matrix() * rotation.transpose();
    let torque = inertia_world * angular;

    Wrench { force, torque }
}

// ---------------------------------------------------------------------------
// ForceSolution
// ---------------------------------------------------------------------------

/// Outcome of one balance solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    /// Fresh feasible solution.
    Optimal,
    /// The QP did not converge within the iteration bound (or there were no
    /// stance legs); the previous solution was returned instead.
    Degraded,
}

/// Per-leg ground reaction forces for one tick, world frame.
#[derive(Clone, Debug)]
pub struct ForceSolution {
    pub forces: [Vector3<f64>; LEG_COUNT],
    pub status: SolveStatus,
    /// Wall-clock time of the numeric solve in microseconds.
    pub solve_time_us: u64,
}

// ---------------------------------------------------------------------------
// BalanceOptimizer
// ---------------------------------------------------------------------------

/// Formulates and solves the per-tick contact-force QP.
///
/// Holds the previous solution for smoothness regularization and as the
/// fallback when a solve degrades.
#[derive(Clone, Debug)]
pub struct BalanceOptimizer {
    config: BalanceConfig,
    prev: [Vector3<f64>; LEG_COUNT],
}

impl BalanceOptimizer {
    #[must_use]
    pub fn new(config: BalanceConfig) -> Self {
        Self {
            config,
            prev: [Vector3::zeros(); LEG_COUNT],
        }
    }

    /// Forget the previous solution (on mode entry).
    pub fn reset(&mut self) {
        self.prev = [Vector3::zeros(); LEG_COUNT];
    }

    /// Solve for stance-leg ground reaction forces realizing `wrench`.
    ///
    /// `feet` are world-frame foot positions. Swing legs get zero force and
    /// no decision variables.
    pub fn solve(
        &mut self,
        wrench: &Wrench,
        contact: &ContactState,
        body: &BodyState,
        feet: &[Vector3<f64>; LEG_COUNT],
    ) -> ForceSolution {
        let start = Instant::now();

        let stance: Vec<usize> = LegId::ALL
            .iter()
            .filter(|leg| contact.in_stance(**leg))
            .map(|leg| leg.index())
            .collect();

        if stance.is_empty() {
            warn!("balance solve with zero stance legs; returning previous solution");
            return ForceSolution {
                forces: self.prev,
                status: SolveStatus::Degraded,
                solve_time_us: elapsed_us(start),
            };
        }

        let n = 3 * stance.len();

        // Wrench map: identity force rows, skew(r_i) moment rows.
        let mut a = DMatrix::<f64>::zeros(6, n);
        for (k, &leg) in stance.iter().enumerate() {
            let r = feet[leg] - body.position;
            a.view_mut((0, 3 * k), (3, 3)).copy_from(&Matrix3::identity());
            a.view_mut((3, 3 * k), (3, 3)).copy_from(&skew(&r));
        }

        let s = DMatrix::from_diagonal(&DVector::from_row_slice(&self.config.wrench_weights));
        let w = DVector::from_column_slice(wrench.to_vector6().as_slice());
        let mut f_prev = DVector::zeros(n);
        for (k, &leg) in stance.iter().enumerate() {
            f_prev
                .fixed_rows_mut::<3>(3 * k)
                .copy_from(&self.prev[leg]);
        }

        // Expand the cost to 1/2 f^T P f + q^T f.
        let reg = self.config.force_weight + self.config.smoothness_weight;
        let p_mat = (a.transpose() * &s * &a + DMatrix::identity(n, n) * reg) * 2.0;
        let q_vec = (a.transpose() * &s * &w + &f_prev * self.config.smoothness_weight) * -2.0;

        let (a_ineq, b_ineq) = self.build_constraints(&stance);

        let p_csc = dmatrix_to_csc_upper_tri(&p_mat);
        let a_csc = dmatrix_to_csc(&a_ineq);
        let cones = vec![NonnegativeConeT(b_ineq.len())];

        let settings = match DefaultSettingsBuilder::default()
            .max_iter(self.config.max_iterations)
            .verbose(false)
            .tol_gap_abs(1e-6)
            .tol_gap_rel(1e-6)
            .tol_feas(1e-6)
            .build()
        {
            Ok(settings) => settings,
            Err(_) => {
                return self.degraded(start);
            }
        };

        let q_slice: Vec<f64> = q_vec.iter().copied().collect();

        let mut solver =
            DefaultSolver::new(&p_csc, &q_slice, &a_csc, &b_ineq, &cones, settings);
        solver.solve();

        let converged = matches!(
            solver.solution.status,
            SolverStatus::Solved | SolverStatus::AlmostSolved
        );
        if !converged {
            return self.degraded(start);
        }

        let mut forces = [Vector3::zeros(); LEG_COUNT];
        for (k, &leg) in stance.iter().enumerate() {
            forces[leg] = Vector3::new(
                solver.solution.x[3 * k],
                solver.solution.x[3 * k + 1],
                solver.solution.x[3 * k + 2],
            );
        }
        self.prev = forces;

        ForceSolution {
            forces,
            status: SolveStatus::Optimal,
            solve_time_us: elapsed_us(start),
        }
    }

    /// Inequality rows for the stance set, as `A f <= b`.
    fn build_constraints(&self, stance: &[usize]) -> (DMatrix<f64>, Vec<f64>) {
        let mu = self.config.friction_coeff;
        let n = 3 * stance.len();
        let rows = 6 * stance.len();

        let mut a = DMatrix::<f64>::zeros(rows, n);
        let mut b = vec![0.0; rows];
        let mut row = 0;

        for k in 0..stance.len() {
            let fx = 3 * k;
            let fy = fx + 1;
            let fz = fx + 2;

            // fx - mu fz <= 0
            a[(row, fx)] = 1.0;
            a[(row, fz)] = -mu;
            row += 1;
            // -fx - mu fz <= 0
            a[(row, fx)] = -1.0;
            a[(row, fz)] = -mu;
            row += 1;
            // fy - mu fz <= 0
            a[(row, fy)] = 1.0;
            a[(row, fz)] = -mu;
            row += 1;
            // -fy - mu fz <= 0
            a[(row, fy)] = -1.0;
            a[(row, fz)] = -mu;
            row += 1;
            // -fz <= -f_min
            a[(row, fz)] = -1.0;
            b[row] = -self.config.min_normal_force;
            row += 1;
            // fz <= f_max
            a[(row, fz)] = 1.0;
            b[row] = self.config.max_normal_force;
            row += 1;
        }

        (a, b)
    }

    fn degraded(&self, start: Instant) -> ForceSolution {
        warn!("balance QP did not converge; returning previous solution");
        ForceSolution {
            forces: self.prev,
            status: SolveStatus::Degraded,
            solve_time_us: elapsed_us(start),
        }
    }
}

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Cross-product matrix: `skew(r) * f == r x f`.
fn skew(r: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -r.z, r.y, r.z, 0.0, -r.x, -r.y, r.x, 0.0)
}

/// Convert a dense matrix to Clarabel CSC form (all entries).
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Convert a symmetric dense matrix to upper-triangular CSC form.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows - 1) {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
