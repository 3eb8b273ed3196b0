//! Gait and balance pipeline for the strider quadruped:
//!
//! 1. **Phase scheduler** — periodic wave generator producing per-leg
//!    stance/swing status and segment phase
//! 2. **Foot placement planner** — Raibert-style touchdown targeting and
//!    smooth swing trajectories
//! 3. **Balance optimizer** — PD wrench law plus a per-tick QP over stance
//!    ground reaction forces (Clarabel does the numeric solve)
//! 4. **Whole-body mapping** — foot forces to joint torques via J^T
//!
//! Each stage is a plain struct with an explicit per-tick method; the mode
//! state machine owns the instances and wires them together.

pub mod balance;
pub mod gait;
pub mod swing;
pub mod wbc;

pub use balance::{desired_wrench, BalanceOptimizer, ForceSolution, PoseTarget, SolveStatus};
pub use gait::{GaitPattern, PhaseScheduler};
pub use swing::{swing_foot_position, swing_foot_velocity, FootPlacementPlanner};
pub use wbc::{stance_torques, swing_tracking_force, swing_torques};
