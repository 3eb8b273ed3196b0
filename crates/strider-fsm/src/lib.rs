//! Mode state machine for the strider quadruped.
//!
//! [`ControlContext`] owns every mutable piece of the control core —
//! estimator, phase scheduler, foot planner, balance optimizer, last joint
//! command — and drives them through one `tick(user_command, sensors)` call
//! per control period. The active [`Mode`] gates which parts of the
//! pipeline run; transitions go through an explicit table with the
//! emergency path checked first, every tick, from every mode.

pub mod context;
pub mod handlers;
pub mod mode;
#[cfg(feature = "bevy")]
pub mod plugin;
pub mod safety;

pub use context::{ControlContext, TickOutput, TickStatus};
pub use mode::Mode;
#[cfg(feature = "bevy")]
pub use plugin::{ActuatorOutput, CommandInput, SensorInput, StriderControlPlugin, StriderController};
pub use safety::{SafetyEvent, SafetyMonitor};
