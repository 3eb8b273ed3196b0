// strider-core: Types, configuration, errors and tick clock for the strider
// quadruped motion-control core.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub mod prelude {
    pub use crate::config::{
        BalanceConfig, ControlConfig, EstimatorConfig, GaitConfig, PatternParams, RobotConfig,
        StriderConfig,
    };
    pub use crate::error::{ConfigError, StriderError};
    pub use crate::time::{Accumulator, StalenessLevel, StalenessMonitor, TickClock};
    pub use crate::types::{
        BodyState, ContactState, FootTarget, ImuSample, JointCommand, JointCommands, JointState,
        LegId, LegPhase, ModeRequest, PostureCommand, SensorSample, UserCommand, Wrench,
        JOINTS_PER_LEG, JOINT_COUNT, LEG_COUNT,
    };
}
