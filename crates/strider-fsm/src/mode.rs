//! Operating modes and the transition table.

use strider_core::types::ModeRequest;

/// Active operating mode. Exactly one at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Zero torque, light joint damping. The safe terminal-like state.
    #[default]
    Passive,
    /// Joint-space interpolation to the nominal standing pose.
    FixedStand,
    /// Posture-commanded standing: body pose from the user, feet pinned.
    FreeStand,
    /// Periodic trot driven by user velocity commands.
    Trotting,
    /// Full-stance wrench regulation test, no gait.
    BalanceTest,
    /// Cartesian position test of the front-right leg, others held.
    SwingTest,
    /// Trot in place (zero commanded velocity).
    StepTest,
    /// Trot driven by the external navigation stack's velocity command.
    ExternalNavigation,
}

impl Mode {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::FixedStand => "fixed-stand",
            Self::FreeStand => "free-stand",
            Self::Trotting => "trotting",
            Self::BalanceTest => "balance-test",
            Self::SwingTest => "swing-test",
            Self::StepTest => "step-test",
            Self::ExternalNavigation => "external-navigation",
        }
    }

    /// Whether this mode runs the scheduler/planner/optimizer gait chain.
    #[must_use]
    pub const fn uses_gait(self) -> bool {
        matches!(
            self,
            Self::Trotting | Self::StepTest | Self::ExternalNavigation
        )
    }
}

impl From<ModeRequest> for Mode {
    fn from(request: ModeRequest) -> Self {
        match request {
            ModeRequest::Passive => Self::Passive,
            ModeRequest::FixedStand => Self::FixedStand,
            ModeRequest::FreeStand => Self::FreeStand,
            ModeRequest::Trotting => Self::Trotting,
            ModeRequest::BalanceTest => Self::BalanceTest,
            ModeRequest::SwingTest => Self::SwingTest,
            ModeRequest::StepTest => Self::StepTest,
            ModeRequest::ExternalNavigation => Self::ExternalNavigation,
        }
    }
}

/// Explicit transition table for user-requested mode changes.
///
/// Any mode may drop to Passive; everything else funnels through
/// FixedStand, which is the only mode the active behaviors can be entered
/// from. Forced safety transitions bypass this table (they always target
/// Passive, which is always allowed).
#[must_use]
pub const fn transition_allowed(from: Mode, to: Mode) -> bool {
    use Mode::{
        BalanceTest, ExternalNavigation, FixedStand, FreeStand, Passive, StepTest, SwingTest,
        Trotting,
    };
    match (from, to) {
        // Re-entering the current mode is a no-op, not a transition.
        _ if from as u8 == to as u8 => false,
        (_, Passive) | (Passive, FixedStand) => true,
        (
            FixedStand,
            FreeStand | Trotting | BalanceTest | SwingTest | StepTest | ExternalNavigation,
        ) => true,
        (
            FreeStand | Trotting | BalanceTest | SwingTest | StepTest | ExternalNavigation,
            FixedStand,
        ) => true,
        _ => false,
    }
}
