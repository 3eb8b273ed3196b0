//! Unsafe-state detection.
//!
//! Three conditions force a transition to Passive, overriding any pending
//! user command: excessive body tilt, a diverging velocity estimate, and a
//! sensor exchange that has been stale for longer than the configured
//! tolerance. Detection is pure; the state machine performs the transition.

use strider_core::config::ControlConfig;
use strider_core::time::StalenessLevel;
use strider_core::types::BodyState;

/// Why the safety monitor demanded Passive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SafetyEvent {
    /// Combined roll/pitch beyond the configured limit.
    ExcessiveTilt { tilt: f64, limit: f64 },
    /// Estimated body speed beyond the divergence limit.
    VelocityDivergence { speed: f64, limit: f64 },
    /// Sensor staleness tolerance exhausted.
    SensorTimeout { stale_ticks: u32 },
}

/// Stateless checks over the estimated body state and I/O freshness.
#[derive(Clone, Copy, Debug)]
pub struct SafetyMonitor {
    max_tilt: f64,
    max_velocity: f64,
}

impl SafetyMonitor {
    #[must_use]
    pub const fn new(config: &ControlConfig) -> Self {
        Self {
            max_tilt: config.max_tilt,
            max_velocity: config.max_velocity,
        }
    }

    /// Evaluate this tick. Returns the first tripped condition, checked in
    /// severity order: staleness, tilt, velocity.
    #[must_use]
    pub fn check(&self, body: &BodyState, staleness: StalenessLevel) -> Option<SafetyEvent> {
        if let StalenessLevel::Exceeded(stale_ticks) = staleness {
            return Some(SafetyEvent::SensorTimeout { stale_ticks });
        }

        let tilt = body.tilt();
        if tilt > self.max_tilt {
            return Some(SafetyEvent::ExcessiveTilt {
                tilt,
                limit: self.max_tilt,
            });
        }

        let speed = body.velocity.norm();
        if !speed.is_finite() || speed > self.max_velocity {
            return Some(SafetyEvent::VelocityDivergence {
                speed,
                limit: self.max_velocity,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    fn monitor() -> SafetyMonitor {
        SafetyMonitor::new(&ControlConfig::default())
    }

    #[test]
    fn nominal_state_passes() {
        let body = BodyState::default();
        assert_eq!(monitor().check(&body, StalenessLevel::Fresh), None);
    }

    #[test]
    fn tolerated_staleness_passes() {
        let body = BodyState::default();
        assert_eq!(monitor().check(&body, StalenessLevel::Stale(3)), None);
    }

    #[test]
    fn exceeded_staleness_trips() {
        let body = BodyState::default();
        assert!(matches!(
            monitor().check(&body, StalenessLevel::Exceeded(26)),
            Some(SafetyEvent::SensorTimeout { stale_ticks: 26 })
        ));
    }

    #[test]
    fn excessive_tilt_trips() {
        let body = BodyState {
            orientation: UnitQuaternion::from_euler_angles(0.7, 0.0, 0.0),
            ..BodyState::default()
        };
        assert!(matches!(
            monitor().check(&body, StalenessLevel::Fresh),
            Some(SafetyEvent::ExcessiveTilt { .. })
        ));
    }

    #[test]
    fn diverged_velocity_trips() {
        let body = BodyState {
            velocity: Vector3::new(10.0, 0.0, 0.0),
            ..BodyState::default()
        };
        assert!(matches!(
            monitor().check(&body, StalenessLevel::Fresh),
            Some(SafetyEvent::VelocityDivergence { .. })
        ));
    }

    #[test]
    fn nan_velocity_trips() {
        let body = BodyState {
            velocity: Vector3::new(f64::NAN, 0.0, 0.0),
            ..BodyState::default()
        };
        assert!(matches!(
            monitor().check(&body, StalenessLevel::Fresh),
            Some(SafetyEvent::VelocityDivergence { .. })
        ));
    }

    #[test]
    fn staleness_outranks_tilt() {
        let body = BodyState {
            orientation: UnitQuaternion::from_euler_angles(0.7, 0.0, 0.0),
            ..BodyState::default()
        };
        assert!(matches!(
            monitor().check(&body, StalenessLevel::Exceeded(30)),
            Some(SafetyEvent::SensorTimeout { .. })
        ));
    }
}
