use thiserror::Error;

/// Top-level error type for the strider control core.
///
/// Runtime degradation (infeasible balance solve, covariance reset, stale
/// sensors) is deliberately *not* an error: the loop keeps running on a safe
/// fallback and surfaces a status flag instead. Errors here are conditions
/// under which the core refuses to start or a caller misused the API.
#[derive(Debug, Error)]
pub enum StriderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Load-time configuration errors. The core never starts with any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid control dt: {0} (must be > 0)")]
    InvalidDt(f64),

    #[error("Invalid gait period: {0} (must be > 0)")]
    InvalidPeriod(f64),

    #[error("Invalid duty ratio: {0} (must be in (0, 1])")]
    InvalidDutyRatio(f64),

    #[error("Invalid phase offset for leg {leg}: {offset} (must be in [0, 1))")]
    InvalidPhaseOffset { leg: usize, offset: f64 },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Invalid force bounds: min={min}, max={max} (need 0 < min < max)")]
    InvalidForceBounds { min: f64, max: f64 },

    #[error("Invalid friction coefficient: {0} (must be > 0)")]
    InvalidFriction(f64),

    #[error("Invalid noise parameter {name}: {value} (must be > 0)")]
    InvalidNoise { name: &'static str, value: f64 },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strider_error_from_config_error() {
        let err = ConfigError::InvalidPeriod(-0.5);
        let top: StriderError = err.into();
        assert!(matches!(top, StriderError::Config(_)));
        assert!(top.to_string().contains("-0.5"));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ConfigError = io_err.into();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn config_error_display_messages() {
        assert_eq!(
            ConfigError::InvalidDt(0.0).to_string(),
            "Invalid control dt: 0 (must be > 0)"
        );
        assert_eq!(
            ConfigError::InvalidDutyRatio(1.5).to_string(),
            "Invalid duty ratio: 1.5 (must be in (0, 1])"
        );
        assert_eq!(
            ConfigError::InvalidPhaseOffset {
                leg: 2,
                offset: 1.0
            }
            .to_string(),
            "Invalid phase offset for leg 2: 1 (must be in [0, 1))"
        );
        assert_eq!(
            ConfigError::InvalidForceBounds { min: 0.0, max: 10.0 }.to_string(),
            "Invalid force bounds: min=0, max=10 (need 0 < min < max)"
        );
        assert_eq!(
            ConfigError::DegenerateGeometry("zero thigh length".into()).to_string(),
            "Degenerate geometry: zero thigh length"
        );
        assert_eq!(
            ConfigError::InvalidNoise {
                name: "process_noise_velocity",
                value: -1.0
            }
            .to_string(),
            "Invalid noise parameter process_noise_velocity: -1 (must be > 0)"
        );
    }
}
