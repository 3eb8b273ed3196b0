// strider-estimator: body-state Kalman filter for the strider control core.

pub mod filter;

pub use filter::{EstimatorStatus, StateEstimator};
