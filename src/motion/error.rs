// Error types for robot-level motion commands

use super::actuator::ActuatorError;
use super::calibration::CalibrationPhase;
use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Steering calibration failed: no stall while {phase} after {elapsed_ms}ms")]
    CalibrationFailed {
        phase: CalibrationPhase,
        elapsed_ms: u64,
    },

    #[error("Steering center is unknown; calibrate or set it first")]
    SteeringUncalibrated,

    #[error("Command not supported by this robot: {0}")]
    UnsupportedCommand(&'static str),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

pub type Result<T> = std::result::Result<T, RobotError>;

/// Arc routines divide by the radius
pub(crate) fn check_radius(radius_mm: f32) -> Result<()> {
    if radius_mm == 0.0 || !radius_mm.is_finite() {
        return Err(RobotError::InvalidGeometry(format!(
            "arc radius must be finite and non-zero, got {}",
            radius_mm
        )));
    }
    Ok(())
}

/// Distances, angles and speeds must be real numbers before they are rounded
pub(crate) fn check_finite(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() {
        return Err(RobotError::InvalidGeometry(format!(
            "{} must be finite, got {}",
            name, value
        )));
    }
    Ok(())
}
