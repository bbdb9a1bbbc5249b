// Timeouts, topics, default speeds and robot geometry
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::motion::Stop;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog (continuous drive only)
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_MOTION: &str = "motion/cmd"; // commands
pub const TOPIC_ODOMETRY: &str = "motion/state/odometry"; // odometry
pub const TOPIC_HEALTH: &str = "motion/state/health"; // health status

// Default command speeds
pub const DEFAULT_STRAIGHT_SPEED_MM_S: f32 = 200.0;
pub const DEFAULT_TURN_SPEED_DEG_S: f32 = 90.0;
pub const DEFAULT_STEER_SPEED_DEG_S: i32 = 100;
pub const CENTER_STEER_SPEED_DEG_S: i32 = 100;

// Default steering limit for car chassis
pub const DEFAULT_MAX_STEERING_DEG: f32 = 45.0;

// Mechanical steering stops of the simulated car used by the runtime
pub const SIM_STEERING_STOPS_DEG: (i32, i32) = (-55, 65);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be a positive number, got {value}")]
    NonPositive { field: &'static str, value: f32 },

    #[error("{field} must be zero or positive, got {value}")]
    Negative { field: &'static str, value: f32 },

    #[error("Invalid calibration settings: {0}")]
    Calibration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    // written this way round so NaN fails too
    if !(value > 0.0) || !value.is_finite() {
        return Err(ConfigError::NonPositive { field, value });
    }
    Ok(())
}

/// Two-wheel differential chassis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveBaseConfig {
    pub wheel_diameter_mm: f32,
    pub axle_track_mm: f32,
    #[serde(default)]
    pub default_stop: Stop,
}

impl DriveBaseConfig {
    pub fn new(wheel_diameter_mm: f32, axle_track_mm: f32) -> Self {
        Self {
            wheel_diameter_mm,
            axle_track_mm,
            default_stop: Stop::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("wheel_diameter_mm", self.wheel_diameter_mm)?;
        positive("axle_track_mm", self.axle_track_mm)
    }
}

/// Stall-search parameters for steering calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub search_speed_deg_s: i32,
    /// Speeds strictly below this count as stalled
    pub stall_threshold_deg_s: i32,
    pub stall_time_ms: u64,
    /// Upper bound on each limit search
    pub search_timeout_ms: u64,
    /// Pause after reaching each limit
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            search_speed_deg_s: 50,
            stall_threshold_deg_s: 5,
            stall_time_ms: 200,
            search_timeout_ms: 5000,
            settle_ms: 200,
            poll_interval_ms: 10,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stall_threshold_deg_s <= 0 {
            return Err(ConfigError::Calibration(
                "stall threshold must be positive".to_string(),
            ));
        }
        if self.search_speed_deg_s.unsigned_abs() < self.stall_threshold_deg_s.unsigned_abs() {
            return Err(ConfigError::Calibration(format!(
                "search speed {} would read as a stall (threshold {})",
                self.search_speed_deg_s, self.stall_threshold_deg_s
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Calibration(
                "poll interval must be at least 1ms".to_string(),
            ));
        }
        if self.search_timeout_ms <= self.stall_time_ms {
            return Err(ConfigError::Calibration(format!(
                "search timeout {}ms leaves no room for a {}ms stall",
                self.search_timeout_ms, self.stall_time_ms
            )));
        }
        Ok(())
    }
}

fn default_max_steering() -> f32 {
    DEFAULT_MAX_STEERING_DEG
}

fn default_true() -> bool {
    true
}

/// Car chassis: one drive actuator, one steering actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarConfig {
    pub wheel_diameter_mm: f32,
    pub wheelbase_mm: f32,
    #[serde(default = "default_max_steering")]
    pub max_steering_angle_deg: f32,
    #[serde(default)]
    pub default_stop: Stop,
    /// Run calibration from `Car::initialize`
    #[serde(default = "default_true")]
    pub auto_calibrate: bool,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

impl CarConfig {
    pub fn new(wheel_diameter_mm: f32, wheelbase_mm: f32) -> Self {
        Self {
            wheel_diameter_mm,
            wheelbase_mm,
            max_steering_angle_deg: DEFAULT_MAX_STEERING_DEG,
            default_stop: Stop::default(),
            auto_calibrate: true,
            calibration: CalibrationConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("wheel_diameter_mm", self.wheel_diameter_mm)?;
        positive("wheelbase_mm", self.wheelbase_mm)?;
        if !(self.max_steering_angle_deg >= 0.0) || !self.max_steering_angle_deg.is_finite() {
            return Err(ConfigError::Negative {
                field: "max_steering_angle_deg",
                value: self.max_steering_angle_deg,
            });
        }
        self.calibration.validate()
    }
}

/// Robot description loaded from JSON, tagged by `"kind"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobotConfig {
    DriveBase(DriveBaseConfig),
    Car(CarConfig),
}

impl Default for RobotConfig {
    fn default() -> Self {
        RobotConfig::DriveBase(DriveBaseConfig::new(56.0, 128.0))
    }
}

impl RobotConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            RobotConfig::DriveBase(c) => c.validate(),
            RobotConfig::Car(c) => c.validate(),
        }
    }
}
