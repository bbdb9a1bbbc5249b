// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_STEER_SPEED_DEG_S, DEFAULT_STRAIGHT_SPEED_MM_S, DEFAULT_TURN_SPEED_DEG_S,
};
use crate::motion::Stop;

fn default_speed_mm_s() -> f32 {
    DEFAULT_STRAIGHT_SPEED_MM_S
}

fn default_turn_speed() -> f32 {
    DEFAULT_TURN_SPEED_DEG_S
}

fn default_steer_speed() -> i32 {
    DEFAULT_STEER_SPEED_DEG_S
}

fn default_wait() -> bool {
    true
}

// Command from teleop/scripts -> runtime, tagged by "cmd"
// e.g. {"cmd": "straight", "distance_mm": 280}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum MotionCommand {
    Straight {
        distance_mm: f32,
        #[serde(default = "default_speed_mm_s")]
        speed_mm_s: f32,
        #[serde(default = "default_wait")]
        wait: bool,
    },
    Turn {
        angle_deg: f32,
        #[serde(default = "default_turn_speed")]
        speed_deg_s: f32,
        #[serde(default = "default_wait")]
        wait: bool,
    },
    // Continuous; kept alive by resending, stopped by the watchdog otherwise
    Drive {
        speed_mm_s: f32,
        turn_rate_deg_s: f32,
    },
    Arc {
        radius_mm: f32,
        angle_deg: f32,
        #[serde(default = "default_speed_mm_s")]
        speed_mm_s: f32,
        #[serde(default = "default_wait")]
        wait: bool,
    },
    Steer {
        angle_deg: f32,
        #[serde(default = "default_steer_speed")]
        speed_deg_s: i32,
        #[serde(default = "default_wait")]
        wait: bool,
    },
    CenterSteering,
    Calibrate,
    Stop {
        #[serde(default)]
        then: Option<Stop>,
    },
    Reset,
}

impl MotionCommand {
    pub fn is_continuous(&self) -> bool {
        matches!(self, MotionCommand::Drive { .. })
    }
}

// Odometry published by the runtime
// heading is only known for a differential base
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Odometry {
    pub distance_mm: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f32>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Fault,
}
