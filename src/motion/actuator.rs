// Actuator contract consumed by the drive base and the car
//
// The concrete device layer (port I/O, encoders, PWM) lives outside this crate.
// Anything that can report a relative angle and a speed and accept the motion
// primitives below can drive a robot.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// What an actuator does once a motion finishes (or on an explicit stop)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stop {
    Continue = 0,   // keep running at the last speed
    Coast = 1,      // free-wheel to a stop
    Brake = 2,      // brake and keep braking
    Hold = 3,       // actively hold the position
    SmartCoast = 4, // coast, compensating on the next command
    #[default]
    SmartBrake = 5, // brake, compensating on the next command
}

/// Failures reported by an actuator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActuatorError {
    #[error("Actuator {name} fault: {reason}")]
    Fault { name: String, reason: String },

    #[error("Timeout waiting for actuator {name}")]
    Timeout { name: String },

    #[error("Actuator {name} disconnected")]
    Disconnected { name: String },
}

pub type Result<T> = std::result::Result<T, ActuatorError>;

/// A rotary actuator with relative-angle odometry.
///
/// Units: degrees and degrees/second. Positional moves take their direction from
/// the sign of the angle (or from target vs. current position); only the
/// magnitude of `speed` is used.
///
/// A new command replaces whatever the actuator was doing. Nothing is queued.
pub trait Actuator {
    /// Run continuously at a signed speed until told otherwise
    fn run(&mut self, speed: i32) -> Result<()>;

    /// Start a move of `angle` degrees relative to the current position
    fn run_angle(&mut self, speed: i32, angle: i32, then: Stop) -> Result<()>;

    /// Start a move to `target` in the relative-angle frame
    fn run_target(&mut self, speed: i32, target: i32, then: Stop) -> Result<()>;

    /// Block until the current positional move has completed.
    /// Returns immediately for continuous runs or when idle.
    fn wait(&mut self) -> Result<()>;

    /// Whether the current positional move has completed
    fn is_done(&mut self) -> Result<bool>;

    fn stop(&mut self, then: Stop) -> Result<()>;

    /// Cumulative signed degrees since the last reset
    fn angle(&mut self) -> Result<i32>;

    /// Signed degrees/second
    fn speed(&mut self) -> Result<i32>;

    fn reset_angle(&mut self, angle: i32) -> Result<()>;
}

/// Millisecond time source used by polling loops
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn sleep_ms(&mut self, ms: u64);
}

/// Wall clock backed by `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_ms(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}
