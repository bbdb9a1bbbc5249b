// Motion layer for wheeled robots
//
// Provides:
// - Actuator contract and a simulated actuator
// - Wheel geometry (differential and Ackermann)
// - Differential drive base and car with steering self-calibration

pub mod actuator;
pub mod calibration;
mod car;
mod drive_base;
mod error;
mod handle;
pub mod kinematics;
pub mod sim;

pub use actuator::{Actuator, ActuatorError, Clock, Stop, SystemClock};
pub use calibration::{CalibrationPhase, CalibrationState};
pub use car::Car;
pub use drive_base::DriveBase;
pub use error::RobotError;
pub use handle::{Completion, MotionHandle};
pub use sim::{SimActuator, SimClock};
