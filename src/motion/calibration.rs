// Steering range calibration by stall detection
//
// The steering actuator is driven into each mechanical stop in turn. A stop is
// recognised when the measured speed stays below a threshold for long enough;
// the center is the midpoint of both stops.
//
// This module only holds the state machine. The caller owns the actuator and the
// clock, feeds samples into `update` and acts on the returned events.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{Result, RobotError};
use crate::config::CalibrationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    Uncalibrated,
    SearchingLeftLimit,
    SearchingRightLimit,
    Calibrated,
}

/// Which stop was being searched for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    LeftLimit,
    RightLimit,
}

impl fmt::Display for CalibrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationPhase::LeftLimit => write!(f, "searching left limit"),
            CalibrationPhase::RightLimit => write!(f, "searching right limit"),
        }
    }
}

/// Debounced "speed is near zero" detector. Any fast sample restarts the timer.
#[derive(Debug, Clone)]
pub struct StallDetector {
    threshold: i32,
    stall_time_ms: u64,
    stalled_since: Option<u64>,
}

impl StallDetector {
    pub fn new(threshold: i32, stall_time_ms: u64) -> Self {
        Self {
            threshold,
            stall_time_ms,
            stalled_since: None,
        }
    }

    pub fn reset(&mut self) {
        self.stalled_since = None;
    }

    /// Feed one speed sample; true once the stall has lasted `stall_time_ms`
    pub fn sample(&mut self, speed: i32, now_ms: u64) -> bool {
        if speed.unsigned_abs() < self.threshold.unsigned_abs() {
            let since = *self.stalled_since.get_or_insert(now_ms);
            now_ms.saturating_sub(since) >= self.stall_time_ms
        } else {
            self.stalled_since = None;
            false
        }
    }
}

/// What the caller should do after a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationEvent {
    /// Not searching; nothing to do
    Idle,
    /// Keep polling
    Searching,
    /// Left stop found: hold, then call `begin_right_search`
    LeftLimit { position: i32 },
    /// Both stops found
    Calibrated { left: i32, right: i32, center: i32 },
}

#[derive(Debug, Clone)]
pub struct SteeringCalibration {
    config: CalibrationConfig,
    state: CalibrationState,
    detector: StallDetector,
    phase_started_ms: u64,
    left_limit: Option<i32>,
}

impl SteeringCalibration {
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            config: config.clone(),
            state: CalibrationState::Uncalibrated,
            detector: StallDetector::new(config.stall_threshold_deg_s, config.stall_time_ms),
            phase_started_ms: 0,
            left_limit: None,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Start over and search the left stop. Returns the speed to run at.
    pub fn begin(&mut self, now_ms: u64) -> i32 {
        self.abort();
        self.state = CalibrationState::SearchingLeftLimit;
        self.start_phase(now_ms);
        info!("Searching left steering limit");
        -self.config.search_speed_deg_s.saturating_abs()
    }

    /// Search the right stop after `LeftLimit`. Returns the speed to run at.
    pub fn begin_right_search(&mut self, now_ms: u64) -> i32 {
        self.start_phase(now_ms);
        info!("Searching right steering limit");
        self.config.search_speed_deg_s.saturating_abs()
    }

    /// Record that a center was supplied without searching
    pub fn mark_calibrated(&mut self) {
        self.state = CalibrationState::Calibrated;
    }

    /// Drop any partial result
    pub fn abort(&mut self) {
        self.state = CalibrationState::Uncalibrated;
        self.left_limit = None;
        self.detector.reset();
    }

    fn start_phase(&mut self, now_ms: u64) {
        self.phase_started_ms = now_ms;
        self.detector.reset();
    }

    fn phase(&self) -> Option<CalibrationPhase> {
        match self.state {
            CalibrationState::SearchingLeftLimit => Some(CalibrationPhase::LeftLimit),
            CalibrationState::SearchingRightLimit => Some(CalibrationPhase::RightLimit),
            _ => None,
        }
    }

    /// Feed one speed/angle sample taken at `now_ms`
    pub fn update(&mut self, speed: i32, angle: i32, now_ms: u64) -> Result<CalibrationEvent> {
        let Some(phase) = self.phase() else {
            return Ok(CalibrationEvent::Idle);
        };

        if self.detector.sample(speed, now_ms) {
            return Ok(match phase {
                CalibrationPhase::LeftLimit => {
                    debug!("Left steering limit at {}", angle);
                    self.left_limit = Some(angle);
                    self.state = CalibrationState::SearchingRightLimit;
                    CalibrationEvent::LeftLimit { position: angle }
                }
                CalibrationPhase::RightLimit => {
                    let left = self.left_limit.unwrap_or(angle);
                    let center = midpoint(left, angle);
                    info!(
                        "Steering calibrated: left={} right={} center={}",
                        left, angle, center
                    );
                    self.state = CalibrationState::Calibrated;
                    CalibrationEvent::Calibrated {
                        left,
                        right: angle,
                        center,
                    }
                }
            });
        }

        let elapsed_ms = now_ms.saturating_sub(self.phase_started_ms);
        if elapsed_ms >= self.config.search_timeout_ms {
            warn!("No steering stall after {}ms ({})", elapsed_ms, phase);
            self.abort();
            return Err(RobotError::CalibrationFailed { phase, elapsed_ms });
        }

        Ok(CalibrationEvent::Searching)
    }
}

/// Midpoint rounded half-to-even
fn midpoint(left: i32, right: i32) -> i32 {
    ((left as f64 + right as f64) / 2.0).round_ties_even() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CalibrationConfig {
        CalibrationConfig {
            search_timeout_ms: 1000,
            ..CalibrationConfig::default()
        }
    }

    #[test]
    fn test_stall_detector_debounce() {
        let mut d = StallDetector::new(5, 200);
        assert!(!d.sample(0, 0));
        assert!(!d.sample(2, 150));
        // a fast sample restarts the window
        assert!(!d.sample(30, 160));
        assert!(!d.sample(0, 170));
        assert!(!d.sample(-4, 300));
        assert!(d.sample(1, 370));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut d = StallDetector::new(5, 0);
        assert!(!d.sample(5, 0));
        assert!(!d.sample(-5, 10));
        assert!(d.sample(4, 20));
    }

    #[test]
    fn test_extreme_speeds_do_not_overflow() {
        let mut d = StallDetector::new(5, 0);
        assert!(!d.sample(i32::MIN, 0));
        assert!(d.sample(0, 10));

        let mut cal = SteeringCalibration::new(&CalibrationConfig {
            search_speed_deg_s: i32::MIN,
            ..config()
        });
        assert_eq!(cal.begin(0), -i32::MAX);
        assert_eq!(cal.begin_right_search(0), i32::MAX);
    }

    #[test]
    fn test_full_sequence() {
        let mut cal = SteeringCalibration::new(&config());
        assert_eq!(cal.state(), CalibrationState::Uncalibrated);

        assert_eq!(cal.begin(0), -50);
        assert_eq!(cal.state(), CalibrationState::SearchingLeftLimit);
        assert_eq!(cal.update(-50, -20, 10).unwrap(), CalibrationEvent::Searching);
        assert_eq!(cal.update(0, -40, 20).unwrap(), CalibrationEvent::Searching);
        assert_eq!(
            cal.update(0, -40, 220).unwrap(),
            CalibrationEvent::LeftLimit { position: -40 }
        );
        assert_eq!(cal.state(), CalibrationState::SearchingRightLimit);

        assert_eq!(cal.begin_right_search(500), 50);
        assert_eq!(cal.update(50, 0, 510).unwrap(), CalibrationEvent::Searching);
        assert_eq!(cal.update(0, 60, 600).unwrap(), CalibrationEvent::Searching);
        assert_eq!(
            cal.update(0, 60, 800).unwrap(),
            CalibrationEvent::Calibrated {
                left: -40,
                right: 60,
                center: 10
            }
        );
        assert_eq!(cal.state(), CalibrationState::Calibrated);
        assert_eq!(cal.update(0, 60, 900).unwrap(), CalibrationEvent::Idle);
    }

    #[test]
    fn test_timeout_fails_and_resets() {
        let mut cal = SteeringCalibration::new(&config());
        cal.begin(0);
        let mut now = 0;
        let err = loop {
            now += 10;
            match cal.update(50, now as i32, now) {
                Ok(CalibrationEvent::Searching) => continue,
                Ok(other) => panic!("unexpected {:?}", other),
                Err(e) => break e,
            }
        };
        assert!(matches!(
            err,
            RobotError::CalibrationFailed {
                phase: CalibrationPhase::LeftLimit,
                elapsed_ms: 1000
            }
        ));
        assert_eq!(cal.state(), CalibrationState::Uncalibrated);
    }

    #[test]
    fn test_right_search_has_its_own_timeout() {
        let mut cal = SteeringCalibration::new(&config());
        cal.begin(0);
        cal.update(0, -30, 0).unwrap();
        assert!(matches!(
            cal.update(0, -30, 200).unwrap(),
            CalibrationEvent::LeftLimit { .. }
        ));
        cal.begin_right_search(900);
        // 900ms into the whole run, but the right search just started
        assert_eq!(cal.update(50, 0, 1500).unwrap(), CalibrationEvent::Searching);
        assert!(matches!(
            cal.update(50, 10, 1900),
            Err(RobotError::CalibrationFailed {
                phase: CalibrationPhase::RightLimit,
                ..
            })
        ));
    }

    #[test]
    fn test_midpoint_rounds_half_to_even() {
        assert_eq!(midpoint(-40, 60), 10);
        assert_eq!(midpoint(-41, 60), 10);
        assert_eq!(midpoint(-39, 60), 10);
        assert_eq!(midpoint(0, 3), 2);
    }
}
