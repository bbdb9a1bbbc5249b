// Simulated actuator and virtual clock
//
// Motion is modelled kinematically from the shared virtual clock: a command
// records where it started and how fast it goes, and the position is evaluated
// on demand. Blocking waits jump the clock forward to the completion time, so
// every actuator sharing the clock progresses together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::actuator::{Actuator, ActuatorError, Clock, Result, Stop};

/// Virtual millisecond clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Move the clock forward to `ms` (never backwards)
    pub fn advance_to(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_ms(&mut self, ms: u64) {
        self.advance(ms);
    }
}

/// A command as received by a simulated actuator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Run { speed: i32 },
    RunAngle { speed: i32, angle: i32, then: Stop },
    RunTarget { speed: i32, target: i32, then: Stop },
    Stop { then: Stop },
    ResetAngle { angle: i32 },
}

/// Shared record of every command an actuator received
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Arc<Mutex<Vec<Command>>>,
}

impl CommandLog {
    fn push(&self, command: Command) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command);
    }

    pub fn entries(&self) -> Vec<Command> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<Command> {
        self.entries().last().copied()
    }

    /// Motion commands only (resets filtered out)
    pub fn motions(&self) -> Vec<Command> {
        self.entries()
            .into_iter()
            .filter(|c| !matches!(c, Command::ResetAngle { .. }))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[derive(Debug, Clone, Copy)]
enum Motion {
    Idle {
        at: f64,
    },
    Running {
        from: f64,
        start_ms: u64,
        speed: f64,
    },
    Moving {
        from: f64,
        start_ms: u64,
        target: f64,
        speed: f64, // magnitude
        then: Stop,
    },
}

/// Simulated rotary actuator driven by a [`SimClock`]
///
/// Optional mechanical limits pin the shaft: pushing into a limit reports zero
/// speed, which is what stall detection looks for.
#[derive(Debug)]
pub struct SimActuator {
    name: String,
    clock: SimClock,
    limits: Option<(f64, f64)>,
    motion: Motion,
    offset: f64, // reported angle = raw + offset
    log: CommandLog,
    fault: Option<ActuatorError>,
}

impl SimActuator {
    pub fn new(name: &str, clock: &SimClock) -> Self {
        Self {
            name: name.to_string(),
            clock: clock.clone(),
            limits: None,
            motion: Motion::Idle { at: 0.0 },
            offset: 0.0,
            log: CommandLog::default(),
            fault: None,
        }
    }

    /// Add hard mechanical stops, in degrees of the initial frame
    pub fn with_limits(mut self, min: i32, max: i32) -> Self {
        self.limits = Some((min.min(max) as f64, min.max(max) as f64));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command_log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Make every subsequent call fail with `error`
    pub fn inject_fault(&mut self, error: ActuatorError) {
        self.fault = Some(error);
    }

    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    fn check_fault(&self) -> Result<()> {
        match &self.fault {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn clamp(&self, raw: f64) -> f64 {
        match self.limits {
            Some((min, max)) => raw.clamp(min, max),
            None => raw,
        }
    }

    fn pinned(&self, raw: f64, direction: f64) -> bool {
        match self.limits {
            Some((min, max)) => (direction > 0.0 && raw >= max) || (direction < 0.0 && raw <= min),
            None => false,
        }
    }

    fn elapsed_s(&self, start_ms: u64) -> f64 {
        self.clock.now_ms().saturating_sub(start_ms) as f64 / 1000.0
    }

    fn raw_position(&self) -> f64 {
        match self.motion {
            Motion::Idle { at } => at,
            Motion::Running {
                from,
                start_ms,
                speed,
            } => self.clamp(from + speed * self.elapsed_s(start_ms)),
            Motion::Moving {
                from,
                start_ms,
                target,
                speed,
                then,
            } => {
                let distance = (target - from).abs();
                let direction = (target - from).signum();
                let travelled = speed * self.elapsed_s(start_ms);
                let mut raw = from + direction * travelled.min(distance);
                if then == Stop::Continue && travelled > distance {
                    raw += direction * (travelled - distance);
                }
                self.clamp(raw)
            }
        }
    }

    fn raw_speed(&self) -> f64 {
        let raw = self.raw_position();
        let velocity = match self.motion {
            Motion::Idle { .. } => 0.0,
            Motion::Running { speed, .. } => speed,
            Motion::Moving {
                from,
                start_ms,
                target,
                speed,
                then,
            } => {
                let direction = (target - from).signum();
                let finished = speed * self.elapsed_s(start_ms) >= (target - from).abs();
                if finished && then != Stop::Continue {
                    0.0
                } else {
                    direction * speed
                }
            }
        };
        if self.pinned(raw, velocity.signum()) {
            0.0
        } else {
            velocity
        }
    }

    fn freeze(&mut self) {
        self.motion = Motion::Idle {
            at: self.raw_position(),
        };
    }

    fn start_move(&mut self, speed: i32, raw_target: f64, then: Stop) {
        let from = self.raw_position();
        self.motion = Motion::Moving {
            from,
            start_ms: self.clock.now_ms(),
            target: raw_target,
            speed: (speed as f64).abs(),
            then,
        };
    }
}

impl Actuator for SimActuator {
    fn run(&mut self, speed: i32) -> Result<()> {
        self.check_fault()?;
        debug!("{}: run speed={}", self.name, speed);
        self.log.push(Command::Run { speed });
        let from = self.raw_position();
        self.motion = Motion::Running {
            from,
            start_ms: self.clock.now_ms(),
            speed: speed as f64,
        };
        Ok(())
    }

    fn run_angle(&mut self, speed: i32, angle: i32, then: Stop) -> Result<()> {
        self.check_fault()?;
        debug!(
            "{}: run_angle speed={} angle={} then={:?}",
            self.name, speed, angle, then
        );
        self.log.push(Command::RunAngle { speed, angle, then });
        let target = self.raw_position() + angle as f64;
        self.start_move(speed, target, then);
        Ok(())
    }

    fn run_target(&mut self, speed: i32, target: i32, then: Stop) -> Result<()> {
        self.check_fault()?;
        debug!(
            "{}: run_target speed={} target={} then={:?}",
            self.name, speed, target, then
        );
        self.log.push(Command::RunTarget {
            speed,
            target,
            then,
        });
        self.start_move(speed, target as f64 - self.offset, then);
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        self.check_fault()?;
        let Motion::Moving {
            from,
            start_ms,
            target,
            speed,
            ..
        } = self.motion
        else {
            return Ok(());
        };

        let distance = (target - from).abs();
        if distance == 0.0 {
            return Ok(());
        }
        if speed == 0.0 || self.clamp(target) != target {
            return Err(ActuatorError::Fault {
                name: self.name.clone(),
                reason: format!("move to {:.0} can never complete", target + self.offset),
            });
        }

        let duration_ms = (distance / speed * 1000.0).ceil() as u64;
        self.clock.advance_to(start_ms + duration_ms);
        Ok(())
    }

    fn is_done(&mut self) -> Result<bool> {
        self.check_fault()?;
        Ok(match self.motion {
            Motion::Moving {
                from,
                start_ms,
                target,
                speed,
                ..
            } => speed * self.elapsed_s(start_ms) >= (target - from).abs(),
            _ => true,
        })
    }

    fn stop(&mut self, then: Stop) -> Result<()> {
        self.check_fault()?;
        debug!("{}: stop then={:?}", self.name, then);
        self.log.push(Command::Stop { then });
        self.freeze();
        Ok(())
    }

    fn angle(&mut self) -> Result<i32> {
        self.check_fault()?;
        Ok((self.raw_position() + self.offset).round() as i32)
    }

    fn speed(&mut self) -> Result<i32> {
        self.check_fault()?;
        Ok(self.raw_speed().round() as i32)
    }

    fn reset_angle(&mut self, angle: i32) -> Result<()> {
        self.check_fault()?;
        self.log.push(Command::ResetAngle { angle });
        self.offset = angle as f64 - self.raw_position();
        Ok(())
    }
}
