// 50 Hz command loop with watchdog
// Motion commands arrive as JSON over zenoh and run on a simulated robot.
// A continuous `drive` command must keep being resent; once it goes stale the
// watchdog stops the robot.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, RobotConfig, SIM_STEERING_STOPS_DEG, TOPIC_CMD_MOTION, TOPIC_HEALTH,
    TOPIC_ODOMETRY,
};
use crate::messages::{MotionCommand, Odometry, RuntimeHealth};
use crate::motion::{
    Actuator, Car, Clock, DriveBase, MotionHandle, RobotError, SimActuator, SimClock,
};

/// A robot the runtime can drive
pub trait Robot {
    fn execute(&mut self, cmd: &MotionCommand) -> Result<(), RobotError>;
    fn odometry(&mut self) -> Result<Odometry, RobotError>;
    /// Bring the robot to a stop with its default stop mode
    fn halt(&mut self) -> Result<(), RobotError>;
}

fn finish<A: Actuator>(handle: MotionHandle<'_, A>, wait: bool) -> Result<(), RobotError> {
    if wait {
        handle.wait()?;
    } else {
        // keeps running; the next command replaces it
        drop(handle);
    }
    Ok(())
}

impl<A: Actuator> Robot for DriveBase<A> {
    fn execute(&mut self, cmd: &MotionCommand) -> Result<(), RobotError> {
        match *cmd {
            MotionCommand::Straight {
                distance_mm,
                speed_mm_s,
                wait,
            } => finish(self.start_straight(distance_mm, speed_mm_s)?, wait),
            MotionCommand::Turn {
                angle_deg,
                speed_deg_s,
                wait,
            } => finish(self.start_turn(angle_deg, speed_deg_s)?, wait),
            MotionCommand::Drive {
                speed_mm_s,
                turn_rate_deg_s,
            } => self.drive(speed_mm_s, turn_rate_deg_s),
            MotionCommand::Arc {
                radius_mm,
                angle_deg,
                speed_mm_s,
                wait,
            } => finish(self.start_drive_arc(radius_mm, angle_deg, speed_mm_s)?, wait),
            MotionCommand::Steer { .. }
            | MotionCommand::CenterSteering
            | MotionCommand::Calibrate => {
                Err(RobotError::UnsupportedCommand("drive base has no steering"))
            }
            MotionCommand::Stop { then } => self.stop(then),
            MotionCommand::Reset => self.reset(),
        }
    }

    fn odometry(&mut self) -> Result<Odometry, RobotError> {
        let (distance_mm, heading_deg) = DriveBase::odometry(self)?;
        Ok(Odometry {
            distance_mm,
            heading_deg: Some(heading_deg),
        })
    }

    fn halt(&mut self) -> Result<(), RobotError> {
        self.stop(None)
    }
}

impl<A: Actuator, C: Clock> Robot for Car<A, C> {
    fn execute(&mut self, cmd: &MotionCommand) -> Result<(), RobotError> {
        match *cmd {
            MotionCommand::Straight {
                distance_mm,
                speed_mm_s,
                wait,
            } => finish(self.start_drive_straight(distance_mm, speed_mm_s)?, wait),
            MotionCommand::Turn { .. } => {
                Err(RobotError::UnsupportedCommand("car cannot turn in place"))
            }
            MotionCommand::Drive { .. } => {
                Err(RobotError::UnsupportedCommand("car has no continuous drive"))
            }
            MotionCommand::Arc {
                radius_mm,
                angle_deg,
                speed_mm_s,
                wait,
            } => finish(self.start_drive_arc(radius_mm, angle_deg, speed_mm_s)?, wait),
            MotionCommand::Steer {
                angle_deg,
                speed_deg_s,
                wait,
            } => finish(self.start_steer(angle_deg, speed_deg_s)?, wait),
            MotionCommand::CenterSteering => self.center_steering().map(|_| ()),
            MotionCommand::Calibrate => self.calibrate_steering().map(|_| ()),
            MotionCommand::Stop { then } => self.stop(then),
            MotionCommand::Reset => self.reset_odometry(),
        }
    }

    fn odometry(&mut self) -> Result<Odometry, RobotError> {
        Ok(Odometry {
            distance_mm: self.distance()?,
            heading_deg: None,
        })
    }

    fn halt(&mut self) -> Result<(), RobotError> {
        self.stop(None)
    }
}

/// Build a robot on simulated actuators sharing `clock`
pub fn build_sim_robot(
    config: &RobotConfig,
    clock: &SimClock,
) -> Result<Box<dyn Robot>, RobotError> {
    match config {
        RobotConfig::DriveBase(c) => {
            let base = DriveBase::new(
                SimActuator::new("left", clock),
                SimActuator::new("right", clock),
                c.clone(),
            )?;
            Ok(Box::new(base))
        }
        RobotConfig::Car(c) => {
            let (min, max) = SIM_STEERING_STOPS_DEG;
            let steer = SimActuator::new("steer", clock).with_limits(min, max);
            let drive = SimActuator::new("drive", clock);
            let mut car = Car::new(drive, steer, c.clone(), clock.clone())?;
            car.initialize()?;
            Ok(Box::new(car))
        }
    }
}

pub struct Runtime {
    robot: Box<dyn Robot>,
    driving: bool,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(robot: Box<dyn Robot>) -> Self {
        Self {
            robot,
            driving: false,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Execute an incoming command
    pub fn on_command(&mut self, cmd: &MotionCommand, now: Instant) {
        info!("Received command: {:?}", cmd);
        self.cmd_received_at = now;
        match self.robot.execute(cmd) {
            Ok(()) => {
                self.driving = cmd.is_continuous();
                self.health = RuntimeHealth::Ok;
            }
            Err(e) => {
                warn!("Command failed: {}", e);
                self.driving = false;
                self.health = RuntimeHealth::Fault;
            }
        }
    }

    /// Stop a continuous drive that has not been refreshed in time
    pub fn check_watchdog(&mut self, now: Instant) {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        if !self.driving || cmd_age <= CMD_TIMEOUT {
            return;
        }

        // Watchdog triggered - stop the robot
        warn!("Command stale ({:?} old), stopping robot", cmd_age);
        self.driving = false;
        self.health = match self.robot.halt() {
            Ok(()) => RuntimeHealth::CmdStale,
            Err(e) => {
                warn!("Failed to stop robot: {}", e);
                RuntimeHealth::Fault
            }
        };
    }

    /// Stop the robot regardless of what it is doing
    pub fn halt(&mut self) {
        self.driving = false;
        if let Err(e) = self.robot.halt() {
            warn!("Failed to stop robot: {}", e);
            self.health = RuntimeHealth::Fault;
        }
    }

    pub fn odometry(&mut self) -> Option<Odometry> {
        match self.robot.odometry() {
            Ok(odometry) => Some(odometry),
            Err(e) => {
                warn!("Failed to read odometry: {}", e);
                self.health = RuntimeHealth::Fault;
                None
            }
        }
    }
}

pub async fn run(config: RobotConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let clock = SimClock::new();
    let robot = build_sim_robot(&config, &clock)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MOTION).await?;
    let pub_odometry = session.declare_publisher(TOPIC_ODOMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(robot);
    let period = Duration::from_millis(1000 / LOOP_HZ);
    let mut tick = interval(period);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_MOTION);
    info!("Publishing to: {}, {}", TOPIC_ODOMETRY, TOPIC_HEALTH);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down, stopping robot");
                runtime.halt();
                return Ok(());
            }
        }
        // simulated actuators follow wall time between commands
        clock.advance(period.as_millis() as u64);

        // 1. Drain all pending commands (non-blocking), in order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotionCommand>(&payload) {
                Ok(cmd) => runtime.on_command(&cmd, Instant::now()),
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Watchdog
        runtime.check_watchdog(Instant::now());

        // 3. Publish odometry
        if let Some(odometry) = runtime.odometry() {
            pub_odometry.put(serde_json::to_string(&odometry)?).await?;
        }

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CarConfig, DriveBaseConfig};
    use crate::motion::Stop;
    use crate::motion::sim::Command;

    fn drive(speed: f32) -> MotionCommand {
        MotionCommand::Drive {
            speed_mm_s: speed,
            turn_rate_deg_s: 0.0,
        }
    }

    #[test]
    fn test_watchdog_stops_stale_drive() {
        let clock = SimClock::new();
        let left = SimActuator::new("left", &clock);
        let right = SimActuator::new("right", &clock);
        let log = right.command_log();
        let base = DriveBase::new(left, right, DriveBaseConfig::new(56.0, 128.0)).unwrap();
        let mut runtime = Runtime::new(Box::new(base));
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);

        let t0 = Instant::now();
        runtime.on_command(&drive(100.0), t0);
        assert_eq!(runtime.health(), RuntimeHealth::Ok);

        runtime.check_watchdog(t0 + Duration::from_millis(100));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
        assert_eq!(log.last(), Some(Command::Run { speed: 205 }));

        runtime.check_watchdog(t0 + Duration::from_millis(300));
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
        assert_eq!(log.last(), Some(Command::Stop { then: Stop::SmartBrake }));
    }

    #[test]
    fn test_halt_stops_continuous_drive() {
        let clock = SimClock::new();
        let robot = build_sim_robot(&RobotConfig::default(), &clock).unwrap();
        let mut runtime = Runtime::new(robot);

        let t0 = Instant::now();
        runtime.on_command(&drive(100.0), t0);
        clock.advance(500);
        runtime.halt();
        let moved = runtime.odometry().unwrap().distance_mm;
        clock.advance(500);
        assert_eq!(runtime.odometry().unwrap().distance_mm, moved);

        // already stopped, so the watchdog has nothing to do
        runtime.check_watchdog(t0 + Duration::from_secs(1));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_discrete_command_is_not_watched() {
        let clock = SimClock::new();
        let robot = build_sim_robot(&RobotConfig::default(), &clock).unwrap();
        let mut runtime = Runtime::new(robot);

        let t0 = Instant::now();
        runtime.on_command(
            &MotionCommand::Straight {
                distance_mm: 100.0,
                speed_mm_s: 200.0,
                wait: true,
            },
            t0,
        );
        runtime.check_watchdog(t0 + Duration::from_secs(5));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);

        let odometry = runtime.odometry().unwrap();
        assert!((odometry.distance_mm - 100.0).abs() < 0.5);
        assert!(odometry.heading_deg.unwrap().abs() < 0.5);
    }

    #[test]
    fn test_unsupported_command_reports_fault() {
        let clock = SimClock::new();
        let mut config = CarConfig::new(56.0, 160.0);
        config.auto_calibrate = false;
        let robot = build_sim_robot(&RobotConfig::Car(config), &clock).unwrap();
        let mut runtime = Runtime::new(robot);

        runtime.on_command(
            &MotionCommand::Turn {
                angle_deg: 90.0,
                speed_deg_s: 90.0,
                wait: true,
            },
            Instant::now(),
        );
        assert_eq!(runtime.health(), RuntimeHealth::Fault);

        runtime.on_command(&MotionCommand::CenterSteering, Instant::now());
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
        assert_eq!(runtime.odometry().unwrap().heading_deg, None);
    }

    #[test]
    fn test_car_arc_without_wait_recenters_on_next_command() {
        let clock = SimClock::new();
        let drive = SimActuator::new("drive", &clock);
        let steer = SimActuator::new("steer", &clock).with_limits(-55, 65);
        let steer_log = steer.command_log();
        let mut config = CarConfig::new(56.0, 160.0);
        config.auto_calibrate = false;
        let mut car = Car::new(drive, steer, config, clock.clone()).unwrap();
        car.initialize().unwrap();
        steer_log.clear();
        let mut runtime = Runtime::new(Box::new(car));

        runtime.on_command(
            &MotionCommand::Arc {
                radius_mm: 300.0,
                angle_deg: 90.0,
                speed_mm_s: 200.0,
                wait: false,
            },
            Instant::now(),
        );
        clock.advance(60_000);
        runtime.on_command(
            &MotionCommand::Straight {
                distance_mm: 100.0,
                speed_mm_s: 200.0,
                wait: true,
            },
            Instant::now(),
        );
        assert_eq!(runtime.health(), RuntimeHealth::Ok);

        let targets: Vec<i32> = steer_log
            .motions()
            .into_iter()
            .filter_map(|c| match c {
                Command::RunTarget { target, .. } => Some(target),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec![28, 0]);
    }

    #[test]
    fn test_sim_car_calibrates_on_build() {
        let clock = SimClock::new();
        let robot = build_sim_robot(&RobotConfig::Car(CarConfig::new(56.0, 160.0)), &clock);
        assert!(robot.is_ok());
        // both stop searches plus settling take simulated time
        assert!(clock.now_ms() > 1000);
    }
}
