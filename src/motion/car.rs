// Car-like chassis: one drive actuator, one steering actuator
//
// Steering positions are expressed relative to a center found by driving the
// steering into both mechanical stops (see `calibration`).

use tracing::{debug, info, warn};

use super::actuator::{Actuator, Clock, Stop};
use super::calibration::{CalibrationEvent, CalibrationState, SteeringCalibration};
use super::error::{Result, RobotError, check_finite, check_radius};
use super::handle::{Completion, MotionHandle, Recenter};
use super::kinematics::{self, WheelGeometry, to_command};
use crate::config::{CENTER_STEER_SPEED_DEG_S, CarConfig, DEFAULT_STEER_SPEED_DEG_S};

pub struct Car<A: Actuator, C: Clock> {
    drive: A,
    steer: A,
    clock: C,
    config: CarConfig,
    geometry: WheelGeometry,
    calibration: SteeringCalibration,
    steering_center: Option<i32>,
    // steering left turned by an arc whose handle was dropped
    recenter_pending: bool,
}

impl<A: Actuator, C: Clock> Car<A, C> {
    /// Take ownership of both actuators and zero the drive odometry.
    ///
    /// The steering center starts unknown; call [`Car::initialize`],
    /// [`Car::calibrate_steering`] or [`Car::set_steering_center`] before steering.
    pub fn new(drive: A, steer: A, config: CarConfig, clock: C) -> Result<Self> {
        config.validate()?;
        info!(
            "Car: wheel={}mm wheelbase={}mm max_steer={}deg",
            config.wheel_diameter_mm, config.wheelbase_mm, config.max_steering_angle_deg
        );
        let mut car = Self {
            drive,
            steer,
            clock,
            geometry: WheelGeometry::new(config.wheel_diameter_mm),
            calibration: SteeringCalibration::new(&config.calibration),
            config,
            steering_center: None,
            recenter_pending: false,
        };
        car.reset_odometry()?;
        Ok(car)
    }

    /// Calibrate when `auto_calibrate` is set. Otherwise angle 0 of the
    /// steering actuator is taken as center and the steering is moved there.
    pub fn initialize(&mut self) -> Result<()> {
        if self.config.auto_calibrate {
            self.calibrate_steering()?;
        } else {
            self.set_steering_center(0);
            self.center_steering()?;
        }
        Ok(())
    }

    pub fn config(&self) -> &CarConfig {
        &self.config
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.state()
    }

    pub fn steering_center(&self) -> Option<i32> {
        self.steering_center
    }

    /// Give the actuators and clock back
    pub fn into_parts(self) -> (A, A, C) {
        (self.drive, self.steer, self.clock)
    }

    /// Use a known center position instead of calibrating
    pub fn set_steering_center(&mut self, center: i32) {
        info!("Steering center set to {}", center);
        self.calibration.abort();
        self.calibration.mark_calibrated();
        self.steering_center = Some(center);
    }

    /// Use wherever the steering is right now as center
    pub fn mark_steering_center(&mut self) -> Result<i32> {
        let center = self.steer.angle()?;
        self.set_steering_center(center);
        Ok(center)
    }

    /// Find both steering stops and center between them.
    ///
    /// Blocks until done. Each stop search is bounded by the configured timeout;
    /// on failure the steering is held where it is and the car is left
    /// uncalibrated.
    pub fn calibrate_steering(&mut self) -> Result<i32> {
        self.steering_center = None;
        self.recenter_pending = false;
        match self.run_calibration() {
            Ok(center) => Ok(center),
            Err(e) => {
                self.calibration.abort();
                self.steering_center = None;
                if let Err(stop_err) = self.steer.stop(Stop::Hold) {
                    warn!("Failed to stop steering after calibration error: {}", stop_err);
                }
                Err(e)
            }
        }
    }

    fn run_calibration(&mut self) -> Result<i32> {
        let poll_ms = self.config.calibration.poll_interval_ms;
        let settle_ms = self.config.calibration.settle_ms;

        let speed = self.calibration.begin(self.clock.now_ms());
        self.steer.run(speed)?;

        loop {
            self.clock.sleep_ms(poll_ms);
            let speed = self.steer.speed()?;
            let angle = self.steer.angle()?;
            match self.calibration.update(speed, angle, self.clock.now_ms())? {
                CalibrationEvent::Searching => {}
                CalibrationEvent::LeftLimit { .. } => {
                    self.steer.stop(Stop::Hold)?;
                    self.clock.sleep_ms(settle_ms);
                    let speed = self.calibration.begin_right_search(self.clock.now_ms());
                    self.steer.run(speed)?;
                }
                CalibrationEvent::Calibrated { center, .. } => {
                    self.steer.stop(Stop::Hold)?;
                    self.clock.sleep_ms(settle_ms);
                    self.steering_center = Some(center);
                    self.center_steering()?;
                    return Ok(center);
                }
                CalibrationEvent::Idle => return Err(RobotError::SteeringUncalibrated),
            }
        }
    }

    fn center(&self) -> Result<i32> {
        self.steering_center.ok_or(RobotError::SteeringUncalibrated)
    }

    /// Move the steering to center and hold it there
    pub fn center_steering(&mut self) -> Result<Completion> {
        let center = self.center()?;
        debug!("Centering steering at {}", center);
        self.steer.run_target(CENTER_STEER_SPEED_DEG_S, center, Stop::Hold)?;
        let done = MotionHandle::new(&mut self.steer, Stop::Hold).wait()?;
        self.recenter_pending = false;
        Ok(done)
    }

    /// Finish the re-center of an earlier arc that was never waited on
    fn settle_steering(&mut self) -> Result<()> {
        if self.recenter_pending {
            debug!("Re-centering steering left over from a previous arc");
            self.center_steering()?;
        }
        Ok(())
    }

    /// Absolute steering target for an angle relative to center, clamped to the
    /// configured range
    fn steering_target(&self, angle_deg: f32) -> Result<i32> {
        check_finite("steering angle", angle_deg)?;
        let max = self.config.max_steering_angle_deg;
        Ok(self.center()? + to_command(angle_deg.clamp(-max, max)))
    }

    pub fn start_steer(&mut self, angle_deg: f32, speed: i32) -> Result<MotionHandle<'_, A>> {
        let target = self.steering_target(angle_deg)?;
        self.settle_steering()?;
        debug!("Steer {}deg -> target {}", angle_deg, target);
        self.steer.run_target(speed, target, Stop::Hold)?;
        Ok(MotionHandle::new(&mut self.steer, Stop::Hold))
    }

    pub fn steer(&mut self, angle_deg: f32, speed: i32) -> Result<Completion> {
        self.start_steer(angle_deg, speed)?.wait()
    }

    pub fn start_drive_straight(
        &mut self,
        distance_mm: f32,
        speed_mm_s: f32,
    ) -> Result<MotionHandle<'_, A>> {
        check_finite("distance_mm", distance_mm)?;
        check_finite("speed_mm_s", speed_mm_s)?;
        self.settle_steering()?;
        info!("Drive straight {}mm at {}mm/s", distance_mm, speed_mm_s);
        let then = self.config.default_stop;
        let angle = to_command(self.geometry.mm_to_deg(distance_mm));
        let speed = to_command(self.geometry.mm_to_deg(speed_mm_s));
        self.drive.run_angle(speed, angle, then)?;
        Ok(MotionHandle::new(&mut self.drive, then))
    }

    pub fn drive_straight(&mut self, distance_mm: f32, speed_mm_s: f32) -> Result<Completion> {
        self.start_drive_straight(distance_mm, speed_mm_s)?.wait()
    }

    /// Steer for `radius_mm` (negative = left), then drive through `arc_angle_deg`
    /// (negative = backwards).
    ///
    /// Steering is set and awaited before the drive starts. The returned handle
    /// re-centers the steering once the drive is waited on or cancelled. If it is
    /// dropped instead, the next steer or drive command re-centers first.
    pub fn start_drive_arc(
        &mut self,
        radius_mm: f32,
        arc_angle_deg: f32,
        speed_mm_s: f32,
    ) -> Result<MotionHandle<'_, A>> {
        check_radius(radius_mm)?;
        check_finite("arc_angle_deg", arc_angle_deg)?;
        check_finite("speed_mm_s", speed_mm_s)?;
        let center = self.center()?;

        let steering = kinematics::ackermann_steering_deg(self.config.wheelbase_mm, radius_mm);
        info!(
            "Arc r={}mm through {}deg (steering {:.1}deg)",
            radius_mm, arc_angle_deg, steering
        );
        self.steer(steering, DEFAULT_STEER_SPEED_DEG_S)?;

        let arc_mm = kinematics::arc_length_mm(radius_mm, arc_angle_deg);
        let mut angle = self.geometry.mm_to_deg(arc_mm);
        let mut speed = self.geometry.mm_to_deg(speed_mm_s);
        if arc_angle_deg < 0.0 {
            angle = -angle;
            speed = -speed;
        }

        let then = self.config.default_stop;
        self.drive.run_angle(to_command(speed), to_command(angle), then)?;
        self.recenter_pending = true;
        let recenter = Recenter {
            actuator: &mut self.steer,
            target: center,
            speed: CENTER_STEER_SPEED_DEG_S,
            pending: &mut self.recenter_pending,
        };
        Ok(MotionHandle::new(&mut self.drive, then).with_recenter(recenter))
    }

    pub fn drive_arc(
        &mut self,
        radius_mm: f32,
        arc_angle_deg: f32,
        speed_mm_s: f32,
    ) -> Result<Completion> {
        self.start_drive_arc(radius_mm, arc_angle_deg, speed_mm_s)?.wait()
    }

    /// Stop the drive actuator with `then`, or the configured default
    pub fn stop(&mut self, then: Option<Stop>) -> Result<()> {
        let then = then.unwrap_or(self.config.default_stop);
        info!("Stopping car ({:?})", then);
        self.drive.stop(then)?;
        Ok(())
    }

    /// Distance driven since the last odometry reset
    pub fn distance(&mut self) -> Result<f32> {
        Ok(self.geometry.deg_to_mm(self.drive.angle()? as f32))
    }

    pub fn reset_odometry(&mut self) -> Result<()> {
        self.drive.reset_angle(0)?;
        Ok(())
    }
}
