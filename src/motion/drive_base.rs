// Differential drive base: two wheels on a common axle
//
// Robot-level moves are turned into one positional command per wheel. Both wheels
// are dispatched before anything blocks so they start together; only the right
// wheel is awaited.

use tracing::{debug, info};

use super::actuator::{Actuator, Stop};
use super::error::{Result, check_finite, check_radius};
use super::handle::{Completion, MotionHandle};
use super::kinematics::{self, WheelGeometry, WheelTargets, to_command};
use crate::config::DriveBaseConfig;

pub struct DriveBase<A: Actuator> {
    left: A,
    right: A,
    config: DriveBaseConfig,
    geometry: WheelGeometry,
}

impl<A: Actuator> DriveBase<A> {
    /// Take ownership of both wheel actuators and zero the odometry
    pub fn new(left: A, right: A, config: DriveBaseConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Drive base: wheel={}mm axle={}mm default_stop={:?}",
            config.wheel_diameter_mm, config.axle_track_mm, config.default_stop
        );
        let mut base = Self {
            left,
            right,
            geometry: WheelGeometry::new(config.wheel_diameter_mm),
            config,
        };
        base.reset()?;
        Ok(base)
    }

    pub fn config(&self) -> &DriveBaseConfig {
        &self.config
    }

    /// Give the actuators back
    pub fn into_parts(self) -> (A, A) {
        (self.left, self.right)
    }

    fn dispatch(&mut self, targets: WheelTargets) -> Result<MotionHandle<'_, A>> {
        let then = self.config.default_stop;
        let (left_angle, right_angle) = (
            to_command(targets.left_deg),
            to_command(targets.right_deg),
        );
        let (left_speed, right_speed) = (
            to_command(targets.left_speed),
            to_command(targets.right_speed),
        );
        debug!(
            "Wheel targets: left={}deg@{} right={}deg@{}",
            left_angle, left_speed, right_angle, right_speed
        );

        self.left.run_angle(left_speed, left_angle, then)?;
        self.right.run_angle(right_speed, right_angle, then)?;
        Ok(MotionHandle::new(&mut self.right, then).with_companion(&mut self.left))
    }

    /// Start driving `distance_mm` (negative = backwards) without blocking
    pub fn start_straight(
        &mut self,
        distance_mm: f32,
        speed_mm_s: f32,
    ) -> Result<MotionHandle<'_, A>> {
        check_finite("distance_mm", distance_mm)?;
        check_finite("speed_mm_s", speed_mm_s)?;
        info!("Straight {}mm at {}mm/s", distance_mm, speed_mm_s);
        let targets = kinematics::straight(&self.geometry, distance_mm, speed_mm_s);
        self.dispatch(targets)
    }

    pub fn straight(&mut self, distance_mm: f32, speed_mm_s: f32) -> Result<Completion> {
        self.start_straight(distance_mm, speed_mm_s)?.wait()
    }

    /// Start an in-place turn (positive = clockwise) without blocking
    pub fn start_turn(&mut self, angle_deg: f32, speed_deg_s: f32) -> Result<MotionHandle<'_, A>> {
        check_finite("angle_deg", angle_deg)?;
        check_finite("speed_deg_s", speed_deg_s)?;
        info!("Turn {}deg at {}deg/s", angle_deg, speed_deg_s);
        let targets = kinematics::pivot(
            &self.geometry,
            self.config.axle_track_mm,
            angle_deg,
            speed_deg_s,
        );
        self.dispatch(targets)
    }

    pub fn turn(&mut self, angle_deg: f32, speed_deg_s: f32) -> Result<Completion> {
        self.start_turn(angle_deg, speed_deg_s)?.wait()
    }

    /// Start following an arc of `radius_mm` through `angle_deg` without blocking.
    ///
    /// Positive radius puts the left wheel on the inner track, so the base turns
    /// left (heading decreases). Negative `angle_deg` drives the arc backwards.
    /// A zero radius is rejected before any wheel moves.
    pub fn start_drive_arc(
        &mut self,
        radius_mm: f32,
        angle_deg: f32,
        speed_mm_s: f32,
    ) -> Result<MotionHandle<'_, A>> {
        check_radius(radius_mm)?;
        check_finite("angle_deg", angle_deg)?;
        check_finite("speed_mm_s", speed_mm_s)?;
        info!(
            "Arc r={}mm through {}deg at {}mm/s",
            radius_mm, angle_deg, speed_mm_s
        );
        let targets = kinematics::differential_arc(
            &self.geometry,
            self.config.axle_track_mm,
            radius_mm,
            angle_deg,
            speed_mm_s,
        );
        self.dispatch(targets)
    }

    pub fn drive_arc(
        &mut self,
        radius_mm: f32,
        angle_deg: f32,
        speed_mm_s: f32,
    ) -> Result<Completion> {
        self.start_drive_arc(radius_mm, angle_deg, speed_mm_s)?.wait()
    }

    /// Run both wheels continuously. Returns immediately.
    pub fn drive(&mut self, speed_mm_s: f32, turn_rate_deg_s: f32) -> Result<()> {
        check_finite("speed_mm_s", speed_mm_s)?;
        check_finite("turn_rate_deg_s", turn_rate_deg_s)?;
        let (left, right) = kinematics::differential_speeds(
            &self.geometry,
            self.config.axle_track_mm,
            speed_mm_s,
            turn_rate_deg_s,
        );
        debug!("Drive: left={:.1}deg/s right={:.1}deg/s", left, right);
        self.left.run(to_command(left))?;
        self.right.run(to_command(right))?;
        Ok(())
    }

    /// Stop both wheels with `then`, or the configured default
    pub fn stop(&mut self, then: Option<Stop>) -> Result<()> {
        let then = then.unwrap_or(self.config.default_stop);
        info!("Stopping drive base ({:?})", then);
        self.left.stop(then)?;
        self.right.stop(then)?;
        Ok(())
    }

    fn wheel_travel_mm(&mut self) -> Result<(f32, f32)> {
        let left = self.geometry.deg_to_mm(self.left.angle()? as f32);
        let right = self.geometry.deg_to_mm(self.right.angle()? as f32);
        Ok((left, right))
    }

    /// Mean distance travelled by both wheels since the last reset
    pub fn distance(&mut self) -> Result<f32> {
        let (left, right) = self.wheel_travel_mm()?;
        Ok((left + right) / 2.0)
    }

    /// Heading change since the last reset, clockwise positive
    pub fn heading(&mut self) -> Result<f32> {
        let (left, right) = self.wheel_travel_mm()?;
        Ok(kinematics::heading_deg(self.config.axle_track_mm, left, right))
    }

    /// `(distance_mm, heading_deg)` from a single read of both wheels
    pub fn odometry(&mut self) -> Result<(f32, f32)> {
        let (left, right) = self.wheel_travel_mm()?;
        Ok((
            (left + right) / 2.0,
            kinematics::heading_deg(self.config.axle_track_mm, left, right),
        ))
    }

    /// Zero distance and heading
    pub fn reset(&mut self) -> Result<()> {
        self.left.reset_angle(0)?;
        self.right.reset_angle(0)?;
        Ok(())
    }
}
