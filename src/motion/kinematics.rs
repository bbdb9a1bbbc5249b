// Wheel geometry for differential and Ackermann chassis
// Converts robot-level distances, angles and speeds into per-wheel degrees.

use std::f32::consts::PI;

/// Linear <-> angular conversion for a wheel of a given diameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    wheel_diameter_mm: f32,
}

impl WheelGeometry {
    /// Caller guarantees `wheel_diameter_mm > 0` (validated by the robot configs)
    pub fn new(wheel_diameter_mm: f32) -> Self {
        Self { wheel_diameter_mm }
    }

    pub fn circumference_mm(&self) -> f32 {
        PI * self.wheel_diameter_mm
    }

    /// Wheel degrees per millimeter of travel
    pub fn deg_per_mm(&self) -> f32 {
        360.0 / self.circumference_mm()
    }

    pub fn mm_to_deg(&self, mm: f32) -> f32 {
        mm * self.deg_per_mm()
    }

    pub fn deg_to_mm(&self, deg: f32) -> f32 {
        deg / self.deg_per_mm()
    }
}

/// Per-wheel positional command (degrees, deg/s) before rounding
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelTargets {
    pub left_deg: f32,
    pub right_deg: f32,
    pub left_speed: f32,
    pub right_speed: f32,
}

/// Round a float command to the whole degrees an actuator accepts
pub fn to_command(value: f32) -> i32 {
    // `as` saturates, so huge values clamp to the i32 range
    value.round() as i32
}

/// Circumference of the circle the wheels trace when pivoting in place
pub fn axle_circumference_mm(axle_track_mm: f32) -> f32 {
    PI * axle_track_mm
}

/// Length of a circular arc of `angle_deg` around `radius_mm` (always >= 0)
pub fn arc_length_mm(radius_mm: f32, angle_deg: f32) -> f32 {
    (angle_deg.abs() / 360.0) * (2.0 * PI * radius_mm.abs())
}

/// Both wheels roll the same distance at the same speed
pub fn straight(geometry: &WheelGeometry, distance_mm: f32, speed_mm_s: f32) -> WheelTargets {
    let angle = geometry.mm_to_deg(distance_mm);
    let speed = geometry.mm_to_deg(speed_mm_s);
    WheelTargets {
        left_deg: angle,
        right_deg: angle,
        left_speed: speed,
        right_speed: speed,
    }
}

/// In-place pivot. Positive angles drive the left wheel forward (clockwise).
pub fn pivot(
    geometry: &WheelGeometry,
    axle_track_mm: f32,
    angle_deg: f32,
    speed_deg_s: f32,
) -> WheelTargets {
    let circumference = axle_circumference_mm(axle_track_mm);
    let rotation = geometry.mm_to_deg((angle_deg / 360.0) * circumference);
    let speed = geometry.mm_to_deg((speed_deg_s / 360.0) * circumference);
    WheelTargets {
        left_deg: rotation,
        right_deg: -rotation,
        left_speed: speed,
        right_speed: speed,
    }
}

/// Continuous wheel speeds (deg/s) for a forward speed and turn rate
///
/// Returns `(left, right)`: left = speed - turn/2, right = speed + turn/2, where
/// turn is the rate converted to differential wheel speed over the axle circumference.
pub fn differential_speeds(
    geometry: &WheelGeometry,
    axle_track_mm: f32,
    speed_mm_s: f32,
    turn_rate_deg_s: f32,
) -> (f32, f32) {
    let turn_mm_s = (turn_rate_deg_s / 360.0) * axle_circumference_mm(axle_track_mm);
    (
        geometry.mm_to_deg(speed_mm_s - turn_mm_s / 2.0),
        geometry.mm_to_deg(speed_mm_s + turn_mm_s / 2.0),
    )
}

/// Arc drive for a differential base
///
/// Each wheel follows its own radius (`radius ∓ axle/2`); its travel and speed are
/// the centerline values scaled by `wheel_radius / radius`. A negative `angle_deg`
/// reverses both. `radius_mm` must be non-zero.
pub fn differential_arc(
    geometry: &WheelGeometry,
    axle_track_mm: f32,
    radius_mm: f32,
    angle_deg: f32,
    speed_mm_s: f32,
) -> WheelTargets {
    let centerline_mm = arc_length_mm(radius_mm, angle_deg);
    let left_ratio = (radius_mm - axle_track_mm / 2.0) / radius_mm;
    let right_ratio = (radius_mm + axle_track_mm / 2.0) / radius_mm;

    let mut targets = WheelTargets {
        left_deg: geometry.mm_to_deg(centerline_mm * left_ratio),
        right_deg: geometry.mm_to_deg(centerline_mm * right_ratio),
        left_speed: geometry.mm_to_deg(speed_mm_s * left_ratio),
        right_speed: geometry.mm_to_deg(speed_mm_s * right_ratio),
    };

    if angle_deg < 0.0 {
        targets.left_deg = -targets.left_deg;
        targets.right_deg = -targets.right_deg;
        targets.left_speed = -targets.left_speed;
        targets.right_speed = -targets.right_speed;
    }
    targets
}

/// Steering angle (degrees) that makes a car of `wheelbase_mm` follow `radius_mm`.
/// Negative radius (left turn) gives a negative angle. `radius_mm` must be non-zero.
pub fn ackermann_steering_deg(wheelbase_mm: f32, radius_mm: f32) -> f32 {
    let angle = (wheelbase_mm / radius_mm.abs()).atan().to_degrees();
    if radius_mm < 0.0 { -angle } else { angle }
}

/// Heading change (degrees, clockwise positive) from wheel travel in mm
pub fn heading_deg(axle_track_mm: f32, left_mm: f32, right_mm: f32) -> f32 {
    (left_mm - right_mm) / (2.0 * axle_circumference_mm(axle_track_mm)) * 360.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHEEL: f32 = 56.0;
    const AXLE: f32 = 128.0;

    fn approx(a: f32, b: f32, tol: f32) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_mm_deg_conversion() {
        let g = WheelGeometry::new(WHEEL);
        // one revolution covers exactly one circumference
        assert!(approx(g.mm_to_deg(g.circumference_mm()), 360.0, 1e-3));
        assert!(approx(g.deg_to_mm(g.mm_to_deg(123.4)), 123.4, 1e-3));
    }

    #[test]
    fn test_straight_angle() {
        let g = WheelGeometry::new(WHEEL);
        let t = straight(&g, 280.0, 200.0);
        println!("Straight 280mm: left={}, right={}", t.left_deg, t.right_deg);
        assert_eq!(to_command(t.left_deg), 573);
        assert_eq!(to_command(t.right_deg), 573);
        assert_eq!(t.left_speed, t.right_speed);
    }

    #[test]
    fn test_pivot_quarter_turn() {
        let g = WheelGeometry::new(WHEEL);
        let t = pivot(&g, AXLE, -90.0, 90.0);
        println!("Pivot -90: left={}, right={}", t.left_deg, t.right_deg);
        // (90/360) * pi * 128 = 100.5mm of wheel travel -> ~205.7 deg
        assert!(approx(t.left_deg, -205.7, 0.1));
        assert!(approx(t.right_deg, 205.7, 0.1));
        assert!(t.left_speed > 0.0 && t.right_speed > 0.0);
    }

    #[test]
    fn test_pivot_heading_matches_turn() {
        let g = WheelGeometry::new(WHEEL);
        for angle in [-270.0, -90.0, 15.0, 45.0, 180.0] {
            let t = pivot(&g, AXLE, angle, 90.0);
            let heading = heading_deg(AXLE, g.deg_to_mm(t.left_deg), g.deg_to_mm(t.right_deg));
            assert!(approx(heading, angle, 1e-2), "angle {} -> heading {}", angle, heading);
        }
    }

    #[test]
    fn test_differential_speeds_split() {
        let g = WheelGeometry::new(WHEEL);
        let (left, right) = differential_speeds(&g, AXLE, 100.0, 0.0);
        assert_eq!(left, right);

        let (left, right) = differential_speeds(&g, AXLE, 0.0, 90.0);
        assert!(approx(left, -right, 1e-3));
        assert!(right > 0.0);
    }

    #[test]
    fn test_arc_wheel_ratio() {
        let g = WheelGeometry::new(WHEEL);
        for (radius, angle) in [(300.0, 90.0), (500.0, -45.0), (-250.0, 180.0), (40.0, 30.0)] {
            let t = differential_arc(&g, AXLE, radius, angle, 150.0);
            let expected = (radius - AXLE / 2.0) / (radius + AXLE / 2.0);
            assert!(
                approx(t.left_deg / t.right_deg, expected, 1e-4),
                "radius {}: {} vs {}",
                radius,
                t.left_deg / t.right_deg,
                expected
            );
            assert!(approx(t.left_speed / t.right_speed, expected, 1e-4));
        }
    }

    #[test]
    fn test_arc_reverse_flips_signs() {
        let g = WheelGeometry::new(WHEEL);
        let fwd = differential_arc(&g, AXLE, 300.0, 90.0, 200.0);
        let rev = differential_arc(&g, AXLE, 300.0, -90.0, 200.0);
        assert_eq!(fwd.left_deg, -rev.left_deg);
        assert_eq!(fwd.right_speed, -rev.right_speed);
    }

    #[test]
    fn test_ackermann_angle() {
        assert!(approx(ackermann_steering_deg(100.0, 100.0), 45.0, 1e-3));
        assert!(approx(ackermann_steering_deg(100.0, -100.0), -45.0, 1e-3));
        // larger radius, gentler steering
        assert!(ackermann_steering_deg(100.0, 1000.0) < ackermann_steering_deg(100.0, 200.0));
    }

    #[test]
    fn test_arc_length() {
        assert!(approx(arc_length_mm(100.0, 360.0), 2.0 * PI * 100.0, 1e-3));
        assert_eq!(arc_length_mm(-100.0, -90.0), arc_length_mm(100.0, 90.0));
    }

    #[test]
    fn test_to_command_saturates() {
        assert_eq!(to_command(1e12), i32::MAX);
        assert_eq!(to_command(-1e12), i32::MIN);
        assert_eq!(to_command(2.5), 3);
    }
}
