use wheeled_motion::config::{CarConfig, DriveBaseConfig};
use wheeled_motion::motion::sim::Command;
use wheeled_motion::motion::{
    Actuator, ActuatorError, CalibrationState, Car, DriveBase, RobotError, SimActuator, SimClock,
    Stop,
};

fn drive_base() -> (DriveBase<SimActuator>, SimClock) {
    let clock = SimClock::new();
    let base = DriveBase::new(
        SimActuator::new("left", &clock),
        SimActuator::new("right", &clock),
        DriveBaseConfig::new(56.0, 128.0),
    )
    .unwrap();
    (base, clock)
}

fn run_angle(command: Option<Command>) -> (i32, i32) {
    match command {
        Some(Command::RunAngle { speed, angle, .. }) => (speed, angle),
        other => panic!("expected run_angle, got {:?}", other),
    }
}

#[test]
fn straight_then_turn_matches_reference_numbers() {
    let clock = SimClock::new();
    let left = SimActuator::new("left", &clock);
    let right = SimActuator::new("right", &clock);
    let (left_log, right_log) = (left.command_log(), right.command_log());
    let mut base = DriveBase::new(left, right, DriveBaseConfig::new(56.0, 128.0)).unwrap();

    base.straight(280.0, 200.0).unwrap();
    assert_eq!(run_angle(left_log.last()).1, 573);
    assert_eq!(run_angle(right_log.last()).1, 573);

    base.turn(-90.0, 90.0).unwrap();
    let (_, left_angle) = run_angle(left_log.last());
    let (_, right_angle) = run_angle(right_log.last());
    assert_eq!(left_angle.abs(), 206);
    assert_eq!(right_angle, -left_angle);
    assert!(right_angle > 0);
}

#[test]
fn straight_distance_round_trip() {
    let (mut base, _) = drive_base();
    for d in [10.0, 280.0, -150.0, 1234.5] {
        base.reset().unwrap();
        base.straight(d, 200.0).unwrap();
        let distance = base.distance().unwrap();
        assert!((distance - d).abs() < 0.5, "straight({}) -> {}", d, distance);
        assert!(base.heading().unwrap().abs() < 0.5);
    }
}

#[test]
fn turn_heading_round_trip() {
    let (mut base, _) = drive_base();
    for angle in [90.0, -45.0, 180.0, 30.0] {
        base.reset().unwrap();
        base.turn(angle, 90.0).unwrap();
        let heading = base.heading().unwrap();
        assert!((heading - angle).abs() < 1.0, "turn({}) -> {}", angle, heading);

        base.turn(-angle, 90.0).unwrap();
        assert!(base.heading().unwrap().abs() < 1.0);
        assert!(base.distance().unwrap().abs() < 0.5);
    }
}

#[test]
fn arc_wheel_travel_follows_radius_ratio() {
    let clock = SimClock::new();
    let left = SimActuator::new("left", &clock);
    let right = SimActuator::new("right", &clock);
    let (left_log, right_log) = (left.command_log(), right.command_log());
    let mut base = DriveBase::new(left, right, DriveBaseConfig::new(56.0, 128.0)).unwrap();

    for speed in [100.0, 300.0] {
        base.drive_arc(500.0, 90.0, speed).unwrap();
        let (_, l) = run_angle(left_log.last());
        let (_, r) = run_angle(right_log.last());
        let expected = (500.0 - 64.0) / (500.0 + 64.0);
        // dispatched angles are whole degrees
        assert!((l as f32 / r as f32 - expected).abs() < 0.005);
    }
}

#[test]
fn zero_radius_dispatches_nothing() {
    let clock = SimClock::new();
    let left = SimActuator::new("left", &clock);
    let right = SimActuator::new("right", &clock);
    let (left_log, right_log) = (left.command_log(), right.command_log());
    let mut base = DriveBase::new(left, right, DriveBaseConfig::new(56.0, 128.0)).unwrap();
    left_log.clear();
    right_log.clear();

    assert!(matches!(
        base.drive_arc(0.0, 45.0, 100.0),
        Err(RobotError::InvalidGeometry(_))
    ));
    assert!(left_log.is_empty());
    assert!(right_log.is_empty());
}

#[test]
fn non_blocking_motion_is_replaced_by_next_command() {
    let (mut base, clock) = drive_base();
    let handle = base.start_straight(1000.0, 100.0).unwrap();
    drop(handle);
    clock.advance(1000);

    // about 100mm in, a new command takes over
    base.stop(Some(Stop::Hold)).unwrap();
    let distance = base.distance().unwrap();
    assert!((distance - 100.0).abs() < 1.0, "distance {}", distance);
}

#[test]
fn car_calibrates_between_stops() {
    let clock = SimClock::new();
    let drive = SimActuator::new("drive", &clock);
    let steer = SimActuator::new("steer", &clock).with_limits(-40, 60);
    let steer_log = steer.command_log();
    let mut car = Car::new(drive, steer, CarConfig::new(56.0, 160.0), clock).unwrap();

    car.initialize().unwrap();
    assert_eq!(car.steering_center(), Some(10));
    assert_eq!(car.calibration_state(), CalibrationState::Calibrated);

    car.steer(0.0, 100).unwrap();
    assert_eq!(
        steer_log.last(),
        Some(Command::RunTarget {
            speed: 100,
            target: 10,
            then: Stop::Hold
        })
    );

    // beyond the configured maximum
    car.steer(200.0, 100).unwrap();
    let Some(Command::RunTarget { target, .. }) = steer_log.last() else {
        panic!("expected steering target");
    };
    assert_eq!(target, 55);

    let (_, mut steer, _) = car.into_parts();
    assert_eq!(steer.angle().unwrap(), 55);
}

#[test]
fn car_calibration_fault_propagates() {
    let clock = SimClock::new();
    let drive = SimActuator::new("drive", &clock);
    let mut steer = SimActuator::new("steer", &clock);
    let fault = ActuatorError::Fault {
        name: "steer".to_string(),
        reason: "overcurrent".to_string(),
    };
    steer.inject_fault(fault.clone());
    let mut car = Car::new(drive, steer, CarConfig::new(56.0, 160.0), clock).unwrap();

    match car.calibrate_steering() {
        Err(RobotError::Actuator(e)) => assert_eq!(e, fault),
        other => panic!("expected actuator fault, got {:?}", other),
    }
    assert_eq!(car.calibration_state(), CalibrationState::Uncalibrated);
}
