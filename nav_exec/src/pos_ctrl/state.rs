//! # Position controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant}
};
use log::{debug, info, trace, warn};
use nalgebra::Vector2;
use util::{
    maths::{ang_dist_pi, wrap_pi},
    time::duration_to_millis
};

use crate::{
    hal::{DigitalInputs, Direction, Motor, MotorDrive},
    loc::{Pose, PoseProvider, SharedPose},
    odometer::{self, Odometer},
    telemetry::{DotClass, TelemetrySink, TrackPoint}
};
use super::{
    controllers::PidController,
    heading_to,
    segment::SegmentState,
    velocity::{wheel_velocities, LEFT_CURVE, RIGHT_CURVE},
    CancelHandle, DriftStatus, Params, PosCtrlError, WaypointOutcome
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Go-to-goal position controller.
///
/// Owns the odometer and the pose estimate. The pose starts at the origin
/// with a heading of zero and is carried over from one waypoint to the next.
pub struct PositionController {
    params: Params,

    odometer: Odometer,
    motors: Arc<dyn MotorDrive>,
    telemetry: Box<dyn TelemetrySink>,

    pose: Pose,
    shared_pose: SharedPose,

    cancel: CancelHandle,

    /// Heading controller, reset at the start of each waypoint
    pid: PidController,

    /// Time spent navigating over all waypoints
    mission_time: Duration,

    /// Last (left, right) wheel velocities demanded
    demand: (f64, f64)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PositionController {
    /// Create a new controller.
    ///
    /// The odometer is created on the given inputs and, unless in simulation
    /// mode, its decode thread is started.
    pub fn new(
        params: Params,
        odo_params: &odometer::Params,
        inputs: Arc<dyn DigitalInputs>,
        motors: Arc<dyn MotorDrive>,
        telemetry: Box<dyn TelemetrySink>
    ) -> Result<Self, PosCtrlError> {
        params.validate()?;

        let mut odometer = Odometer::new(inputs, odo_params, params.wheel_radius_cm)?;

        if params.simulation {
            info!("Position control in simulation mode, motors won't be driven");
        }
        else {
            odometer.run()?;
        }

        let pid = PidController::new(params.k_p, params.k_i, params.k_d);

        Ok(Self {
            params,
            odometer,
            motors,
            telemetry,
            pose: Pose::default(),
            shared_pose: SharedPose::default(),
            cancel: CancelHandle::default(),
            pid,
            mission_time: Duration::from_secs(0),
            demand: (0.0, 0.0)
        })
    }

    /// Drive to the given global position.
    ///
    /// Blocks until the robot arrives, drifts too far away, is cancelled, or
    /// an error occurs. The motors are always stopped before returning.
    pub fn go_to_waypoint(&mut self, x: f64, y: f64) -> Result<WaypointOutcome, PosCtrlError> {
        let result = self.transit(Vector2::new(x, y));

        let stopped = if self.params.simulation {
            Ok(())
        }
        else {
            self.motors.stop_all()
        };

        let outcome = result?;
        stopped?;

        info!(
            "Waypoint ({:.2}, {:.2}) ended {:?} at ({:.2}, {:.2}) heading {:.3}",
            x, y, outcome, self.pose.x(), self.pose.y(), self.pose.heading_rad
        );

        Ok(outcome)
    }

    /// Get the current pose estimate.
    pub fn current_pose(&self) -> Pose {
        self.pose
    }

    /// Get a handle to the pose which can be read from other threads.
    pub fn pose_handle(&self) -> SharedPose {
        self.shared_pose.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn odometer(&self) -> &Odometer {
        &self.odometer
    }

    pub fn mission_time(&self) -> Duration {
        self.mission_time
    }

    /// The control loop for one waypoint.
    fn transit(&mut self, target: Vector2<f64>) -> Result<WaypointOutcome, PosCtrlError> {
        let mut seg = SegmentState::new(
            &self.params,
            target,
            heading_to(&target, &self.pose.position_cm, self.pose.heading_rad)
        );

        info!(
            "Going to ({:.2}, {:.2}) from ({:.2}, {:.2}) heading {:.3}, required heading {:.3}",
            target[0], target[1],
            self.pose.x(), self.pose.y(), self.pose.heading_rad,
            seg.reference_heading
        );

        self.odometer.reset();
        self.pid.reset();
        self.demand = (0.0, 0.0);

        let mut last_tick = Instant::now();

        loop {
            if self.cancel.take() {
                info!("Navigation cancelled");
                return Ok(WaypointOutcome::Cancelled)
            }

            if !self.params.simulation
                && (self.odometer.has_error() || !self.odometer.is_running())
            {
                warn!("Odometer has stopped, abandoning the waypoint");
                return Err(PosCtrlError::OdometerFailed)
            }

            // Re-aim from the latest pose estimate
            if seg.iteration % self.params.heading_recompute_interval as u64 == 0 {
                seg.reference_heading = heading_to(
                    &seg.target, &self.pose.position_cm, self.pose.heading_rad
                );
                debug!("Required heading is now {:.3}", seg.reference_heading);
            }

            let now = Instant::now();
            let tick = now - last_tick;
            last_tick = now;
            let dt = tick.as_secs_f64();

            seg.elapsed += tick;
            self.mission_time += tick;

            // Wheel travel since the start of the waypoint
            let (dist_left, dist_right) = if self.params.simulation {
                seg.integrate_velocities(self.demand, dt)
            }
            else {
                self.odometer.distance()
            };
            let deltas = seg.distance_deltas(dist_left, dist_right);

            // Dead reckoning
            self.pose.position_cm += deltas.total * self.pose.forward2();
            self.pose.heading_rad = wrap_pi(
                self.pose.heading_rad + (deltas.right - deltas.left) / self.params.wheelbase_cm
            );
            self.pose.timestamp_ms = duration_to_millis(self.mission_time);
            self.shared_pose.publish(self.pose);

            let heading_error = ang_dist_pi(seg.reference_heading, self.pose.heading_rad);
            let distance = (seg.target - self.pose.position_cm).norm();

            debug!(
                "[{}] dist ({:.2}, {:.2}) pose ({:.2}, {:.2}, {:.4}) heading error {:.4} distance to target {:.2}",
                seg.iteration, dist_left, dist_right,
                self.pose.x(), self.pose.y(), self.pose.heading_rad,
                heading_error, distance
            );

            match seg.drift.update(distance) {
                DriftStatus::Abort => {
                    warn!(
                        "Distance to target grew to {:.2} (initially {:.2}), abandoning the waypoint",
                        distance, seg.drift.initial().unwrap_or(distance)
                    );
                    return Ok(WaypointOutcome::AbortedDrift)
                },
                DriftStatus::Drifting { consecutive, growth } => trace!(
                    "Not getting closer for {} ticks, {:.2} further away", consecutive, growth
                ),
                DriftStatus::Improving => ()
            }

            if distance < self.params.approach_radius_cm && !seg.approaching {
                info!("Approaching the target, slowing down");
                seg.approaching = true;
            }

            if distance <= self.params.arrival_radius_cm {
                info!(
                    "Within {:.2} of the target after {:.2} s and {} ticks",
                    distance, seg.elapsed.as_secs_f64(), seg.iteration
                );
                self.record(DotClass::Arrival, true);
                return Ok(WaypointOutcome::Arrived)
            }

            self.record(
                if seg.approaching { DotClass::Approaching } else { DotClass::Neutral },
                false
            );

            let forward = if seg.approaching {
                self.params.approach_velocity
            }
            else {
                self.params.cruise_velocity
            };

            let terms = self.pid.update(heading_error, dt);
            let u = terms.p + terms.i + terms.d;

            let (vel_left, vel_right) = wheel_velocities(
                forward, u, self.params.wheelbase_cm, self.params.wheel_radius_cm
            );
            self.demand = (vel_left, vel_right);

            let pct_left = LEFT_CURVE.duty_cycle_pct(vel_left, self.params.max_velocity);
            let pct_right = RIGHT_CURVE.duty_cycle_pct(vel_right, self.params.max_velocity);

            debug!(
                "P {:.6} I {:.6} D {:.6} u {:.6} -> velocities ({:.2}, {:.2}) duty ({}, {})",
                terms.p, terms.i, terms.d, u, vel_left, vel_right, pct_left, pct_right
            );

            if !self.params.simulation {
                self.motors.drive(Motor::Left, Direction::from_velocity(vel_left), pct_left)?;
                self.motors.drive(Motor::Right, Direction::from_velocity(vel_right), pct_right)?;
            }

            seg.iteration += 1;

            thread::sleep(self.params.tick_period());
        }
    }

    /// Record the current position to telemetry. Failures are only logged.
    fn record(&mut self, class: DotClass, waypoint: bool) {
        let point = TrackPoint {
            time_s: self.mission_time.as_secs_f64(),
            x: self.pose.x(),
            y: self.pose.y(),
            class,
            waypoint
        };

        if let Err(e) = self.telemetry.record(&point) {
            warn!("Could not record telemetry: {}", e);
        }
    }
}

impl PoseProvider for PositionController {
    fn current_pose(&self) -> Pose {
        self.pose
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        hal::mock::{EncoderSim, MotorCommand, RecordingMotors, RecordingSink, ScriptFeeder, ScriptedInputs},
        odometer::{EncoderPins, Params as OdoParams},
        pos_ctrl::DriftPolicy
    };
    use approx::assert_abs_diff_eq;

    struct Rig {
        ctrl: PositionController,
        inputs: Arc<ScriptedInputs>,
        feeder: ScriptFeeder,
        motors: Arc<RecordingMotors>,
        sink: RecordingSink
    }

    fn rig(simulation: bool) -> Rig {
        rig_with(Params {
            tick_period_ms: 5,
            simulation,
            ..Params::default()
        })
    }

    fn rig_with(params: Params) -> Rig {
        let odo_params = OdoParams {
            pins: EncoderPins::default(),
            calibration_timeout_s: 0.1
        };

        let (inputs, feeder) = ScriptedInputs::new();
        let inputs = Arc::new(inputs);
        let motors = Arc::new(RecordingMotors::default());
        let sink = RecordingSink::default();

        let ctrl = PositionController::new(
            params,
            &odo_params,
            inputs.clone(),
            motors.clone(),
            Box::new(sink.clone())
        ).unwrap();

        Rig { ctrl, inputs, feeder, motors, sink }
    }

    /// Feed forward steps on both wheels after a delay, from another thread.
    fn feed_later(feeder: ScriptFeeder, steps: usize, left: i64, right: i64) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let mut sim = EncoderSim::new(EncoderPins::default().as_array());
            for _ in 0..steps {
                feeder.edge(sim.step(left, right));
                thread::sleep(Duration::from_millis(1));
            }
        })
    }

    fn assert_stopped_last(commands: &[MotorCommand]) {
        assert!(commands.len() >= 2);
        assert_eq!(
            &commands[commands.len() - 2..],
            &[MotorCommand::Stop(Motor::Left), MotorCommand::Stop(Motor::Right)]
        );
    }

    #[test]
    fn test_new() {
        let r = rig(false);
        assert!(r.ctrl.odometer().is_running());
        assert_eq!(r.ctrl.current_pose(), Pose::default());
        assert_eq!(r.inputs.configured.lock().unwrap().len(), 4);

        let r = rig(true);
        assert!(!r.ctrl.odometer().is_running());

        let (inputs, _) = ScriptedInputs::new();
        let bad = PositionController::new(
            Params { wheelbase_cm: -1.0, ..Params::default() },
            &OdoParams { pins: EncoderPins::default(), calibration_timeout_s: 0.1 },
            Arc::new(inputs),
            Arc::new(RecordingMotors::default()),
            Box::new(RecordingSink::default())
        );
        assert!(matches!(bad, Err(PosCtrlError::Params(_))));
    }

    #[test]
    fn test_arrive_immediately() {
        let mut r = rig(false);

        assert_eq!(r.ctrl.go_to_waypoint(1.0, 1.0).unwrap(), WaypointOutcome::Arrived);

        // Within the arrival radius from the start, so the motors are only stopped
        assert_eq!(
            r.motors.commands(),
            vec![MotorCommand::Stop(Motor::Left), MotorCommand::Stop(Motor::Right)]
        );

        let points = r.sink.points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].class, DotClass::Arrival);
        assert!(points[0].waypoint);
    }

    #[test]
    fn test_arrive_with_odometry() {
        let mut r = rig(false);

        // 30 ticks is just under 8 cm
        let feed = feed_later(r.feeder.clone(), 30, 1, 1);

        assert_eq!(r.ctrl.go_to_waypoint(10.0, 0.0).unwrap(), WaypointOutcome::Arrived);
        feed.join().unwrap();

        let pose = r.ctrl.current_pose();
        assert!(pose.x() >= 5.0);
        assert_abs_diff_eq!(pose.y(), 0.0);
        assert_abs_diff_eq!(pose.heading_rad, 0.0);

        let commands = r.motors.commands();
        assert!(commands.len() > 2);
        assert!(matches!(commands[0], MotorCommand::Forward(Motor::Left, _)));
        assert_stopped_last(&commands);

        let points = r.sink.points();
        let last = points.last().unwrap();
        assert_eq!(last.class, DotClass::Arrival);
        assert!(last.waypoint);
        assert!(points[..points.len() - 1].iter().all(|p| !p.waypoint));

        assert_eq!(r.ctrl.pose_handle().current_pose().position_cm, pose.position_cm);
        assert!(r.ctrl.mission_time() > Duration::from_millis(100));
    }

    #[test]
    fn test_arrive_in_simulation() {
        let mut r = rig(true);

        // Starts inside the approach radius so drives the whole way at the
        // approach velocity
        assert_eq!(r.ctrl.go_to_waypoint(6.0, 0.0).unwrap(), WaypointOutcome::Arrived);

        let pose = r.ctrl.current_pose();
        assert!(pose.x() >= 1.0 && pose.x() < 1.5);
        assert_abs_diff_eq!(pose.y(), 0.0);

        // Nothing is driven in simulation
        assert!(r.motors.commands().is_empty());

        let points = r.sink.points();
        assert!(points.len() > 2);
        assert!(points[..points.len() - 1].iter().all(|p| p.class == DotClass::Approaching));
    }

    #[test]
    fn test_drift_abort() {
        let mut r = rig(false);

        // Target behind the robot while the encoders say it's driving forwards
        let feed = feed_later(r.feeder.clone(), 40, 1, 1);

        assert_eq!(r.ctrl.go_to_waypoint(-20.0, 0.0).unwrap(), WaypointOutcome::AbortedDrift);
        feed.join().unwrap();

        // Aborted once a quarter of the initial 20 cm further away
        let pose = r.ctrl.current_pose();
        assert!(pose.x() >= 5.0);
        assert!(pose.x() < 10.0);

        assert_stopped_last(&r.motors.commands());
        assert!(r.sink.points().iter().all(|p| !p.waypoint));
    }

    #[test]
    fn test_drift_abort_after_iterations() {
        let mut r = rig_with(Params {
            tick_period_ms: 5,
            drift_policy: DriftPolicy::Iterations { max: 3 },
            ..Params::default()
        });

        // The wheels never turn so the distance stays at 20 cm, which never
        // grows but never improves either
        assert_eq!(r.ctrl.go_to_waypoint(-20.0, 0.0).unwrap(), WaypointOutcome::AbortedDrift);

        assert_eq!(r.ctrl.current_pose().position_cm, Vector2::new(0.0, 0.0));
        assert_stopped_last(&r.motors.commands());

        // One point for each tick before the abort, none of them arrivals
        let points = r.sink.points();
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|p| !p.waypoint));
    }

    #[test]
    fn test_odometer_failure() {
        let mut r = rig(false);

        let feeder = r.feeder.clone();
        let fail = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            feeder.fail_read();
        });

        assert!(matches!(
            r.ctrl.go_to_waypoint(50.0, 0.0),
            Err(PosCtrlError::OdometerFailed)
        ));
        fail.join().unwrap();

        assert!(r.ctrl.odometer().has_error());
        assert_stopped_last(&r.motors.commands());
    }

    #[test]
    fn test_cancel() {
        let mut r = rig(false);
        let cancel = r.ctrl.cancel_handle();

        // Pending cancellation ends the next waypoint straight away
        cancel.cancel();
        assert_eq!(r.ctrl.go_to_waypoint(50.0, 0.0).unwrap(), WaypointOutcome::Cancelled);
        assert!(!cancel.is_cancelled());

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });
        assert_eq!(r.ctrl.go_to_waypoint(50.0, 0.0).unwrap(), WaypointOutcome::Cancelled);
        canceller.join().unwrap();

        assert_stopped_last(&r.motors.commands());
    }

    #[test]
    fn test_motor_failure() {
        let mut r = rig(false);
        r.motors.fail.store(true, std::sync::atomic::Ordering::SeqCst);

        assert!(matches!(
            r.ctrl.go_to_waypoint(50.0, 0.0),
            Err(PosCtrlError::Motor(_))
        ));
    }
}
