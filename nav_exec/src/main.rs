//! # Navigation Executable
//!
//! Drives the robot around the waypoints in `nav_exec.toml`, or measures the
//! motor calibration data.
//!
//! ```text
//! nav_exec run
//! nav_exec calibrate --wheel right --revolutions 10 --speed 60 [--reverse]
//! ```
//!
//! Both subcommands need `DDNAV_SW_ROOT` to be set, parameters are read from
//! `$DDNAV_SW_ROOT/params` and a new session is made in
//! `$DDNAV_SW_ROOT/sessions`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{f64::consts::PI, sync::Arc, thread, time::Duration};
use color_eyre::{eyre::{eyre, WrapErr}, Result};
use log::{info, warn};
use structopt::StructOpt;

// Internal
use nav_lib::{
    hal::{drv8833::Drv8833, sysfs_gpio::SysfsGpio, DigitalInputs, Direction, MotorDrive},
    odometer::{self, Odometer, Wheel},
    params::NavExecParams,
    pos_ctrl::{self, PositionController, WaypointOutcome},
    telemetry::{DotLog, NullSink, TelemetrySink}
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session
};

// ------------------------------------------------------------------------------------------------
// COMMAND LINE
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "nav_exec", about = "Differential drive go-to-goal navigation")]
enum Cmd {
    /// Visit every waypoint in the parameters in order.
    #[structopt(name = "run")]
    Run,

    /// Time one wheel over a number of revolutions at a fixed duty cycle.
    ///
    /// The robot should be on blocks, only the chosen wheel is driven.
    #[structopt(name = "calibrate")]
    Calibrate {
        /// The wheel to drive, `left` or `right`
        #[structopt(long, default_value = "left", parse(try_from_str = parse_wheel))]
        wheel: Wheel,

        /// Drive the wheel backwards
        #[structopt(long)]
        reverse: bool,

        /// Number of full wheel revolutions to time
        #[structopt(long, default_value = "10")]
        revolutions: u32,

        /// Duty cycle percentage to drive at
        #[structopt(long, default_value = "50")]
        speed: u8
    }
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let cmd = Cmd::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "nav_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Differential Drive Navigation Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: NavExecParams = util::params::load("nav_exec.toml")
        .wrap_err("Could not load nav_exec params")?;
    let pos_ctrl_params: pos_ctrl::Params = util::params::load("pos_ctrl.toml")
        .wrap_err("Could not load pos_ctrl params")?;
    let odo_params: odometer::Params = util::params::load("odometer.toml")
        .wrap_err("Could not load odometer params")?;

    info!("Parameters loaded");

    // ---- HARDWARE ----

    let inputs: Arc<dyn DigitalInputs> = Arc::new(SysfsGpio::new(&exec_params.gpio_root));
    let motors = Arc::new(
        Drv8833::new(&exec_params.pwm).wrap_err("Failed to initialise the motor driver")?
    );

    info!("Hardware initialised\n");

    match cmd {
        Cmd::Run => run(&session, &exec_params, pos_ctrl_params, &odo_params, inputs, motors),
        Cmd::Calibrate { wheel, reverse, revolutions, speed } => {
            let direction = if reverse { Direction::Reverse } else { Direction::Forward };

            calibrate(
                &odo_params,
                pos_ctrl_params.wheel_radius_cm,
                inputs,
                motors.as_ref(),
                wheel,
                direction,
                revolutions,
                speed
            )
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn run(
    session: &Session,
    exec_params: &NavExecParams,
    pos_ctrl_params: pos_ctrl::Params,
    odo_params: &odometer::Params,
    inputs: Arc<dyn DigitalInputs>,
    motors: Arc<Drv8833>
) -> Result<()> {
    let telemetry: Box<dyn TelemetrySink> = match exec_params.dotlog_name {
        Some(ref name) => Box::new(
            DotLog::new(session, name).wrap_err("Failed to create the trajectory log")?
        ),
        None => {
            info!("No trajectory log configured");
            Box::new(NullSink)
        }
    };

    let mut ctrl = PositionController::new(
        pos_ctrl_params,
        odo_params,
        inputs,
        motors.clone(),
        telemetry
    ).wrap_err("Failed to initialise PosCtrl")?;

    info!("PosCtrl init complete, {} waypoints to visit", exec_params.waypoints.len());

    let pause = Duration::from_secs_f64(exec_params.waypoint_pause_s.max(0.0));

    for (i, [x, y]) in exec_params.waypoints.iter().copied().enumerate() {
        motors.stop_all().wrap_err("Failed to stop the motors")?;
        thread::sleep(pause);

        info!("---- WAYPOINT {} ----", i);

        let outcome = ctrl.go_to_waypoint(x, y)
            .wrap_err_with(|| format!("Navigation to waypoint {} ({}, {}) failed", i, x, y))?;

        match outcome {
            WaypointOutcome::Arrived => info!("Arrived at waypoint {}", i),
            WaypointOutcome::AbortedDrift => warn!(
                "Gave up on waypoint {}, continuing to the next", i
            ),
            WaypointOutcome::Cancelled => {
                warn!("Navigation cancelled");
                break
            }
        }
    }

    let pose = ctrl.current_pose();
    info!(
        "Finished at ({:.2}, {:.2}) heading {:.3} after {:.2} s",
        pose.x(), pose.y(), pose.heading_rad, ctrl.mission_time().as_secs_f64()
    );

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn calibrate(
    odo_params: &odometer::Params,
    wheel_radius_cm: f64,
    inputs: Arc<dyn DigitalInputs>,
    motors: &dyn MotorDrive,
    wheel: Wheel,
    direction: Direction,
    revolutions: u32,
    speed_pct: u8
) -> Result<()> {
    let odometer = Odometer::new(inputs, odo_params, wheel_radius_cm)
        .wrap_err("Failed to initialise the odometer")?;

    info!(
        "Timing {} revolutions of the {:?} wheel {:?} at {} %",
        revolutions, wheel, direction, speed_pct
    );

    let time = odometer.time_to_distance(motors, wheel, direction, revolutions, speed_pct)
        .wrap_err("Calibration failed")?;

    let distance_cm = 2.0 * PI * wheel_radius_cm * revolutions as f64;

    info!(
        "{:.2} cm in {:.3} s, {:.4} cm/s at {} %",
        distance_cm,
        time.as_secs_f64(),
        distance_cm / time.as_secs_f64(),
        speed_pct
    );

    Ok(())
}

fn parse_wheel(s: &str) -> Result<Wheel> {
    match s {
        "left" | "l" => Ok(Wheel::Left),
        "right" | "r" => Ok(Wheel::Right),
        _ => Err(eyre!("Expected `left` or `right`, found `{}`", s))
    }
}
