//! # nano402
//!
//! Command-line front end for a simulated CiA 402 drive.
//!
//! # Usage
//!
//! ```bash
//! # Enable operation and keep the drive state for the next call
//! nano402 --state /tmp/drive.json enable
//!
//! # Reference run with the speeds from a profile
//! nano402 --state /tmp/drive.json --profile profiles/example.toml home
//!
//! # Commission and store parameters, JSON logs
//! nano402 --profile profiles/example.toml --json commission --save
//! ```

#![deny(warnings)]

use clap::{Parser, Subcommand};
use nano402_common::config::{ConfigLoader, LogLevel};
use nano402_common::drive::homing::HomingSpeeds;
use nano402_common::drive::profile::DriveProfile;
use nano402_common::drive::words::StatusWord;
use nano402_control::commission::apply_profile;
use nano402_control::{
    AutoSetupController, DeviceFault, HomingController, MotionController, PowerStateMachine,
    ProfilePositionController, VelocityController,
};
use nano402_sim::{SimulatedDrive, SimulationConfig, StatePersistence};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Interval at which `move` checks for target reached.
const MOVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// nano402 - drive a simulated CiA 402 motor controller
#[derive(Parser, Debug)]
#[command(name = "nano402")]
#[command(version)]
#[command(about = "CiA 402 power state machine and motion modes against a simulated drive")]
#[command(long_about = None)]
struct Args {
    /// Commissioning profile (TOML)
    #[arg(short, long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Simulation settings (TOML)
    #[arg(long, value_name = "FILE")]
    sim_config: Option<PathBuf>,

    /// Drive state file; restored before and saved after the command
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decoded status word, mode and actual values
    Status,
    /// Bring the drive to operation enabled
    Enable,
    /// Operation enabled -> switched on
    Disable,
    /// Move towards ready to switch on
    Shutdown,
    /// Quick stop an enabled drive
    QuickStop,
    /// Reference run, waiting until it completes
    Home {
        /// Maximum status polls (100 ms apart)
        #[arg(long, default_value_t = 300)]
        max_polls: u32,
    },
    /// Profile position move, waiting for target reached
    Move {
        /// Target position in user units
        #[arg(allow_hyphen_values = true)]
        target: i32,
        /// Target is relative to the current position
        #[arg(long)]
        relative: bool,
        /// Maximum status polls (100 ms apart)
        #[arg(long, default_value_t = 600)]
        max_polls: u32,
    },
    /// Run in velocity mode for a while
    Spin {
        /// Target velocity
        #[arg(allow_hyphen_values = true)]
        velocity: i16,
        /// How long to run before reporting, in milliseconds
        #[arg(long, default_value_t = 1000)]
        for_ms: u64,
    },
    /// Identify the connected motor
    AutoSetup,
    /// Apply the profile given with --profile
    Commission {
        /// Store the written parameter groups
        #[arg(long)]
        save: bool,
    },
    /// Error history, most recent first
    Faults,
    /// Raise a drive fault (simulation only)
    InjectFault {
        /// CiA 301 emergency error code, e.g. 0x2310
        #[arg(value_parser = parse_code)]
        code: u16,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("nano402 failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let profile = args
        .profile
        .as_deref()
        .map(DriveProfile::load)
        .transpose();
    setup_tracing(
        &args,
        profile
            .as_ref()
            .ok()
            .and_then(|p| p.as_ref())
            .map(|p| p.shared.log_level),
    );
    let profile = profile?;
    if let Some(profile) = &profile {
        profile.validate()?;
        info!("Loaded profile for {}", profile.shared.service_name);
    }

    let config = match &args.sim_config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    config.validate()?;

    let drive = SimulatedDrive::new(config);
    let persistence = args.state.as_ref().map(StatePersistence::new);
    if let Some(persistence) = &persistence {
        if let Some(snapshot) = persistence.load()? {
            drive.restore(&snapshot);
        }
    }

    let output = execute(&args.command, &drive, profile.as_ref());

    // Keep whatever the drive went through, even on failure.
    if let Some(persistence) = &persistence {
        persistence.save(&drive.snapshot())?;
    }

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

fn execute(
    command: &Command,
    drive: &SimulatedDrive,
    profile: Option<&DriveProfile>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let node = drive.node();
    let power = PowerStateMachine::new(drive, &node);

    let output = match command {
        Command::Status => status(&power)?,
        Command::Enable => {
            power.enable_operation()?;
            status(&power)?
        }
        Command::Disable => {
            power.disable_operation()?;
            status(&power)?
        }
        Command::Shutdown => {
            power.shutdown()?;
            status(&power)?
        }
        Command::QuickStop => {
            power.quick_stop()?;
            status(&power)?
        }
        Command::Home { max_polls } => {
            let homing = HomingController::new(&power)?;
            match profile.and_then(|p| p.homing.as_ref()) {
                Some(config) => {
                    homing.set_homing_speed(config.speeds())?;
                    homing.set_homing_mode(config.method)?;
                    if let Some(acceleration) = config.acceleration {
                        homing.set_homing_acceleration(acceleration)?;
                    }
                    homing.start_homing()?;
                }
                None => homing.home(HomingSpeeds::default())?,
            }
            homing.wait_until_homed(*max_polls)?;
            json!({
                "homing": homing.state()?,
                "position": homing.get_position_actual()?,
            })
        }
        Command::Move {
            target,
            relative,
            max_polls,
        } => {
            let position = ProfilePositionController::new(&power)?;
            position.set_target_position(*target, *relative)?;
            position.start_positioning()?;
            let reached = wait_for_target(&position, *max_polls)?;
            json!({
                "target_reached": reached,
                "parameters": position.positioning_parameters()?,
                "position": position.get_position_actual()?,
            })
        }
        Command::Spin { velocity, for_ms } => {
            let controller = VelocityController::new(&power)?;
            controller.set_target_velocity(*velocity)?;
            controller.start_velocity()?;
            controller.drive().sleep(Duration::from_millis(*for_ms));
            json!({
                "target": controller.target_velocity()?,
                "demanded": controller.get_velocity_demanded()?,
                "actual": controller.get_velocity_actual()?,
                "units": controller.get_user_units_velocity()?.to_string(),
            })
        }
        Command::AutoSetup => {
            let auto_setup = AutoSetupController::new(&power)?;
            auto_setup.auto_setup_motor_parameters()?;
            json!({ "motor": auto_setup.get_motor_parameters()? })
        }
        Command::Commission { save } => {
            let profile = profile.ok_or("commission needs --profile")?;
            let report = apply_profile(&power, profile, *save)?;
            serde_json::to_value(report)?
        }
        Command::Faults => {
            let base = MotionController::new(&power);
            json!({
                "device": base.device_name()?,
                "faults": base.error_history()?,
            })
        }
        Command::InjectFault { code } => {
            drive.inject_fault(DeviceFault {
                code: *code,
                class: 0x01,
                number: 0,
            });
            status(&power)?
        }
    };
    Ok(output)
}

fn status(power: &PowerStateMachine<'_, SimulatedDrive>) -> Result<Value, Box<dyn std::error::Error>> {
    let base = MotionController::new(power);
    Ok(json!({
        "device": base.device_name()?,
        "report": base.status_report()?,
        "mode": base.get_mode_of_operation()?.to_string(),
        "position": base.get_position_actual()?,
        "velocity": base.get_speed_actual()?,
        "inputs": base.read_digital_inputs()?,
    }))
}

/// Poll target reached (status bit 10) every [`MOVE_POLL_INTERVAL`].
fn wait_for_target(
    position: &ProfilePositionController<'_, SimulatedDrive>,
    max_polls: u32,
) -> Result<bool, Box<dyn std::error::Error>> {
    let drive = position.drive();
    for _ in 0..max_polls {
        if drive.status_word()?.contains(StatusWord::TARGET_REACHED) {
            return Ok(true);
        }
        drive.sleep(MOVE_POLL_INTERVAL);
    }
    Ok(false)
}

fn parse_code(text: &str) -> Result<u16, std::num::ParseIntError> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

/// Setup tracing subscriber based on CLI arguments and the profile's level.
fn setup_tracing(args: &Args, profile_level: Option<LogLevel>) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        profile_level
            .unwrap_or_default()
            .as_directive()
            .parse()
            .unwrap_or(Level::INFO)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
