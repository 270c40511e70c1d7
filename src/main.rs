// Bench tool for the wheel base: query telemetry or send one-off commands
//
// Usage: roboteq-base --port /dev/ttyACM0 [--port /dev/ttyACM1] <command>
//        roboteq-base --config base.json status

use std::io::BufRead;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use roboteq_base::config::{
    COMMAND_REPEAT_HZ, DEFAULT_BAUDRATE, DEFAULT_HOLD_MS, DEFAULT_TIMEOUT_MS, WheelBaseConfig,
};
use roboteq_base::messages::{BaseHealth, DriveCommand, Telemetry};
use roboteq_base::motor::WheelBase;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(version, about = "Drive and inspect a Roboteq wheel base")]
struct Cli {
    /// Serial port of a controller; give twice for one controller per side (left first)
    #[arg(short, long = "port", num_args = 1, conflicts_with = "config")]
    ports: Vec<String>,

    /// JSON config file instead of --port
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    baud: u32,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Check faults, battery and wheel speed; print telemetry as JSON
    Status,
    /// Set raw wheel speeds in controller units, hold them, then stop
    Speed {
        #[arg(allow_negative_numbers = true)]
        left: i32,
        #[arg(allow_negative_numbers = true)]
        right: i32,
        /// How long to keep re-sending the command before stopping
        #[arg(long, default_value_t = DEFAULT_HOLD_MS)]
        hold_ms: u64,
    },
    /// Drive with a forward speed and turn rate, hold it, then stop
    Move {
        #[arg(allow_negative_numbers = true)]
        speed: f32,
        #[arg(allow_negative_numbers = true)]
        turn: f32,
        #[arg(long, default_value_t = DEFAULT_HOLD_MS)]
        hold_ms: u64,
    },
    /// Apply DriveCommand JSON objects read line by line from stdin
    Drive,
    Stop,
    Estop,
    Release,
}

impl Cli {
    fn wheel_base_config(&self) -> Result<WheelBaseConfig, BoxError> {
        let config = match &self.config {
            Some(path) => WheelBaseConfig::load(path)?,
            None => WheelBaseConfig {
                ports: self.ports.clone(),
                baud_rate: self.baud,
                timeout_ms: self.timeout_ms,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn status(base: &mut WheelBase) -> Telemetry {
    let fault_query_ok = base.read_fault_flags();
    let battery_voltage = base
        .read_battery_voltage()
        .map_err(|e| warn!("Battery voltage unavailable: {}", e))
        .ok();
    let speed_ratio_rpm = base
        .read_motor_speed_ratio()
        .map_err(|e| warn!("Speed ratio unavailable: {}", e))
        .ok();

    Telemetry {
        topology: base.topology(),
        fault_query_ok,
        battery_voltage,
        speed_ratio_rpm,
        events: base.take_events(),
    }
}

fn drive(base: &mut WheelBase) -> Result<bool, BoxError> {
    let mut ok = true;
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DriveCommand>(&line) {
            Ok(cmd) => {
                info!("Received command: {:?}", &cmd);
                ok &= base.move_base(cmd.speed, cmd.turn);
            }
            Err(e) => warn!("Failed to parse command: {}", e),
        }
    }
    // End of input: bring the base to rest
    Ok(base.stop() && ok)
}

/// Call `send` once, then keep calling it every `period` until `hold` has
/// elapsed. Re-sending keeps the controller's command watchdog fed.
fn repeat_for(hold: Duration, period: Duration, mut send: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    let mut ok = send();
    while start.elapsed() < hold {
        std::thread::sleep(period.min(hold.saturating_sub(start.elapsed())));
        ok &= send();
    }
    ok
}

fn hold_then_stop(
    base: &mut WheelBase,
    hold_ms: u64,
    mut send: impl FnMut(&mut WheelBase) -> bool,
) -> bool {
    let period = Duration::from_millis(1000 / COMMAND_REPEAT_HZ);
    info!("Holding command for {}ms", hold_ms);
    let held = repeat_for(Duration::from_millis(hold_ms), period, || send(base));
    base.stop() && held
}

fn run(cli: Cli) -> Result<bool, BoxError> {
    let config = cli.wheel_base_config()?;
    let mut base = WheelBase::open(&config)?;

    let result = match cli.command {
        Cmd::Status => {
            let telemetry = status(&mut base);
            let health = BaseHealth::from(&telemetry);
            println!("{}", serde_json::to_string_pretty(&telemetry)?);
            println!("{}", serde_json::to_string(&health)?);
            Ok(health != BaseHealth::CommsLost)
        }
        Cmd::Speed {
            left,
            right,
            hold_ms,
        } => Ok(hold_then_stop(&mut base, hold_ms, |b| {
            b.set_speed(left, right)
        })),
        Cmd::Move {
            speed,
            turn,
            hold_ms,
        } => Ok(hold_then_stop(&mut base, hold_ms, |b| {
            b.move_base(speed, turn)
        })),
        Cmd::Drive => drive(&mut base),
        Cmd::Stop => Ok(base.stop()),
        Cmd::Estop => Ok(base.e_stop()),
        Cmd::Release => Ok(base.release_estop()),
    };

    if !base.close() {
        warn!("Not every channel acknowledged zero speed on close");
    }
    result
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match run(Cli::parse()) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("Controller did not acknowledge every command");
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_for_zero_hold_sends_once() {
        let mut calls = 0;
        assert!(repeat_for(Duration::ZERO, Duration::from_millis(10), || {
            calls += 1;
            true
        }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_repeat_for_resends_until_hold_elapses() {
        let mut calls = 0;
        let start = Instant::now();
        repeat_for(Duration::from_millis(50), Duration::from_millis(10), || {
            calls += 1;
            true
        });
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(calls >= 2, "only {} sends", calls);
    }

    #[test]
    fn test_repeat_for_reports_any_failure() {
        let mut calls = 0;
        let ok = repeat_for(Duration::from_millis(30), Duration::from_millis(10), || {
            calls += 1;
            calls != 1
        });
        assert!(!ok);
    }

    #[test]
    fn test_cli_parses_hold() {
        let cli = Cli::parse_from([
            "roboteq-base", "--port", "COM3", "move", "100", "-10", "--hold-ms", "250",
        ]);
        match cli.command {
            Cmd::Move { speed, turn, hold_ms } => {
                assert_eq!((speed, turn, hold_ms), (100.0, -10.0, 250));
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.ports, vec!["COM3"]);
    }
}
