//! Command line front end for the filter wheel.
//!
//! ```bash
//! filterwheel --config config/settings.toml move 3
//! filterwheel position
//! filterwheel pair 365nm
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use filterwheel_lib::config::DEFAULT_SETTINGS_PATH;
use filterwheel_lib::device::Position;
use filterwheel_lib::{FilterWheel, SerialInterface, Settings};

#[derive(Parser)]
#[command(name = "filterwheel")]
#[command(about = "Drive a serial eight-slot filter wheel", long_about = None)]
struct Cli {
    /// Settings file with the [filter_changer] port and baud rate
    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rotate to a slot (1-8)
    Move {
        #[arg(allow_hyphen_values = true)]
        slot: i32,
    },

    /// Report the slot currently in the beam
    Position,

    /// Visit every slot in order and confirm each one
    Cycle,

    /// List configured filter labels
    Slots,

    /// List emission filters usable with an excitation wavelength
    Pair {
        /// Excitation label, e.g. "365nm"
        excitation: String,
    },

    /// List serial ports visible to the OS
    Ports,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Ports => return list_ports(cli.json),
        Commands::Slots => {
            let settings = load_settings(&cli.config)?;
            return print_slots(&settings, cli.json);
        }
        Commands::Pair { ref excitation } => {
            let settings = load_settings(&cli.config)?;
            return print_pairs(&settings, excitation, cli.json);
        }
        _ => {}
    }

    let settings = load_settings(&cli.config)?;
    let mut wheel = FilterWheel::with_timing(settings.connection.clone(), settings.timing);
    wheel
        .connect()
        .with_context(|| format!("Failed to open {}", settings.connection.port))?;

    let outcome = run_device_command(&mut wheel, &cli.command, cli.json);
    wheel.disconnect();
    outcome
}

fn run_device_command(wheel: &mut FilterWheel, command: &Commands, json: bool) -> Result<()> {
    match command {
        Commands::Move { slot } => {
            wheel.move_to(*slot)?;
            if json {
                println!("{}", serde_json::json!({ "moved_to": slot }));
            } else {
                println!("Moved to slot {}", slot);
            }
        }
        Commands::Position => {
            let position = wheel.current_position()?;
            if json {
                println!("{}", serde_json::json!({ "position": position }));
            } else {
                println!("Current slot: {}", position);
            }
        }
        Commands::Cycle => {
            let mut visited = Vec::new();
            for slot in Position::all() {
                wheel
                    .move_to(slot.get())
                    .with_context(|| format!("Move to slot {} failed", slot))?;
                let reported = wheel
                    .current_position()
                    .with_context(|| format!("Position query after slot {} failed", slot))?;
                if reported != slot.get() {
                    bail!("Wheel reports slot {} after moving to {}", reported, slot);
                }
                if !json {
                    println!("Slot {} confirmed", slot);
                }
                visited.push(reported);
            }
            if json {
                println!("{}", serde_json::json!({ "visited": visited }));
            }
        }
        Commands::Slots | Commands::Pair { .. } | Commands::Ports => {}
    }
    Ok(())
}

fn load_settings(path: &Path) -> Result<Settings> {
    Settings::load(path).with_context(|| format!("Could not load settings from {}", path.display()))
}

fn print_slots(settings: &Settings, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&settings.catalog)?);
        return Ok(());
    }
    for (slot, label) in settings.catalog.slots() {
        println!("{}: {}", slot, label);
    }
    if !settings.catalog.led_labels().is_empty() {
        println!("LEDs: {}", settings.catalog.led_labels().join(", "));
    }
    Ok(())
}

fn print_pairs(settings: &Settings, excitation: &str, json: bool) -> Result<()> {
    let compatible = settings.catalog.compatible_filters(excitation);
    if json {
        let slots: Vec<_> = compatible
            .iter()
            .map(|(slot, label)| serde_json::json!({ "slot": slot, "label": label }))
            .collect();
        println!("{}", serde_json::Value::Array(slots));
        return Ok(());
    }
    if compatible.is_empty() {
        println!("No configured filter passes light longer than {}", excitation);
    }
    for (slot, label) in compatible {
        println!("{}: {}", slot, label);
    }
    Ok(())
}

fn list_ports(json: bool) -> Result<()> {
    let ports = SerialInterface::discover_ports().context("Could not enumerate serial ports")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!("{} ({:04x}:{:04x})", port.port_name, vid, pid),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
