//! SnmpSim main application

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{error, info, warn};

use snmpsim::{
    config::{DeviceType, SimulatorConfig},
    core::{Simulator, SimulatorEvent},
    mib::builder::builtin_profile,
    utils::setup_logging,
    Result,
};

#[derive(Parser)]
#[command(name = "snmpsim")]
#[command(about = "SNMP device fleet simulator")]
#[command(version = snmpsim::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the simulator
    Start,
    /// Validate configuration
    ValidateConfig,
    /// Generate default configuration
    GenerateConfig {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Dump the built-in MIB profile for a device type as JSON
    ShowProfile {
        /// Device type tag (cable_modem, switch, ...)
        device_type: String,
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_configuration(&cli)?;
    let _log_guard = setup_logging(&config.logging)?;

    info!("Starting {} v{}", snmpsim::NAME, snmpsim::VERSION);

    match &cli.command {
        Some(Commands::Start) | None => run_simulator(config).await,
        Some(Commands::ValidateConfig) => validate_configuration(&config),
        Some(Commands::GenerateConfig { output }) => generate_default_config(output.clone()),
        Some(Commands::ShowProfile {
            device_type,
            output,
        }) => show_profile(device_type, output.clone()),
    }
}

fn load_configuration(cli: &Cli) -> Result<SimulatorConfig> {
    let config = if let Some(config_path) = &cli.config {
        SimulatorConfig::load_from_file(config_path)?
    } else {
        match SimulatorConfig::load_from_env() {
            Ok(config) => config,
            Err(_) => SimulatorConfig::default_config(),
        }
    };

    config.validate()?;
    Ok(config)
}

async fn run_simulator(config: SimulatorConfig) -> Result<()> {
    let mut simulator = Simulator::new(config)?;

    let mut event_rx = simulator
        .take_event_receiver()
        .ok_or_else(|| snmpsim::Error::internal("event receiver already taken"))?;

    simulator.start().await?;

    let event_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            handle_simulator_event(event);
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down gracefully");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    simulator.stop().await?;
    event_task.abort();

    let status = simulator.status();
    info!(
        devices_created = status.pool.created,
        peak = status.pool.peak,
        "simulator shutdown complete"
    );
    Ok(())
}

fn handle_simulator_event(event: SimulatorEvent) {
    match event {
        SimulatorEvent::Started => {
            info!("simulator started");
        }
        SimulatorEvent::Stopped => {
            info!("simulator stopped");
        }
        SimulatorEvent::DeviceCreated { port, device_type } => {
            info!(port, %device_type, "device created");
        }
        SimulatorEvent::DeviceEvicted { port } => {
            info!(port, "device evicted");
        }
        SimulatorEvent::DeviceCrashed { port } => {
            error!(port, "device crashed; will be recreated on next access");
        }
        SimulatorEvent::SecurityEvent {
            port,
            source,
            community,
        } => {
            warn!(port, %source, community, "authentication failure");
        }
        SimulatorEvent::Error { message } => {
            error!("simulator error: {}", message);
        }
    }
}

fn validate_configuration(config: &SimulatorConfig) -> Result<()> {
    config.validate()?;

    let assignments = config.devices.resolved_assignments()?;
    let total: usize = assignments.iter().map(|a| a.range.len()).sum();

    println!("✓ Configuration is valid");
    println!("  Node ID: {}", config.general.node_id);
    println!("  Community: {}", config.agent.community);
    println!("  Devices: {total}");
    for assignment in &assignments {
        println!(
            "    {} on ports {}-{}",
            assignment.device_type, assignment.range.min, assignment.range.max
        );
    }
    println!("  Pool capacity: {}", config.pool.max_devices);
    println!("  Idle timeout: {}s", config.pool.idle_timeout_secs);

    Ok(())
}

fn generate_default_config(output_path: Option<PathBuf>) -> Result<()> {
    let config = SimulatorConfig::default_config();
    let toml_content = toml::to_string_pretty(&config)
        .map_err(|e| snmpsim::Error::internal(format!("Failed to serialize config: {e}")))?;

    match output_path {
        Some(path) => {
            std::fs::write(&path, toml_content)?;
            println!("✓ Default configuration written to: {}", path.display());
        }
        None => {
            println!("{toml_content}");
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct ProfileRecord {
    oid: String,
    value_type: &'static str,
    value: String,
}

fn profile_records(device_type: &DeviceType) -> Result<Vec<ProfileRecord>> {
    let profile = builtin_profile(device_type)?;
    Ok(profile
        .entries()
        .iter()
        .map(|entry| ProfileRecord {
            oid: entry.oid.to_string(),
            value_type: entry.value.type_name(),
            value: entry.value.to_string(),
        })
        .collect())
}

fn show_profile(device_type: &str, output_path: Option<PathBuf>) -> Result<()> {
    let device_type: DeviceType = device_type.parse()?;
    let records = profile_records(&device_type)?;
    let json = serde_json::to_string_pretty(&records)?;

    match output_path {
        Some(path) => {
            std::fs::write(&path, json)?;
            println!(
                "✓ {} profile ({} objects) written to: {}",
                device_type,
                records.len(),
                path.display()
            );
        }
        None => {
            println!("{json}");
        }
    }

    Ok(())
}
