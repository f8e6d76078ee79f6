//! Command-line interface for the ZigMind Zigbee2MQTT bridge.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use zigmind_core::config::json_logging_requested;
use zigmind_core::{BridgeConfig, EventBus};
use zigmind_devices::expose::parse_device_list;
use zigmind_devices::{detect, DeviceDefinition, DeviceDescription, MqttBus, ZigbeeBridge};

/// ZigMind - Zigbee2MQTT devices as typed properties, actions and events.
#[derive(Parser, Debug)]
#[command(name = "zigmind")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the broker and mirror the bridge's devices.
    Run {
        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Zigbee2MQTT base topic.
        #[arg(long)]
        prefix: Option<String>,
        /// Broker host.
        #[arg(long)]
        host: Option<String>,
        /// Broker port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the mapped schema of a saved `bridge/devices` payload.
    Inspect {
        /// JSON file with a device list or a single device entry.
        #[arg(required = true)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Run {
            config,
            prefix,
            host,
            port,
        } => run_bridge(config, prefix, host, port).await,
        Command::Inspect { path } => inspect(&path),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "zigmind=debug" } else { "zigmind=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging_requested() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(
    path: Option<PathBuf>,
    prefix: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => BridgeConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BridgeConfig::from_env().context("Invalid environment configuration")?,
    };

    if let Some(prefix) = prefix {
        config.topic_prefix = prefix;
    }
    if let Some(host) = host {
        config.mqtt.host = host;
    }
    if let Some(port) = port {
        config.mqtt.port = port;
    }
    config.validate()?;
    Ok(config)
}

async fn run_bridge(
    path: Option<PathBuf>,
    prefix: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let config = load_config(path, prefix, host, port)?;
    info!(
        "Connecting to {} (prefix {})",
        config.mqtt.full_broker_addr(),
        config.topic_prefix
    );

    let events = EventBus::with_name("zigmind");
    let mut notifications = events.subscribe();
    tokio::spawn(async move {
        while let Some((event, meta)) = notifications.recv().await {
            debug!("[{}] {}", meta.source, event);
        }
    });

    let (mqtt, inbound, eventloop) = MqttBus::connect(&config.mqtt);
    let bridge = ZigbeeBridge::from_config(&config, Arc::new(mqtt.clone()), events);
    bridge.start().await?;

    tokio::select! {
        _ = bridge.run(inbound) => info!("Broker connection closed"),
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    if let Err(e) = mqtt.disconnect().await {
        debug!("Disconnect failed: {}", e);
    }
    eventloop.abort();
    Ok(())
}

/// Parse a device list, or a single device entry.
fn read_definitions(path: &Path) -> Result<Vec<DeviceDefinition>> {
    let payload =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match parse_device_list(&payload) {
        Ok(list) => Ok(list),
        Err(_) => {
            let single: DeviceDefinition = serde_json::from_slice(&payload)
                .with_context(|| format!("{} is not a device list or device entry", path.display()))?;
            Ok(vec![single])
        }
    }
}

fn inspect(path: &Path) -> Result<()> {
    let descriptions: Vec<DeviceDescription> = read_definitions(path)?
        .iter()
        .filter(|def| !def.is_coordinator() && def.definition.is_some())
        .map(|def| DeviceDescription::new(def, &detect(def)))
        .collect();

    info!("Mapped {} devices from {}", descriptions.len(), path.display());
    println!("{}", serde_json::to_string_pretty(&descriptions)?);
    Ok(())
}
