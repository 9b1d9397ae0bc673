//! Sensor node entry point
//!
//! Recovers the device identity, then runs the agent loop until SIGINT or
//! SIGTERM. An identity that cannot be recovered halts the node before any
//! connection is attempted.

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sensor_node::agent::{ConnectionManager, ConnectionSettings, SchedulerOptions, SensorAgent};
use sensor_node::config::NodeConfig;
use sensor_node::error::{NodeError, NodeResult};
use sensor_node::identity::{load_or_create_identity_with_source, DeviceIdentity, IdentityOptions};
use sensor_node::observability::{init_default_logging, init_logging, LogFormat};
use sensor_node::protocol::{build_topics, Channel};
use sensor_node::sensors;
use sensor_node::storage::FileStorage;
use sensor_node::time::{SystemClock, TokioSleeper};
use sensor_node::transport::mqtt::MqttSession;
use sensor_node::transport::{HostLink, ReachabilityProbe, TcpProbe};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};

/// Light and temperature telemetry node
#[derive(Parser)]
#[command(name = "sensor-node")]
#[command(about = "Publishes light and temperature readings over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sensor agent
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
    /// Print the device identity and its topics, creating the identity if needed
    Identity,
}

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["sensor-node.toml", "config/sensor-node.toml"];

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_observability(cli.verbose);

    info!("Starting sensor node v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_node(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Identity => handle_identity_command(&config),
    };

    if let Err(e) = result {
        if e.is_fatal() {
            error!("Halting: {}", e);
        } else {
            error!("Command failed: {}", e);
        }
        process::exit(1);
    }

    info!("Sensor node shutdown complete");
}

fn init_observability(verbose: u8) {
    let level = match verbose {
        0 => return init_default_logging(),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    init_logging(level, LogFormat::parse(&format), false);
}

fn load_configuration(config_path: Option<&Path>) -> NodeResult<NodeConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(NodeConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(NodeConfig::load_from_file(path)?);
        }
    }

    Err(sensor_node::config::ConfigError::InvalidConfig(
        "no configuration file found; pass -c/--config or create sensor-node.toml".to_string(),
    )
    .into())
}

/// Recover the identity from the configured storage file
fn recover_identity(config: &NodeConfig) -> NodeResult<DeviceIdentity> {
    let mut storage = FileStorage::new(&config.identity.storage_path);
    let mut rng = StdRng::from_entropy();
    let options = IdentityOptions {
        repair_invalid: config.identity.repair_invalid,
    };

    let (identity, source) = load_or_create_identity_with_source(&mut storage, &mut rng, options)?;
    info!(
        identity = %identity,
        ?source,
        storage = %storage.path().display(),
        "Device identity ready"
    );
    Ok(identity)
}

async fn run_node(config: NodeConfig) -> NodeResult<()> {
    let identity = recover_identity(&config)?;
    let device_type = config.device.device_type.clone();
    let topics = build_topics(&device_type, identity.as_str(), &Channel::names());

    let settings = ConnectionSettings::from_config(
        &config,
        &identity,
        &topics,
        config.get_wifi_password()?,
    )?;

    let link = HostLink::new(
        config.wifi.ssid.clone(),
        settings.broker_host.clone(),
        settings.broker_port,
    );
    let session = MqttSession::new(
        config.mqtt.clone(),
        config.get_mqtt_username(),
        config.get_mqtt_password(),
    );
    let probe: Option<Box<dyn ReachabilityProbe>> = config.probe.enabled.then(|| {
        Box::new(TcpProbe::new(
            config.probe.attempts,
            Duration::from_millis(config.probe.timeout_ms),
        )) as Box<dyn ReachabilityProbe>
    });

    let manager = ConnectionManager::new(link, session, Box::new(TokioSleeper), probe, settings);
    let mut agent = SensorAgent::new(
        manager,
        topics,
        &device_type,
        sensors::from_config(&config.sensors),
        Box::new(SystemClock::new()),
        Box::new(TokioSleeper),
        SchedulerOptions::from_config(&config.schedule),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    agent.run(shutdown_rx).await;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let (mut sigint, mut sigterm) = match (
        signal::unix::signal(signal::unix::SignalKind::interrupt()),
        signal::unix::signal(signal::unix::SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        _ => {
            warn!("Signal handlers unavailable, falling back to Ctrl-C");
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to wait for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

fn handle_config_command(config: &NodeConfig, show: bool) -> NodeResult<()> {
    if show {
        let rendered = toml::to_string_pretty(config).map_err(|e| {
            NodeError::Config(sensor_node::config::ConfigError::InvalidConfig(e.to_string()))
        })?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}

fn handle_identity_command(config: &NodeConfig) -> NodeResult<()> {
    let identity = recover_identity(config)?;
    let topics = build_topics(
        &config.device.device_type,
        identity.as_str(),
        &Channel::names(),
    );

    println!("Device identity: {identity}");
    for topic in topics.channel_topics() {
        println!("  data:    {topic}");
    }
    println!("  command: {}", topics.command_topic());
    Ok(())
}
