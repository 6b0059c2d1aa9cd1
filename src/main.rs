//! MQTT getting-started sample - Main Entry Point
//!
//! Loads connection settings, builds the mutual-TLS transport and drives one
//! MQTT session: CONNECT, SUBSCRIBE, PUBLISH, then wait for a signal.

use clap::{Args, Parser, Subcommand};
use mqtt_getting_started::config::ConnectionSettings;
use mqtt_getting_started::driver::{DriverOutcome, SessionDriver, SessionPlan};
use mqtt_getting_started::error::{SampleError, SampleResult};
use mqtt_getting_started::observability::init_cli_logging;
use mqtt_getting_started::shutdown::ShutdownSignal;
use mqtt_getting_started::transport::mqtt::{MqttSession, OutboundMessage, SessionHandlers};
use mqtt_getting_started::transport::tls::{Credential, TlsTransport};
use rumqttc::v5::mqttbytes::QoS;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::{error, info};

/// Connect to an MQTT broker over mutual TLS, subscribe and publish
#[derive(Parser)]
#[command(name = "getting-started")]
#[command(about = "MQTT getting-started sample over mutual TLS")]
#[command(version)]
struct Cli {
    /// Connection settings file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "MQTT_ENV_FILE",
        default_value = ".env"
    )]
    env_file: PathBuf,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, subscribe, publish and wait for Ctrl+C
    Run(RunArgs),
    /// Validate the settings file
    Config {
        /// Show the loaded settings
        #[arg(long)]
        show: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Topic filter to subscribe to
    #[arg(long, default_value = "sample/+")]
    topic_filter: String,

    /// Topic to publish the payload to
    #[arg(long, default_value = "sample/topic1")]
    publish_topic: String,

    /// Payload to publish
    #[arg(long, default_value = "hello world")]
    payload: String,

    /// Seconds to wait for CONNACK
    #[arg(long, default_value_t = 30)]
    connect_timeout_secs: u64,
}

impl RunArgs {
    fn plan(&self) -> SessionPlan {
        SessionPlan {
            topic_filter: self.topic_filter.clone(),
            subscribe_qos: QoS::AtLeastOnce,
            message: OutboundMessage::new(
                self.publish_topic.clone(),
                self.payload.clone(),
                QoS::AtLeastOnce,
            ),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_cli_logging(cli.verbose);

    info!(
        "Starting MQTT getting-started sample v{}",
        env!("CARGO_PKG_VERSION")
    );

    let result = match load_settings(&cli.env_file) {
        Ok(settings) => match cli.command {
            Commands::Run(args) => run_sample(settings, args).await,
            Commands::Config { show } => handle_config_command(&settings, show),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("{}", e.sanitized_message());
        process::exit(e.exit_code());
    }
}

fn load_settings(path: &Path) -> SampleResult<ConnectionSettings> {
    info!("Loading connection settings from: {}", path.display());
    Ok(ConnectionSettings::load_from_file(path)?)
}

async fn run_sample(settings: ConnectionSettings, args: RunArgs) -> SampleResult<()> {
    if let Some(ca_file) = &settings.ca_file {
        info!("CA file: {}", ca_file.display());
    }
    info!("Key file: {}", settings.key_file.display());

    info!("Loading certificates");
    let credential = Credential::load(&settings.cert_file, &settings.key_file)?;

    info!("Preparing TLS transport for {}", settings.endpoint());
    let transport = TlsTransport::establish(&settings, credential)?;

    let mut shutdown = ShutdownSignal::from_os_signals().map_err(SampleError::Signal)?;

    info!("Creating MQTT client");
    let session = MqttSession::new(&settings, transport, SessionHandlers::logging());

    let mut driver = SessionDriver::new(session, args.plan())
        .with_connect_timeout(Duration::from_secs(args.connect_timeout_secs));

    match driver.run(&mut shutdown).await? {
        DriverOutcome::Terminated => Ok(()),
        DriverOutcome::SessionLost(reason) => Err(SampleError::SessionLost(reason)),
    }
}

fn handle_config_command(settings: &ConnectionSettings, show: bool) -> SampleResult<()> {
    if show {
        println!("Current connection settings:");
        println!("{}", toml::to_string_pretty(settings)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
