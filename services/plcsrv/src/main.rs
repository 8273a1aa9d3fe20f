//! PLC Polling Service
//!
//! Command-line entry point: `plcsrv run` polls until Ctrl+C, the other
//! subcommands perform a single operation and exit.

use std::path::PathBuf;
use std::process::ExitCode;

use blocklink::{Address, BlockValue, TransportError};
use clap::{Parser, Subcommand, ValueEnum};
use common::LogConfig;
use errors::{ServiceError, ServiceResult};
use tracing::{error, info};

use plcsrv::{s7_coordinator, PlcsrvConfig};

/// Command-line arguments for plcsrv
#[derive(Parser, Debug)]
#[command(
    name = "plcsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "S7 PLC Polling Service",
    long_about = None
)]
struct Args {
    /// Configuration file (yaml, toml or json)
    #[arg(short = 'c', long, default_value = "config/plcsrv.yaml", env = "PLCSRV_CONFIG")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Directory for rolling log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// JSON log output
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll until interrupted
    Run,
    /// Poll once and print one address (e.g. DB40.REAL30)
    Read {
        address: Address,
        /// Decimal places (REAL only)
        #[arg(long)]
        round_to: Option<u32>,
    },
    /// Write one value (e.g. DB10.DBW16 2)
    Write {
        address: Address,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Send a configured command word
    Command { name: String },
    /// Write a configured setpoint (e.g. herb_garden_start_hour 6)
    Set {
        name: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Print connectivity, CPU state and all points
    Status {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Load and validate the configuration only
    Validate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_value(value: &str) -> ServiceResult<BlockValue> {
    BlockValue::parse(value).ok_or_else(|| {
        ServiceError::invalid_parameter("value", format!("'{}' is not a number", value))
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error [{}]: {}", e.error_code(), e);
            ExitCode::from(e.exit_code() as u8)
        },
    }
}

async fn run(args: Args) -> ServiceResult<()> {
    let config = PlcsrvConfig::load(&args.config)?;

    let log_config = LogConfig {
        service_name: "plcsrv".to_string(),
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        log_dir: args
            .log_dir
            .clone()
            .or_else(|| config.logging.dir.as_ref().map(PathBuf::from)),
        enable_json: args.json || config.logging.json,
    };
    common::init_with_config(log_config)
        .map_err(|e| ServiceError::StartupFailed(format!("logging: {}", e)))?;

    info!("Configuration loaded from {}", args.config.display());

    match args.command {
        Command::Validate => {
            println!(
                "{}: OK ({} blocks, {} points, {} commands, {} setpoints)",
                args.config.display(),
                config.blocks.len(),
                config.points.len(),
                config.commands.len(),
                config.setpoints.len()
            );
            Ok(())
        },
        Command::Run => {
            let mut coordinator = s7_coordinator(config);
            coordinator.run(common::wait_for_shutdown()).await;
            Ok(())
        },
        Command::Read { address, round_to } => {
            let mut coordinator = s7_coordinator(config);
            let value = coordinator.read_address(&address, round_to).await?;
            println!("{} = {}", address, value);
            Ok(())
        },
        Command::Write { address, value } => {
            let parsed = parse_value(&value)?;
            let mut coordinator = s7_coordinator(config);
            coordinator.write(&address, &parsed).await?;
            println!("{} <- {}", address, parsed);
            Ok(())
        },
        Command::Command { name } => {
            let mut coordinator = s7_coordinator(config);
            coordinator.send_command(&name).await?;
            println!("Command '{}' sent", name);
            Ok(())
        },
        Command::Set { name, value } => {
            let parsed = parse_value(&value)?;
            let mut coordinator = s7_coordinator(config);
            coordinator.set_setpoint(&name, &parsed).await?;
            println!("Setpoint '{}' <- {}", name, parsed);
            Ok(())
        },
        Command::Status { format } => {
            let mut coordinator = s7_coordinator(config);
            let data = coordinator.refresh().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data)?),
                OutputFormat::Text => {
                    println!("Connection: {}", coordinator.connection_state());
                    println!(
                        "CPU: {}",
                        match data.cpu_running {
                            Some(true) => "Run",
                            Some(false) => "Stop",
                            None => "Unknown",
                        }
                    );
                    for (name, reading) in &data.readings {
                        let unit = coordinator
                            .config()
                            .point(name)
                            .and_then(|p| p.unit.as_deref())
                            .unwrap_or("");
                        println!("  {:<24} {} {}", name, reading, unit);
                    }
                },
            }
            if data.comms_ok {
                Ok(())
            } else {
                Err(TransportError::ConnectionFailed(format!(
                    "{} unreachable",
                    coordinator.session().host()
                ))
                .into())
            }
        },
    }
}
