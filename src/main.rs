//! Binary entry point for the Cloud Shepard CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cloud_shepard::{
    ConfigError, DigitalOceanError, DigitalOceanGateway, FileInventoryWriter, FingerprintError,
    FleetError, FleetFile, FleetOrchestrator, FleetSettings, InventoryOutcome, KeyFingerprinter,
    MappingPolicy, ShepardConfig, TerminalProgress,
};

mod cli;

use cli::{Cli, CreateCommand, FleetArgs, InventoryCommand};

const NO_DROPLETS: &str = "No droplets found";

type Orchestrator = FleetOrchestrator<DigitalOceanGateway, TerminalProgress, FileInventoryWriter>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("ssh key error: {0}")]
    Fingerprint(#[from] FingerprintError),
    #[error("provider error: {0}")]
    Provider(#[from] DigitalOceanError),
    #[error(transparent)]
    Fleet(Box<FleetError<DigitalOceanError>>),
    #[error("failed to render output: {0}")]
    Output(String),
}

impl From<FleetError<DigitalOceanError>> for CliError {
    fn from(value: FleetError<DigitalOceanError>) -> Self {
        Self::Fleet(Box::new(value))
    }
}

struct Session {
    fleet: FleetFile,
    shepard: ShepardConfig,
    orchestrator: Orchestrator,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping local waits");
            interrupt.cancel();
        }
    });

    let exit_code = match dispatch(cli, cancel).await {
        Ok(()) => 0,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), CliError> {
    match cli {
        Cli::Create(command) => create(&command, cancel).await,
        Cli::Destroy(args) => destroy(&args, cancel).await,
        Cli::List(args) => list(&args, cancel).await,
        Cli::Inventory(command) => inventory(&command, cancel).await,
    }
}

fn open_session(
    args: &FleetArgs,
    policy: Option<&str>,
    cancel: CancellationToken,
) -> Result<Session, CliError> {
    let shepard = ShepardConfig::load_without_cli_args()?;
    let fleet = FleetFile::load(Utf8Path::new(&args.config))?;
    let api_key = shepard.resolve_api_key(args.api_key.as_deref(), &fleet)?;
    let settings = fleet_settings(&shepard, policy)?;

    let gateway = DigitalOceanGateway::with_api_base(api_key, shepard.api_base.as_str())?;
    let orchestrator = FleetOrchestrator::new(
        gateway,
        TerminalProgress,
        FileInventoryWriter,
        settings,
    )
    .with_cancellation(cancel);
    Ok(Session {
        fleet,
        shepard,
        orchestrator,
    })
}

fn fleet_settings(shepard: &ShepardConfig, policy: Option<&str>) -> Result<FleetSettings, CliError> {
    let mut settings = shepard.fleet_settings()?;
    if let Some(raw) = policy {
        settings.mapping_policy =
            raw.parse::<MappingPolicy>()
                .map_err(|err| ConfigError::Invalid {
                    field: String::from("policy"),
                    message: err.to_string(),
                })?;
    }
    Ok(settings)
}

async fn create(command: &CreateCommand, cancel: CancellationToken) -> Result<(), CliError> {
    let session = open_session(&command.fleet, command.policy.as_deref(), cancel)?;
    let key_path = session
        .shepard
        .resolve_ssh_key(command.ssh_key.as_deref(), &session.fleet)?;
    let fingerprint = KeyFingerprinter::with_process_runner(session.shepard.ssh_keygen_bin.as_str())
        .fingerprint(&key_path)?;
    let keys = vec![fingerprint];
    let plan = session.fleet.plan()?;

    let template = &session.fleet.droplets;
    let outcome = session
        .orchestrator
        .create(
            &plan,
            session.fleet.selector(),
            |group| template.spec_for(group, &keys),
            command.write_inventory_to.as_deref().map(Utf8Path::new),
        )
        .await?;

    print_line(&outcome.rendered);
    Ok(())
}

async fn destroy(args: &FleetArgs, cancel: CancellationToken) -> Result<(), CliError> {
    let session = open_session(args, None, cancel)?;
    let outcome = session
        .orchestrator
        .destroy(session.fleet.selector())
        .await?;
    if outcome.count() == 0 {
        print_line(NO_DROPLETS);
    } else {
        print_line(&format!("Destroyed {} droplets", outcome.count()));
    }
    Ok(())
}

async fn list(args: &FleetArgs, cancel: CancellationToken) -> Result<(), CliError> {
    let session = open_session(args, None, cancel)?;
    let instances = session.orchestrator.list(session.fleet.selector()).await?;
    if instances.is_empty() {
        print_line(NO_DROPLETS);
        return Ok(());
    }
    let rendered = serde_json::to_string_pretty(&instances)
        .map_err(|err| CliError::Output(err.to_string()))?;
    print_line(&rendered);
    Ok(())
}

async fn inventory(command: &InventoryCommand, cancel: CancellationToken) -> Result<(), CliError> {
    let session = open_session(&command.fleet, command.policy.as_deref(), cancel)?;
    let plan = session.fleet.plan()?;
    let outcome = session
        .orchestrator
        .inventory(
            &plan,
            session.fleet.selector(),
            command.write_inventory_to.as_deref().map(Utf8Path::new),
        )
        .await?;
    match outcome {
        InventoryOutcome::NoInstances => print_line(NO_DROPLETS),
        InventoryOutcome::Mapped { rendered, .. } => print_line(&rendered),
    }
    Ok(())
}

fn print_line(text: &str) {
    writeln!(io::stdout(), "{text}").ok();
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
