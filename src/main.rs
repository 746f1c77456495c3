//! Binary entry point for the Skiff CLI.
//!
//! The binary is the host adapter around the library's lifecycle contract:
//! each subcommand loads configuration, restores the session file, runs one
//! lifecycle operation, and persists the session back (even when the
//! operation failed) so partial progress is never discarded.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use skiff::{
    BootstrapPayload, CancelSignal, ComputeClient, ComputeError, Liveness, SessionStore,
    SpawnError, Spawner, SpawnerConfig, TeardownError, TeardownPolicy,
};

#[derive(Debug, Parser)]
#[command(
    name = "skiff",
    about = "Provision per-user workbench nodes with persistent volumes",
    arg_required_else_help = true
)]
enum Cli {
    #[command(about = "Provision a node and attach the user's volumes")]
    Provision(ProvisionCommand),
    #[command(about = "Stop or terminate the node and optionally delete volumes")]
    Teardown(TeardownCommand),
    #[command(about = "Report whether the session's node is running")]
    Status,
}

#[derive(Debug, Parser)]
struct ProvisionCommand {
    /// OS username the node is provisioned for.
    #[arg(long)]
    username: String,
    /// Environment entries passed to the in-node bootstrap agent.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,
}

#[derive(Debug, Parser)]
struct TeardownCommand {
    /// Stop the node instead of terminating it, keeping it restartable.
    #[arg(long)]
    keep_node: bool,
    /// Detach and delete the session's volumes as well.
    #[arg(long)]
    delete_volumes: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("session state error: {0}")]
    Session(String),
    #[error("invalid --env entry `{0}`: expected KEY=VALUE")]
    InvalidEnvEntry(String),
    #[error("bootstrap payload error: {0}")]
    Bootstrap(String),
    #[error("provisioning failed: {0}")]
    Provision(#[from] SpawnError<ComputeError>),
    #[error("teardown failed: {0}")]
    Teardown(#[from] TeardownError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Provision(command) => provision_command(command).await,
        Cli::Teardown(command) => teardown_command(command).await,
        Cli::Status => status_command().await,
    }
}

fn load_config() -> Result<SpawnerConfig, CliError> {
    SpawnerConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))
}

fn build_spawner(config: &SpawnerConfig) -> Result<Spawner<ComputeClient>, CliError> {
    let client = ComputeClient::new(config.api_base_url.as_str(), config.api_token.as_str())
        .map_err(|err| CliError::Config(err.to_string()))?;
    Ok(Spawner::new(client, config.service_port).with_wait_params(config.wait_params()))
}

async fn provision_command(args: ProvisionCommand) -> Result<i32, CliError> {
    let config = load_config()?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let spawner = build_spawner(&config)?;
    let store = SessionStore::new(config.session_file.as_str());
    let mut session = store
        .load()
        .map_err(|err| CliError::Session(err.to_string()))?;

    let payload = BootstrapPayload::new(args.username.as_str())
        .map_err(|err| CliError::Bootstrap(err.to_string()))?
        .with_env(parse_env_entries(&args.env)?);
    let request = config
        .as_provision_request(payload)
        .map_err(|err| CliError::Config(err.to_string()))?;

    let outcome = spawner
        .provision(&mut session, &request, &CancelSignal::never())
        .await;
    // Persisted before the outcome is inspected: a failed call may still
    // have recorded resources the next attempt must resume from.
    store
        .save(&session)
        .map_err(|err| CliError::Session(err.to_string()))?;
    let endpoint = outcome?;

    writeln!(io::stdout(), "{endpoint}").ok();
    Ok(0)
}

async fn teardown_command(args: TeardownCommand) -> Result<i32, CliError> {
    let config = load_config()?;
    let spawner = build_spawner(&config)?;
    let store = SessionStore::new(config.session_file.as_str());
    let mut session = store
        .load()
        .map_err(|err| CliError::Session(err.to_string()))?;

    let policy = TeardownPolicy {
        terminate_node: !args.keep_node,
        delete_volumes: args.delete_volumes,
    };
    let outcome = spawner
        .teardown(&mut session, policy, &CancelSignal::never())
        .await;
    store
        .save(&session)
        .map_err(|err| CliError::Session(err.to_string()))?;
    outcome?;

    writeln!(io::stdout(), "teardown complete").ok();
    Ok(0)
}

async fn status_command() -> Result<i32, CliError> {
    let config = load_config()?;
    let spawner = build_spawner(&config)?;
    let store = SessionStore::new(config.session_file.as_str());
    let session = store
        .load()
        .map_err(|err| CliError::Session(err.to_string()))?;

    match spawner.poll(&session).await {
        Liveness::Alive => {
            writeln!(io::stdout(), "alive").ok();
            Ok(0)
        }
        Liveness::NotStarted => {
            writeln!(io::stdout(), "not started").ok();
            Ok(1)
        }
    }
}

fn parse_env_entries(entries: &[String]) -> Result<BTreeMap<String, String>, CliError> {
    let mut env = BTreeMap::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(CliError::InvalidEnvEntry(entry.clone()));
        };
        let trimmed_key = key.trim();
        if trimmed_key.is_empty() {
            return Err(CliError::InvalidEnvEntry(entry.clone()));
        }
        env.insert(trimmed_key.to_owned(), value.to_owned());
    }
    Ok(env)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
