use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use stack_client::{
    ClientConfig, ConfigError, GenericResponse, RestEvent, StackError, StackEvent, TransportError, WsEvent,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,stack_client=info";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("client setup failed: {0}")]
    Setup(#[from] TransportError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("--metadata must be a JSON object")]
    MetadataNotObject,
}

#[derive(Parser, Debug)]
#[command(name = "stack-cli", about = "Drive a stack service over REST or WebSocket")]
struct Cli {
    /// Stack host (and port). Overrides STACK_HOSTNAME; the other STACK_* settings still apply.
    #[arg(long)]
    hostname: Option<String>,

    /// Use http/ws instead of https/wss.
    #[arg(long, env = "STACK_INSECURE")]
    insecure: bool,

    #[arg(long, value_enum, env = "STACK_TRANSPORT", default_value_t = Transport::Rest)]
    transport: Transport,

    #[arg(long, env = "STACK_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "STACK_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    #[arg(long, env = "STACK_SCOPE")]
    scope: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Transport {
    Rest,
    Ws,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the stack session.
    Bootstrap { message: Option<String> },
    /// Ask a question.
    Query { message: Option<String> },
    /// Upload documents.
    Store {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// JSON object attached to the batch.
        #[arg(long)]
        metadata: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if let Err(e) = tracing_subscriber::fmt().with_target(true).with_env_filter(filter).try_init() {
        eprintln!("tracing already initialized: {e}");
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = build_config(cli.hostname, cli.insecure)?;

    let stack: Box<dyn StackEvent> = match cli.transport {
        Transport::Rest => Box::new(RestEvent::new(&config)?),
        Transport::Ws => Box::new(WsEvent::new(&config)?),
    };
    tracing::info!(hostname = %config.hostname, transport = ?cli.transport, "authorizing");

    stack
        .authorize_stack(cli.client_id.as_deref(), cli.client_secret.as_deref(), cli.scope.as_deref())
        .await?;

    let outcome = run_command(stack.as_ref(), cli.command).await;
    let destroyed = stack.destroy_stack(None).await;

    let result = outcome?;
    destroyed?;
    print_json(&result)
}

/// Environment settings with the command-line flags layered on top.
fn build_config(hostname: Option<String>, insecure: bool) -> Result<ClientConfig, CliError> {
    let config = ClientConfig::from_env_with_hostname(hostname)?;
    Ok(if insecure { config.with_secure(false) } else { config })
}

async fn run_command(stack: &dyn StackEvent, command: Command) -> Result<GenericResponse, CliError> {
    let response = match command {
        Command::Bootstrap { message } => stack.bootstrap_stack(message.as_deref()).await?,
        Command::Query { message } => stack.generate_answer(message.as_deref()).await?,
        Command::Store { paths, metadata } => {
            let metadata = metadata.as_deref().map(parse_metadata).transpose()?;
            stack.store_data(&paths, metadata).await?
        }
    };
    Ok(response)
}

fn parse_metadata(raw: &str) -> Result<Map<String, Value>, CliError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::MetadataNotObject),
    }
}

fn print_json(response: &GenericResponse) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(response)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
