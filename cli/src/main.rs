//! kubegate — guarded kubectl gateway.
//!
//! Three subcommands:
//! - `kubegate serve`: HTTP API for browser terminals and selectors
//! - `kubegate exec`: run one command through the pipeline
//! - `kubegate plan`: print the invocation a command would run, without running it

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use axum::Router;
use clap::{Args, Parser, Subcommand};
use kubegate::exec::REJECTION_MESSAGE;
use kubegate::{AppState, CommandRequest, ExecutionPipeline, GatewayConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Validate, target and run kubectl commands.
#[derive(Parser)]
#[command(name = "kubegate", version, about = "Guarded kubectl execution gateway")]
struct Cli {
    /// Path to kubegate.toml [default: ./kubegate.toml or ~/.config/kubegate/kubegate.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// HTTP port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Validate and run a single command
    Exec(TargetArgs),
    /// Validate a command and print the composed invocation
    Plan(TargetArgs),
}

#[derive(Args)]
struct TargetArgs {
    /// The command, e.g. "kubectl get pods"
    command: String,
    /// Namespace [default: from config]
    #[arg(short, long)]
    namespace: Option<String>,
    /// Context [default: from config]
    #[arg(long)]
    context: Option<String>,
    /// Run the command inside this pod
    #[arg(long)]
    pod: Option<String>,
}

impl From<TargetArgs> for CommandRequest {
    fn from(args: TargetArgs) -> Self {
        Self {
            raw_command: args.command,
            namespace: args.namespace.unwrap_or_default(),
            context: args.context.unwrap_or_default(),
            pod: args.pod,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // RUST_LOG controls verbosity; logs go to stderr so exec output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config).await?;

    match cli.command {
        Commands::Serve { port, host } => {
            let cancel = CancellationToken::new();
            let cancel_for_signal = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                tracing::info!("shutting down kubegate");
                cancel_for_signal.cancel();
            });

            run_serve(config, host, port, cancel).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exec(args) => run_exec(&config, args.into()).await,
        Commands::Plan(args) => run_plan(&config, args.into()),
    }
}

/// Serve the HTTP API until cancelled.
async fn run_serve(
    config: GatewayConfig,
    host: String,
    port: u16,
    cancel: CancellationToken,
) -> Result<()> {
    let state = AppState::from_config(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to build gateway state: {}", e))?;

    let tasks = state.spawn_background(&config.cluster, cancel.child_token());

    let app = Router::new().nest("/api/kubernetes", kubegate::router(state));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!(host = %host, port = %port, "kubegate HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .map_err(|e| anyhow::anyhow!("kubegate HTTP server error: {}", e))?;

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("kubegate HTTP server stopped");
    Ok(())
}

/// Run one command; stdout and stderr pass through, exit code 1 on error.
async fn run_exec(config: &GatewayConfig, request: CommandRequest) -> Result<ExitCode> {
    let pipeline = ExecutionPipeline::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to build pipeline: {}", e))?;

    let result = pipeline.execute(&request).await;
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    if !result.stderr.is_empty() && !result.stderr.ends_with('\n') {
        eprintln!();
    }

    Ok(if result.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Print the composed invocation, or the rejection reason.
fn run_plan(config: &GatewayConfig, request: CommandRequest) -> Result<ExitCode> {
    let pipeline = ExecutionPipeline::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to build pipeline: {}", e))?;

    match pipeline.plan(&request) {
        Ok(invocation) => {
            println!("{invocation}");
            Ok(ExitCode::SUCCESS)
        }
        Err(violation) => {
            eprintln!("{REJECTION_MESSAGE}: {violation}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Resolve config file path: explicit flag → ./kubegate.toml →
/// ~/.config/kubegate/kubegate.toml. `None` means built-in defaults.
fn resolve_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let local = Path::new("kubegate.toml");
    if local.exists() {
        return Some(local.to_path_buf());
    }

    dirs::config_dir()
        .map(|dir| dir.join("kubegate").join("kubegate.toml"))
        .filter(|path| path.exists())
}

async fn load_config(explicit: Option<PathBuf>) -> Result<GatewayConfig> {
    match resolve_config(explicit) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            GatewayConfig::load(&path)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))
        }
        None => {
            tracing::debug!("no kubegate.toml found, using built-in defaults");
            Ok(GatewayConfig::default())
        }
    }
}
