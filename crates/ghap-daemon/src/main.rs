use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ghap_core::{Config, Dispatcher, MetadataStore, MockEmbeddingService, SqliteVectorStore};
use ghap_daemon::process::{open_log_file_append, ProcessHandle};
use ghap_daemon::{bind, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ghap-daemon", version, about = "GHAP experience-learning and orchestration daemon")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon as a detached background process (default).
    Start,
    /// Send SIGTERM (then SIGKILL after a grace period) to a running daemon.
    Stop,
    /// Report whether the daemon's PID file names a live process.
    Status,
    /// Run the server loop in the foreground. Used internally by `start`'s
    /// re-exec; also useful for supervised deployments that manage
    /// backgrounding themselves.
    Run,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env();
    config.ensure_layout()?;
    let handle = ProcessHandle::new(config.pid_path());

    match args.command.unwrap_or(Command::Start) {
        Command::Start => start_detached(&config, &handle),
        Command::Stop => handle.stop(),
        Command::Status => {
            println!("{}", if handle.is_running() { "running" } else { "stopped" });
            Ok(())
        }
        Command::Run => run_foreground(&config, &handle),
    }
}

/// Spawns `ghap-daemon run` in a new process group with stderr redirected
/// to the append-mode log file (§6), then returns immediately.
fn start_detached(config: &Config, handle: &ProcessHandle) -> Result<()> {
    if handle.is_running() {
        bail!("daemon already running (pid file at {})", config.pid_path().display());
    }

    let log_file = open_log_file_append(&config.log_path())
        .with_context(|| format!("opening log file {}", config.log_path().display()))?;
    let exe = std::env::current_exe().context("resolving current executable")?;

    let mut command = std::process::Command::new(exe);
    command.arg("run").stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::from(log_file));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    command.spawn().context("spawning daemon child process")?;
    println!("ghap-daemon starting (log: {})", config.log_path().display());
    Ok(())
}

fn run_foreground(config: &Config, handle: &ProcessHandle) -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new("ghap=info")).init();
    handle.write_own_pid().context("writing PID file")?;

    // Fork-safety contract (§4.C, §5): the embedding service is constructed
    // only after the PID file is written, never in a process that might
    // still be forked again.
    let metadata = MetadataStore::open(config.db_path())?;
    let vectors = Arc::new(SqliteVectorStore::new(config.vector_db_path())?);
    let embeddings = Arc::new(MockEmbeddingService::new(ghap_core::DEFAULT_EMBEDDING_DIM));
    let dispatcher = Arc::new(Dispatcher::new(metadata, vectors, embeddings, "ghap-daemon", ghap_core::version()));

    info!(host = %config.host, port = config.port, "ghap-daemon listening");

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?
        .block_on(serve_until_shutdown(AppState { dispatcher }, config));

    handle.remove_pid_file();
    result
}

async fn serve_until_shutdown(state: AppState, config: &Config) -> Result<()> {
    let server = bind(state, &config.host, config.port)?;
    let server_handle = server.handle();

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("received shutdown signal, stopping gracefully");
        server_handle.stop(true).await;
    });

    server.await.map_err(anyhow::Error::from)
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
    let mut interrupt = signal(SignalKind::interrupt()).expect("installing SIGINT handler");
    tokio::select! {
        _ = terminate.recv() => {},
        _ = interrupt.recv() => {},
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
