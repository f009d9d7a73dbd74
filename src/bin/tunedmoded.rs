//! tunedmode daemon - GameMode requests in, tuned profile switches out
//!
//! This binary claims `com.feralinteractive.GameMode` on the session bus,
//! tracks which games want performance mode, and switches tuned's profile
//! while at least one of them is running.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! tunedmoded start
//!
//! # Start the daemon (background/daemonized)
//! tunedmoded start -d
//!
//! # Use a different performance profile
//! tunedmoded start --profile throughput-performance
//! TUNEDMODE_PROFILE=throughput-performance tunedmoded start
//!
//! # Stop the daemon
//! tunedmoded stop
//!
//! # Show registered games
//! tunedmoded status
//! tunedmoded status --json
//!
//! # Enable debug logging
//! RUST_LOG=tunedmoded=debug tunedmoded start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: restore the pre-game profile, then exit

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use tunedmode_core::{LivenessMonitor, ProcfsMonitor};
use tunedmode_protocol::GameModeProxy;
use tunedmoded::config::{DaemonConfig, ENV_PROFILE};
use tunedmoded::registry::spawn_registry;
use tunedmoded::service;
use tunedmoded::tuned::TunedController;

/// tunedmode daemon - GameMode-compatible tuned profile switcher
#[derive(Parser, Debug)]
#[command(name = "tunedmoded", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// tuned profile to apply while games are running
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status and registered games
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

/// Returns the state directory holding the PID and log files.
fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("tunedmode")
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    state_dir().join("tunedmoded.pid")
}

/// Returns the path to the log file.
fn log_file_path() -> PathBuf {
    state_dir().join("tunedmoded.log")
}

/// Reads the PID from the PID file, if it exists.
fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

/// Removes the PID file.
fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

/// Checks if a process with the given PID is running.
fn is_process_running(pid: u32) -> bool {
    ProcfsMonitor::new().is_alive(pid.into())
}

/// Checks if the daemon is already running.
fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file - remove it
        remove_pid_file();
    }
    None
}

/// Sends SIGTERM to the daemon process.
fn stop_daemon(pid: u32) -> Result<()> {
    let raw = i32::try_from(pid).context("PID out of range")?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let result = unsafe { libc::kill(raw, libc::SIGTERM) };
    if result != 0 {
        bail!("Failed to send SIGTERM to process {}", pid);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Default to 'start' if no subcommand given
    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
        profile: None,
    });

    match command {
        Command::Start {
            daemon,
            config,
            profile,
        } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {})", pid);
                eprintln!("Use 'tunedmoded stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                // Daemonize before starting tokio runtime
                daemonize()?;
            }

            write_pid()?;

            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            let result = runtime.block_on(run_daemon(config, profile));

            // Clean up PID file on exit
            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {})...", pid);
                stop_daemon(pid)?;

                // Restoring the profile can take a moment (up to the tuned timeout)
                for _ in 0..150 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 15 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status { json } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(show_status(json))
        }
    }
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Runs the daemon (async entry point).
async fn run_daemon(config_path: Option<PathBuf>, cli_profile: Option<String>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tunedmoded=info".parse()?)
                .add_directive("tunedmode_core=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "tunedmode daemon starting"
    );

    let env_profile = env::var(ENV_PROFILE).ok();
    let config = DaemonConfig::resolve(
        config_path.as_deref(),
        env_profile.as_deref(),
        cli_profile.as_deref(),
    )
    .context("Failed to load configuration")?;

    info!(
        performance_profile = %config.performance_profile,
        reconcile_interval = ?config.reconcile_interval,
        profile_timeout = ?config.profile_timeout,
        "Configuration loaded"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let tuned = TunedController::connect(config.profile_timeout)
        .await
        .context("Failed to connect to tuned on the system bus")?;

    match tuned.available().await {
        Ok(profiles) if !profiles.contains(&config.performance_profile) => {
            warn!(
                profile = %config.performance_profile,
                "Performance profile is not installed in tuned; switches will fail"
            );
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not list tuned profiles"),
    }

    let liveness: Arc<dyn LivenessMonitor> = Arc::new(ProcfsMonitor::new());
    let registry = spawn_registry(config.registry_settings(), Arc::new(tuned), liveness.clone());
    info!("Registration registry started");

    let connection = match service::serve(registry.clone(), liveness).await {
        Ok(connection) => connection,
        Err(e) => {
            registry.shutdown().await;
            return Err(e).context("Failed to publish the GameMode service");
        }
    };

    cancel_token.cancelled().await;

    // Restore before releasing the bus name.
    registry.shutdown().await;
    drop(connection);

    info!("tunedmode daemon stopped");
    Ok(())
}

/// Queries a running daemon over the session bus and prints what it reports.
async fn show_status(json: bool) -> Result<()> {
    // Without this check the proxy call below could bus-activate a real
    // gamemoded in our place.
    let Some(pid) = is_daemon_running() else {
        print_not_running(json, None);
        process::exit(1);
    };

    let connection = zbus::Connection::session()
        .await
        .context("Failed to connect to the session bus")?;
    let proxy = GameModeProxy::new(&connection)
        .await
        .context("Failed to create GameMode proxy")?;

    let games = match proxy.list_games().await {
        Ok(games) => games,
        Err(e) => {
            debug!(error = %e, "ListGames failed");
            print_not_running(json, Some(pid));
            process::exit(1);
        }
    };
    let client_count = proxy.client_count().await.unwrap_or(-1);

    if json {
        let games: Vec<_> = games
            .iter()
            .map(|(game, requester)| serde_json::json!({ "game": game, "requester": requester }))
            .collect();
        let out = serde_json::json!({
            "running": true,
            "pid": pid,
            "client_count": client_count,
            "games": games,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Daemon is running (PID {})", pid);
    println!("Registered clients: {}", client_count);
    for (game, requester) in games {
        if game == requester {
            println!("  game {}", game);
        } else {
            println!("  game {} (requested by {})", game, requester);
        }
    }

    Ok(())
}

/// Reports a daemon that is not running, or holds a PID file but does not
/// answer on the bus.
fn print_not_running(json: bool, pid: Option<u32>) {
    if json {
        println!("{}", serde_json::json!({ "running": false, "pid": pid }));
    } else if let Some(pid) = pid {
        println!("Daemon (PID {}) is not reachable on the session bus.", pid);
    } else {
        println!("Daemon is not running.");
    }
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}
