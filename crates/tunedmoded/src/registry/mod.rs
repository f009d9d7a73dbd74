//! Registration registry using Actor pattern.
//!
//! The registry is the central state manager: it tracks which clients want
//! the performance profile and decides when tuned must switch.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  GameMode D-Bus │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └─────────────────┘     └────────┬────────┘     └─────────────────┘
//!         │                        │                       │
//!         │   RegistryCommand      │  ProfileController    │ RegistryEvent
//!         │   (mpsc channel)       ▼                       ▼
//!    Register/Unregister     tuned (system bus)     D-Bus signals
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::debug;

use tunedmode_core::{LivenessMonitor, ProfileName};

use crate::tuned::ProfileController;

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError, RegistryEvent, RegistryStatus, RemovalReason};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Default period of the background reconcile.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Construction parameters for the registry.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Profile applied while any game is registered.
    pub performance_profile: ProfileName,

    /// Period of the background reconcile.
    pub reconcile_interval: Duration,
}

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates command and event channels
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Spawns the periodic reconcile task
/// 4. Returns a RegistryHandle for client use
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tunedmode_core::ProcfsMonitor;
/// use tunedmoded::registry::{spawn_registry, RegistrySettings, DEFAULT_RECONCILE_INTERVAL};
/// use tunedmoded::tuned::{TunedController, DEFAULT_PROFILE_TIMEOUT};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let tuned = TunedController::connect(DEFAULT_PROFILE_TIMEOUT).await?;
///     let settings = RegistrySettings {
///         performance_profile: "latency-performance".parse()?,
///         reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
///     };
///     let handle = spawn_registry(settings, Arc::new(tuned), Arc::new(ProcfsMonitor::new()));
///     let status = handle.status().await?;
///     println!("{} games registered", status.client_count());
///     Ok(())
/// }
/// ```
pub fn spawn_registry(
    settings: RegistrySettings,
    profiles: Arc<dyn ProfileController>,
    liveness: Arc<dyn LivenessMonitor>,
) -> RegistryHandle {
    // Create channels
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    // Create and spawn actor
    let actor = RegistryActor::new(
        cmd_rx,
        event_tx.clone(),
        settings.performance_profile,
        profiles,
        liveness,
    );
    tokio::spawn(actor.run());

    spawn_reconcile_task(cmd_tx.downgrade(), settings.reconcile_interval);

    RegistryHandle::new(cmd_tx, event_tx)
}

/// Spawn a background task that triggers periodic reconciliation.
///
/// Closes episodes left open by clients that crashed, even if no other
/// client ever calls in again. Holds only a weak sender, so dropping every
/// `RegistryHandle` still stops the actor.
fn spawn_reconcile_task(sender: mpsc::WeakSender<RegistryCommand>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(period);

        loop {
            ticker.tick().await;

            let Some(sender) = sender.upgrade() else {
                debug!("Reconcile task stopping: every registry handle dropped");
                break;
            };

            // Fire-and-forget reconcile command
            if sender
                .send(RegistryCommand::Reconcile { respond_to: None })
                .await
                .is_err()
            {
                // Channel closed, actor stopped - exit reconcile task
                debug!("Reconcile task stopping: registry channel closed");
                break;
            }

            debug!("Triggered periodic reconcile");
        }
    });
}
