//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to registry events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{broadcast, mpsc, oneshot};

use tunedmode_core::GameKey;

use super::commands::{RegistryCommand, RegistryError, RegistryEvent, RegistryStatus};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle shared by the D-Bus facade and `main`.
/// Once every clone is dropped the actor restores the saved profile and
/// stops.
///
/// # Usage
///
/// ```ignore
/// let key = GameKey::own(Pid::new(1000));
/// handle.register(key).await?;
/// let status = handle.status().await?;
/// handle.unregister(key).await?;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Register a (requester, game) pair.
    ///
    /// Registering a pair that is already active succeeds without side
    /// effects beyond refreshing it.
    ///
    /// # Errors
    ///
    /// - `RegistryError::InvalidClient` if either process is not running
    /// - `RegistryError::ProfileService` if tuned failed while starting an episode
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(&self, key: GameKey) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                key,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Unregister a (requester, game) pair. Absent pairs are not an error.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ProfileService` if restoring the saved profile failed
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn unregister(&self, key: GameKey) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Unregister {
                key,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Reconcile now and wait for it; returns the number of registrations
    /// removed.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn reconcile(&self) -> Result<usize, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Reconcile {
                respond_to: Some(tx),
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Snapshot of the registry.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn status(&self) -> Result<RegistryStatus, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::GetStatus { respond_to: tx })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Restore the saved profile (if engaged) and stop the actor.
    ///
    /// Returns once the restore attempt has finished. Calling this on an
    /// actor that already stopped is a no-op.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Shutdown { respond_to: tx })
            .await
            .is_err()
        {
            return;
        }

        let _ = rx.await;
    }

    /// Subscribe to registry events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunedmode_core::Pid;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = broadcast::channel(16);
        let handle = RegistryHandle::new(cmd_tx, event_tx);
        (handle, cmd_rx)
    }

    #[tokio::test]
    async fn test_register_sends_command() {
        let (handle, mut rx) = create_test_handle();
        let key = GameKey::new(Pid::new(10), Pid::new(20));

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Register { key, respond_to }) = rx.recv().await {
                assert_eq!(key.requester, Pid::new(10));
                assert_eq!(key.game, Pid::new(20));
                let _ = respond_to.send(Ok(()));
                return true;
            }
            false
        });

        assert!(handle.register(key).await.is_ok());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_register_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.register(GameKey::own(Pid::new(1))).await;
        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_unregister_propagates_actor_error() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            if let Some(RegistryCommand::Unregister { key, respond_to }) = rx.recv().await {
                let _ = respond_to.send(Err(RegistryError::InvalidClient(key.game)));
            }
        });

        let result = handle.unregister(GameKey::own(Pid::new(5))).await;
        assert!(matches!(result, Err(RegistryError::InvalidClient(pid)) if pid == Pid::new(5)));
    }

    #[tokio::test]
    async fn test_status_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(matches!(handle.status().await, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_ignores_closed_channel() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        // Should not panic or error
        handle.shutdown().await;
        assert!(matches!(handle.status().await, Err(RegistryError::ChannelClosed)));
    }
}
