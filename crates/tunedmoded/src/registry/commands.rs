//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for subscribers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::fmt;

use thiserror::Error;
use tokio::sync::oneshot;

use tunedmode_core::{GameKey, Pid, ProfileName, RegistrationView};

use crate::tuned::ProfileError;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each request carries a oneshot channel for the response. The actor
/// finishes one command, profile calls included, before reading the next.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a (requester, game) pair.
    ///
    /// # Errors
    /// - `RegistryError::InvalidClient` if either process is not running
    /// - `RegistryError::ProfileService` if tuned failed while starting an episode
    Register {
        key: GameKey,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove a (requester, game) pair. Removing an absent pair succeeds.
    ///
    /// # Errors
    /// - `RegistryError::ProfileService` if restoring the saved profile failed
    Unregister {
        key: GameKey,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Drop registrations whose requester process is gone.
    ///
    /// Sent fire-and-forget (`None`) by the periodic reconcile task; callers
    /// that want the number of removed registrations pass a sender.
    Reconcile {
        respond_to: Option<oneshot::Sender<usize>>,
    },

    /// Snapshot of the registry. Does not reconcile.
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Restore the saved profile if engaged, then stop the actor.
    Shutdown { respond_to: oneshot::Sender<()> },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A PID in the request does not name a running process.
    #[error("invalid client: process {0} is not running")]
    InvalidClient(Pid),

    /// The tuning service failed a profile read or switch.
    #[error("profile service error: {0}")]
    ProfileService(#[from] ProfileError),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Status Snapshot
// ============================================================================

/// Read-only projection of the registry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStatus {
    /// `true` while at least one registration is active.
    pub engaged: bool,

    /// Profile applied while engaged.
    pub performance_profile: ProfileName,

    /// Profile that will be restored when the episode ends.
    pub saved_profile: Option<ProfileName>,

    /// Active registrations in registration order.
    pub registrations: Vec<RegistrationView>,
}

impl RegistryStatus {
    /// Number of active registrations.
    pub fn client_count(&self) -> usize {
        self.registrations.len()
    }

    /// Returns `true` if exactly this pair is registered.
    pub fn contains(&self, key: GameKey) -> bool {
        self.registrations.iter().any(|r| r.key() == key)
    }
}

// ============================================================================
// Registry Events
// ============================================================================

/// Events published by the registry to subscribers.
///
/// The D-Bus facade turns these into `GameRegistered`/`GameUnregistered`
/// signals and `ClientCount` change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A new pair was registered.
    Registered { key: GameKey },

    /// A pair was removed from the registry.
    Unregistered { key: GameKey, reason: RemovalReason },
}

/// Reason why a registration was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The client called UnregisterGame.
    Explicit,

    /// The requester process exited (or its PID was reused) without
    /// unregistering. Detected during reconcile.
    ProcessDied,

    /// The daemon is shutting down.
    Shutdown,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicitly unregistered"),
            Self::ProcessDied => write!(f, "requester process died"),
            Self::Shutdown => write!(f, "daemon shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tunedmode_core::Registration;

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::InvalidClient(Pid::new(4242));
        assert_eq!(err.to_string(), "invalid client: process 4242 is not running");

        let err = RegistryError::from(ProfileError::Timeout {
            call: "switch_profile",
            after: Duration::from_secs(1),
        });
        assert_eq!(
            err.to_string(),
            "profile service error: switch_profile timed out after 1s"
        );

        assert_eq!(RegistryError::ChannelClosed.to_string(), "response channel closed");
    }

    #[test]
    fn test_removal_reason_display() {
        assert_eq!(RemovalReason::Explicit.to_string(), "explicitly unregistered");
        assert_eq!(RemovalReason::ProcessDied.to_string(), "requester process died");
        assert_eq!(RemovalReason::Shutdown.to_string(), "daemon shutting down");
    }

    #[test]
    fn test_status_projection() {
        let key = GameKey::new(Pid::new(1), Pid::new(2));
        let status = RegistryStatus {
            engaged: true,
            performance_profile: ProfileName::new("latency-performance"),
            saved_profile: Some(ProfileName::new("balanced")),
            registrations: vec![RegistrationView::from_domain(&Registration::new(key, None))],
        };

        assert_eq!(status.client_count(), 1);
        assert!(status.contains(key));
        assert!(!status.contains(GameKey::own(Pid::new(2))));
    }
}
