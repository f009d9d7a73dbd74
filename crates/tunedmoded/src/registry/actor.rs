//! Registry actor - owns all registration state and drives tuned.
//!
//! The RegistryActor is the single owner of the active registrations and the
//! saved profile. It receives commands via an mpsc channel, runs each one to
//! completion (profile calls included) and publishes events via broadcast.
//!
//! # State machine
//!
//! ```text
//!            Register (first pair)
//!            capture current, switch to performance
//!   ┌──────┐ ─────────────────────────────────────▶ ┌─────────┐
//!   │ Idle │                                        │ Engaged │ ◀─┐ Register / Unregister
//!   └──────┘ ◀───────────────────────────────────── └─────────┘ ──┘ (set stays non-empty)
//!            Unregister / Reconcile / Shutdown
//!            (set becomes empty): restore saved
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use tunedmode_core::{GameKey, LivenessMonitor, ProfileName, Registration, RegistrationView};

use super::commands::{RegistryCommand, RegistryError, RegistryEvent, RegistryStatus, RemovalReason};
use crate::tuned::ProfileController;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all registration state.
///
/// # Ownership
///
/// The actor owns:
/// - `active`: registrations in insertion order
/// - `saved_profile`: profile to restore, `Some` exactly while engaged
///
/// # Serialization
///
/// The actor runs in a single task and awaits each command, including calls
/// into tuned, before dequeuing the next. Exactly one command can therefore
/// observe the `Idle → Engaged` or `Engaged → Idle` edge, which gives one
/// capture and one restore per episode.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Active registrations, oldest first.
    active: Vec<Registration>,

    /// Profile observed just before the current episode began.
    saved_profile: Option<ProfileName>,

    /// Profile applied while any registration is active.
    performance_profile: ProfileName,

    profiles: Arc<dyn ProfileController>,
    liveness: Arc<dyn LivenessMonitor>,

    /// Event publisher for the D-Bus signal forwarder
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor in the `Idle` state.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
        performance_profile: ProfileName,
        profiles: Arc<dyn ProfileController>,
        liveness: Arc<dyn LivenessMonitor>,
    ) -> Self {
        Self {
            receiver,
            active: Vec::new(),
            saved_profile: None,
            performance_profile,
            profiles,
            liveness,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until `Shutdown` arrives or every `RegistryHandle`
    /// is dropped (the reconcile task only holds a weak sender). Either way
    /// the saved profile is restored if an episode is still open.
    pub async fn run(mut self) {
        info!(
            performance_profile = %self.performance_profile,
            "Registry actor starting"
        );

        while let Some(cmd) = self.receiver.recv().await {
            if self.handle_command(cmd).await.is_break() {
                break;
            }
        }

        // No-op if Shutdown already released everything.
        self.release_all(RemovalReason::Shutdown).await;

        info!("Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    async fn handle_command(&mut self, cmd: RegistryCommand) -> ControlFlow<()> {
        match cmd {
            RegistryCommand::Register { key, respond_to } => {
                let result = self.handle_register(key).await;
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Unregister { key, respond_to } => {
                let result = self.handle_unregister(key).await;
                let _ = respond_to.send(result);
            }
            RegistryCommand::Reconcile { respond_to } => {
                let removed = self.reconcile().await;
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(removed);
                }
            }
            RegistryCommand::GetStatus { respond_to } => {
                let _ = respond_to.send(self.handle_get_status());
            }
            RegistryCommand::Shutdown { respond_to } => {
                self.release_all(RemovalReason::Shutdown).await;
                let _ = respond_to.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    async fn handle_register(&mut self, key: GameKey) -> Result<(), RegistryError> {
        self.reconcile().await;

        for pid in [key.requester, key.game] {
            if !self.liveness.is_alive(pid) {
                warn!(key = %key, pid = %pid, "Rejecting registration: process not running");
                return Err(RegistryError::InvalidClient(pid));
            }
        }

        let requester_started = self.liveness.start_time(key.requester);

        if let Some(existing) = self.active.iter_mut().find(|r| r.key == key) {
            existing.refresh(requester_started);
            debug!(key = %key, "Game already registered, refreshed");
            return Ok(());
        }

        if self.active.is_empty() {
            self.begin_episode(Registration::new(key, requester_started))
                .await?;
        } else {
            self.active.push(Registration::new(key, requester_started));
        }

        info!(
            requester = %key.requester,
            game = %key.game,
            total_registrations = self.active.len(),
            "Game registered"
        );

        // Publish event (ignore if no subscribers)
        let _ = self.event_publisher.send(RegistryEvent::Registered { key });

        Ok(())
    }

    async fn handle_unregister(&mut self, key: GameKey) -> Result<(), RegistryError> {
        self.reconcile().await;

        let Some(position) = self.active.iter().position(|r| r.key == key) else {
            debug!(key = %key, "Unregister for unknown pair, nothing to do");
            return Ok(());
        };

        self.active.remove(position);

        info!(
            requester = %key.requester,
            game = %key.game,
            total_registrations = self.active.len(),
            "Game unregistered"
        );

        let _ = self.event_publisher.send(RegistryEvent::Unregistered {
            key,
            reason: RemovalReason::Explicit,
        });

        if self.active.is_empty() {
            self.end_episode().await?;
        }

        Ok(())
    }

    fn handle_get_status(&self) -> RegistryStatus {
        RegistryStatus {
            engaged: !self.active.is_empty(),
            performance_profile: self.performance_profile.clone(),
            saved_profile: self.saved_profile.clone(),
            registrations: self.active.iter().map(RegistrationView::from_domain).collect(),
        }
    }

    /// Removes registrations whose requester is gone; never fails.
    ///
    /// Returns the number of registrations removed.
    async fn reconcile(&mut self) -> usize {
        if self.active.is_empty() {
            return 0;
        }

        let (dead, alive): (Vec<Registration>, Vec<Registration>) =
            std::mem::take(&mut self.active).into_iter().partition(|r| {
                !self
                    .liveness
                    .is_same_process(r.key.requester, r.requester_started)
            });
        self.active = alive;

        if dead.is_empty() {
            debug!("No dead-requester registrations to clean up");
            return 0;
        }

        for registration in &dead {
            // Use warn! so it shows up without RUST_LOG=debug
            warn!(
                requester = %registration.key.requester,
                game = %registration.key.game,
                reason = %RemovalReason::ProcessDied,
                "Registration removed by reconcile"
            );
            let _ = self.event_publisher.send(RegistryEvent::Unregistered {
                key: registration.key,
                reason: RemovalReason::ProcessDied,
            });
        }

        if self.active.is_empty() {
            if let Err(e) = self.end_episode().await {
                warn!(error = %e, "Failed to restore profile after reconcile");
            }
        }

        dead.len()
    }

    /// Drops every registration and closes the episode, best effort.
    async fn release_all(&mut self, reason: RemovalReason) {
        for registration in std::mem::take(&mut self.active) {
            let _ = self.event_publisher.send(RegistryEvent::Unregistered {
                key: registration.key,
                reason,
            });
        }

        if let Err(e) = self.end_episode().await {
            warn!(error = %e, reason = %reason, "Failed to restore profile, giving up");
        }
    }

    // ========================================================================
    // Profile Transitions
    // ========================================================================

    /// `Idle → Engaged`: capture the current profile, insert `first`, apply
    /// the performance profile.
    ///
    /// On any failure the registry is left exactly as it was (Idle).
    async fn begin_episode(&mut self, first: Registration) -> Result<(), RegistryError> {
        let previous = self.profiles.current().await.map_err(|e| {
            warn!(error = %e, "Cannot read current profile, not starting episode");
            e
        })?;

        // One switch per episode start, even if already active.
        if let Err(e) = self.profiles.set(&self.performance_profile).await {
            warn!(
                error = %e,
                profile = %self.performance_profile,
                "Failed to apply performance profile, registration rolled back"
            );
            return Err(e.into());
        }

        info!(
            saved_profile = %previous,
            performance_profile = %self.performance_profile,
            "Performance episode started"
        );

        self.saved_profile = Some(previous);
        self.active.push(first);
        Ok(())
    }

    /// `Engaged → Idle`: restore the saved profile and forget it.
    ///
    /// The saved profile is cleared even when the restore fails, so the next
    /// episode captures afresh instead of replaying a stale value.
    async fn end_episode(&mut self) -> Result<(), RegistryError> {
        let Some(saved) = self.saved_profile.take() else {
            return Ok(());
        };

        self.profiles.set(&saved).await?;

        info!(restored_profile = %saved, "Performance episode ended");
        Ok(())
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of registrations currently active.
    #[cfg(test)]
    pub fn registration_count(&self) -> usize {
        self.active.len()
    }

    /// Returns the profile that would be restored.
    #[cfg(test)]
    pub fn saved_profile(&self) -> Option<&ProfileName> {
        self.saved_profile.as_ref()
    }
}
