//! Profile controller - the daemon's only path to the tuning service.
//!
//! [`ProfileController`] is the seam the registry is written against;
//! [`TunedController`] implements it over tuned's system-bus interface.
//!
//! Every call is bounded by a timeout so a wedged tuned cannot hold the
//! registry actor. Calls are never retried: tuned is authoritative and
//! profile switches are rare.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use zbus::Connection;

use tunedmode_core::ProfileName;
use tunedmode_protocol::TunedProxy;

/// Default bound on a single call to tuned.
pub const DEFAULT_PROFILE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Errors
// ============================================================================

/// Errors from the tuning service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileError {
    /// tuned did not answer within the configured bound.
    #[error("{call} timed out after {after:?}")]
    Timeout {
        /// Name of the tuned method that was called
        call: &'static str,
        /// The bound that expired
        after: Duration,
    },

    /// tuned answered but refused to switch.
    #[error("tuned refused to switch to '{profile}': {message}")]
    Rejected {
        profile: ProfileName,
        message: String,
    },

    /// Transport-level failure talking to tuned.
    #[error("tuned bus error: {0}")]
    Bus(String),
}

impl ProfileError {
    pub fn bus<E: std::fmt::Display>(err: E) -> Self {
        Self::Bus(err.to_string())
    }
}

// ============================================================================
// Controller Trait
// ============================================================================

/// Command interface to the tuning service.
#[async_trait]
pub trait ProfileController: Send + Sync {
    /// Returns the currently active profile.
    async fn current(&self) -> Result<ProfileName, ProfileError>;

    /// Switches to `profile`.
    async fn set(&self, profile: &ProfileName) -> Result<(), ProfileError>;
}

// ============================================================================
// tuned Implementation
// ============================================================================

/// [`ProfileController`] talking to `com.redhat.tuned` on the system bus.
pub struct TunedController {
    proxy: TunedProxy<'static>,
    timeout: Duration,
}

impl TunedController {
    /// Connects to the system bus and binds to tuned.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Bus` if the system bus is unreachable.
    pub async fn connect(timeout: Duration) -> Result<Self, ProfileError> {
        let connection = Connection::system().await.map_err(ProfileError::bus)?;
        Self::with_connection(&connection, timeout).await
    }

    /// Binds to tuned over an existing connection.
    pub async fn with_connection(
        connection: &Connection,
        timeout: Duration,
    ) -> Result<Self, ProfileError> {
        let proxy = TunedProxy::new(connection)
            .await
            .map_err(ProfileError::bus)?;
        Ok(Self { proxy, timeout })
    }

    /// Lists the profiles tuned has installed.
    pub async fn available(&self) -> Result<Vec<ProfileName>, ProfileError> {
        let names = bounded("profiles", self.timeout, self.proxy.profiles()).await?;
        Ok(names.into_iter().map(ProfileName::new).collect())
    }
}

#[async_trait]
impl ProfileController for TunedController {
    async fn current(&self) -> Result<ProfileName, ProfileError> {
        let name = bounded("active_profile", self.timeout, self.proxy.active_profile()).await?;
        debug!(profile = %name, "tuned reports active profile");
        Ok(ProfileName::new(name))
    }

    async fn set(&self, profile: &ProfileName) -> Result<(), ProfileError> {
        let reply = bounded(
            "switch_profile",
            self.timeout,
            self.proxy.switch_profile(profile.as_str()),
        )
        .await?;
        switch_outcome(profile, reply)
    }
}

/// Applies the timeout bound to one tuned call.
async fn bounded<T, F>(call: &'static str, after: Duration, fut: F) -> Result<T, ProfileError>
where
    F: Future<Output = zbus::Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ProfileError::bus(e)),
        Err(_) => {
            warn!(call, timeout = ?after, "tuned call timed out");
            Err(ProfileError::Timeout { call, after })
        }
    }
}

/// Interprets tuned's `(success, message)` reply to `switch_profile`.
fn switch_outcome(profile: &ProfileName, reply: (bool, String)) -> Result<(), ProfileError> {
    match reply {
        (true, _) => Ok(()),
        (false, message) => Err(ProfileError::Rejected {
            profile: profile.clone(),
            message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_error_display() {
        let err = ProfileError::Timeout {
            call: "switch_profile",
            after: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "switch_profile timed out after 3s");

        let err = ProfileError::Rejected {
            profile: ProfileName::new("turbo"),
            message: "Requested profile 'turbo' doesn't exist.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "tuned refused to switch to 'turbo': Requested profile 'turbo' doesn't exist."
        );

        assert_eq!(
            ProfileError::bus("connection reset").to_string(),
            "tuned bus error: connection reset"
        );
    }

    #[test]
    fn test_switch_outcome() {
        let profile = ProfileName::new("latency-performance");
        assert_eq!(switch_outcome(&profile, (true, "OK".to_string())), Ok(()));

        let err = switch_outcome(&profile, (false, "nope".to_string())).unwrap_err();
        assert!(matches!(err, ProfileError::Rejected { ref message, .. } if message == "nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let never = std::future::pending::<zbus::Result<String>>();
        let result = bounded("active_profile", Duration::from_secs(5), never).await;

        assert_eq!(
            result,
            Err(ProfileError::Timeout {
                call: "active_profile",
                after: Duration::from_secs(5),
            })
        );
    }

    #[tokio::test]
    async fn test_bounded_maps_bus_errors() {
        let failing = async { Err::<String, _>(zbus::Error::Failure("gone".to_string())) };
        let result = bounded("active_profile", Duration::from_secs(5), failing).await;

        assert!(matches!(result, Err(ProfileError::Bus(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_values_through() {
        let ok = async { Ok::<_, zbus::Error>("balanced".to_string()) };
        let result = bounded("active_profile", Duration::from_secs(5), ok).await;

        assert_eq!(result, Ok("balanced".to_string()));
    }
}
