//! Game registrations tracked by the daemon.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::process::Pid;

// ============================================================================
// Registration Key
// ============================================================================

/// Identifies one registration: the client that asked, and the game it
/// asked for.
///
/// A client registering itself uses its own PID for both fields. Launchers
/// and portals register on behalf of another process, so the two differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameKey {
    pub requester: Pid,
    pub game: Pid,
}

impl GameKey {
    pub fn new(requester: Pid, game: Pid) -> Self {
        Self { requester, game }
    }

    /// Key for a process registering itself.
    pub fn own(pid: Pid) -> Self {
        Self::new(pid, pid)
    }
}

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.requester, self.game)
    }
}

// ============================================================================
// Domain Entity
// ============================================================================

/// A currently active performance request.
#[derive(Debug, Clone)]
pub struct Registration {
    pub key: GameKey,

    /// Start time of the requester process when it registered.
    ///
    /// `None` if it could not be read; liveness then falls back to a
    /// plain existence check.
    pub requester_started: Option<u64>,

    pub registered_at: DateTime<Utc>,

    /// Last time the requester registered this pair (re-registering is a
    /// refresh, not a duplicate).
    pub last_seen: DateTime<Utc>,
}

impl Registration {
    pub fn new(key: GameKey, requester_started: Option<u64>) -> Self {
        let now = Utc::now();
        Self {
            key,
            requester_started,
            registered_at: now,
            last_seen: now,
        }
    }

    /// Records a repeated registration of the same pair.
    pub fn refresh(&mut self, requester_started: Option<u64>) {
        self.last_seen = Utc::now();
        if requester_started.is_some() {
            self.requester_started = requester_started;
        }
    }
}

// ============================================================================
// Application Layer DTO
// ============================================================================

/// Read-only view of a registration for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationView {
    pub requester: Pid,
    pub game: Pid,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl RegistrationView {
    pub fn from_domain(registration: &Registration) -> Self {
        Self {
            requester: registration.key.requester,
            game: registration.key.game,
            registered_at: registration.registered_at,
            last_seen: registration.last_seen,
        }
    }

    pub fn key(&self) -> GameKey {
        GameKey::new(self.requester, self.game)
    }
}
