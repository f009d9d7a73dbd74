//! Process identifiers and liveness checks.
//!
//! The registry never talks to `/proc` directly. It goes through the
//! [`LivenessMonitor`] trait so tests can script process deaths and PID
//! reuse without spawning real processes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Pid
// ============================================================================

/// Operating-system process identifier.
///
/// D-Bus carries PIDs as signed 32-bit integers; [`Pid::from_wire`] rejects
/// anything that cannot name a real process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Creates a PID from a raw value.
    pub const fn new(pid: u32) -> Self {
        Self(pid)
    }

    /// Converts a PID received over the bus.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidPid` for zero or negative values.
    pub fn from_wire(pid: i32) -> DomainResult<Self> {
        u32::try_from(pid)
            .ok()
            .filter(|p| *p != 0)
            .map(Self)
            .ok_or(DomainError::InvalidPid(i64::from(pid)))
    }

    /// Returns the PID in the bus representation.
    ///
    /// Values above `i32::MAX` cannot come from the kernel; they saturate.
    pub fn to_wire(self) -> i32 {
        i32::try_from(self.0).unwrap_or(i32::MAX)
    }

    /// Returns the raw value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Self(pid)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Liveness Monitor
// ============================================================================

/// Answers "is this process still running?" against the process table.
///
/// Implementations must never fail: a lookup error means the process is
/// treated as gone, so reconciliation always makes progress.
pub trait LivenessMonitor: Send + Sync {
    /// Returns the start time of `pid` (clock ticks since boot), or `None`
    /// if no such process is running.
    ///
    /// The start time is stable for the lifetime of a process and is used to
    /// detect a PID that was recycled by an unrelated process.
    fn start_time(&self, pid: Pid) -> Option<u64>;

    /// Returns the UID owning `pid`, or `None` if it cannot be determined.
    fn owner(&self, pid: Pid) -> Option<u32>;

    /// Returns `true` if `pid` maps to a running process.
    fn is_alive(&self, pid: Pid) -> bool {
        self.start_time(pid).is_some()
    }

    /// Returns `true` if `pid` is running and is the same process that was
    /// observed with `expected_start` earlier.
    ///
    /// With no recorded start time only existence is checked.
    fn is_same_process(&self, pid: Pid, expected_start: Option<u64>) -> bool {
        match (self.start_time(pid), expected_start) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(current), Some(expected)) => {
                if current != expected {
                    debug!(
                        pid = %pid,
                        expected_start = expected,
                        current_start = current,
                        "start time mismatch, PID reused"
                    );
                }
                current == expected
            }
        }
    }
}

/// [`LivenessMonitor`] backed by `/proc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsMonitor;

impl ProcfsMonitor {
    pub fn new() -> Self {
        Self
    }

    fn process(pid: Pid) -> Option<procfs::process::Process> {
        let raw = i32::try_from(pid.as_u32()).ok()?;
        procfs::process::Process::new(raw).ok()
    }
}

impl LivenessMonitor for ProcfsMonitor {
    fn start_time(&self, pid: Pid) -> Option<u64> {
        let stat = Self::process(pid)?.stat().ok()?;
        // Zombies still have a /proc entry but will never call back in.
        if stat.state == 'Z' {
            debug!(pid = %pid, "process is a zombie, treating as dead");
            return None;
        }
        Some(stat.starttime)
    }

    fn owner(&self, pid: Pid) -> Option<u32> {
        Self::process(pid)?.uid().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_from_wire_accepts_positive() {
        assert_eq!(Pid::from_wire(1000), Ok(Pid::new(1000)));
        assert_eq!(Pid::from_wire(1).map(Pid::as_u32), Ok(1));
    }

    #[test]
    fn test_pid_from_wire_rejects_zero_and_negative() {
        assert_eq!(Pid::from_wire(0), Err(DomainError::InvalidPid(0)));
        assert_eq!(Pid::from_wire(-42), Err(DomainError::InvalidPid(-42)));
    }

    #[test]
    fn test_pid_to_wire_saturates() {
        assert_eq!(Pid::new(4321).to_wire(), 4321);
        assert_eq!(Pid::new(u32::MAX).to_wire(), i32::MAX);
    }

    #[test]
    fn test_procfs_monitor_sees_current_process() {
        let monitor = ProcfsMonitor::new();
        let me = Pid::new(std::process::id());

        assert!(monitor.is_alive(me));
        let started = monitor.start_time(me);
        assert!(started.is_some());
        assert!(monitor.is_same_process(me, started));
        assert!(monitor.owner(me).is_some());
    }

    #[test]
    fn test_procfs_monitor_detects_reused_pid() {
        let monitor = ProcfsMonitor::new();
        let me = Pid::new(std::process::id());
        let started = monitor.start_time(me).unwrap_or_default();

        assert!(!monitor.is_same_process(me, Some(started.wrapping_add(1))));
    }

    #[test]
    fn test_procfs_monitor_missing_process_is_dead() {
        let monitor = ProcfsMonitor::new();
        // Above the kernel's pid_max ceiling (2^22), so never allocated.
        let ghost = Pid::new(4_194_305);

        assert!(!monitor.is_alive(ghost));
        assert!(!monitor.is_same_process(ghost, None));
        assert_eq!(monitor.owner(ghost), None);
    }
}
