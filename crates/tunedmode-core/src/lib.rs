//! tunedmode Core - Shared types for the GameMode/tuned bridge
//!
//! This crate provides the domain types shared between the daemon
//! (tunedmoded) and its command-line client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod process;
pub mod profile;
pub mod registration;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use process::{LivenessMonitor, Pid, ProcfsMonitor};
pub use profile::ProfileName;
pub use registration::{GameKey, Registration, RegistrationView};
