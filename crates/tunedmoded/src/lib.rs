//! tunedmode Daemon - GameMode front, tuned back
//!
//! This crate provides the core infrastructure for the tunedmode daemon:
//! - `registry` - Registration actor that owns state and drives profile switches
//! - `service` - The `com.feralinteractive.GameMode` D-Bus facade
//! - `tuned` - Profile controller for the tuned daemon
//! - `config` - Configuration file and overrides
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      tunedmoded                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ GameModeService │────▶│     RegistryActor           │   │
//! │  │ (session bus)   │     │  (registrations owner)      │   │
//! │  └────────▲────────┘     └──────┬───────────────┬──────┘   │
//! │           │ signals             │ switch        │ liveness │
//! │           │                     ▼               ▼          │
//! │  ┌────────┴────────┐     ┌──────────────┐ ┌────────────┐   │
//! │  │ signal forwarder│     │TunedController│ │   /proc    │   │
//! │  │ (RegistryEvent) │     │ (system bus) │ │            │   │
//! │  └─────────────────┘     └──────────────┘ └────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod service;
pub mod tuned;
