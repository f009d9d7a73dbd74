//! tunedmode Protocol - D-Bus surfaces the daemon sits between
//!
//! This crate describes both sides of the bridge:
//! - the GameMode interface the daemon serves to games and launchers
//! - the tuned control interface the daemon drives
//!
//! Client proxies are generated with `zbus` so the daemon's `status`
//! command and the tuned controller share one definition of each interface.

pub mod names;
pub mod proxy;
pub mod status;

pub use names::{GAMEMODE_BUS_NAME, GAMEMODE_PATH};
pub use proxy::{GameModeProxy, TunedProxy};
pub use status::GameStatus;
