//! Well-known bus name and object path of the served GameMode interface.

/// Bus name claimed on the session bus, the one GameMode clients look up.
pub const GAMEMODE_BUS_NAME: &str = "com.feralinteractive.GameMode";

/// Object path the GameMode interface is served at.
pub const GAMEMODE_PATH: &str = "/com/feralinteractive/GameMode";
