//! Client proxies for the two D-Bus interfaces.

use zbus::proxy;

/// Client side of the GameMode interface served by `tunedmoded`.
///
/// Used by `tunedmoded status` to inspect a running daemon, and by anything
/// else that wants to talk GameMode without linking libgamemode.
#[proxy(
    interface = "com.feralinteractive.GameMode",
    default_service = "com.feralinteractive.GameMode",
    default_path = "/com/feralinteractive/GameMode"
)]
pub trait GameMode {
    /// RegisterGame method
    fn register_game(&self, game: i32) -> zbus::Result<i32>;

    /// UnregisterGame method
    fn unregister_game(&self, game: i32) -> zbus::Result<i32>;

    /// QueryStatus method
    fn query_status(&self, game: i32) -> zbus::Result<i32>;

    /// RegisterGameByPID method
    #[zbus(name = "RegisterGameByPID")]
    fn register_game_by_pid(&self, requester: i32, game: i32) -> zbus::Result<i32>;

    /// UnregisterGameByPID method
    #[zbus(name = "UnregisterGameByPID")]
    fn unregister_game_by_pid(&self, requester: i32, game: i32) -> zbus::Result<i32>;

    /// QueryStatusByPID method
    #[zbus(name = "QueryStatusByPID")]
    fn query_status_by_pid(&self, requester: i32, game: i32) -> zbus::Result<i32>;

    /// ListGames method, `(game, requester)` pairs in registration order
    fn list_games(&self) -> zbus::Result<Vec<(i32, i32)>>;

    /// ClientCount property
    #[zbus(property)]
    fn client_count(&self) -> zbus::Result<i32>;

    /// GameRegistered signal
    #[zbus(signal)]
    fn game_registered(&self, game: i32, requester: i32) -> zbus::Result<()>;

    /// GameUnregistered signal
    #[zbus(signal)]
    fn game_unregistered(&self, game: i32, requester: i32) -> zbus::Result<()>;
}

/// tuned's control interface (system bus).
///
/// tuned exports snake_case member names, so each method is renamed
/// explicitly.
#[proxy(
    interface = "com.redhat.tuned.control",
    default_service = "com.redhat.tuned",
    default_path = "/Tuned"
)]
pub trait Tuned {
    /// Name of the currently active profile.
    #[zbus(name = "active_profile")]
    fn active_profile(&self) -> zbus::Result<String>;

    /// Switches profile; returns `(success, message)`.
    #[zbus(name = "switch_profile")]
    fn switch_profile(&self, profile: &str) -> zbus::Result<(bool, String)>;

    /// Names of all installed profiles.
    #[zbus(name = "profiles")]
    fn profiles(&self) -> zbus::Result<Vec<String>>;
}
