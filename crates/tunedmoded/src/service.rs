//! GameMode D-Bus facade.
//!
//! Serves `com.feralinteractive.GameMode` on the session bus so games and
//! launchers built against libgamemode talk to us. Each method call is
//! translated into a registry command; registry errors become D-Bus errors.
//!
//! # Caller identity
//!
//! The requester PID is never taken from the message body on trust:
//! - `RegisterGame`-style calls use the caller's PID as reported by the bus
//!   daemon.
//! - `*ByPID` calls name the requester explicitly; the caller must be that
//!   process, run as the same user, or be root.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::fdo::{self, DBusProxy};
use zbus::message::Header;
use zbus::names::BusName;
use zbus::object_server::{InterfaceRef, SignalEmitter};
use zbus::{connection, interface, Connection};

use tunedmode_core::{GameKey, LivenessMonitor, Pid};
use tunedmode_protocol::{GameStatus, GAMEMODE_BUS_NAME, GAMEMODE_PATH};

use crate::registry::{RegistryError, RegistryEvent, RegistryHandle, RegistryStatus};

/// Reply value for a successful mutation, as libgamemode expects.
const SUCCESS: i32 = 0;

// ============================================================================
// Interface
// ============================================================================

/// The object served at `/com/feralinteractive/GameMode`.
pub struct GameModeService {
    registry: RegistryHandle,
    processes: Arc<dyn LivenessMonitor>,
}

impl GameModeService {
    pub fn new(registry: RegistryHandle, processes: Arc<dyn LivenessMonitor>) -> Self {
        Self {
            registry,
            processes,
        }
    }

    /// Validates an explicit (requester, game) pair against the caller.
    async fn authorize(
        &self,
        requester: i32,
        game: i32,
        header: &Header<'_>,
        connection: &Connection,
    ) -> fdo::Result<GameKey> {
        let key = GameKey::new(wire_pid(requester)?, wire_pid(game)?);
        let caller = Caller::lookup(header, connection).await?;

        if !may_act_for(&caller, key.requester, self.processes.owner(key.requester)) {
            warn!(
                caller = %caller.pid,
                caller_uid = caller.uid,
                requester = %key.requester,
                "Rejecting request on behalf of another user's process"
            );
            return Err(fdo::Error::AccessDenied(format!(
                "process {} may not act for process {}",
                caller.pid, key.requester
            )));
        }

        Ok(key)
    }

    async fn query(&self, key: GameKey) -> fdo::Result<i32> {
        let status = self.registry.status().await.map_err(to_fdo_error)?;
        let answer = GameStatus::project(status.engaged, status.contains(key));
        debug!(key = %key, status = %answer, "QueryStatus");
        Ok(answer.code())
    }
}

/// Method names and `i` replies match libgamemode.
///
/// `ListGames` and the `GameRegistered`/`GameUnregistered` signals differ
/// from gamemoded, which uses `ao` and `(i, o)` with per-game objects.
/// Here there are no per-game objects: `ListGames` is `a(ii)` of
/// `(game, requester)` and both signals carry `(i game, i requester)`.
#[interface(name = "com.feralinteractive.GameMode")]
impl GameModeService {
    async fn register_game(
        &self,
        game: i32,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<i32> {
        let requester = Caller::lookup(&header, connection).await?.pid;
        let key = GameKey::new(requester, wire_pid(game)?);
        debug!(key = %key, "RegisterGame");
        self.registry.register(key).await.map_err(to_fdo_error)?;
        Ok(SUCCESS)
    }

    async fn unregister_game(
        &self,
        game: i32,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<i32> {
        let requester = Caller::lookup(&header, connection).await?.pid;
        let key = GameKey::new(requester, wire_pid(game)?);
        debug!(key = %key, "UnregisterGame");
        self.registry.unregister(key).await.map_err(to_fdo_error)?;
        Ok(SUCCESS)
    }

    async fn query_status(
        &self,
        game: i32,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<i32> {
        let requester = Caller::lookup(&header, connection).await?.pid;
        self.query(GameKey::new(requester, wire_pid(game)?)).await
    }

    #[zbus(name = "RegisterGameByPID")]
    async fn register_game_by_pid(
        &self,
        requester: i32,
        game: i32,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<i32> {
        let key = self.authorize(requester, game, &header, connection).await?;
        debug!(key = %key, "RegisterGameByPID");
        self.registry.register(key).await.map_err(to_fdo_error)?;
        Ok(SUCCESS)
    }

    #[zbus(name = "UnregisterGameByPID")]
    async fn unregister_game_by_pid(
        &self,
        requester: i32,
        game: i32,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<i32> {
        let key = self.authorize(requester, game, &header, connection).await?;
        debug!(key = %key, "UnregisterGameByPID");
        self.registry.unregister(key).await.map_err(to_fdo_error)?;
        Ok(SUCCESS)
    }

    #[zbus(name = "QueryStatusByPID")]
    async fn query_status_by_pid(
        &self,
        requester: i32,
        game: i32,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<i32> {
        let key = self.authorize(requester, game, &header, connection).await?;
        self.query(key).await
    }

    /// `(game, requester)` pairs in registration order.
    async fn list_games(&self) -> fdo::Result<Vec<(i32, i32)>> {
        let status = self.registry.status().await.map_err(to_fdo_error)?;
        Ok(list_entries(&status))
    }

    #[zbus(property)]
    async fn client_count(&self) -> fdo::Result<i32> {
        let status = self.registry.status().await.map_err(to_fdo_error)?;
        Ok(i32::try_from(status.client_count()).unwrap_or(i32::MAX))
    }

    #[zbus(signal)]
    async fn game_registered(
        emitter: &SignalEmitter<'_>,
        game: i32,
        requester: i32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn game_unregistered(
        emitter: &SignalEmitter<'_>,
        game: i32,
        requester: i32,
    ) -> zbus::Result<()>;
}

// ============================================================================
// Serving
// ============================================================================

/// Claims the GameMode name on the session bus and serves the interface.
///
/// Also spawns the task that turns registry events into D-Bus signals. The
/// returned connection must be kept alive for as long as the service should
/// be reachable.
pub async fn serve(
    registry: RegistryHandle,
    processes: Arc<dyn LivenessMonitor>,
) -> zbus::Result<Connection> {
    let events = registry.subscribe();
    let service = GameModeService::new(registry, processes);

    let connection = connection::Builder::session()?
        .name(GAMEMODE_BUS_NAME)?
        .serve_at(GAMEMODE_PATH, service)?
        .build()
        .await?;

    info!(name = GAMEMODE_BUS_NAME, path = GAMEMODE_PATH, "GameMode service published");

    spawn_signal_forwarder(connection.clone(), events);

    Ok(connection)
}

/// Forwards registry events as `GameRegistered`/`GameUnregistered` signals
/// and `ClientCount` change notifications.
fn spawn_signal_forwarder(
    connection: Connection,
    mut events: broadcast::Receiver<RegistryEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let iface = match connection
            .object_server()
            .interface::<_, GameModeService>(GAMEMODE_PATH)
            .await
        {
            Ok(iface) => iface,
            Err(e) => {
                warn!(error = %e, "GameMode interface not found, signals disabled");
                return;
            }
        };

        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = emit(&iface, event).await {
                        warn!(error = %e, "Failed to emit GameMode signal");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Signal forwarder lagged, some signals were dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Signal forwarder stopping: registry event channel closed");
                    break;
                }
            }
        }
    })
}

async fn emit(iface: &InterfaceRef<GameModeService>, event: RegistryEvent) -> zbus::Result<()> {
    let emitter = iface.signal_emitter();
    match event {
        RegistryEvent::Registered { key } => {
            GameModeService::game_registered(emitter, key.game.to_wire(), key.requester.to_wire())
                .await?;
        }
        RegistryEvent::Unregistered { key, .. } => {
            GameModeService::game_unregistered(
                emitter,
                key.game.to_wire(),
                key.requester.to_wire(),
            )
            .await?;
        }
    }
    iface.get().await.client_count_changed(emitter).await
}

// ============================================================================
// Caller Validation
// ============================================================================

/// Identity of the peer that sent a method call, as vouched for by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Caller {
    pid: Pid,
    uid: u32,
}

impl Caller {
    async fn lookup(header: &Header<'_>, connection: &Connection) -> fdo::Result<Self> {
        let sender = header
            .sender()
            .ok_or_else(|| fdo::Error::Failed("method call has no sender".to_string()))?;
        let dbus = DBusProxy::new(connection).await?;
        let pid = dbus
            .get_connection_unix_process_id(BusName::from(sender.to_owned()))
            .await?;
        let uid = dbus
            .get_connection_unix_user(BusName::from(sender.to_owned()))
            .await?;
        Ok(Self {
            pid: Pid::new(pid),
            uid,
        })
    }
}

/// Returns `true` if `caller` may register or query on behalf of `requester`.
fn may_act_for(caller: &Caller, requester: Pid, requester_uid: Option<u32>) -> bool {
    caller.pid == requester || caller.uid == 0 || requester_uid == Some(caller.uid)
}

/// `ListGames` reply body: `(game, requester)` in registration order.
fn list_entries(status: &RegistryStatus) -> Vec<(i32, i32)> {
    status
        .registrations
        .iter()
        .map(|r| (r.game.to_wire(), r.requester.to_wire()))
        .collect()
}

fn wire_pid(raw: i32) -> fdo::Result<Pid> {
    Pid::from_wire(raw).map_err(|e| fdo::Error::InvalidArgs(e.to_string()))
}

/// Maps a registry failure onto the D-Bus error returned to the caller.
pub fn to_fdo_error(err: RegistryError) -> fdo::Error {
    match err {
        RegistryError::InvalidClient(_) => fdo::Error::InvalidArgs(err.to_string()),
        RegistryError::ProfileService(_) | RegistryError::ChannelClosed => {
            fdo::Error::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tunedmode_core::{ProfileName, Registration, RegistrationView};

    use crate::tuned::ProfileError;

    fn caller(pid: u32, uid: u32) -> Caller {
        Caller {
            pid: Pid::new(pid),
            uid,
        }
    }

    #[test]
    fn test_caller_may_act_for_itself() {
        assert!(may_act_for(&caller(100, 1000), Pid::new(100), None));
    }

    #[test]
    fn test_same_user_may_act_for_requester() {
        assert!(may_act_for(&caller(100, 1000), Pid::new(200), Some(1000)));
    }

    #[test]
    fn test_root_may_act_for_anyone() {
        assert!(may_act_for(&caller(1, 0), Pid::new(200), Some(1000)));
        assert!(may_act_for(&caller(1, 0), Pid::new(200), None));
    }

    #[test]
    fn test_other_user_is_denied() {
        assert!(!may_act_for(&caller(100, 1000), Pid::new(200), Some(1001)));
        assert!(!may_act_for(&caller(100, 1000), Pid::new(200), None));
    }

    #[test]
    fn test_wire_pid_rejects_non_positive() {
        assert!(matches!(wire_pid(0), Err(fdo::Error::InvalidArgs(_))));
        assert!(matches!(wire_pid(-1), Err(fdo::Error::InvalidArgs(_))));
        assert_eq!(wire_pid(31337).unwrap(), Pid::new(31337));
    }

    #[test]
    fn test_list_entries_are_game_then_requester() {
        let first = GameKey::new(Pid::new(300), Pid::new(301));
        let second = GameKey::own(Pid::new(100));
        let status = RegistryStatus {
            engaged: true,
            performance_profile: ProfileName::new("latency-performance"),
            saved_profile: Some(ProfileName::new("balanced")),
            registrations: [first, second]
                .iter()
                .map(|key| RegistrationView::from_domain(&Registration::new(*key, None)))
                .collect(),
        };

        assert_eq!(list_entries(&status), vec![(301, 300), (100, 100)]);
    }

    #[test]
    fn test_error_mapping() {
        let err = to_fdo_error(RegistryError::InvalidClient(Pid::new(9)));
        assert!(
            matches!(err, fdo::Error::InvalidArgs(ref msg) if msg == "invalid client: process 9 is not running")
        );

        let err = to_fdo_error(RegistryError::ProfileService(ProfileError::Timeout {
            call: "switch_profile",
            after: Duration::from_secs(10),
        }));
        assert!(matches!(err, fdo::Error::Failed(_)));

        let err = to_fdo_error(RegistryError::ChannelClosed);
        assert!(matches!(err, fdo::Error::Failed(ref msg) if msg == "response channel closed"));
    }
}
