//! Public RCON client.
//!
//! ```ignore
//! use rcon_core::{RconClient, RconConfig};
//!
//! let client = RconClient::connect(&RconConfig::new("127.0.0.1:27015", "secret")).await?;
//! client.on_disconnect(|reason| eprintln!("lost server: {reason}"));
//! let status = client.send_command("status").await?;
//! client.dispose();
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{self, AuthSlot};
use crate::config::RconConfig;
use crate::dispatch::{Dispatcher, PendingCommand};
use crate::error::{RconError, Result};
use crate::frame::{Frame, FrameKind};
use crate::network::{CloseReason, Connection, FrameHandler};
use crate::notify::{DisconnectNotifier, DisconnectReason};
use crate::parser::{self, Parseable, ResponseParser};
use crate::state::ConnectionState;
use crate::watchdog::Watchdog;

// ── Session ──────────────────────────────────────────────────────

/// Everything one connection owns. Shared between the client handle,
/// the receive loop and the watchdog.
pub(crate) struct Session {
    connection: Connection,
    dispatcher: Dispatcher,
    auth: AuthSlot,
    state: Mutex<ConnectionState>,
    notifier: DisconnectNotifier,
    shutdown: CancellationToken,
}

impl Session {
    fn new(connection: Connection, state: ConnectionState) -> Self {
        Self {
            connection,
            dispatcher: Dispatcher::new(),
            auth: AuthSlot::new(),
            state: Mutex::new(state),
            notifier: DisconnectNotifier::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    pub(crate) fn endpoint(&self) -> SocketAddr {
        self.connection.peer_addr()
    }

    /// Cancelled when the session is torn down.
    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn transition(
        &self,
        step: impl FnOnce(&mut ConnectionState) -> Result<()>,
    ) -> Result<()> {
        step(&mut *self.lock_state())
    }

    pub(crate) async fn issue(&self, command: &str) -> Result<PendingCommand> {
        if !self.state().is_ready() {
            return Err(RconError::NotConnected);
        }
        self.dispatcher.issue(&self.connection, command).await
    }

    /// Close everything down. Runs its side effects once; later calls
    /// are no-ops.
    ///
    /// `reason` is `Some` for unsolicited loss. The disconnect
    /// notification only fires if the session had reached `Ready`.
    pub(crate) fn teardown(&self, reason: Option<DisconnectReason>) {
        let previous = {
            let mut state = self.lock_state();
            let previous = *state;
            if !state.close() {
                return;
            }
            previous
        };

        self.shutdown.cancel();
        self.connection.close();
        self.auth.clear();
        let failed = self.dispatcher.fail_all();

        let endpoint = self.endpoint();
        match reason {
            Some(reason) if previous.is_ready() => {
                warn!(%endpoint, %reason, failed, "rcon connection lost");
                self.notifier.fire(reason);
            }
            _ => info!(%endpoint, %previous, failed, "rcon session closed"),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receive-loop adapter. Holds the session weakly so an abandoned
/// connect (or a dropped client) frees it.
struct SessionHandler(Weak<Session>);

impl FrameHandler for SessionHandler {
    fn on_frame(&self, frame: Frame) {
        let Some(session) = self.0.upgrade() else {
            return;
        };
        match frame.kind() {
            FrameKind::AuthResponse => {
                if !session.auth.resolve(frame.id()) {
                    debug!(id = frame.id(), "ignoring unsolicited auth response");
                }
            }
            FrameKind::ResponseValue => {
                session.dispatcher.dispatch(frame);
            }
            kind => debug!(%kind, "ignoring client-only frame kind"),
        }
    }

    fn on_closed(&self, reason: CloseReason) {
        let Some(session) = self.0.upgrade() else {
            return;
        };
        let reason = match reason {
            CloseReason::Eof => DisconnectReason::RemoteClosed,
            CloseReason::Error(e) => DisconnectReason::Transport(e.to_string()),
            CloseReason::Closed => DisconnectReason::Transport("connection closed".into()),
        };
        session.teardown(Some(reason));
    }
}

// ── RconClient ───────────────────────────────────────────────────

/// An authenticated RCON session.
///
/// Obtained from [`RconClient::connect`]; there is no way back from
/// `Closed`, so reconnecting means connecting a new client. Dropping the
/// client disposes it.
pub struct RconClient {
    session: Arc<Session>,
    watchdog: JoinHandle<()>,
}

impl RconClient {
    /// Connect, authenticate and start the watchdog.
    ///
    /// The whole sequence is bounded by the configured connect timeout.
    /// On any failure nothing is left open.
    pub async fn connect(config: &RconConfig) -> Result<Self> {
        let timeout = config.connect_timeout();
        match tokio::time::timeout(timeout, Self::establish(config)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(address = %config.address, ?timeout, "rcon connect timed out");
                Err(RconError::Timeout(timeout))
            }
        }
    }

    async fn establish(config: &RconConfig) -> Result<Self> {
        let mut state = ConnectionState::default();
        state.begin_connect()?;

        let connection = Connection::connect(&config.address, config.connect_timeout()).await?;
        state.begin_auth()?;
        let session = Arc::new(Session::new(connection, state));

        session
            .connection
            .start_receive_loop(Arc::new(SessionHandler(Arc::downgrade(&session))))?;

        if let Err(e) = auth::authenticate(&session.connection, &session.auth, &config.password).await
        {
            session.teardown(None);
            return Err(e);
        }
        // Fails only if the receive loop tore the session down meanwhile.
        session
            .transition(ConnectionState::complete_auth)
            .map_err(|_| RconError::ConnectionClosed)?;

        info!(endpoint = %session.endpoint(), "rcon session ready");
        let watchdog = Watchdog::new(config).spawn(Arc::downgrade(&session));
        Ok(Self { session, watchdog })
    }

    /// Run a console command and return its raw response body.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        self.issue(command).await?.response().await
    }

    /// Run a command and parse the response with the parser registered
    /// for `T`.
    pub async fn send_command_as<T: Parseable>(&self, command: &str) -> Result<T> {
        self.send_command_with(command, &T::Parser::default()).await
    }

    /// Run a command and parse the response with `parser`.
    ///
    /// Parser errors go to the caller only; the connection is unaffected.
    pub async fn send_command_with<P: ResponseParser>(
        &self,
        command: &str,
        parser: &P,
    ) -> Result<P::Output> {
        let body = self.send_command(command).await?;
        parser::parse_with(parser, body)
    }

    /// Send a command without waiting for its response.
    pub async fn issue(&self, command: &str) -> Result<PendingCommand> {
        self.session.issue(command).await
    }

    /// Register a callback for unsolicited connection loss.
    ///
    /// Fires at most once per client. If the connection is already lost
    /// the callback runs immediately. Not fired by [`RconClient::dispose`].
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: FnOnce(DisconnectReason) + Send + 'static,
    {
        self.session.notifier.register(callback);
    }

    /// Resolves when the connection is lost. Never resolves after a
    /// plain `dispose`.
    pub async fn disconnected(&self) -> DisconnectReason {
        self.session.notifier.wait().await
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.session.endpoint()
    }

    /// Commands sent but not yet answered.
    pub fn pending_count(&self) -> usize {
        self.session.dispatcher.pending_count()
    }

    /// Close the connection. Outstanding commands fail with
    /// `ConnectionClosed`. Idempotent.
    pub fn dispose(&self) {
        self.session.teardown(None);
    }
}

impl Drop for RconClient {
    fn drop(&mut self) {
        self.dispose();
        self.watchdog.abort();
    }
}

impl std::fmt::Debug for RconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconClient")
            .field("endpoint", &self.endpoint())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    use super::*;
    use crate::codec::RconCodec;

    /// Accepts one client, approves its password, and echoes every
    /// command back until the client goes away.
    async fn echo_server() -> (RconConfig, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = RconConfig::new(listener.local_addr().unwrap().to_string(), "pw")
            .with_probe_interval(Duration::from_millis(20));

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Framed::new(stream, RconCodec::server());
            let auth = conn.next().await.unwrap().unwrap();
            conn.send(Frame::auth_response(auth.id())).await.unwrap();
            while let Some(Ok(frame)) = conn.next().await {
                let reply = Frame::response_value(frame.id(), frame.body()).unwrap();
                if conn.send(reply).await.is_err() {
                    break;
                }
            }
        });
        (config, server)
    }

    #[tokio::test]
    async fn dispose_ends_watchdog_task() {
        let (config, server) = echo_server().await;
        let client = RconClient::connect(&config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!client.watchdog.is_finished());

        client.dispose();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !client.watchdog.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("watchdog kept running after dispose");

        assert!(!client.session.notifier.has_fired());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn drop_releases_session() {
        let (config, server) = echo_server().await;
        let client = RconClient::connect(&config).await.unwrap();
        let session = Arc::downgrade(&client.session);

        drop(client);
        server.await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while session.upgrade().is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session outlived its client");
    }
}
