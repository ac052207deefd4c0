//! Manager session lifecycle.
//!
//! Lifecycle:
//! 1. Resolve the login secret (explicit password or manager.conf)
//! 2. Connect, read the `Asterisk Call Manager/x.y` banner
//! 3. `Action: Login`, wait for the matching response
//! 4. Spawn the connection task: every `Event` frame is pushed, in order,
//!    into a bounded channel returned to the caller
//! 5. `stop()` sends `Action: Logoff` and closes the transport
//!
//! Losing the connection any other way is a forced disconnect, reported
//! through [`ManagerSession::disconnected`]. The session never reconnects.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, interval_at, timeout};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use astcc_core::ManagerEvent;

use crate::codec::{ManagerAction, ManagerCodec, ManagerFrame, ManagerMessage};
use crate::credentials::{DEFAULT_MANAGER_CONF, resolve_secret};
use crate::error::SessionError;

/// Default AMI TCP port.
pub const DEFAULT_PORT: u16 = 5038;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
const LOGOFF_TIMEOUT: Duration = Duration::from_secs(2);
const EVENT_BUFFER: usize = 256;

/// Receiving end of the session's event sink.
pub type EventStream = mpsc::Receiver<ManagerEvent>;

type Transport = Framed<TcpStream, ManagerCodec>;

/// Connection parameters for [`ManagerSession::start`].
#[derive(Clone)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// `None` → look the secret up in `manager_conf` (loopback hosts only).
    pub password: Option<String>,
    pub manager_conf: PathBuf,
    /// Interval for `Action: Ping`; `None` disables keep-alive.
    pub keepalive: Option<Duration>,
    /// Optional `Events:` mask sent with the login.
    pub events: Option<String>,
}

impl SessionOptions {
    /// `host:port`, bracketing bare IPv6 literals.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: None,
            manager_conf: PathBuf::from(DEFAULT_MANAGER_CONF),
            keepalive: None,
            events: None,
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("manager_conf", &self.manager_conf)
            .field("keepalive", &self.keepalive)
            .field("events", &self.events)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `stop()` was called.
    Requested,
    /// The transport went away on its own.
    Forced(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Disconnected(DisconnectReason),
}

/// Handle to one authenticated manager connection.
pub struct ManagerSession {
    addr: String,
    username: String,
    state: watch::Receiver<SessionState>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ManagerSession {
    /// Connect, authenticate and start pushing events.
    pub async fn start(options: &SessionOptions) -> Result<(Self, EventStream), SessionError> {
        let secret = resolve_secret(
            &options.host,
            &options.username,
            options.password.as_deref(),
            &options.manager_conf,
        )?;

        let addr = options.addr();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(SessionError::Connection { addr, source }),
            Err(_) => {
                return Err(SessionError::Connection {
                    addr,
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "connect timed out",
                    ),
                });
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("set_nodelay failed: {e}");
        }

        let mut transport = Framed::new(stream, ManagerCodec::new());
        let mut ids = ActionIds::default();

        match timeout(
            LOGIN_TIMEOUT,
            login(&mut transport, options, &secret, &mut ids),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(SessionError::Timeout("login response")),
        }

        tracing::info!("logged in to manager at {addr} as {}", options.username);
        state_tx.send_replace(SessionState::Authenticated);

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let shutdown = CancellationToken::new();
        let keepalive = options
            .keepalive
            .filter(|d| !d.is_zero())
            .map(|period| interval_at(Instant::now() + period, period));

        let connection = Connection {
            transport,
            events: events_tx,
            state: state_tx,
            shutdown: shutdown.clone(),
            keepalive,
            ids,
        };
        let task = tokio::spawn(connection.run());

        Ok((
            Self {
                addr,
                username: options.username.clone(),
                state: state_rx,
                shutdown,
                task: Some(task),
            },
            events_rx,
        ))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Resolves once the session is disconnected, with the reason.
    pub async fn disconnected(&mut self) -> DisconnectReason {
        let reason = match self
            .state
            .wait_for(|s| matches!(s, SessionState::Disconnected(_)))
            .await
        {
            Ok(state) => match &*state {
                SessionState::Disconnected(reason) => Some(reason.clone()),
                _ => None,
            },
            Err(_) => None,
        };
        reason.unwrap_or_else(|| DisconnectReason::Forced("session task ended".to_owned()))
    }

    /// Log off and close the transport. Safe to call more than once.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.shutdown.cancel();
        if let Err(e) = task.await {
            tracing::warn!("manager session task failed: {e}");
        }
        tracing::info!("disconnected from manager at {}", self.addr);
    }
}

impl Drop for ManagerSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Default)]
struct ActionIds {
    last: u64,
}

impl ActionIds {
    fn next(&mut self) -> String {
        self.last += 1;
        format!("astcc-{}", self.last)
    }
}

async fn login(
    transport: &mut Transport,
    options: &SessionOptions,
    secret: &str,
    ids: &mut ActionIds,
) -> Result<(), SessionError> {
    match transport.next().await {
        Some(Ok(ManagerFrame::Banner(banner))) => {
            if banner.starts_with("Asterisk Call Manager") {
                tracing::debug!("manager banner: {banner}");
            } else {
                tracing::warn!("unexpected manager banner: {banner:?}");
            }
        }
        Some(Ok(ManagerFrame::Message(_))) => {
            return Err(SessionError::Protocol(
                "expected banner, got a message".to_owned(),
            ));
        }
        Some(Err(e)) => return Err(e.into()),
        None => {
            return Err(SessionError::Protocol(
                "connection closed before banner".to_owned(),
            ));
        }
    }

    let id = ids.next();
    transport
        .send(ManagerAction::login(
            &options.username,
            secret,
            options.events.as_deref(),
            &id,
        ))
        .await?;

    loop {
        let msg = match transport.next().await {
            Some(Ok(ManagerFrame::Message(msg))) => msg,
            Some(Ok(ManagerFrame::Banner(_))) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(SessionError::Protocol(
                    "connection closed during login".to_owned(),
                ));
            }
        };

        let is_reply = match msg.action_id() {
            Some(action_id) => action_id == id,
            None => msg.response().is_some(),
        };
        if !is_reply {
            tracing::trace!("ignoring message before login completed");
            continue;
        }

        return match msg.response() {
            Some(r) if r.eq_ignore_ascii_case("Success") => Ok(()),
            _ => Err(SessionError::Auth {
                username: options.username.clone(),
                message: msg
                    .message()
                    .unwrap_or("authentication failed")
                    .to_owned(),
            }),
        };
    }
}

/// Owns the transport after login.
struct Connection {
    transport: Transport,
    events: mpsc::Sender<ManagerEvent>,
    state: watch::Sender<SessionState>,
    shutdown: CancellationToken,
    keepalive: Option<Interval>,
    ids: ActionIds,
}

impl Connection {
    async fn run(mut self) {
        let reason = loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    self.logoff().await;
                    break DisconnectReason::Requested;
                }
                () = tick(&mut self.keepalive) => {
                    let id = self.ids.next();
                    if let Err(e) = self.transport.send(ManagerAction::ping(&id)).await {
                        break DisconnectReason::Forced(format!("keep-alive failed: {e}"));
                    }
                    tracing::trace!("sent keep-alive {id}");
                }
                frame = self.transport.next() => match frame {
                    Some(Ok(ManagerFrame::Message(msg))) => self.route(msg).await,
                    Some(Ok(ManagerFrame::Banner(line))) => {
                        tracing::trace!("ignoring banner after login: {line}");
                    }
                    Some(Err(e)) => break DisconnectReason::Forced(e.to_string()),
                    None => break DisconnectReason::Forced("connection closed by manager".to_owned()),
                },
            }
        };

        self.state.send_replace(SessionState::Disconnected(reason));
    }

    async fn route(&mut self, msg: ManagerMessage) {
        match msg.into_event() {
            Ok(event) => {
                tracing::trace!(event = ?event.name(), "manager event");
                // The queue may be full behind a slow hardware action; stop()
                // must still get through.
                tokio::select! {
                    sent = self.events.send(event) => {
                        if sent.is_err() {
                            tracing::trace!("event receiver dropped, discarding event");
                        }
                    }
                    () = self.shutdown.cancelled() => {
                        tracing::debug!("shutdown requested while event queue full, event dropped");
                    }
                }
            }
            Err(msg) => {
                tracing::trace!(
                    response = ?msg.response(),
                    action_id = ?msg.action_id(),
                    "manager response"
                );
            }
        }
    }

    async fn logoff(&mut self) {
        let id = self.ids.next();
        if let Err(e) = self.transport.send(ManagerAction::logoff(&id)).await {
            tracing::debug!("logoff not sent: {e}");
            return;
        }

        let transport = &mut self.transport;
        let goodbye = async {
            while let Some(frame) = transport.next().await {
                match frame {
                    Ok(ManagerFrame::Message(msg))
                        if msg
                            .response()
                            .is_some_and(|r| r.eq_ignore_ascii_case("Goodbye")) =>
                    {
                        return;
                    }
                    Ok(_) => continue,
                    Err(_) => return,
                }
            }
        };
        if timeout(LOGOFF_TIMEOUT, goodbye).await.is_err() {
            tracing::debug!("no logoff acknowledgement from manager");
        }
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
