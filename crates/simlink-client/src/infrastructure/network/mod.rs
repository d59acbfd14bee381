//! TCP connection to the simulation: connect, receive, send, reconnect.
//!
//! Architecture:
//! - [`ConnectionManager`] owns one supervisor task.  The task resolves the
//!   configured address, connects under a timeout, and backs off
//!   exponentially while the simulation is unreachable.
//! - Once connected, a *session* splits the socket.  The read half feeds the
//!   [`ReceiveState`] machine and decoded commands are pushed onto the
//!   [`InboundQueue`].  The write half belongs to a writer future that drains
//!   frames queued by [`CommandSender::send`].  One `tokio::select!` loop
//!   polls both, so a write waiting on a full socket never pauses reading.
//!   Exactly one receive loop exists per socket.
//! - Any I/O error, EOF, or framing error ends the session.  The supervisor
//!   then reconnects; a partially received frame is lost with the socket.
//! - An unknown command id or a payload that fails to decode is logged and
//!   dropped.  The frame was consumed in full, so the stream stays aligned.
//!
//! # Connection state (for beginners)
//!
//! The current [`ConnectionState`] is published through a
//! `tokio::sync::watch` channel.  A watch channel only stores the latest
//! value, which is exactly what a status indicator needs: a UI can call
//! [`ConnectionManager::state`] on every frame, or `await` changes through
//! [`ConnectionManager::subscribe_state`].

mod backoff;

pub use backoff::RetryPolicy;

use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use simlink_core::protocol::{
    encode_frame, Command, CommandFactory, CommandId, FrameHeader, Progress, ProtocolError,
    RawFrame, ReceiveState, SequenceCounter,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::application::dispatch::InboundQueue;
use crate::infrastructure::config::ClientSettings;

/// Errors that end a connect attempt or an established session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The configured host name could not be resolved.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Resolution succeeded but produced no addresses.
    #[error("no socket address found for {0}")]
    NoAddress(String),

    /// The TCP handshake did not finish within the connect timeout.
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    /// TCP connection to the simulation failed.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// The byte stream violated the framing rules.
    #[error("framing error: {0}")]
    Framing(#[from] ProtocolError),
}

/// Errors returned to callers of [`CommandSender::send`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// No session is live; the command was not queued.
    #[error("not connected to the simulation")]
    NotConnected,

    /// The session ended between the check and the enqueue.
    #[error("outbound channel closed")]
    ChannelClosed,

    /// The command cannot be framed (payload too large for the header).
    #[error("failed to frame command: {0}")]
    Encode(#[source] ProtocolError),
}

/// Externally visible connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started yet, or the supervisor has exited.
    Disconnected,
    /// A connect attempt or backoff wait is in progress.
    Connecting,
    /// A session is live and frames are flowing.
    Connected,
    /// [`ConnectionManager::shutdown`] was called.  Terminal.
    ShuttingDown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ShuttingDown => "shutting down",
        };
        f.write_str(s)
    }
}

/// Work item for the session writer.
#[derive(Debug)]
enum Outbound {
    Frame { id: CommandId, payload: Vec<u8> },
    Heartbeat,
}

/// State shared between the manager, its senders and the supervisor task.
struct Shared {
    running: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
    /// `Some` exactly while a session is live.
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    connect_attempts: AtomicU64,
    sessions_established: AtomicU64,
}

impl Shared {
    fn outbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Outbound>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `next` unless shutdown already made the state terminal.
    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == ConnectionState::ShuttingDown || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn enqueue(&self, item: Outbound) -> Result<(), SendError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(SendError::NotConnected);
        }
        let guard = self.outbound();
        let Some(tx) = guard.as_ref() else {
            debug!("not connected, command not sent");
            return Err(SendError::NotConnected);
        };
        tx.send(item).map_err(|_| SendError::ChannelClosed)
    }

    fn send<C: Command>(&self, command: &C) -> Result<(), SendError> {
        let id = command.command_id();
        let payload = command.to_payload();
        FrameHeader::for_payload(0, id, payload.len()).map_err(SendError::Encode)?;
        self.enqueue(Outbound::Frame { id, payload })
    }
}

/// Cloneable handle for queuing outbound commands.
pub struct CommandSender<C> {
    shared: Arc<Shared>,
    _command: PhantomData<fn(&C)>,
}

impl<C: Command> CommandSender<C> {
    /// Encodes `command` and queues it for the live session.
    ///
    /// # Errors
    ///
    /// [`SendError::NotConnected`] when no session is live.  Commands are
    /// never buffered across a reconnect.
    pub fn send(&self, command: &C) -> Result<(), SendError> {
        self.shared.send(command)
    }

    /// Queues a zero-length heartbeat frame.
    pub fn send_heartbeat(&self) -> Result<(), SendError> {
        self.shared.enqueue(Outbound::Heartbeat)
    }
}

impl<C> Clone for CommandSender<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _command: PhantomData,
        }
    }
}

impl<C> fmt::Debug for CommandSender<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSender")
            .field("connected", &self.shared.outbound().is_some())
            .finish()
    }
}

/// Owns the connection to the simulation.
///
/// Construct once, wrap in an `Arc`, call [`start`](Self::start).  Hand out
/// [`sender`](Self::sender) clones to code that sends commands.
pub struct ConnectionManager<C> {
    settings: ClientSettings,
    factory: Arc<CommandFactory<C>>,
    inbound: Arc<InboundQueue<C>>,
    shared: Arc<Shared>,
    started: AtomicBool,
}

impl<C: Command> ConnectionManager<C> {
    pub fn new(
        settings: ClientSettings,
        factory: Arc<CommandFactory<C>>,
        inbound: Arc<InboundQueue<C>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            settings,
            factory,
            inbound,
            shared: Arc::new(Shared {
                running: AtomicBool::new(true),
                state_tx,
                outbound: Mutex::new(None),
                connect_attempts: AtomicU64::new(0),
                sessions_established: AtomicU64::new(0),
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Settings the manager was built with.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Spawns the supervisor task that connects, receives and reconnects
    /// until [`shutdown`](Self::shutdown).
    ///
    /// Only the first call spawns a supervisor; later calls log a warning and
    /// return a handle to an already finished task.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("connection manager already started");
            return tokio::spawn(async {});
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.supervise().await })
    }

    /// Stops the supervisor and the live session.  Idempotent.
    ///
    /// The state becomes [`ConnectionState::ShuttingDown`] immediately; the
    /// task exits at its next await point without further connect attempts.
    pub fn shutdown(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            info!("connection manager shutting down");
        }
        self.shared.outbound().take();
        self.shared.state_tx.send_replace(ConnectionState::ShuttingDown);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Number of TCP connect attempts made so far, successful or not.
    pub fn connect_attempts(&self) -> u64 {
        self.shared.connect_attempts.load(Ordering::Relaxed)
    }

    /// Number of sessions that reached [`ConnectionState::Connected`].
    pub fn sessions_established(&self) -> u64 {
        self.shared.sessions_established.load(Ordering::Relaxed)
    }

    pub fn sender(&self) -> CommandSender<C> {
        CommandSender {
            shared: Arc::clone(&self.shared),
            _command: PhantomData,
        }
    }

    /// See [`CommandSender::send`].
    pub fn send(&self, command: &C) -> Result<(), SendError> {
        self.shared.send(command)
    }

    /// See [`CommandSender::send_heartbeat`].
    pub fn send_heartbeat(&self) -> Result<(), SendError> {
        self.shared.enqueue(Outbound::Heartbeat)
    }

    // ── Supervisor ────────────────────────────────────────────────────────────

    async fn supervise(self: Arc<Self>) {
        let mut state_rx = self.subscribe_state();
        let mut retry = RetryPolicy::new(self.settings.retry_backoff, self.settings.max_retry_backoff);

        while self.is_running() {
            self.shared.set_state(ConnectionState::Connecting);

            let attempt = tokio::select! {
                result = self.connect() => result,
                _ = wait_for_shutdown(&mut state_rx) => break,
            };

            match attempt {
                Ok((stream, peer)) => {
                    retry.reset();
                    let span = info_span!("connection", session = %Uuid::new_v4(), %peer);
                    let session = async {
                        info!("connected to simulation");
                        match self.run_session(stream, &mut state_rx).await {
                            Ok(()) => debug!("session closed for shutdown"),
                            Err(e) => warn!(error = %e, "disconnected, reconnecting"),
                        }
                    };
                    session.instrument(span).await;
                }
                Err(e) => {
                    let delay = retry.next_delay();
                    warn!(
                        addr = %self.settings.address(),
                        error = %e,
                        retry_in = ?delay,
                        "not connected to simulation"
                    );
                    tokio::select! {
                        _ = time::sleep(delay) => {}
                        _ = wait_for_shutdown(&mut state_rx) => break,
                    }
                }
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        debug!("connection supervisor stopped");
    }

    async fn connect(&self) -> Result<(TcpStream, SocketAddr), ConnectionError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::Relaxed);

        let addr = self.settings.address();
        let peer = tokio::net::lookup_host(addr.as_str())
            .await
            .map_err(|source| ConnectionError::Resolve {
                addr: addr.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| ConnectionError::NoAddress(addr.clone()))?;

        let timeout = self.settings.connect_timeout;
        let stream = time::timeout(timeout, TcpStream::connect(peer))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout { addr: peer, timeout })?
            .map_err(|source| ConnectionError::ConnectFailed { addr: peer, source })?;
        stream.set_nodelay(true)?;
        Ok((stream, peer))
    }

    // ── Session ───────────────────────────────────────────────────────────────

    /// Drives one established connection until it fails or shutdown.
    ///
    /// Returns `Ok(())` only for shutdown.
    async fn run_session<S>(
        &self,
        stream: S,
        state_rx: &mut watch::Receiver<ConnectionState>,
    ) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let mut receive = ReceiveState::with_max_payload(self.settings.max_payload_bytes);

        // A fresh channel per session: anything queued for a dead session
        // went down with its receiver.
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.outbound() = Some(tx);
        if !self.is_running() {
            self.shared.outbound().take();
            return Ok(());
        }
        self.shared.sessions_established.fetch_add(1, Ordering::Relaxed);
        self.shared.set_state(ConnectionState::Connected);

        let writer = write_outbound(writer, rx);
        tokio::pin!(writer);

        let result = loop {
            tokio::select! {
                read = reader.read(receive.unfilled_mut()) => {
                    let n = match read {
                        Ok(0) => break Err(ConnectionError::Closed),
                        Ok(n) => n,
                        Err(e) => break Err(e.into()),
                    };
                    if let Err(e) = receive.advance(n).and_then(|p| self.on_progress(p)) {
                        break Err(e.into());
                    }
                }
                // Only a write error or the channel closing on shutdown
                // finishes the writer.
                written = &mut writer => break written.map_err(ConnectionError::from),
                _ = wait_for_shutdown(state_rx) => break Ok(()),
            }
        };

        self.shared.outbound().take();
        if result.is_err() {
            self.shared.set_state(ConnectionState::Connecting);
        }
        result
    }

    fn on_progress(&self, progress: Progress) -> Result<(), ProtocolError> {
        match progress {
            Progress::NeedMore => Ok(()),
            Progress::Heartbeat(header) => {
                trace!(sequence = header.sequence, "heartbeat");
                Ok(())
            }
            Progress::Frame(frame) => self.on_frame(frame),
        }
    }

    /// Decodes one frame onto the inbound queue.  Errors that leave the
    /// stream aligned are logged and the frame is dropped; any other error
    /// ends the session.
    fn on_frame(&self, frame: RawFrame) -> Result<(), ProtocolError> {
        let RawFrame { header, payload } = frame;
        match self.factory.decode(header.command_id, &payload) {
            Ok(command) => {
                trace!(
                    command_id = %header.command_id,
                    sequence = header.sequence,
                    len = payload.len(),
                    "command received"
                );
                self.inbound.push(command);
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    command_id = %header.command_id,
                    len = payload.len(),
                    error = %e,
                    "frame dropped"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl<C> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("addr", &self.settings.address())
            .field("state", &*self.shared.state_tx.borrow())
            .finish()
    }
}

/// Resolves once the state is [`ConnectionState::ShuttingDown`].
async fn wait_for_shutdown(state_rx: &mut watch::Receiver<ConnectionState>) {
    // The sender lives as long as the manager, so an error cannot happen
    // while a session or the supervisor is running.
    let _ = state_rx
        .wait_for(|s| *s == ConnectionState::ShuttingDown)
        .await;
}

/// Writes queued frames in order until the session's channel closes.
///
/// Sequence numbers start at 0 for every session.
async fn write_outbound<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let sequence = SequenceCounter::new();
    while let Some(item) = rx.recv().await {
        if let Some(frame) = frame_outbound(item, &sequence) {
            writer.write_all(&frame).await?;
        }
    }
    Ok(())
}

/// Mints the sequence number and builds the bytes of one outbound frame.
fn frame_outbound(item: Outbound, sequence: &SequenceCounter) -> Option<Vec<u8>> {
    match item {
        Outbound::Heartbeat => Some(FrameHeader::heartbeat(sequence.next()).encode().to_vec()),
        Outbound::Frame { id, payload } => {
            match FrameHeader::for_payload(sequence.next(), id, payload.len()) {
                Ok(header) => Some(encode_frame(&header, &payload)),
                Err(e) => {
                    warn!(command_id = %id, error = %e, "outbound command dropped");
                    None
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
