//! Historian connection manager.
//!
//! A [`Historian`] owns one background thread that dials the historian's Unix
//! socket, reads newline-delimited JSON messages and dispatches them:
//! events go to the registered [`EventHandler`], responses go to the caller
//! blocked in [`Historian::send_command`]. When the connection drops for any
//! reason the thread tears it down and dials again until shut down.
//!
//! The write handle and the response slot share one mutex. It is held only
//! for the immediate write/flush of a command and for bookkeeping, never
//! across the blocking line read. Writes time out after the response
//! deadline, and the handle that severs the connection sits behind its own
//! lock, so a peer that stops reading cannot wedge shutdown.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{EventHandler, UiEvent};
use crate::historian::framing::{format_command, LineReader};
use crate::jsondom::{self, Node};

/// Path of the flag that reports whether the historian itself is connected
/// to the game.
const READY_FLAG_PATH: [&str; 3] = ["status", "connection", "connected_to_beatsaber"];

/// Connection lifecycle as seen by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistorianState {
    #[default]
    Unconnected,
    /// Socket is open but the historian has not reported game readiness.
    ConnectedWaiting,
    /// The historian reported that it is connected to the game.
    ConnectedReady,
}

impl HistorianState {
    pub fn is_connected(self) -> bool {
        !matches!(self, HistorianState::Unconnected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HistorianState::Unconnected => "unconnected",
            HistorianState::ConnectedWaiting => "connected-waiting",
            HistorianState::ConnectedReady => "connected-ready",
        }
    }
}

impl fmt::Display for HistorianState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing policy for dialing and commands.
#[derive(Debug, Clone)]
pub struct HistorianConfig {
    /// Pause after failing to set up socket descriptors.
    pub socket_backoff: Duration,
    /// Pause after a refused or failed connect.
    pub connect_backoff: Duration,
    /// How long `send_command` waits for the response.
    pub response_timeout: Duration,
    /// Attempts made by `send_command_retry`.
    pub retry_attempts: u32,
    /// Pause between those attempts.
    pub retry_pause: Duration,
}

impl Default for HistorianConfig {
    fn default() -> Self {
        Self {
            socket_backoff: Duration::from_secs(1),
            connect_backoff: Duration::from_secs(3),
            response_timeout: Duration::from_secs(2),
            retry_attempts: 3,
            retry_pause: Duration::from_secs(1),
        }
    }
}

/// Errors returned by the command API.
#[derive(Debug, Error)]
pub enum HistorianError {
    /// No live connection (never connected, reconnecting or shut down).
    #[error("Not connected to historian")]
    NotConnected,

    /// Another command is still waiting for its response.
    #[error("Another historian command is awaiting its response")]
    Busy,

    #[error("Historian did not respond within {0:?}")]
    Timeout(Duration),

    /// Parameters are not a valid one-line JSON fragment.
    #[error("Command parameters must form a single-line JSON object")]
    InvalidCommand,

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("Failed to start historian connection thread: {0}")]
    Spawn(#[source] io::Error),
}

impl HistorianError {
    /// Whether retrying the same command later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HistorianError::NotConnected
                | HistorianError::Busy
                | HistorianError::Timeout(_)
                | HistorianError::Io(_)
        )
    }
}

/// Routing class of an inbound message, taken from its `msgtype` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Unsolicited status or event push.
    Event,
    /// Reply to the command in flight (`"response"` or `"error"`).
    Response,
}

impl MessageKind {
    /// `None` when the discriminator is missing or not a string.
    pub fn of(doc: &Node) -> Option<Self> {
        match doc.get_str("msgtype")? {
            "response" | "error" => Some(MessageKind::Response),
            _ => Some(MessageKind::Event),
        }
    }
}

/// Resolve the default socket path of the historian.
///
/// Resolution order:
/// 1. `$XDG_RUNTIME_DIR/historian.sock` (Linux standard)
/// 2. `<cache dir>/historian.sock`
/// 3. `/tmp/historian.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("historian.sock");
    }

    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("historian.sock");
    }

    PathBuf::from("/tmp/historian.sock")
}

/// Fire-and-forget commands remembered as possible sources of an `error`
/// reply. Successful ones are never answered, so the list is bounded.
const MAX_UNSETTLED_COMMANDS: usize = 16;

/// The command currently waiting for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    /// Unique per `send_command` call, never reused.
    ticket: u64,
    /// Position of the command among the lines written on this connection.
    written_at: u64,
}

#[derive(Default)]
struct Connection {
    writer: Option<BufWriter<UnixStream>>,
    pending: Option<Pending>,
    response: Option<(u64, Node)>,
    next_ticket: u64,
    /// Lines written on the current connection.
    written: u64,
    /// Write positions of fire-and-forget commands the historian may still
    /// reject with an `error` reply.
    unsettled: VecDeque<u64>,
}

impl Connection {
    /// Write one command line. A failed write leaves a partial line on the
    /// wire, so the connection is severed and the reader recycles it.
    /// Returns the write position of the line.
    fn write_line(&mut self, line: &str) -> Result<u64, HistorianError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(HistorianError::NotConnected);
        };
        let result = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.flush());
        if let Err(e) = result {
            let _ = writer.get_ref().shutdown(Shutdown::Both);
            return Err(HistorianError::Io(e));
        }
        self.written += 1;
        Ok(self.written)
    }

    fn remember_unsettled(&mut self, written_at: u64) {
        if self.unsettled.len() == MAX_UNSETTLED_COMMANDS {
            self.unsettled.pop_front();
        }
        self.unsettled.push_back(written_at);
    }

    fn take_response(&mut self, ticket: u64) -> Option<Node> {
        match self.response.take() {
            Some((owner, doc)) if owner == ticket => {
                self.pending = None;
                Some(doc)
            }
            other => {
                self.response = other;
                None
            }
        }
    }

    fn is_waiting(&self, ticket: u64) -> bool {
        self.pending.map(|p| p.ticket) == Some(ticket)
    }

    fn reset(&mut self) {
        self.writer = None;
        self.pending = None;
        self.response = None;
        self.written = 0;
        self.unsettled.clear();
    }
}

struct Shared {
    socket_path: PathBuf,
    config: HistorianConfig,
    running: AtomicBool,
    state: Mutex<HistorianState>,
    conn: Mutex<Connection>,
    /// Handle that severs the live connection. Never held across I/O, and
    /// the lock under which `running` is cleared.
    control: Mutex<Option<UnixStream>>,
    /// Signalled when a response is delivered or the connection goes away.
    response_cond: Condvar,
    /// Signalled on shutdown to cut backoff sleeps short.
    wake: Condvar,
    handler: Box<dyn EventHandler>,
}

impl Shared {
    fn new(socket_path: PathBuf, config: HistorianConfig, handler: Box<dyn EventHandler>) -> Self {
        Self {
            socket_path,
            config,
            running: AtomicBool::new(true),
            state: Mutex::new(HistorianState::Unconnected),
            conn: Mutex::new(Connection::default()),
            control: Mutex::new(None),
            response_cond: Condvar::new(),
            wake: Condvar::new(),
            handler,
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown is requested first.
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut control = self.control.lock();
        while self.is_running() {
            if self.wake.wait_until(&mut control, deadline).timed_out() {
                break;
            }
        }
    }

    /// Notify the handler if the state actually changes. The stored state is
    /// updated first so a handler querying it sees the new value.
    fn change_state(&self, new: HistorianState) {
        let old = {
            let mut state = self.state.lock();
            if *state == new {
                return;
            }
            std::mem::replace(&mut *state, new)
        };
        info!("Historian state {} -> {}", old, new);
        self.handler.on_event(UiEvent::HistorianStateChange { old, new });
    }

    /// Open the socket. Returns (control, reader, writer) handles on one
    /// connection, or the backoff to apply before the next attempt.
    fn dial(&self) -> Result<(UnixStream, UnixStream, UnixStream), (Duration, io::Error)> {
        let stream = UnixStream::connect(&self.socket_path)
            .map_err(|e| (self.config.connect_backoff, e))?;
        let reader = stream
            .try_clone()
            .map_err(|e| (self.config.socket_backoff, e))?;
        let writer = stream
            .try_clone()
            .map_err(|e| (self.config.socket_backoff, e))?;
        // A peer that stops reading fails the write instead of blocking it.
        writer
            .set_write_timeout(Some(self.config.response_timeout))
            .map_err(|e| (self.config.socket_backoff, e))?;
        Ok((stream, reader, writer))
    }

    /// Publish a fresh connection. Fails if shutdown raced the dial.
    fn install(&self, control: UnixStream, writer: UnixStream) -> bool {
        {
            let mut slot = self.control.lock();
            if !self.is_running() {
                let _ = control.shutdown(Shutdown::Both);
                return false;
            }
            *slot = Some(control);
        }
        let mut conn = self.conn.lock();
        conn.reset();
        conn.writer = Some(BufWriter::new(writer));
        true
    }

    fn teardown(&self) {
        if let Some(control) = self.control.lock().take() {
            let _ = control.shutdown(Shutdown::Both);
        }
        let mut conn = self.conn.lock();
        if let Some(pending) = conn.pending {
            debug!(
                "Connection lost while command {} awaited its response",
                pending.ticket
            );
        }
        conn.reset();
        drop(conn);
        self.response_cond.notify_all();
    }

    /// Read and dispatch messages until the connection ends.
    fn serve(&self, reader: UnixStream) {
        let mut lines = LineReader::new(BufReader::new(reader));
        while self.is_running() {
            let line = match lines.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Historian closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("Received improper line from historian, severing connection: {}", e);
                    break;
                }
            };

            let doc = match jsondom::parse(&line) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Failed to parse historian message, severing connection: {}", e);
                    break;
                }
            };

            self.dispatch(doc);
        }
    }

    fn dispatch(&self, doc: Node) {
        match MessageKind::of(&doc) {
            Some(MessageKind::Event) => {
                if let Some(ready) = doc.lookup(&READY_FLAG_PATH).and_then(Node::as_bool) {
                    self.change_state(if ready {
                        HistorianState::ConnectedReady
                    } else {
                        HistorianState::ConnectedWaiting
                    });
                }
                self.handler.on_event(UiEvent::HistorianMessage(doc));
            }
            Some(MessageKind::Response) => self.deliver_response(doc),
            None => warn!("Discarding historian message without msgtype: {}", doc),
        }
    }

    /// Hand a response to the command waiting for it.
    ///
    /// Responses carry no command id. Any reply goes to the command in the
    /// slot; a caller that timed out has already cleared the slot, so its
    /// late reply finds nobody waiting. An `error` reply is first charged to
    /// an earlier fire-and-forget command, since the historian only answers
    /// those when it rejects them.
    fn deliver_response(&self, doc: Node) {
        let mut conn = self.conn.lock();

        if doc.get_str("msgtype") == Some("error") {
            let before = conn.pending.map_or(u64::MAX, |p| p.written_at);
            if conn.unsettled.front().is_some_and(|&at| at < before) {
                conn.unsettled.pop_front();
                warn!("Historian rejected a fire-and-forget command: {}", doc);
                return;
            }
        }

        let Some(pending) = conn.pending else {
            warn!("Discarding unsolicited historian response: {}", doc);
            return;
        };
        if conn.response.is_some() {
            warn!(
                "Discarding extra response to command {}: {}",
                pending.ticket, doc
            );
            return;
        }

        // The historian answers in order: everything written before this
        // command has been handled.
        conn.unsettled.retain(|&at| at > pending.written_at);
        conn.response = Some((pending.ticket, doc));
        drop(conn);
        self.response_cond.notify_all();
    }

    fn run(&self) {
        info!(
            "Historian connection thread started for {}",
            self.socket_path.display()
        );
        let mut failures: u32 = 0;

        while self.is_running() {
            let (control, reader, writer) = match self.dial() {
                Ok(streams) => streams,
                Err((backoff, e)) => {
                    failures += 1;
                    if failures == 1 {
                        warn!(
                            "Cannot reach historian at {}: {} (retrying every {:?})",
                            self.socket_path.display(),
                            e,
                            backoff
                        );
                    } else {
                        debug!("Historian dial attempt {} failed: {}", failures, e);
                    }
                    self.sleep(backoff);
                    continue;
                }
            };
            failures = 0;

            if !self.install(control, writer) {
                break;
            }
            self.change_state(HistorianState::ConnectedWaiting);
            self.serve(reader);
            self.teardown();
            self.change_state(HistorianState::Unconnected);
        }

        debug!("Historian connection thread exiting");
    }
}

/// Client for the historian's status socket.
///
/// Share it between threads behind an `Arc`; every method takes `&self`.
/// Dropping the last handle shuts the connection thread down.
///
/// # Example
///
/// ```ignore
/// use std::sync::mpsc;
/// use cyberblades_ui::historian::{param, Historian};
///
/// let (tx, rx) = mpsc::channel();
/// let historian = Historian::connect("/run/user/1000/historian.sock", tx)?;
///
/// let info = historian.send_command_retry("playerinfo", &param("player", "joe")?)?;
/// for event in rx.try_iter() {
///     println!("{:?}", event);
/// }
/// ```
pub struct Historian {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Historian {
    /// Start connecting to the historian at `socket_path` with default timing.
    ///
    /// Returns immediately; the connection is established in the background
    /// and reported through `handler`.
    pub fn connect(
        socket_path: impl Into<PathBuf>,
        handler: impl EventHandler + 'static,
    ) -> Result<Self, HistorianError> {
        Self::with_config(socket_path, HistorianConfig::default(), handler)
    }

    pub fn with_config(
        socket_path: impl Into<PathBuf>,
        config: HistorianConfig,
        handler: impl EventHandler + 'static,
    ) -> Result<Self, HistorianError> {
        let shared = Arc::new(Shared::new(socket_path.into(), config, Box::new(handler)));

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("historian".to_string())
            .spawn(move || worker.run())
            .map_err(HistorianError::Spawn)?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.shared.socket_path
    }

    pub fn state(&self) -> HistorianState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Build the command line, rejecting parameters that would not form a
    /// single-line JSON object.
    fn envelope(name: &str, params: &str) -> Result<String, HistorianError> {
        if params.contains(|c| c == '\n' || c == '\r') {
            return Err(HistorianError::InvalidCommand);
        }
        let line = format_command(name, params);
        if let Err(e) = jsondom::parse(&line) {
            debug!("Rejecting historian command {}: {}", name, e);
            return Err(HistorianError::InvalidCommand);
        }
        Ok(line)
    }

    /// Send a command and wait for its response.
    ///
    /// `params` is a raw `"key":value` fragment (see
    /// [`param`](crate::historian::param)) spliced into the command object.
    /// Only one response-awaiting command can be in flight per connection;
    /// there is no queueing. The deadline covers the write as well as the
    /// wait for the reply.
    ///
    /// # Errors
    ///
    /// - `InvalidCommand` if `params` does not yield a one-line JSON object
    /// - `NotConnected` if no connection is established, or it drops while
    ///   waiting
    /// - `Busy` if another command is still awaiting its response
    /// - `Timeout` if no response arrives within the configured deadline
    /// - `Io` if writing the command fails; the connection is then recycled
    pub fn send_command(&self, name: &str, params: &str) -> Result<Node, HistorianError> {
        let line = Self::envelope(name, params)?;
        let timeout = self.shared.config.response_timeout;
        let deadline = Instant::now() + timeout;

        let mut conn = self.shared.conn.lock();
        if conn.writer.is_none() {
            return Err(HistorianError::NotConnected);
        }
        if conn.pending.is_some() {
            return Err(HistorianError::Busy);
        }

        let written_at = conn.write_line(&line).map_err(|e| {
            warn!("Failed to send historian command {}: {}", name, e);
            e
        })?;

        conn.next_ticket += 1;
        let ticket = conn.next_ticket;
        conn.pending = Some(Pending { ticket, written_at });
        debug!("Sent historian command {} (ticket {})", name, ticket);

        loop {
            if let Some(doc) = conn.take_response(ticket) {
                return Ok(doc);
            }
            if !conn.is_waiting(ticket) {
                return Err(HistorianError::NotConnected);
            }
            if self
                .shared
                .response_cond
                .wait_until(&mut conn, deadline)
                .timed_out()
            {
                if let Some(doc) = conn.take_response(ticket) {
                    return Ok(doc);
                }
                if conn.is_waiting(ticket) {
                    conn.pending = None;
                }
                warn!("Historian command {} timed out after {:?}", name, timeout);
                return Err(HistorianError::Timeout(timeout));
            }
        }
    }

    /// [`send_command`](Self::send_command) with a few attempts, to ride out
    /// short reconnect windows.
    pub fn send_command_retry(&self, name: &str, params: &str) -> Result<Node, HistorianError> {
        let attempts = self.shared.config.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.send_command(name, params) {
                Ok(doc) => return Ok(doc),
                Err(e) if e.is_transient() && attempt < attempts && self.is_running() => {
                    debug!(
                        "Historian command {} failed (attempt {}/{}): {}",
                        name, attempt, attempts, e
                    );
                    attempt += 1;
                    self.shared.sleep(self.shared.config.retry_pause);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a command that produces no response.
    ///
    /// Does not touch the response slot, so it may be used while another
    /// command is pending. When disconnected the command is dropped and
    /// logged.
    pub fn send_fire_and_forget(&self, name: &str, params: &str) -> Result<(), HistorianError> {
        let line = Self::envelope(name, params)?;

        let mut conn = self.shared.conn.lock();
        if conn.writer.is_none() {
            warn!("Command discarded, no historian connection: {}", line.trim_end());
            return Err(HistorianError::NotConnected);
        }
        let written_at = conn.write_line(&line).map_err(|e| {
            warn!("Failed to send historian command {}: {}", name, e);
            e
        })?;
        conn.remember_unsettled(written_at);
        Ok(())
    }

    /// Stop the connection thread and wait for it to exit. Idempotent.
    ///
    /// Does not wait for the command lock, so a write stalled on an
    /// unresponsive peer cannot hold it up. Commands in flight return
    /// `NotConnected` once the connection is torn down.
    pub fn shutdown(&self) {
        {
            let control = self.shared.control.lock();
            self.shared.running.store(false, Ordering::SeqCst);
            if let Some(stream) = control.as_ref() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
        self.shared.wake.notify_all();
        self.shared.response_cond.notify_all();

        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Called from an event handler; the thread exits on its own.
            return;
        }
        if handle.join().is_err() {
            warn!("Historian connection thread panicked");
        } else {
            debug!("Historian connection thread shut down");
        }
    }
}

impl Drop for Historian {
    fn drop(&mut self) {
        self.shutdown();
    }
}
