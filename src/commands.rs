//! Historian command worker.
//!
//! Response-awaiting commands block for up to the historian's response
//! deadline (and longer with retries), so the UI thread never issues them
//! directly. [`CommandWorker`] runs them on a dedicated thread; requests go
//! in over a bounded channel and results are polled back each frame.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use cyberblades_ui::historian::{param, Historian};
use cyberblades_ui::jsondom::Node;

/// Seam between the application and the command worker, so the app can be
/// driven by a mock in tests.
pub trait CommandService {
    /// Select `player` on the historian, then fetch their statistics.
    fn request_select_player(&self, player: &str, request_id: usize) -> Result<()>;

    /// Fetch statistics of `player` without changing the selection.
    fn request_player_info(&self, player: &str, request_id: usize) -> Result<()>;

    /// Ask for a fresh status document.
    fn request_status(&self, request_id: usize) -> Result<()>;

    /// Next finished command, if any (non-blocking).
    fn poll_response(&self) -> Option<CommandResponse>;
}

#[derive(Debug)]
pub enum CommandRequest {
    /// Worker exits after receiving this.
    Shutdown,
    SelectPlayer { player: String, request_id: usize },
    FetchPlayerInfo { player: String, request_id: usize },
    FetchStatus { request_id: usize },
}

/// Result of a command, tagged with the id of the request that caused it.
#[derive(Debug)]
pub enum CommandResponse {
    PlayerInfo {
        request_id: usize,
        result: Result<Node>,
    },
    Status {
        request_id: usize,
        result: Result<Node>,
    },
}

impl CommandResponse {
    pub fn request_id(&self) -> usize {
        match self {
            CommandResponse::PlayerInfo { request_id, .. }
            | CommandResponse::Status { request_id, .. } => *request_id,
        }
    }

    fn result_error(&self) -> Result<(), &anyhow::Error> {
        match self {
            CommandResponse::PlayerInfo { result, .. } | CommandResponse::Status { result, .. } => {
                result.as_ref().map(|_| ())
            }
        }
    }
}

/// Kind of command in flight (for the status line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SelectPlayer,
    FetchPlayerInfo,
    FetchStatus,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SelectPlayer => "Selecting player",
            CommandKind::FetchPlayerInfo => "Loading player",
            CommandKind::FetchStatus => "Refreshing status",
        }
    }
}

const CHANNEL_BOUND: usize = 16;

/// Handle to the command worker thread.
///
/// When dropped, sends a Shutdown request and waits briefly for the worker
/// to exit.
pub struct CommandWorker {
    request_tx: SyncSender<CommandRequest>,
    response_rx: Receiver<CommandResponse>,
    worker_handle: Option<thread::JoinHandle<()>>,
}

impl CommandWorker {
    pub fn spawn(historian: Arc<Historian>) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::sync_channel::<CommandRequest>(CHANNEL_BOUND);
        let (response_tx, response_rx) = mpsc::sync_channel::<CommandResponse>(CHANNEL_BOUND);

        let worker_handle = thread::Builder::new()
            .name("historian-commands".to_string())
            .spawn(move || command_worker_loop(historian, request_rx, response_tx))
            .context("Failed to spawn command worker thread")?;

        Ok(Self {
            request_tx,
            response_rx,
            worker_handle: Some(worker_handle),
        })
    }

    /// Uses try_send so a stalled worker never blocks the UI thread.
    fn try_send_request(&self, request: CommandRequest) -> Result<()> {
        match self.request_tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow::anyhow!(
                "Historian busy - try again in a moment"
            )),
            Err(TrySendError::Disconnected(_)) => {
                Err(anyhow::anyhow!("Command worker disconnected"))
            }
        }
    }
}

impl CommandService for CommandWorker {
    fn request_select_player(&self, player: &str, request_id: usize) -> Result<()> {
        self.try_send_request(CommandRequest::SelectPlayer {
            player: player.to_string(),
            request_id,
        })
    }

    fn request_player_info(&self, player: &str, request_id: usize) -> Result<()> {
        self.try_send_request(CommandRequest::FetchPlayerInfo {
            player: player.to_string(),
            request_id,
        })
    }

    fn request_status(&self, request_id: usize) -> Result<()> {
        self.try_send_request(CommandRequest::FetchStatus { request_id })
    }

    fn poll_response(&self) -> Option<CommandResponse> {
        self.response_rx.try_recv().ok()
    }
}

impl Drop for CommandWorker {
    fn drop(&mut self) {
        let _ = self.request_tx.try_send(CommandRequest::Shutdown);

        // A worker stuck in a command returns once the historian is shut
        // down; don't hold up exit waiting for it.
        if let Some(handle) = self.worker_handle.take() {
            const QUICK_CHECK_INTERVAL: Duration = Duration::from_millis(10);
            const MAX_QUICK_CHECKS: u32 = 20;

            for _ in 0..MAX_QUICK_CHECKS {
                if handle.is_finished() {
                    if handle.join().is_err() {
                        warn!("Command worker thread panicked during shutdown");
                    } else {
                        debug!("Command worker thread shut down gracefully");
                    }
                    return;
                }
                thread::sleep(QUICK_CHECK_INTERVAL);
            }

            debug!(
                "Command worker still running after {}ms - detaching",
                QUICK_CHECK_INTERVAL.as_millis() * MAX_QUICK_CHECKS as u128
            );
        }
    }
}

fn player_info(historian: &Historian, player: &str) -> Result<Node> {
    let params = param("player", player)?;
    historian
        .send_command_retry("playerinfo", &params)
        .with_context(|| format!("playerinfo for {} failed", player))
}

fn process_command_request(historian: &Historian, request: CommandRequest) -> Option<CommandResponse> {
    match request {
        CommandRequest::Shutdown => None,
        CommandRequest::SelectPlayer { player, request_id } => {
            let result = param("player", &player)
                .context("Failed to encode player name")
                .and_then(|params| {
                    historian
                        .send_fire_and_forget("set_player", &params)
                        .context("set_player failed")
                })
                .and_then(|()| player_info(historian, &player));
            Some(CommandResponse::PlayerInfo { request_id, result })
        }
        CommandRequest::FetchPlayerInfo { player, request_id } => Some(CommandResponse::PlayerInfo {
            request_id,
            result: player_info(historian, &player),
        }),
        CommandRequest::FetchStatus { request_id } => Some(CommandResponse::Status {
            request_id,
            result: historian
                .send_command_retry("status", "")
                .context("status failed"),
        }),
    }
}

fn command_worker_loop(
    historian: Arc<Historian>,
    request_rx: Receiver<CommandRequest>,
    response_tx: SyncSender<CommandResponse>,
) {
    while let Ok(request) = request_rx.recv() {
        if matches!(request, CommandRequest::Shutdown) {
            info!("Command worker received shutdown signal, exiting");
            break;
        }

        let Some(response) = process_command_request(&historian, request) else {
            continue;
        };
        if let Err(e) = response.result_error() {
            warn!("Historian command failed: {:#}", e);
        }
        if response_tx.send(response).is_err() {
            debug!("Command response receiver gone, exiting");
            break;
        }
    }
}
