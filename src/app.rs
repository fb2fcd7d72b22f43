//! Application state for the dashboard.
//!
//! The app drains [`UiEvent`]s (historian pushes, state changes, keys),
//! interprets historian documents into [`ServerState`] and decides which
//! screen is shown. Commands that wait for a response run on the command
//! worker; their results are polled back every frame.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::commands::{CommandKind, CommandResponse, CommandService};
use cyberblades_ui::events::{Key, UiEvent};
use cyberblades_ui::historian::HistorianState;
use cyberblades_ui::jsondom::Node;
use cyberblades_ui::models::{HighscoreTable, PlayerInfo, SongInfo};

/// How long the results of a finished game stay up.
pub const FINISH_SCREEN_DURATION: Duration = Duration::from_secs(10);

/// Errors shown in the status line disappear after this long.
const ERROR_DISPLAY_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Player statistics and highscores.
    Main,
    /// A song is being played.
    Game,
    /// Results of the song just finished.
    Finish,
}

/// Everything the dashboard knows about the historian and the game.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub screen: Screen,
    pub screen_shown_at: Instant,
    pub connected_to_beatsaber: bool,
    pub player: PlayerInfo,
    pub current_song: SongInfo,
    pub highscores: HighscoreTable,
    pub historian_state: HistorianState,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            screen: Screen::Main,
            screen_shown_at: Instant::now(),
            connected_to_beatsaber: false,
            player: PlayerInfo::default(),
            current_song: SongInfo::default(),
            highscores: HighscoreTable::default(),
            historian_state: HistorianState::Unconnected,
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Main application state.
pub struct App {
    /// Flag to exit the application.
    pub should_quit: bool,

    pub state: ServerState,

    /// Last non-fatal error message (auto-clears).
    pub last_error: Option<String>,
    last_error_time: Option<Instant>,

    /// Dirty flag - set when UI needs to be redrawn.
    needs_redraw: bool,

    /// Local clock second last drawn in the header.
    clock_second: i64,

    /// Player selected on every (re)connect.
    configured_player: Option<String>,

    events: Receiver<UiEvent>,
    commands: Box<dyn CommandService>,

    /// Monotonically increasing counter for request IDs.
    next_request_id: usize,

    /// Command in flight (for UI feedback).
    pub pending_command: Option<CommandKind>,

    /// Responses with a different ID are stale and ignored.
    pending_request_id: Option<usize>,
}

impl App {
    pub fn new(
        events: Receiver<UiEvent>,
        commands: Box<dyn CommandService>,
        configured_player: Option<String>,
    ) -> Self {
        Self {
            should_quit: false,
            state: ServerState::new(),
            last_error: None,
            last_error_time: None,
            needs_redraw: true,
            clock_second: 0,
            configured_player,
            events,
            commands,
            next_request_id: 0,
            pending_command: None,
            pending_request_id: None,
        }
    }

    // ===== Redraw =====

    pub fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    /// Check if redraw is needed and reset the flag.
    pub fn take_needs_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    #[cfg(test)]
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    // ===== Error Handling =====

    /// Set a non-fatal error to display in the UI.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.last_error_time = Some(Instant::now());
        self.mark_dirty();
    }

    pub fn clear_error(&mut self) {
        if self.last_error.take().is_some() {
            self.last_error_time = None;
            self.mark_dirty();
        }
    }

    // ===== Screens =====

    fn set_screen(&mut self, screen: Screen) {
        if self.state.screen != screen {
            debug!("Screen {:?} -> {:?}", self.state.screen, screen);
            self.state.screen = screen;
            self.state.screen_shown_at = Instant::now();
            self.mark_dirty();
        }
    }

    /// Time-driven updates: leave the finish screen, expire errors, advance
    /// the header clock.
    pub fn tick(&mut self, now: Instant) {
        if self.state.screen == Screen::Finish
            && now.saturating_duration_since(self.state.screen_shown_at) >= FINISH_SCREEN_DURATION
        {
            self.set_screen(Screen::Main);
        }

        if let Some(since) = self.last_error_time {
            if now.saturating_duration_since(since) >= ERROR_DISPLAY_DURATION {
                self.clear_error();
            }
        }

        let second = chrono::Local::now().timestamp();
        if second != self.clock_second {
            self.clock_second = second;
            self.mark_dirty();
        }
    }

    // ===== Events =====

    /// Drain all queued events (non-blocking).
    pub fn poll_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("Event channel closed");
                    self.should_quit = true;
                    break;
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Quit => {
                info!("Quit requested");
                self.should_quit = true;
            }
            UiEvent::KeyPress(key) => self.handle_key(key),
            UiEvent::TextInput(text) => debug!("Ignoring text input {:?}", text),
            UiEvent::HistorianMessage(doc) => self.apply_document(&doc),
            UiEvent::HistorianStateChange { old, new } => self.on_historian_state(old, new),
        }
    }

    fn handle_key(&mut self, key: Key) {
        match (self.state.screen, key) {
            (Screen::Finish, Key::Middle) => self.set_screen(Screen::Main),
            (screen, key) => debug!("Key {:?} has no action on {:?} screen", key, screen),
        }
    }

    fn on_historian_state(&mut self, old: HistorianState, new: HistorianState) {
        self.state.historian_state = new;
        self.mark_dirty();

        if !new.is_connected() {
            self.state.connected_to_beatsaber = false;
            if self.state.screen == Screen::Game {
                self.set_screen(Screen::Main);
            }
            return;
        }

        if !old.is_connected() {
            info!("Historian connected");
            if let Some(player) = self.configured_player.clone() {
                self.request_select_player(player);
            }
        }
    }

    /// Update state from a historian document. Status pushes, `status`
    /// responses, `playerinfo` responses and highscore tables are all
    /// recognized by their fields; anything else is ignored.
    pub fn apply_document(&mut self, doc: &Node) {
        if doc.get_str("msgtype") == Some("error") {
            let text = doc.get_str("text").unwrap_or("unknown error");
            self.set_error(format!("Historian: {}", text));
            return;
        }

        let status = doc.get_dict("status").unwrap_or(doc);

        if let Some(connection) = status.get_dict("connection") {
            self.apply_connection(connection);
        }

        if let Some(game) = status.get("current_game") {
            self.apply_current_game(game);
        }

        if doc.get_dict("today").is_some() || doc.get_dict("alltime").is_some() {
            if let Some(info) = PlayerInfo::from_node(doc) {
                debug!("Player info for {}", info.name);
                self.state.player = info;
                self.mark_dirty();
            }
        }

        if let Some(table) = HighscoreTable::from_node(doc) {
            self.state.highscores = table;
            self.mark_dirty();
        }
    }

    fn apply_connection(&mut self, connection: &Node) {
        if let Some(connected) = connection.get_bool("connected_to_beatsaber") {
            if connected != self.state.connected_to_beatsaber {
                self.state.connected_to_beatsaber = connected;
                self.mark_dirty();
            }
        }

        match connection.get("current_player") {
            Some(Node::Str(name)) if *name != self.state.player.name => {
                info!("Current player is now {}", name);
                self.state.player = PlayerInfo {
                    name: name.clone(),
                    ..PlayerInfo::default()
                };
                self.state.highscores = HighscoreTable::default();
                self.mark_dirty();
                self.request_player_info(name.clone());
            }
            Some(Node::Null) if self.state.player.is_selected() => {
                info!("No player selected");
                self.state.player = PlayerInfo::default();
                self.mark_dirty();
            }
            _ => {}
        }
    }

    fn apply_current_game(&mut self, game: &Node) {
        if game.is_dict() {
            self.state.current_song = SongInfo::from_node(game);
            self.set_screen(Screen::Game);
            self.mark_dirty();
        } else if game.is_null() && self.state.screen == Screen::Game {
            self.set_screen(Screen::Finish);
            // Statistics changed with the finished game.
            if self.state.player.is_selected() {
                let name = self.state.player.name.clone();
                self.request_player_info(name);
            }
        }
    }

    // ===== Commands =====

    fn dispatch_command<F>(&mut self, kind: CommandKind, send: F)
    where
        F: FnOnce(&dyn CommandService, usize) -> anyhow::Result<()>,
    {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        match send(self.commands.as_ref(), request_id) {
            Ok(()) => {
                self.pending_command = Some(kind);
                self.pending_request_id = Some(request_id);
                self.mark_dirty();
            }
            Err(e) => self.set_error(format!("{}: {}", kind.as_str(), e)),
        }
    }

    /// Ask the historian for a fresh status document.
    pub fn request_status(&mut self) {
        self.dispatch_command(CommandKind::FetchStatus, |commands, id| {
            commands.request_status(id)
        });
    }

    fn request_select_player(&mut self, player: String) {
        self.dispatch_command(CommandKind::SelectPlayer, move |commands, id| {
            commands.request_select_player(&player, id)
        });
    }

    fn request_player_info(&mut self, player: String) {
        self.dispatch_command(CommandKind::FetchPlayerInfo, move |commands, id| {
            commands.request_player_info(&player, id)
        });
    }

    /// Apply finished commands (non-blocking).
    pub fn poll_command_responses(&mut self) {
        while let Some(response) = self.commands.poll_response() {
            if self.pending_request_id != Some(response.request_id()) {
                debug!(
                    "Ignoring stale command response {} (pending {:?})",
                    response.request_id(),
                    self.pending_request_id
                );
                continue;
            }
            let kind = self.pending_command.take();
            self.pending_request_id = None;
            self.mark_dirty();

            let result = match response {
                CommandResponse::PlayerInfo { result, .. } | CommandResponse::Status { result, .. } => {
                    result
                }
            };
            match result {
                Ok(doc) => self.apply_document(&doc),
                Err(e) => {
                    let label = kind.map_or("Command", |kind| kind.as_str());
                    self.set_error(format!("{} failed: {:#}", label, e));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod app_tests;
