//! CyberBlades - live terminal dashboard for the Beat Saber historian.
//!
//! Connects to the historian's Unix socket, sets up the terminal and runs
//! the main event loop.

mod app;
mod commands;
mod config;
mod ui;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cyberblades_ui::events::{Key, UiEvent};
use cyberblades_ui::historian::Historian;

use app::App;
use commands::CommandWorker;
use config::Config;

/// Global flag to track if terminal is in raw mode (for panic cleanup)
static TERMINAL_RAW: AtomicBool = AtomicBool::new(false);

/// RAII guard for terminal state management.
/// Restores the terminal when dropped, even on panic or early return.
struct TerminalGuard;

impl TerminalGuard {
    /// Initialize terminal for TUI mode (raw mode, alternate screen).
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        TERMINAL_RAW.store(true, Ordering::SeqCst);

        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            TERMINAL_RAW.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        TERMINAL_RAW.store(false, Ordering::SeqCst);
    }
}

/// Install a panic hook that restores terminal state before printing panic info.
fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        if TERMINAL_RAW.load(Ordering::SeqCst) {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            let _ = io::stdout().flush();
        }
        default_hook(panic_info);
    }));
}

/// Log to a file; the terminal belongs to the dashboard.
fn init_logging(config: &Config) -> Result<()> {
    let path = config.log_path();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "cyberblades=info,cyberblades_ui=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();
    Ok(())
}

fn main() -> Result<()> {
    // Install panic hook FIRST for terminal safety
    install_panic_hook();

    let config = Config::parse();
    init_logging(&config)?;
    info!("Starting CyberBlades v{}", env!("CARGO_PKG_VERSION"));

    let socket_path = config.socket_path();
    info!("Using historian socket {}", socket_path.display());

    let (event_tx, event_rx) = mpsc::channel();
    let historian = Arc::new(
        Historian::connect(&socket_path, event_tx.clone())
            .context("Failed to start historian connection")?,
    );
    let commands = CommandWorker::spawn(Arc::clone(&historian))?;
    let mut app = App::new(
        event_rx,
        Box::new(commands),
        config.player().map(String::from),
    );

    // Setup terminal with RAII guard - ensures cleanup on any exit path
    let terminal_guard = TerminalGuard::new()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let result = run_app(&mut terminal, &mut app, &event_tx, &config);

    terminal.show_cursor()?;

    // Unblock commands in flight before the worker is asked to stop.
    historian.shutdown();
    drop(app);
    drop(terminal_guard);

    if let Err(e) = result {
        tracing::error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        return Err(e);
    }

    info!("CyberBlades exited cleanly");
    Ok(())
}

/// Main application loop.
fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: &Sender<UiEvent>,
    config: &Config,
) -> Result<()> {
    let tick = config.tick();

    loop {
        app.poll_events();
        app.poll_command_responses();
        app.tick(Instant::now());

        if app.should_quit {
            return Ok(());
        }

        if app.take_needs_redraw() {
            terminal.draw(|f| ui::render(f, app))?;
        }

        if event::poll(tick)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if let Some(event) = map_key(key) {
                        let _ = events.send(event);
                    } else if key.code == KeyCode::Char('r') {
                        app.request_status();
                    }
                }
                Event::Resize(_, _) => app.mark_dirty(),
                _ => {}
            }
        }
    }
}

/// Translate terminal keys into dashboard events. Keys go through the same
/// channel as historian events so they are handled in arrival order.
fn map_key(key: KeyEvent) -> Option<UiEvent> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => {
            Some(UiEvent::Quit)
        }
        (KeyCode::Up, _) => Some(UiEvent::KeyPress(Key::Up)),
        (KeyCode::Down, _) => Some(UiEvent::KeyPress(Key::Down)),
        (KeyCode::Enter, _) => Some(UiEvent::KeyPress(Key::Middle)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> Option<UiEvent> {
        map_key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(press(KeyCode::Char('q'), KeyModifiers::NONE), Some(UiEvent::Quit));
        assert_eq!(press(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(UiEvent::Quit));
        assert_eq!(
            press(KeyCode::Enter, KeyModifiers::NONE),
            Some(UiEvent::KeyPress(Key::Middle))
        );
        assert_eq!(
            press(KeyCode::Up, KeyModifiers::NONE),
            Some(UiEvent::KeyPress(Key::Up))
        );
        assert_eq!(press(KeyCode::Char('c'), KeyModifiers::NONE), None);
        assert_eq!(press(KeyCode::Char('r'), KeyModifiers::NONE), None);
    }
}
