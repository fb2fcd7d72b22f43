//! UI rendering module.
//!
//! This module contains all the rendering logic for the dashboard.

mod footer;
mod game_screen;
mod header;
mod main_screen;
mod status;

use ratatui::prelude::*;

use crate::app::{App, Screen};

/// Main render function - called whenever the app is dirty.
pub fn render(frame: &mut Frame, app: &App) {
    // Main layout: Header, Content, Status box, Footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Status box
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    header::render(frame, chunks[0]);

    match app.state.screen {
        Screen::Main => main_screen::render(frame, &app.state, chunks[1]),
        Screen::Game => game_screen::render_game(frame, &app.state, chunks[1]),
        Screen::Finish => game_screen::render_finish(frame, &app.state, chunks[1]),
    }

    status::render(frame, &app.state, chunks[2]);
    footer::render(frame, app, chunks[3]);
}

/// Helper for fixed-size centered rect with clamping.
fn centered_rect_fixed(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandResponse, CommandService};
    use cyberblades_ui::historian::HistorianState;
    use cyberblades_ui::jsondom::parse;
    use ratatui::backend::TestBackend;
    use std::sync::mpsc;

    struct NoCommands;

    impl CommandService for NoCommands {
        fn request_select_player(&self, _player: &str, _request_id: usize) -> anyhow::Result<()> {
            Ok(())
        }

        fn request_player_info(&self, _player: &str, _request_id: usize) -> anyhow::Result<()> {
            Ok(())
        }

        fn request_status(&self, _request_id: usize) -> anyhow::Result<()> {
            Ok(())
        }

        fn poll_response(&self) -> Option<CommandResponse> {
            None
        }
    }

    fn screen_text(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn test_app() -> App {
        let (_tx, rx) = mpsc::channel();
        App::new(rx, Box::new(NoCommands), None)
    }

    #[test]
    fn test_main_screen_without_historian() {
        let app = test_app();
        let text = screen_text(&app);
        assert!(text.contains("Historian unavailable"));
        assert!(text.contains("No player selected"));
    }

    #[test]
    fn test_main_screen_with_player_and_highscores() {
        let mut app = test_app();
        app.state.historian_state = HistorianState::ConnectedReady;
        app.apply_document(
            &parse(
                r#"{"player":"joe","today":{"games_played":4},"alltime":{"games_played":12},
                    "highscores":[{"player":"joe","score":123456,"max_score":200000,"rank":"A"}],
                    "connection":{"connected_to_beatsaber":true}}"#,
            )
            .unwrap(),
        );

        let text = screen_text(&app);
        assert!(text.contains("Current player: joe"));
        assert!(text.contains("Games Played"));
        assert!(text.contains("123456"));
        assert!(text.contains("61.7%"));
        assert!(text.contains("Ready for action!"));
    }

    #[test]
    fn test_game_screen() {
        let mut app = test_app();
        app.state.historian_state = HistorianState::ConnectedWaiting;
        app.apply_document(
            &parse(
                r#"{"status":{"current_game":{"meta":{"song_title":"Escape"},
                    "performance":{"score":4242,"max_score":5000,"missed_notes":3}}}}"#,
            )
            .unwrap(),
        );

        let text = screen_text(&app);
        assert!(text.contains("Game On"));
        assert!(text.contains("Escape"));
        assert!(text.contains("4242"));
        assert!(text.contains("Not connected to BeatSaber"));
    }
}
