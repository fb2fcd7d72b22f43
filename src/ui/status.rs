//! Connection status box.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::ServerState;
use cyberblades_ui::historian::HistorianState;

/// Text, foreground and background of the status box.
pub fn status_message(state: &ServerState) -> (&'static str, Color, Color) {
    match state.historian_state {
        HistorianState::Unconnected => ("Historian unavailable", Color::White, Color::Red),
        HistorianState::ConnectedWaiting | HistorianState::ConnectedReady
            if !state.connected_to_beatsaber =>
        {
            ("Not connected to BeatSaber", Color::Black, Color::Yellow)
        }
        HistorianState::ConnectedWaiting | HistorianState::ConnectedReady => {
            ("Ready for action!", Color::White, Color::Green)
        }
    }
}

pub fn render(frame: &mut Frame, state: &ServerState, area: Rect) {
    let (text, fg, bg) = status_message(state);
    let area = super::centered_rect_fixed(60, area.height, area);
    let style = Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD);

    let paragraph = Paragraph::new(text)
        .style(style)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).border_style(style));

    frame.render_widget(paragraph, area);
}
