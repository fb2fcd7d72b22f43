//! Footer bar with keybindings and command feedback.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::{App, Screen};

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let mut keybindings = vec![("r", "Refresh"), ("q", "Quit")];
    if app.state.screen == Screen::Finish {
        keybindings.insert(0, ("Enter", "Continue"));
    }

    let mut spans: Vec<Span> = keybindings
        .iter()
        .flat_map(|(key, action)| {
            vec![
                Span::styled(
                    format!(" {} ", key),
                    Style::default().bg(Color::DarkGray).fg(Color::White),
                ),
                Span::raw(format!(" {} ", action)),
                Span::raw(" "),
            ]
        })
        .collect();

    if let Some(error) = &app.last_error {
        spans.push(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ));
    } else if let Some(kind) = app.pending_command {
        spans.push(Span::styled(
            format!("{}...", kind.as_str()),
            Style::default().fg(Color::Yellow),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Left);

    frame.render_widget(paragraph, area);
}
