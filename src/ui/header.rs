//! Header bar with title and clock.

use chrono::Local;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

pub fn render(frame: &mut Frame, area: Rect) {
    let block = Block::default().borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let title = Line::from(vec![
        Span::styled(
            "Cyber",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            "Blades",
            Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        ),
    ]);
    frame.render_widget(Paragraph::new(title).alignment(Alignment::Center), inner);

    let clock = Local::now().format("%a %Y-%m-%d %H:%M:%S").to_string();
    frame.render_widget(
        Paragraph::new(clock)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Right),
        inner,
    );
}
