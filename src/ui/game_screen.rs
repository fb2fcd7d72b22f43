//! Live game and finished game screens.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use crate::app::ServerState;
use cyberblades_ui::models::{format_percentage, PerformanceInfo, SongInfo};

pub fn render_game(frame: &mut Frame, state: &ServerState, area: Rect) {
    render_song(frame, " Game On ", &state.current_song, None, area);
}

pub fn render_finish(frame: &mut Frame, state: &ServerState, area: Rect) {
    let performance = &state.current_song.performance;
    let verdict = if performance.verdict_passed {
        Span::styled("Cleared", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else {
        Span::styled("Failed", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
    };
    render_song(frame, " Song Finished ", &state.current_song, Some(verdict), area);
}

fn render_song(
    frame: &mut Frame,
    title: &str,
    song: &SongInfo,
    verdict: Option<Span>,
    area: Rect,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Song
            Constraint::Length(4), // Score
            Constraint::Length(4), // Details
            Constraint::Min(0),
        ])
        .split(inner);

    let meta = &song.meta;
    let mut song_lines = vec![Line::from(Span::styled(
        meta.song_title.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    if !meta.song_author.is_empty() || !meta.level_author.is_empty() {
        song_lines.push(Line::from(format!(
            "{} / mapped by {}",
            meta.song_author, meta.level_author
        )));
    }
    song_lines.push(Line::from(Span::styled(
        meta.difficulty.as_str(),
        Style::default().fg(meta.difficulty.color()),
    )));
    frame.render_widget(
        Paragraph::new(song_lines).alignment(Alignment::Center),
        chunks[0],
    );

    let performance = &song.performance;
    let mut score_lines = vec![
        Line::from(Span::styled(
            performance.score.to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled(
                format_percentage(performance.percentage()),
                Style::default().fg(Color::LightRed),
            ),
            Span::raw("   "),
            Span::styled(
                performance.rank_display().to_string(),
                Style::default().fg(Color::LightRed).add_modifier(Modifier::BOLD),
            ),
        ]),
    ];
    if let Some(verdict) = verdict {
        score_lines.push(Line::from(verdict));
    }
    let score_area = super::centered_rect_fixed(30, chunks[1].height, chunks[1]);
    frame.render_widget(
        Paragraph::new(score_lines).alignment(Alignment::Center),
        score_area,
    );

    render_details(frame, performance, chunks[2]);
}

fn render_details(frame: &mut Frame, performance: &PerformanceInfo, area: Rect) {
    let header = Row::new(
        ["Combo", "Missed Notes", "Total Notes", "Note Percentage", "Max Combo"]
            .into_iter()
            .map(|title| Cell::from(title).style(Style::default().fg(Color::Yellow))),
    )
    .bottom_margin(1);

    let combo_style = if performance.is_full_combo() {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };
    let missed_style = if performance.missed_notes > 0 {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    };

    let row = Row::new(vec![
        Cell::from(performance.combo.to_string()).style(combo_style),
        Cell::from(performance.missed_notes.to_string()).style(missed_style),
        Cell::from(performance.passed_notes.to_string()),
        Cell::from(format_percentage(performance.note_percentage())),
        Cell::from(performance.max_combo.to_string()),
    ]);

    let table = Table::new(vec![row], [Constraint::Ratio(1, 5); 5]).header(header);
    frame.render_widget(table, area);
}
