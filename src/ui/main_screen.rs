//! Main screen: player statistics and highscore table.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use crate::app::ServerState;
use cyberblades_ui::models::{
    format_duration, format_magnitude, format_percentage, HighscoreTable, PlayerStats,
};

pub fn render(frame: &mut Frame, state: &ServerState, area: Rect) {
    if !state.player.is_selected() {
        let paragraph = Paragraph::new("No player selected")
            .style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(paragraph, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Player
            Constraint::Length(6), // Stats
            Constraint::Min(0),    // Highscores
        ])
        .split(area);

    let player = Paragraph::new(format!("Current player: {}", state.player.name))
        .style(Style::default().add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center);
    frame.render_widget(player, chunks[0]);

    render_stats(frame, state, chunks[1]);
    render_highscores(frame, &state.highscores, chunks[2]);
}

fn stats_row<'a>(label: &'a str, stats: &PlayerStats) -> Row<'a> {
    Row::new(vec![
        Cell::from(label).style(Style::default().fg(Color::Cyan)),
        Cell::from(format_duration(stats.total_playtime_secs)),
        Cell::from(format_magnitude(stats.notes_cut() as f64)),
        Cell::from(stats.games_played.to_string()),
        Cell::from(format_magnitude(stats.total_score as f64)),
        Cell::from(format_percentage(stats.percentage())),
    ])
}

fn render_stats(frame: &mut Frame, state: &ServerState, area: Rect) {
    let header = Row::new(
        ["", "Playtime", "Notes Cut", "Games Played", "Total Score", "Percentage"]
            .into_iter()
            .map(|title| Cell::from(title).style(Style::default().fg(Color::Yellow))),
    )
    .height(1)
    .bottom_margin(1);

    let rows = vec![
        stats_row("Today", &state.player.today),
        stats_row("All time", &state.player.alltime),
    ];

    let widths = [
        Constraint::Length(10),
        Constraint::Length(18),
        Constraint::Length(10),
        Constraint::Length(13),
        Constraint::Length(12),
        Constraint::Length(11),
    ];

    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Statistics ")
            .title_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(table, area);
}

fn render_highscores(frame: &mut Frame, table: &HighscoreTable, area: Rect) {
    let header = Row::new(
        ["#", "Player", "Score", "Max Combo", "%", "Rank"]
            .into_iter()
            .map(|title| {
                Cell::from(title).style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            }),
    )
    .height(1)
    .bottom_margin(1);

    let highlighted = table.most_recent_number();
    let rows: Vec<Row> = table
        .entries
        .iter()
        .map(|entry| {
            let passed = entry.performance.verdict_passed;
            let style = if Some(entry.number) == highlighted {
                let color = if passed { Color::Yellow } else { Color::LightRed };
                Style::default().fg(color).add_modifier(Modifier::BOLD)
            } else if !passed {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };

            Row::new(vec![
                Cell::from(entry.number.to_string()),
                Cell::from(entry.name.clone()),
                Cell::from(entry.performance.score.to_string()),
                Cell::from(entry.performance.max_combo.to_string()),
                Cell::from(format_percentage(entry.performance.percentage())),
                Cell::from(entry.performance.rank_display().to_string()),
            ])
            .style(style)
        })
        .collect();

    let title = match &table.song {
        Some(song) if !song.song_title.is_empty() => {
            format!(" Highscores: {} ({}) ", song.song_title, song.difficulty.as_str())
        }
        _ => " Highscores ".to_string(),
    };

    let widths = [
        Constraint::Length(4),
        Constraint::Min(16),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(6),
    ];

    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .title_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(table, area);
}
