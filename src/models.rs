//! Dashboard data models.
//!
//! The historian pushes loosely structured documents; these types pick out
//! the fields the dashboard shows. Interpretation is lenient: a missing field
//! or one of the wrong type falls back to its default instead of rejecting
//! the whole message.

use ratatui::style::Color;
use unicode_truncate::UnicodeTruncateStr;

use crate::jsondom::Node;

/// Widest text field kept from a document, in terminal columns.
pub const MAX_TEXT_WIDTH: usize = 48;

/// Rows shown in the highscore table.
pub const MAX_HIGHSCORE_ENTRIES: usize = 10;

fn text_field(node: &Node, key: &str) -> String {
    node.get_str(key)
        .map(|s| s.unicode_truncate(MAX_TEXT_WIDTH).0.to_string())
        .unwrap_or_default()
}

fn count_field(node: &Node, key: &str) -> u64 {
    node.get_int(key)
        .and_then(|value| u64::try_from(value).ok())
        .unwrap_or(0)
}

fn ratio_percent(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| 100.0 * part as f64 / whole as f64)
}

/// Beat map difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Expert,
    ExpertPlus,
    /// Missing or unrecognized
    #[default]
    Unknown,
}

impl Difficulty {
    /// Accepts the game's names (`"ExpertPlus"`, `"Expert+"`) or the
    /// numeric level 0-4.
    pub fn from_node(node: &Node) -> Self {
        if let Some(level) = node.as_i64() {
            return match level {
                0 => Difficulty::Easy,
                1 => Difficulty::Normal,
                2 => Difficulty::Hard,
                3 => Difficulty::Expert,
                4 => Difficulty::ExpertPlus,
                _ => Difficulty::Unknown,
            };
        }
        match node.as_str().map(str::to_ascii_lowercase).as_deref() {
            Some("easy") => Difficulty::Easy,
            Some("normal") => Difficulty::Normal,
            Some("hard") => Difficulty::Hard,
            Some("expert") => Difficulty::Expert,
            Some("expertplus") | Some("expert+") => Difficulty::ExpertPlus,
            _ => Difficulty::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Hard => "Hard",
            Difficulty::Expert => "Expert",
            Difficulty::ExpertPlus => "Expert+",
            Difficulty::Unknown => "?",
        }
    }

    /// Color used by the game's level selection.
    pub fn color(&self) -> Color {
        match self {
            Difficulty::Easy => Color::Green,
            Difficulty::Normal => Color::Blue,
            Difficulty::Hard => Color::Yellow,
            Difficulty::Expert => Color::Red,
            Difficulty::ExpertPlus => Color::Magenta,
            Difficulty::Unknown => Color::DarkGray,
        }
    }
}

/// Aggregated statistics of one player over a period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStats {
    pub games_played: u64,
    pub total_playtime_secs: u64,
    pub total_score: u64,
    pub total_max_score: u64,
    pub total_passed_notes: u64,
    pub total_missed_notes: u64,
}

impl PlayerStats {
    pub fn from_node(node: &Node) -> Self {
        Self {
            games_played: count_field(node, "games_played"),
            total_playtime_secs: count_field(node, "total_playtime_secs"),
            total_score: count_field(node, "total_score"),
            total_max_score: count_field(node, "total_max_score"),
            total_passed_notes: count_field(node, "total_passed_notes"),
            total_missed_notes: count_field(node, "total_missed_notes"),
        }
    }

    pub fn notes_cut(&self) -> u64 {
        self.total_passed_notes
            .saturating_sub(self.total_missed_notes)
    }

    /// Score relative to the maximum achievable; `None` before any game.
    pub fn percentage(&self) -> Option<f64> {
        ratio_percent(self.total_score, self.total_max_score)
    }
}

/// The selected player and their statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInfo {
    pub name: String,
    pub today: PlayerStats,
    pub alltime: PlayerStats,
}

impl PlayerInfo {
    /// Interpret a `playerinfo` document. Requires a string `player` field.
    pub fn from_node(node: &Node) -> Option<Self> {
        node.get_str("player")?;
        let stats = |key: &str| node.get_dict(key).map(PlayerStats::from_node).unwrap_or_default();
        Some(Self {
            name: text_field(node, "player"),
            today: stats("today"),
            alltime: stats("alltime"),
        })
    }

    pub fn is_selected(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Identifies a beat map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongMetadata {
    pub song_author: String,
    pub song_title: String,
    pub level_author: String,
    pub difficulty: Difficulty,
}

impl SongMetadata {
    pub fn from_node(node: &Node) -> Self {
        Self {
            song_author: text_field(node, "song_author"),
            song_title: text_field(node, "song_title"),
            level_author: text_field(node, "level_author"),
            difficulty: node
                .get("difficulty")
                .map(Difficulty::from_node)
                .unwrap_or_default(),
        }
    }
}

/// Score state of a game, live or final.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceInfo {
    pub score: u64,
    pub max_score: u64,
    pub combo: u64,
    pub max_combo: u64,
    pub hit_notes: u64,
    pub passed_notes: u64,
    pub missed_notes: u64,
    /// False only when a verdict is present and is not a pass.
    pub verdict_passed: bool,
    /// Letter rank such as `"SS"`; empty while unknown.
    pub rank: String,
}

impl Default for PerformanceInfo {
    fn default() -> Self {
        Self {
            score: 0,
            max_score: 0,
            combo: 0,
            max_combo: 0,
            hit_notes: 0,
            passed_notes: 0,
            missed_notes: 0,
            verdict_passed: true,
            rank: String::new(),
        }
    }
}

impl PerformanceInfo {
    pub fn from_node(node: &Node) -> Self {
        let mut rank = node.get_str("rank").unwrap_or_default().to_string();
        rank.truncate(rank.char_indices().nth(3).map_or(rank.len(), |(i, _)| i));
        Self {
            score: count_field(node, "score"),
            max_score: count_field(node, "max_score"),
            combo: count_field(node, "combo"),
            max_combo: count_field(node, "max_combo"),
            hit_notes: count_field(node, "hit_notes"),
            passed_notes: count_field(node, "passed_notes"),
            missed_notes: count_field(node, "missed_notes"),
            verdict_passed: node
                .get_str("verdict")
                .map_or(true, |verdict| verdict.eq_ignore_ascii_case("pass")),
            rank,
        }
    }

    pub fn percentage(&self) -> Option<f64> {
        ratio_percent(self.score, self.max_score)
    }

    /// Share of passed notes that were cut.
    pub fn note_percentage(&self) -> Option<f64> {
        ratio_percent(
            self.passed_notes.saturating_sub(self.missed_notes),
            self.passed_notes,
        )
    }

    pub fn is_full_combo(&self) -> bool {
        self.combo == self.max_combo
    }

    pub fn rank_display(&self) -> &str {
        if self.rank.is_empty() {
            "-"
        } else {
            &self.rank
        }
    }
}

/// The game in progress (or the one just finished).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongInfo {
    pub meta: SongMetadata,
    pub performance: PerformanceInfo,
}

impl SongInfo {
    /// Interpret a `current_game` document with `meta` and `performance`
    /// sections. Before the first score change only `meta` is present.
    pub fn from_node(node: &Node) -> Self {
        let meta = node
            .get_dict("meta")
            .map(SongMetadata::from_node)
            .unwrap_or_default();
        let performance = node
            .get_dict("performance")
            .map(PerformanceInfo::from_node)
            .unwrap_or_default();
        Self { meta, performance }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighscoreEntry {
    /// Position in the table, starting at 1.
    pub number: usize,
    pub name: String,
    pub most_recent: bool,
    pub performance: PerformanceInfo,
}

/// Best results on one beat map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighscoreTable {
    pub song: Option<SongMetadata>,
    pub entries: Vec<HighscoreEntry>,
}

impl HighscoreTable {
    /// Interpret a document carrying a `highscores` array. Entries that are
    /// not dicts are skipped; at most [`MAX_HIGHSCORE_ENTRIES`] are kept.
    pub fn from_node(node: &Node) -> Option<Self> {
        let rows = node.get_array("highscores")?.as_array()?;
        let entries = rows
            .iter()
            .filter(|row| row.is_dict())
            .take(MAX_HIGHSCORE_ENTRIES)
            .enumerate()
            .map(|(index, row)| HighscoreEntry {
                number: index + 1,
                name: text_field(row, "player"),
                most_recent: row.get_bool("most_recent").unwrap_or(false),
                performance: PerformanceInfo::from_node(row),
            })
            .collect();

        Some(Self {
            song: node.get_dict("song").map(SongMetadata::from_node),
            entries,
        })
    }

    /// Table position of the most recently played result, if listed.
    pub fn most_recent_number(&self) -> Option<usize> {
        self.entries
            .iter()
            .find(|entry| entry.most_recent)
            .map(|entry| entry.number)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Human-readable duration: `"42 sec"`, `"3:07 m:s"`, `"1:02:03 h:m:s"` or
/// `"2-01:00:00 d-h:m:s"`.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{} sec", secs)
    } else if secs < 3600 {
        format!("{}:{:02} m:s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!(
            "{}:{:02}:{:02} h:m:s",
            secs / 3600,
            secs % 3600 / 60,
            secs % 60
        )
    } else {
        format!(
            "{}-{:02}:{:02}:{:02} d-h:m:s",
            secs / 86400,
            secs % 86400 / 3600,
            secs % 3600 / 60,
            secs % 60
        )
    }
}

/// Three significant digits with a k/M/G suffix: `"7.50"`, `"123"`,
/// `"12.3 k"`, `"1.23 M"`.
pub fn format_magnitude(value: f64) -> String {
    let (scaled, suffix) = if value < 1e3 {
        (value, "")
    } else if value < 1e6 {
        (value / 1e3, " k")
    } else if value < 1e9 {
        (value / 1e6, " M")
    } else {
        (value / 1e9, " G")
    };

    if scaled < 10.0 {
        format!("{:.2}{}", scaled, suffix)
    } else if scaled < 100.0 {
        format!("{:.1}{}", scaled, suffix)
    } else {
        format!("{:.0}{}", scaled, suffix)
    }
}

/// `"97.3%"`, or `"-"` when there is nothing to relate to.
pub fn format_percentage(percentage: Option<f64>) -> String {
    percentage.map_or_else(|| "-".to_string(), |p| format!("{:.1}%", p))
}
