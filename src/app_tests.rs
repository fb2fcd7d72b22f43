use super::*;
use anyhow::Result;
use cyberblades_ui::jsondom::parse;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

// Mock Command Service
#[derive(Clone, Default)]
struct MockCommandService {
    requests: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<VecDeque<CommandResponse>>>,
    fail_requests: bool,
}

impl MockCommandService {
    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn push_response(&self, response: CommandResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn record(&self, request: String) -> Result<()> {
        if self.fail_requests {
            anyhow::bail!("Historian busy - try again in a moment");
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

impl CommandService for MockCommandService {
    fn request_select_player(&self, player: &str, request_id: usize) -> Result<()> {
        self.record(format!("SelectPlayer(player={}, request_id={})", player, request_id))
    }

    fn request_player_info(&self, player: &str, request_id: usize) -> Result<()> {
        self.record(format!("PlayerInfo(player={}, request_id={})", player, request_id))
    }

    fn request_status(&self, request_id: usize) -> Result<()> {
        self.record(format!("Status(request_id={})", request_id))
    }

    fn poll_response(&self) -> Option<CommandResponse> {
        self.responses.lock().unwrap().pop_front()
    }
}

fn create_test_app(player: Option<&str>) -> (App, MockCommandService, Sender<UiEvent>) {
    let (tx, rx) = mpsc::channel();
    let mock = MockCommandService::default();
    let app = App::new(rx, Box::new(mock.clone()), player.map(String::from));
    (app, mock, tx)
}

fn doc(text: &str) -> Node {
    parse(text).unwrap()
}

fn connect(app: &mut App) {
    app.handle_event(UiEvent::HistorianStateChange {
        old: HistorianState::Unconnected,
        new: HistorianState::ConnectedWaiting,
    });
}

const GAME_STATUS: &str = r#"{"msgtype":"status","status":{
    "connection":{"connected_to_beatsaber":true,"current_player":null},
    "current_game":{"meta":{"song_title":"Escape","song_author":"Jaroslav Beck","difficulty":"Hard"},
                    "performance":{"score":5000,"max_score":6000,"combo":12,"max_combo":30}}}}"#;

const IDLE_STATUS: &str = r#"{"msgtype":"status","status":{
    "connection":{"connected_to_beatsaber":true,"current_player":null},
    "current_game":null}}"#;

#[test]
fn test_initial_state() {
    let (mut app, mock, _tx) = create_test_app(None);
    assert_eq!(app.state.screen, Screen::Main);
    assert_eq!(app.state.historian_state, HistorianState::Unconnected);
    assert!(!app.state.player.is_selected());
    assert!(app.take_needs_redraw());
    assert!(!app.take_needs_redraw());
    assert!(mock.requests().is_empty());
}

#[test]
fn test_connect_selects_configured_player() {
    let (mut app, mock, _tx) = create_test_app(Some("joe"));
    connect(&mut app);

    assert_eq!(app.state.historian_state, HistorianState::ConnectedWaiting);
    assert_eq!(mock.requests(), vec!["SelectPlayer(player=joe, request_id=0)"]);
    assert_eq!(app.pending_command, Some(CommandKind::SelectPlayer));

    // Becoming ready is not a new connection.
    app.handle_event(UiEvent::HistorianStateChange {
        old: HistorianState::ConnectedWaiting,
        new: HistorianState::ConnectedReady,
    });
    assert_eq!(mock.requests().len(), 1);
}

#[test]
fn test_connect_without_player_sends_nothing() {
    let (mut app, mock, _tx) = create_test_app(None);
    connect(&mut app);
    assert!(mock.requests().is_empty());
}

#[test]
fn test_reconnect_selects_player_again() {
    let (mut app, mock, _tx) = create_test_app(Some("joe"));
    connect(&mut app);
    app.handle_event(UiEvent::HistorianStateChange {
        old: HistorianState::ConnectedWaiting,
        new: HistorianState::Unconnected,
    });
    connect(&mut app);
    assert_eq!(mock.requests().len(), 2);
}

#[test]
fn test_disconnect_clears_game_connection() {
    let (mut app, _mock, _tx) = create_test_app(None);
    connect(&mut app);
    app.apply_document(&doc(GAME_STATUS));
    assert!(app.state.connected_to_beatsaber);
    assert_eq!(app.state.screen, Screen::Game);

    app.handle_event(UiEvent::HistorianStateChange {
        old: HistorianState::ConnectedReady,
        new: HistorianState::Unconnected,
    });
    assert!(!app.state.connected_to_beatsaber);
    assert_eq!(app.state.screen, Screen::Main);
}

#[test]
fn test_status_with_current_player_fetches_info() {
    let (mut app, mock, _tx) = create_test_app(None);
    let status = r#"{"msgtype":"status","status":{"connection":
        {"connected_to_beatsaber":false,"current_player":"ann"},"current_game":null}}"#;

    app.apply_document(&doc(status));
    assert_eq!(app.state.player.name, "ann");
    assert!(!app.state.connected_to_beatsaber);
    assert_eq!(mock.requests(), vec!["PlayerInfo(player=ann, request_id=0)"]);

    // Same player again does not refetch.
    app.apply_document(&doc(status));
    assert_eq!(mock.requests().len(), 1);
}

#[test]
fn test_top_level_status_layout_accepted() {
    let (mut app, _mock, _tx) = create_test_app(None);
    app.apply_document(&doc(
        r#"{"msgtype":"status","connection":{"connected_to_beatsaber":true},"current_game":null}"#,
    ));
    assert!(app.state.connected_to_beatsaber);
}

#[test]
fn test_player_deselected() {
    let (mut app, _mock, _tx) = create_test_app(None);
    app.apply_document(&doc(
        r#"{"status":{"connection":{"current_player":"ann"}}}"#,
    ));
    app.apply_document(&doc(
        r#"{"status":{"connection":{"current_player":null}}}"#,
    ));
    assert!(!app.state.player.is_selected());
}

#[test]
fn test_game_lifecycle() {
    let (mut app, mock, _tx) = create_test_app(None);
    let playing = GAME_STATUS.replace(r#""current_player":null"#, r#""current_player":"joe""#);
    let idle = IDLE_STATUS.replace(r#""current_player":null"#, r#""current_player":"joe""#);

    app.apply_document(&doc(&playing));
    assert_eq!(app.state.screen, Screen::Game);
    assert_eq!(app.state.player.name, "joe");
    assert_eq!(app.state.current_song.meta.song_title, "Escape");
    assert_eq!(app.state.current_song.performance.score, 5000);

    app.apply_document(&doc(&idle));
    assert_eq!(app.state.screen, Screen::Finish);
    // Finished song stays visible on the finish screen.
    assert_eq!(app.state.current_song.performance.score, 5000);
    assert_eq!(
        mock.requests(),
        vec![
            "PlayerInfo(player=joe, request_id=0)",
            "PlayerInfo(player=joe, request_id=1)",
        ]
    );

    // Idle status on the finish screen keeps it up.
    app.apply_document(&doc(&idle));
    assert_eq!(app.state.screen, Screen::Finish);
    assert_eq!(mock.requests().len(), 2);
}

#[test]
fn test_idle_status_on_main_screen_stays() {
    let (mut app, mock, _tx) = create_test_app(None);
    app.apply_document(&doc(IDLE_STATUS));
    assert_eq!(app.state.screen, Screen::Main);
    assert!(mock.requests().is_empty());
}

#[test]
fn test_finish_screen_times_out() {
    let (mut app, _mock, _tx) = create_test_app(None);
    app.apply_document(&doc(GAME_STATUS));
    app.apply_document(&doc(IDLE_STATUS));
    assert_eq!(app.state.screen, Screen::Finish);

    app.tick(Instant::now());
    assert_eq!(app.state.screen, Screen::Finish);

    app.tick(Instant::now() + FINISH_SCREEN_DURATION + Duration::from_secs(1));
    assert_eq!(app.state.screen, Screen::Main);
}

#[test]
fn test_middle_key_leaves_finish_screen() {
    let (mut app, _mock, _tx) = create_test_app(None);
    app.apply_document(&doc(GAME_STATUS));
    app.handle_event(UiEvent::KeyPress(Key::Middle));
    assert_eq!(app.state.screen, Screen::Game);

    app.apply_document(&doc(IDLE_STATUS));
    app.handle_event(UiEvent::KeyPress(Key::Middle));
    assert_eq!(app.state.screen, Screen::Main);
}

#[test]
fn test_new_game_from_finish_screen() {
    let (mut app, _mock, _tx) = create_test_app(None);
    app.apply_document(&doc(GAME_STATUS));
    app.apply_document(&doc(IDLE_STATUS));
    app.apply_document(&doc(GAME_STATUS));
    assert_eq!(app.state.screen, Screen::Game);
}

#[test]
fn test_player_info_response_applied() {
    let (mut app, mock, _tx) = create_test_app(Some("joe"));
    connect(&mut app);

    mock.push_response(CommandResponse::PlayerInfo {
        request_id: 0,
        result: Ok(doc(
            r#"{"msgtype":"response","player":"joe",
                "today":{"games_played":2,"total_score":100,"total_max_score":200},
                "alltime":{"games_played":9}}"#,
        )),
    });
    app.poll_command_responses();

    assert_eq!(app.pending_command, None);
    assert_eq!(app.state.player.name, "joe");
    assert_eq!(app.state.player.today.games_played, 2);
    assert_eq!(app.state.player.today.percentage(), Some(50.0));
    assert_eq!(app.state.player.alltime.games_played, 9);
}

#[test]
fn test_stale_response_ignored() {
    let (mut app, mock, _tx) = create_test_app(None);
    app.request_status();
    app.request_status();

    mock.push_response(CommandResponse::Status {
        request_id: 0,
        result: Ok(doc(r#"{"msgtype":"response","connection":{"connected_to_beatsaber":true}}"#)),
    });
    app.poll_command_responses();
    assert!(!app.state.connected_to_beatsaber);
    assert_eq!(app.pending_command, Some(CommandKind::FetchStatus));

    mock.push_response(CommandResponse::Status {
        request_id: 1,
        result: Ok(doc(r#"{"msgtype":"response","connection":{"connected_to_beatsaber":true}}"#)),
    });
    app.poll_command_responses();
    assert!(app.state.connected_to_beatsaber);
    assert_eq!(app.pending_command, None);
}

#[test]
fn test_failed_command_sets_error() {
    let (mut app, mock, _tx) = create_test_app(None);
    app.request_status();
    mock.push_response(CommandResponse::Status {
        request_id: 0,
        result: Err(anyhow::anyhow!("Not connected to historian")),
    });
    app.poll_command_responses();

    let error = app.last_error.clone().unwrap();
    assert!(error.contains("Refreshing status failed"));
    assert!(error.contains("Not connected"));
}

#[test]
fn test_error_document_sets_error() {
    let (mut app, _mock, _tx) = create_test_app(None);
    app.apply_document(&doc(r#"{"msgtype":"error","text":"No such command: \"foo\""}"#));
    assert_eq!(
        app.last_error.as_deref(),
        Some("Historian: No such command: \"foo\"")
    );
}

#[test]
fn test_error_clears_after_timeout() {
    let (mut app, _mock, _tx) = create_test_app(None);
    app.set_error("boom");
    app.tick(Instant::now());
    assert!(app.last_error.is_some());
    app.tick(Instant::now() + Duration::from_secs(6));
    assert!(app.last_error.is_none());
}

#[test]
fn test_rejected_request_reports_error() {
    let (tx, rx) = mpsc::channel::<UiEvent>();
    let mock = MockCommandService {
        fail_requests: true,
        ..MockCommandService::default()
    };
    let mut app = App::new(rx, Box::new(mock), None);
    app.request_status();
    assert_eq!(app.pending_command, None);
    assert!(app.last_error.as_deref().unwrap().contains("busy"));
    drop(tx);
}

#[test]
fn test_highscores_applied() {
    let (mut app, _mock, _tx) = create_test_app(None);
    app.apply_document(&doc(
        r#"{"msgtype":"event","highscores":[{"player":"ann","score":10,"most_recent":true}]}"#,
    ));
    assert_eq!(app.state.highscores.entries.len(), 1);
    assert_eq!(app.state.highscores.most_recent_number(), Some(1));
}

#[test]
fn test_poll_events_drains_channel() {
    let (mut app, _mock, tx) = create_test_app(None);
    tx.send(UiEvent::HistorianMessage(doc(GAME_STATUS))).unwrap();
    tx.send(UiEvent::TextInput("x".to_string())).unwrap();
    tx.send(UiEvent::Quit).unwrap();

    app.poll_events();
    assert_eq!(app.state.screen, Screen::Game);
    assert!(app.should_quit);
}

#[test]
fn test_closed_event_channel_quits() {
    let (mut app, _mock, tx) = create_test_app(None);
    drop(tx);
    app.poll_events();
    assert!(app.should_quit);
}

#[test]
fn test_redraw_flag_on_state_change() {
    let (mut app, _mock, _tx) = create_test_app(None);
    app.take_needs_redraw();
    connect(&mut app);
    assert!(app.needs_redraw());
}
