use std::{sync::Arc, time::Duration};

use live_quiz_back::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, memory::MemoryGameStore},
        quiz_catalog::QuizCatalog,
    },
    dto::ws::{ClientMessage, ServerMessage},
    services::{persistence, session_service},
    state::{AppState, SharedState, identity::ConnectionId},
};
use serde_json::{Value, json};
use tokio::{sync::mpsc::UnboundedReceiver, time::sleep};

const CATALOG: &str = r#"[
    {
        "title": "Geography",
        "questions": [
            {"question": "Capital of France?", "answers": ["Paris", "Rome", "Oslo", "Bern"], "correct": 0},
            {"question": "Capital of Italy?", "answers": ["Paris", "Rome", "Oslo", "Bern"], "correct": 1}
        ]
    }
]"#;

struct Client {
    id: ConnectionId,
    rx: UnboundedReceiver<ServerMessage>,
}

impl Client {
    fn connect(state: &SharedState) -> Self {
        let (id, rx) = state.connections().register();
        Self { id, rx }
    }

    async fn send(&self, state: &SharedState, frame: Value) {
        let message = ClientMessage::from_json_str(&frame.to_string()).unwrap();
        session_service::handle_client_message(state, self.id, message).await;
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }
}

fn app() -> SharedState {
    let catalog = QuizCatalog::from_json(CATALOG, Duration::from_secs(20)).unwrap();
    AppState::new(AppConfig::default(), catalog)
}

async fn create_game(state: &SharedState, host: &mut Client) -> String {
    host.send(state, json!({"event": "create_game", "data": {"quiz_id": 0}}))
        .await;
    match host.drain().as_slice() {
        [ServerMessage::GameCreated(created)] => {
            assert_eq!(created.quiz_title, "Geography");
            assert_eq!(created.question_count, 2);
            created.code.clone()
        }
        other => panic!("unexpected frames {other:?}"),
    }
}

async fn join(state: &SharedState, player: &Client, code: &str, name: &str) {
    player
        .send(
            state,
            json!({"event": "join_game", "data": {"code": code, "name": name}}),
        )
        .await;
}

async fn answer(state: &SharedState, player: &Client, code: &str, option: usize) {
    player
        .send(
            state,
            json!({"event": "submit_answer", "data": {"code": code, "answer": option}}),
        )
        .await;
}

fn results(frames: &[ServerMessage]) -> Vec<(String, bool, u32, u32)> {
    frames
        .iter()
        .find_map(|frame| match frame {
            ServerMessage::ShowResults(payload) => Some(
                payload
                    .results
                    .iter()
                    .map(|row| (row.name.clone(), row.correct, row.score_gained, row.total_score))
                    .collect(),
            ),
            _ => None,
        })
        .expect("show_results frame")
}

#[tokio::test(start_paused = true)]
async fn two_player_game_runs_to_the_final_leaderboard() {
    let state = app();
    let mut host = Client::connect(&state);
    let mut ada = Client::connect(&state);
    let mut bob = Client::connect(&state);

    let code = create_game(&state, &mut host).await;
    join(&state, &ada, &code, "Ada").await;
    join(&state, &bob, &code, "Bob").await;
    host.send(&state, json!({"event": "start_game", "data": {"code": code}}))
        .await;

    // Countdown (3s) then reading (3s) open the first question at t=6s.
    sleep(Duration::from_secs(7)).await;
    assert!(
        ada.drain()
            .iter()
            .any(|frame| matches!(frame, ServerMessage::ShowAnswers(_)))
    );
    answer(&state, &ada, &code, 0).await;
    sleep(Duration::from_secs(4)).await;
    answer(&state, &bob, &code, 0).await;

    let first = results(&host.drain());
    assert_eq!(
        first,
        vec![
            ("Ada".to_string(), true, 975, 975),
            ("Bob".to_string(), true, 875, 875),
        ]
    );
    let bob_result = bob
        .drain()
        .into_iter()
        .find_map(|frame| match frame {
            ServerMessage::YourResult(result) => Some(result),
            _ => None,
        })
        .expect("your_result frame");
    assert_eq!((bob_result.rank, bob_result.total_players), (2, 2));
    assert_eq!(bob_result.streak, 1);

    host.send(
        &state,
        json!({"event": "next_question_request", "data": {"code": code}}),
    )
    .await;
    sleep(Duration::from_secs(4)).await;
    answer(&state, &ada, &code, 1).await;
    host.send(&state, json!({"event": "time_up", "data": {"code": code}}))
        .await;

    let second = results(&host.drain());
    assert_eq!(
        second,
        vec![
            ("Ada".to_string(), true, 1075, 2050),
            ("Bob".to_string(), false, 0, 875),
        ]
    );
    let bob_result = bob
        .drain()
        .into_iter()
        .find_map(|frame| match frame {
            ServerMessage::YourResult(result) => Some(result),
            _ => None,
        })
        .expect("your_result frame");
    assert_eq!(bob_result.streak, 0);
    assert_eq!(bob_result.total_score, 875);

    host.send(
        &state,
        json!({"event": "next_question_request", "data": {"code": code}}),
    )
    .await;
    let ended = ada
        .drain()
        .into_iter()
        .find_map(|frame| match frame {
            ServerMessage::GameEnded(payload) => Some(payload),
            _ => None,
        })
        .expect("game_ended frame");
    assert_eq!(ended.reason, None);
    let board: Vec<(String, u32)> = ended
        .leaderboard
        .into_iter()
        .map(|row| (row.name, row.score))
        .collect();
    assert_eq!(board, vec![("Ada".into(), 2050), ("Bob".into(), 875)]);

    // Ended sessions stay registered until the sweeper removes them.
    assert!(state.sessions().get(&code).is_some());
}

#[tokio::test(start_paused = true)]
async fn player_recovers_score_and_answer_after_dropping_mid_question() {
    let state = app();
    let mut host = Client::connect(&state);
    let ada = Client::connect(&state);
    let bob = Client::connect(&state);

    let code = create_game(&state, &mut host).await;
    join(&state, &ada, &code, "Ada").await;
    join(&state, &bob, &code, "Bob").await;
    host.send(&state, json!({"event": "start_game", "data": {"code": code}}))
        .await;
    sleep(Duration::from_secs(7)).await;
    answer(&state, &ada, &code, 0).await;

    session_service::handle_disconnect(&state, ada.id).await;
    let mut ada_again = Client::connect(&state);
    join(&state, &ada_again, &code, "ada").await;

    let frames = ada_again.drain();
    assert!(
        frames
            .iter()
            .any(|frame| matches!(frame, ServerMessage::ReconnectedPlayer(_)))
    );
    assert!(frames.iter().any(|frame| matches!(
        frame,
        ServerMessage::AnswerReceived(received) if received.answer == 0
    )));

    // A second answer after recovery is ignored; the first one is scored.
    answer(&state, &ada_again, &code, 2).await;
    answer(&state, &bob, &code, 1).await;
    let scored = results(&host.drain());
    assert_eq!(scored[0], ("Ada".to_string(), true, 975, 975));
}

#[tokio::test]
async fn host_socket_cannot_also_join_as_a_player() {
    let state = app();
    let mut host = Client::connect(&state);
    let code = create_game(&state, &mut host).await;

    join(&state, &host, &code, "Sneaky").await;
    assert!(matches!(
        host.drain().as_slice(),
        [ServerMessage::Error(payload)] if payload.message == "This connection is already part of the game"
    ));

    session_service::handle_disconnect(&state, host.id).await;
    let handle = state.sessions().get(&code).unwrap();
    let session = handle.session().lock().await;
    assert_eq!(session.roster_len(), 0);
    assert!(session.is_host_disconnected());
}

#[tokio::test]
async fn malformed_frames_are_rejected_before_reaching_a_session() {
    let state = app();
    assert!(ClientMessage::from_json_str(r#"{"event": "dance", "data": {}}"#).is_err());
    assert!(
        ClientMessage::from_json_str(
            r#"{"event": "join_game", "data": {"code": "ABC234", "name": ""}}"#
        )
        .is_err()
    );
    assert!(state.sessions().is_empty());
}

#[tokio::test]
async fn stored_game_is_restored_when_its_host_returns() {
    let state = app();
    let store = MemoryGameStore::new();
    state.install_game_store(Arc::new(store.clone())).await;
    tokio::spawn(persistence::run_worker(state.clone()));

    let mut host = Client::connect(&state);
    let ada = Client::connect(&state);
    let code = create_game(&state, &mut host).await;
    join(&state, &ada, &code, "Ada").await;

    for _ in 0..100 {
        if !store.list_players(code.clone()).await.unwrap().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(store.find_game(code.clone()).await.unwrap().is_some());

    // Simulate a restart: the in-memory session is gone, the stored one is not.
    let handle = state.sessions().get(&code).unwrap();
    assert!(state.sessions().remove(&handle));
    drop(handle);

    let mut new_host = Client::connect(&state);
    new_host
        .send(
            &state,
            json!({"event": "reconnect_host", "data": {"code": code}}),
        )
        .await;
    let snapshot = new_host
        .drain()
        .into_iter()
        .find_map(|frame| match frame {
            ServerMessage::ReconnectedHost(snapshot) => Some(snapshot),
            _ => None,
        })
        .expect("reconnected_host frame");
    assert_eq!(snapshot.code, code);
    assert_eq!(snapshot.players.len(), 1);

    let restored = state.sessions().get(&code).unwrap();
    let session = restored.session().lock().await;
    assert!(!session.is_host_disconnected());
    assert!(!session.player("Ada").unwrap().connected);
}
