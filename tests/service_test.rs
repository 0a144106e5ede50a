use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use levelbot::config::{FailurePolicy, ServiceConfig};
use levelbot::engine::mock::{MockEngineFactory, MockEvent};
use levelbot::engine::{Completion, CompletionSink, SearchId, SearchOutcome};
use levelbot::handoff::{HandoffError, ResultHandoff};
use levelbot::moves::BestMove;
use levelbot::server;
use levelbot::service::MoveService;

const OPENING_FEN: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2";

fn build(factory: MockEngineFactory) -> (Arc<MockEngineFactory>, Arc<MoveService>) {
    let factory = Arc::new(factory);
    let service = Arc::new(MoveService::new(
        Arc::clone(&factory) as _,
        &ServiceConfig::default(),
    ));
    (factory, service)
}

fn uri(fen: &str, difficulty: &str) -> String {
    let fen = fen.replace(' ', "%20").replace('/', "%2F");
    format!("/?fen={fen}&difficulty={difficulty}")
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn is_square(v: &Value) -> bool {
    v.as_str()
        .map(|s| s.parse::<levelbot::moves::Square>().is_ok())
        .unwrap_or(false)
}

#[tokio::test]
async fn opening_position_returns_move_without_promotion() {
    let (factory, service) = build(MockEngineFactory::new("g1f3"));
    let (status, body) = get(server::router(service), &uri(OPENING_FEN, "0.4")).await;

    assert_eq!(status, StatusCode::OK);
    let result = &body["result"];
    assert!(is_square(&result["from"]));
    assert!(is_square(&result["to"]));
    assert!(result.get("promotion").is_none());
    assert_eq!(result["from"], "g1");
    assert_eq!(result["to"], "f3");

    let events = factory.events();
    assert!(events.contains(&MockEvent::Position {
        model: "elo-999".to_string(),
        fen: OPENING_FEN.to_string(),
    }));
}

#[tokio::test]
async fn promotion_key_present_for_promotions() {
    let (_, service) = build(MockEngineFactory::new("e7e8q"));
    let uri = uri("8/4P3/8/8/8/8/k7/7K w - - 0 1", "0.9");
    let (status, body) = get(server::router(service), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["promotion"], "q");
}

#[tokio::test]
async fn response_is_json() {
    let (_, service) = build(MockEngineFactory::new("e2e4"));
    let response = server::router(service)
        .oneshot(
            Request::builder()
                .uri(uri(OPENING_FEN, "0.5"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["content-type"], "application/json");
}

#[tokio::test]
async fn malformed_difficulty_is_rejected_without_searching() {
    let (factory, service) = build(MockEngineFactory::new("e2e4"));
    let (status, body) = get(server::router(service), &uri(OPENING_FEN, "notanumber")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("result").is_none());
    assert!(body["error"].as_str().unwrap().contains("not a number"));
    assert_eq!(factory.created(), 0);
}

#[tokio::test]
async fn missing_parameters_are_rejected() {
    let (_, service) = build(MockEngineFactory::new("e2e4"));
    let (status, _) = get(server::router(Arc::clone(&service)), "/?difficulty=0.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let no_difficulty = "/?fen=8%2F8%2F8%2F8%2F8%2F8%2F8%2F8%20w%20-%20-%200%201";
    let (status, _) = get(server::router(service), no_difficulty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn no_legal_move_is_unprocessable() {
    let (_, service) = build(MockEngineFactory::new("(none)"));
    let uri = uri("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", "0.5");
    let (status, body) = get(server::router(service), &uri).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn engine_start_failure_is_server_error() {
    let (_, service) = build(MockEngineFactory::new("e2e4").failing_create());
    let (status, body) = get(server::router(Arc::clone(&service)), &uri(OPENING_FEN, "0.5")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("maia-1100.pb"));
    assert!(!service.gate().is_held());
    assert!(!service.handoff().is_armed());
}

#[tokio::test]
async fn search_runs_with_profile_budget() {
    let (factory, service) = build(MockEngineFactory::new("e2e4"));
    service.best_move(OPENING_FEN, 0.8).await.unwrap();

    let expected = service.resolve(0.8).go_params();
    let go = factory
        .events()
        .into_iter()
        .find_map(|e| match e {
            MockEvent::Go { model, params, .. } => Some((model, params)),
            _ => None,
        })
        .unwrap();
    assert_eq!(go, ("elo-2100".to_string(), expected));
}

#[tokio::test]
async fn each_request_starts_a_new_game_before_the_position() {
    let (factory, service) = build(MockEngineFactory::new("e2e4"));
    service.best_move(OPENING_FEN, 0.1).await.unwrap();
    service.best_move(OPENING_FEN, 0.1).await.unwrap();

    let kinds: Vec<&str> = factory
        .events()
        .iter()
        .filter_map(|e| match e {
            MockEvent::NewGame { .. } => Some("new"),
            MockEvent::Position { .. } => Some("pos"),
            MockEvent::Go { .. } => Some("go"),
            MockEvent::Completed { .. } => Some("done"),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, ["new", "pos", "go", "done", "new", "pos", "go", "done"]);
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn concurrent_requests_are_serialized() {
    let (factory, service) =
        build(MockEngineFactory::new("e2e4").with_delay(Duration::from_millis(150)));

    let a = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.best_move(OPENING_FEN, 0.2).await }
    });

    // Let A take the gate and arm its search.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(service.gate().is_held());
    assert!(service.handoff().is_armed());
    let a_search = service.handoff().armed_search().unwrap();

    let b = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.best_move(OPENING_FEN, 0.7).await }
    });

    // B is queued behind the gate; only A's search is armed.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(service.handoff().armed_search(), Some(a_search));

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let order: Vec<(String, &str)> = factory
        .events()
        .into_iter()
        .filter_map(|e| match e {
            MockEvent::Go { model, .. } => Some((model, "go")),
            MockEvent::Completed { model, .. } => Some((model, "done")),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec![
            ("elo-416".to_string(), "go"),
            ("elo-416".to_string(), "done"),
            ("maia-1900.pb".to_string(), "go"),
            ("maia-1900.pb".to_string(), "done"),
        ]
    );
    assert!(!service.gate().is_held());
    assert!(!service.handoff().is_armed());
}

#[tokio::test]
async fn abandoned_request_still_finishes_before_the_next() {
    let (factory, service) =
        build(MockEngineFactory::new("e2e4").with_delay(Duration::from_millis(300)));

    let abandoned = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.best_move(OPENING_FEN, 0.2).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(service.handoff().is_armed());
    abandoned.abort();
    assert!(abandoned.await.unwrap_err().is_cancelled());

    // The search outlives its caller and keeps the gate until it is answered.
    assert!(service.gate().is_held());
    assert!(service.handoff().is_armed());

    let next = service.best_move(OPENING_FEN, 0.7).await.unwrap();
    assert_eq!(next, BestMove::from_uci("e2e4").unwrap());
    assert!(!service.gate().is_held());
    assert!(!service.handoff().is_armed());

    let order: Vec<(String, &str)> = factory
        .events()
        .into_iter()
        .filter_map(|e| match e {
            MockEvent::Go { model, .. } => Some((model, "go")),
            MockEvent::Completed { model, .. } => Some((model, "done")),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec![
            ("elo-416".to_string(), "go"),
            ("elo-416".to_string(), "done"),
            ("maia-1900.pb".to_string(), "go"),
            ("maia-1900.pb".to_string(), "done"),
        ]
    );
}

#[tokio::test]
async fn many_concurrent_requests_all_complete() {
    let (factory, service) =
        build(MockEngineFactory::new("d2d4").with_delay(Duration::from_millis(5)));

    let requests = (0..8).map(|i| {
        let service = Arc::clone(&service);
        async move { service.best_move(OPENING_FEN, i as f64 / 8.0).await }
    });
    let results = futures::future::join_all(requests).await;

    for result in results {
        assert_eq!(result.unwrap(), BestMove::from_uci("d2d4").unwrap());
    }

    // Go/Completed strictly alternate.
    let mut armed = false;
    for event in factory.events() {
        match event {
            MockEvent::Go { .. } => {
                assert!(!armed, "two searches in flight");
                armed = true;
            }
            MockEvent::Completed { .. } => {
                assert!(armed);
                armed = false;
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn preload_creates_every_model_once() {
    let (factory, service) = build(MockEngineFactory::new("e2e4"));
    service.preload().await.unwrap();

    assert_eq!(factory.created(), 10);
    assert_eq!(service.loaded_models().await.len(), 10);

    service.best_move(OPENING_FEN, 0.33).await.unwrap();
    assert_eq!(factory.created(), 10);

    let new_games = factory
        .events()
        .iter()
        .filter(|e| matches!(e, MockEvent::NewGame { .. }))
        .count();
    assert_eq!(new_games, 11);
}

#[tokio::test]
async fn completion_with_nothing_pending_is_detected() {
    let handoff = Arc::new(ResultHandoff::new());
    let sink = CompletionSink::new(Arc::clone(&handoff), FailurePolicy::Respond);

    let err = sink
        .deliver(Completion {
            search: Some(SearchId(1)),
            outcome: SearchOutcome::BestMove(BestMove::from_uci("e2e4").unwrap()),
        })
        .unwrap_err();

    assert_eq!(err, HandoffError::NotArmed { got: Some(SearchId(1)) });
    assert!(err.is_violation());
    assert!(!handoff.is_armed());
}

#[tokio::test]
async fn stray_completion_fails_the_waiting_request() {
    let handoff = Arc::new(ResultHandoff::new());
    let sink = CompletionSink::new(Arc::clone(&handoff), FailurePolicy::Respond);
    let pending = handoff.arm().unwrap();

    let stray = sink.deliver(Completion {
        search: None,
        outcome: SearchOutcome::NoLegalMove,
    });
    assert!(stray.is_err());
    assert!(matches!(
        pending.wait().await,
        Err(HandoffError::Mismatch { got: None, .. })
    ));
}
