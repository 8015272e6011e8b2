use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use pester_core::config::TriggerConfig;
use pester_core::engine::EngineSnapshot;
use pester_core::events::{ActionKind, Event};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{info, warn};

/// Task that keeps the current snapshot updated from the watch channel.
/// This allows async handlers to read the latest snapshot without blocking.
pub async fn start_snapshot_task(
    mut state_rx: watch::Receiver<EngineSnapshot>,
    current_snapshot: Arc<RwLock<EngineSnapshot>>,
) {
    loop {
        if state_rx.changed().await.is_err() {
            break;
        }

        let snapshot = state_rx.borrow().clone();
        *current_snapshot.write().await = snapshot;
    }
}

#[derive(Clone)]
pub struct AppState {
    pub event_tx: mpsc::Sender<Event>,
    pub current_snapshot: Arc<RwLock<EngineSnapshot>>,
    pub shutdown_tx: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub kind: ActionKind,
}

pub fn create_router(
    event_tx: mpsc::Sender<Event>,
    current_snapshot: Arc<RwLock<EngineSnapshot>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
) -> Router {
    let state = AppState {
        event_tx,
        current_snapshot,
        shutdown_tx,
    };
    Router::new()
        .route("/health", get(health))
        .route("/state", get(get_state))
        .route("/trigger", post(trigger))
        .route("/reload", post(reload))
        .route("/panic", post(panic_switch))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    "ok"
}

#[axum::debug_handler]
async fn get_state(State(app_state): State<AppState>) -> impl IntoResponse {
    let snapshot = app_state.current_snapshot.read().await.clone();
    Json(snapshot)
}

async fn trigger(
    State(app_state): State<AppState>,
    Json(req): Json<TriggerRequest>,
) -> impl IntoResponse {
    send_event(&app_state, Event::Trigger { kind: req.kind }).await
}

async fn reload(
    State(app_state): State<AppState>,
    Json(config): Json<TriggerConfig>,
) -> impl IntoResponse {
    if let Err(e) = config.validate() {
        return (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response();
    }
    send_event(&app_state, Event::Reload(config)).await
}

/// Stops all triggers and asks the process to exit.
async fn panic_switch(State(app_state): State<AppState>) -> impl IntoResponse {
    info!("Panic requested over API");
    let response = send_event(&app_state, Event::Panic).await;
    if app_state.shutdown_tx.send(true).is_err() {
        warn!("Shutdown listener already gone");
    }
    response
}

async fn send_event(app_state: &AppState, event: Event) -> axum::response::Response {
    match app_state.event_tx.send(event).await {
        Ok(_) => (StatusCode::OK, "Event sent").into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to send event: channel closed",
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pester_core::engine::TriggerEngine;

    fn app_state() -> (AppState, mpsc::Receiver<Event>, watch::Receiver<bool>) {
        let (event_tx, event_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let snapshot = TriggerEngine::new(TriggerConfig::default(), Some(0))
            .unwrap()
            .get_snapshot();
        let state = AppState {
            event_tx,
            current_snapshot: Arc::new(RwLock::new(snapshot)),
            shutdown_tx: Arc::new(shutdown_tx),
        };
        (state, event_rx, shutdown_rx)
    }

    #[test]
    fn test_trigger_request_parses_lowercase_kind() {
        let req: TriggerRequest = serde_json::from_str(r#"{"kind":"subliminal"}"#).unwrap();
        assert_eq!(req.kind, ActionKind::Subliminal);
        assert!(serde_json::from_str::<TriggerRequest>(r#"{"kind":"explode"}"#).is_err());
    }

    #[tokio::test]
    async fn test_trigger_handler_forwards_kind() {
        let (state, mut event_rx, _shutdown_rx) = app_state();
        let response = trigger(
            State(state),
            Json(TriggerRequest {
                kind: ActionKind::Web,
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            event_rx.recv().await,
            Some(Event::Trigger {
                kind: ActionKind::Web
            })
        );
    }

    #[tokio::test]
    async fn test_reload_handler_forwards_valid_config() {
        let (state, mut event_rx, _shutdown_rx) = app_state();
        let config: TriggerConfig =
            serde_json::from_str(r#"{"delay_ms": 50, "video_chance": 30}"#).unwrap();

        let response = reload(State(state), Json(config.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(event_rx.recv().await, Some(Event::Reload(config)));
    }

    #[tokio::test]
    async fn test_reload_handler_rejects_invalid_config() {
        let (state, mut event_rx, _shutdown_rx) = app_state();
        let config = TriggerConfig {
            web_chance: 250,
            ..TriggerConfig::default()
        };

        let response = reload(State(state), Json(config)).await.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        // Nothing reaches the engine
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_panic_handler_sends_event_and_shutdown() {
        let (state, mut event_rx, shutdown_rx) = app_state();

        let response = panic_switch(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(event_rx.recv().await, Some(Event::Panic));
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_send_event_reports_closed_channel() {
        let (state, event_rx, _shutdown_rx) = app_state();
        drop(event_rx);

        let response = send_event(&state, Event::Panic).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
