//! WebSocket capture monitor.
//!
//! The client streams preview frames as binary messages. Each frame is
//! classified by the presence oracle and fed to the session engine; the
//! engine's actions drive status messages, the settle timer, and capture
//! requests. Each capture request (`"capture"` text message) is answered
//! by one binary high-resolution frame, which is persisted as a new page;
//! the engine tracks how many such frames are outstanding.

use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use tokio::time::Instant;

use crate::capture::{CapturePipeline, SessionAction, SessionEngine};

use super::AppState;

pub async fn monitor(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_monitor(socket, state))
}

async fn handle_monitor(mut socket: WebSocket, state: AppState) {
    let mut engine = SessionEngine::new(state.settings.max_captures);
    let pipeline = CapturePipeline::new(state.deck.clone());
    let settle = Duration::from_millis(state.settings.settle_delay_ms);

    let mut settle_deadline: Option<Instant> = None;

    tracing::info!("capture monitor session started");

    loop {
        tokio::select! {
            _ = sleep_until_opt(settle_deadline), if settle_deadline.is_some() => {
                settle_deadline = None;
                let actions = engine.on_settle_elapsed();
                if execute_actions(&mut socket, actions, &mut settle_deadline, settle)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else { break };
                match message {
                    Message::Binary(bytes) => {
                        if engine.take_pending_hires() {
                            let done = handle_capture(
                                &mut socket,
                                &mut engine,
                                &pipeline,
                                bytes.to_vec(),
                            )
                            .await;
                            if done {
                                break;
                            }
                        } else {
                            let hand_present = match state.oracle.detect(&bytes).await {
                                Ok(present) => present,
                                Err(e) => {
                                    tracing::warn!("presence detection failed: {}", e);
                                    continue;
                                }
                            };
                            let actions = engine.on_frame(hand_present);
                            if execute_actions(&mut socket, actions, &mut settle_deadline, settle)
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    tracing::info!(
        "capture monitor session ended after {} captures",
        engine.captures_taken()
    );
}

/// Awaitable settle timer; only polled when a deadline is armed.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Carry out the engine's actions over the socket.
async fn execute_actions(
    socket: &mut WebSocket,
    actions: Vec<SessionAction>,
    settle_deadline: &mut Option<Instant>,
    settle: Duration,
) -> Result<(), axum::Error> {
    for action in actions {
        match action {
            SessionAction::Notify(text) => {
                socket.send(Message::Text(text)).await?;
            }
            SessionAction::ArmSettleTimer => {
                *settle_deadline = Some(Instant::now() + settle);
            }
            SessionAction::RequestCapture => {
                socket.send(Message::Text("capture".to_string())).await?;
            }
        }
    }
    Ok(())
}

/// Persist one high-resolution frame. Returns true when the session is
/// over (quota reached or the socket failed).
async fn handle_capture(
    socket: &mut WebSocket,
    engine: &mut SessionEngine,
    pipeline: &CapturePipeline,
    frame: Vec<u8>,
) -> bool {
    match pipeline.capture(Some(frame)).await {
        Ok(page) => {
            engine.on_capture_complete(true);
            let message = format!("captured {}", page.content_ref);
            if socket.send(Message::Text(message)).await.is_err() {
                return true;
            }
        }
        Err(e) => {
            engine.on_capture_complete(false);
            tracing::warn!("capture failed: {}", e);
            let message = format!("capture failed: {}", e);
            if socket.send(Message::Text(message)).await.is_err() {
                return true;
            }
        }
    }

    if engine.quota_reached() {
        let _ = socket
            .send(Message::Text("capture limit reached".to_string()))
            .await;
        let _ = socket.send(Message::Close(None)).await;
        return true;
    }
    false
}
