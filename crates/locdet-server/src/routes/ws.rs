//! WebSocket endpoint for real-time job progress.
//!
//! Clients subscribe to job ids over one connection; pipeline events arrive
//! on the broadcast bus and are forwarded to connections subscribed to that
//! job. Malformed frames get an `error` message, never a disconnect.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use locdet_core::error::DetectError;

use crate::events::{ClientMessage, JobEvent, ServerMessage, ALLOWED_CLIENT_MESSAGE_TYPES};
use crate::state::{with_store, AppState};

/// GET /api/v1/ws — upgrade to the progress WebSocket.
pub async fn ws_handler(State(app): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(app, socket))
}

async fn handle_socket(app: AppState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = app.event_tx.subscribe();
    let mut subscriptions: HashSet<String> = HashSet::new();

    tracing::info!("websocket connection established");

    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_frame(&app, &mut subscriptions, text.as_str()).await {
                            if send_message(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(JobEvent { job_id, message }) => {
                        if subscriptions.contains(&job_id)
                            && send_message(&mut sender, &message).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "websocket receiver lagged behind event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::info!(
        subscriptions = subscriptions.len(),
        "websocket connection closed"
    );
}

async fn send_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), ()> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize websocket message");
            return Ok(());
        }
    };
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|_| ())
}

/// Process one client frame, returning the reply to send (if any).
async fn handle_client_frame(
    app: &AppState,
    subscriptions: &mut HashSet<String>,
    text: &str,
) -> Option<ServerMessage> {
    if text.trim().is_empty() {
        return Some(ServerMessage::error("Empty message body", None));
    }

    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return Some(ServerMessage::error("Invalid JSON format", None)),
    };

    let message: ClientMessage = match serde_json::from_value(value.clone()) {
        Ok(message) => message,
        Err(_) => {
            let received = value
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or_default();
            return Some(ServerMessage::error(
                format!("Unknown message type: {received}"),
                Some(serde_json::json!({
                    "received_type": received,
                    "allowed_types": ALLOWED_CLIENT_MESSAGE_TYPES,
                })),
            ));
        }
    };

    match message {
        ClientMessage::Subscribe { job_id } => {
            let lookup = {
                let id = job_id.clone();
                with_store(app.store.clone(), move |s| s.get_job(&id)).await
            };
            match lookup {
                Ok(job) => {
                    subscriptions.insert(job_id.clone());
                    tracing::info!(job_id = %job_id, "connection subscribed to job");
                    Some(ServerMessage::subscribed(&job))
                }
                Err(DetectError::JobNotFound(_)) => Some(ServerMessage::error(
                    format!("Job not found: {job_id}"),
                    Some(serde_json::json!({ "job_id": job_id })),
                )),
                Err(err) => {
                    tracing::error!(job_id = %job_id, error = %err, "subscribe failed");
                    Some(ServerMessage::error("Failed to subscribe to job updates", None))
                }
            }
        }
        ClientMessage::CancelJob { job_id } => {
            let cancelled = {
                let id = job_id.clone();
                with_store(app.store.clone(), move |s| s.cancel_job(&id)).await
            };
            match cancelled {
                Ok(_) => {
                    tracing::info!(job_id = %job_id, "job cancelled via websocket");
                    // Other subscribers learn about the cancellation too.
                    app.publish(JobEvent::new(
                        job_id.clone(),
                        ServerMessage::job_cancelled(&job_id),
                    ));
                    Some(ServerMessage::job_cancelled(&job_id))
                }
                Err(err) => Some(ServerMessage::error(
                    format!("Failed to cancel job: {err}"),
                    Some(serde_json::json!({ "job_id": job_id })),
                )),
            }
        }
        ClientMessage::RequestStatus { job_id } => {
            let lookup = {
                let id = job_id.clone();
                with_store(app.store.clone(), move |s| s.get_job(&id)).await
            };
            match lookup {
                Ok(job) => Some(ServerMessage::job_status(&job)),
                Err(err) => Some(ServerMessage::error(
                    format!("Failed to get job status: {err}"),
                    Some(serde_json::json!({ "job_id": job_id })),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locdet_core::config::Config;
    use locdet_core::job::Job;

    async fn test_app() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::TempDir::new().unwrap();
        let app = AppState::new(dir.path().to_path_buf(), Config::new("locdet")).unwrap();
        (dir, app)
    }

    #[tokio::test]
    async fn empty_frame_gets_error() {
        let (_dir, app) = test_app().await;
        let mut subs = HashSet::new();
        let reply = handle_client_frame(&app, &mut subs, "  ").await.unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "Empty message body");
    }

    #[tokio::test]
    async fn invalid_json_gets_error() {
        let (_dir, app) = test_app().await;
        let mut subs = HashSet::new();
        let reply = handle_client_frame(&app, &mut subs, "{nope").await.unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["message"], "Invalid JSON format");
    }

    #[tokio::test]
    async fn unknown_type_lists_allowed_types() {
        let (_dir, app) = test_app().await;
        let mut subs = HashSet::new();
        let reply = handle_client_frame(&app, &mut subs, r#"{"type":"teleport"}"#)
            .await
            .unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["details"]["received_type"], "teleport");
        assert_eq!(json["details"]["allowed_types"][0], "subscribe");
    }

    #[tokio::test]
    async fn subscribe_unknown_job_gets_error() {
        let (_dir, app) = test_app().await;
        let mut subs = HashSet::new();
        let reply = handle_client_frame(
            &app,
            &mut subs,
            r#"{"type":"subscribe","job_id":"job_missing"}"#,
        )
        .await
        .unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "error");
        assert!(subs.is_empty());
    }

    #[tokio::test]
    async fn subscribe_known_job_registers_subscription() {
        let (_dir, app) = test_app().await;
        let job = Job::new("png");
        app.store.put_job(&job).unwrap();

        let mut subs = HashSet::new();
        let frame = format!(r#"{{"type":"subscribe","job_id":"{}"}}"#, job.job_id);
        let reply = handle_client_frame(&app, &mut subs, &frame).await.unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "subscribed");
        assert_eq!(json["job_status"], "pending");
        assert!(subs.contains(&job.job_id));
    }

    #[tokio::test]
    async fn cancel_via_ws_cancels_and_replies() {
        let (_dir, app) = test_app().await;
        let job = Job::new("png");
        app.store.put_job(&job).unwrap();

        let mut subs = HashSet::new();
        let frame = format!(r#"{{"type":"cancel_job","job_id":"{}"}}"#, job.job_id);
        let reply = handle_client_frame(&app, &mut subs, &frame).await.unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "job_cancelled");
        assert_eq!(
            app.store.get_job(&job.job_id).unwrap().status,
            locdet_core::job::JobStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn request_status_returns_job_fields() {
        let (_dir, app) = test_app().await;
        let job = Job::new("pdf");
        app.store.put_job(&job).unwrap();

        let mut subs = HashSet::new();
        let frame = format!(r#"{{"type":"request_status","job_id":"{}"}}"#, job.job_id);
        let reply = handle_client_frame(&app, &mut subs, &frame).await.unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "job_status");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["blueprint_format"], "pdf");
    }
}
