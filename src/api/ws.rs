/// WebSocket endpoint for live workflow updates
///
/// Each connection registers one observer with the notification hub and
/// forwards its push messages to the client until either side closes.

use crate::api::workflows::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

/// Connection parameters
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub workflow_id: Option<String>,
    pub client_id: Option<String>,
}

pub fn create_ws_routes() -> Router<AppState> {
    Router::new().route("/api/v1/workflows/ws", get(workflow_updates))
}

/// GET /api/v1/workflows/ws?workflow_id=...&client_id=...
async fn workflow_updates(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(workflow_id) = params.workflow_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "workflow_id query parameter is required").into_response();
    };
    let client_id = params
        .client_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "anonymous".to_string());

    ws.on_upgrade(move |socket| handle_socket(socket, state, workflow_id, client_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, workflow_id: String, client_id: String) {
    let hub = state.manager.hub().clone();
    let mut subscription = hub.register(&workflow_id, &client_id);
    let observer_id = subscription.id;
    let (mut sink, mut stream) = socket.split();

    // write pump: drains the observer queue until the hub closes it
    let mut writer = tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            if let Err(e) = sink.send(Message::Text(message.into())).await {
                tracing::debug!("WebSocket write failed for observer {}: {}", observer_id, e);
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // read pump: only watches for the client going away
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!("WebSocket read error for observer {}: {}", observer_id, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
            _ = &mut writer => break,
        }
    }

    hub.unregister(observer_id);
    writer.abort();
}
