//! HTTP upgrade endpoint for the distributed WebSocket hub.
//!
//! Mounted by `ServiceBuilder::build()` at `config.wsc.path` once the `wsc`
//! feature toggle is on. Everything authoritative lives in the
//! [`WsHub`](super::WsHub) agent; this module only does the handshake,
//! spawns the per-connection send/receive tasks, and forwards frames as
//! hub messages.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

use crate::state::AppState;
use crate::websocket::hub::{
    ClientHeartbeat, ClientId, DrainOffline, GetHubStats, HubConnection, HubMessage, HubStats,
    RegisterConnection, RouteMessage, RouteTarget, UnregisterConnection,
};

/// Inbound wire frame. The hub's own `HubMessage` carries a live
/// `axum::extract::ws::Message` payload and can't round-trip through JSON,
/// so the wire shape is this smaller DTO; `content` is forwarded verbatim
/// as a text frame payload to whoever receives it.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    ticket_id: Option<String>,
    content: serde_json::Value,
}

fn extract_param(params: &HashMap<String, String>, headers: &HeaderMap, query_key: &str, header_name: &str) -> Option<String> {
    params
        .get(query_key)
        .cloned()
        .or_else(|| headers.get(header_name).and_then(|v| v.to_str().ok()).map(str::to_string))
}

fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok()) {
        Some(origin) => allowed.iter().any(|a| a == origin),
        None => false,
    }
}

/// Upgrade an HTTP request into a registered WebSocket connection.
///
/// Follows the spec's four-step handshake: Origin check, load-gated
/// admission (503 when the hub reports `over_loaded()`), then the actual
/// `axum` upgrade, then registration with the hub.
pub async fn ws_upgrade_handler<T>(
    State(state): State<AppState<T>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    let Some(hub) = state.ws_hub().cloned() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "WebSocket hub not running").into_response();
    };

    if !origin_allowed(&headers, &state.config().wsc.allowed_origins) {
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    let stats = match hub.send_and_wait::<GetHubStats, HubStats>().await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!(error = %e, "failed to query hub stats before admission");
            return (StatusCode::SERVICE_UNAVAILABLE, "Hub unavailable").into_response();
        }
    };
    if stats.over_loaded() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Hub is overloaded").into_response();
    }

    let user_id = extract_param(&params, &headers, "user_id", "X-User-Id");
    let user_type = extract_param(&params, &headers, "user_type", "X-User-Type");
    let is_agent = matches!(user_type.as_deref(), Some("agent") | Some("bot"));

    ws.on_upgrade(move |socket| handle_socket(socket, hub, user_id, is_agent))
}

async fn handle_socket(
    socket: WebSocket,
    hub: crate::websocket::SharedWsHub,
    user_id: Option<String>,
    is_agent: bool,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let client_id = ClientId::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Message>(32);

    let mut connection = HubConnection::new(client_id, tx);
    if is_agent {
        connection = connection.agent();
    }
    connection.user_id = user_id.clone();

    hub.send(RegisterConnection { connection }).await;

    if let Some(ref uid) = user_id {
        hub.send(DrainOffline {
            user_id: uid.clone(),
            client_id,
        })
        .await;
    }

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        let Ok(msg) = result else { break };

        hub.send(ClientHeartbeat { client_id }).await;

        match msg {
            Message::Text(text) => {
                if let Ok(frame) = serde_json::from_str::<InboundFrame>(&text) {
                    let payload = Message::Text(frame.content.to_string().into());
                    let message = HubMessage::new(Some(client_id), payload);
                    let target = match (frame.to, frame.ticket_id) {
                        (Some(to), _) => RouteTarget::User(to),
                        (None, Some(ticket)) => RouteTarget::Ticket(ticket),
                        (None, None) => RouteTarget::All,
                    };
                    hub.send(RouteMessage { target, message }).await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    hub.send(UnregisterConnection { client_id }).await;
    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn origin_allowed_with_empty_list_allows_everything() {
        let headers = HeaderMap::new();
        assert!(origin_allowed(&headers, &[]));
    }

    #[test]
    fn origin_allowed_rejects_missing_header_when_list_nonempty() {
        let headers = HeaderMap::new();
        assert!(!origin_allowed(&headers, &["https://example.com".to_string()]));
    }

    #[test]
    fn origin_allowed_matches_listed_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::ORIGIN,
            HeaderValue::from_static("https://example.com"),
        );
        assert!(origin_allowed(&headers, &["https://example.com".to_string()]));
    }

    #[test]
    fn origin_allowed_rejects_unlisted_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::ORIGIN,
            HeaderValue::from_static("https://evil.example"),
        );
        assert!(!origin_allowed(&headers, &["https://example.com".to_string()]));
    }

    #[test]
    fn extract_param_prefers_query_over_header() {
        let mut params = HashMap::new();
        params.insert("user_id".to_string(), "from-query".to_string());
        let mut headers = HeaderMap::new();
        headers.insert("X-User-Id", HeaderValue::from_static("from-header"));

        assert_eq!(
            extract_param(&params, &headers, "user_id", "X-User-Id"),
            Some("from-query".to_string())
        );
    }

    #[test]
    fn extract_param_falls_back_to_header() {
        let params = HashMap::new();
        let mut headers = HeaderMap::new();
        headers.insert("X-User-Id", HeaderValue::from_static("from-header"));

        assert_eq!(
            extract_param(&params, &headers, "user_id", "X-User-Id"),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn extract_param_returns_none_when_absent() {
        let params = HashMap::new();
        let headers = HeaderMap::new();
        assert_eq!(extract_param(&params, &headers, "user_id", "X-User-Id"), None);
    }

    #[test]
    fn inbound_frame_routes_by_to_then_ticket_then_all() {
        let to_frame: InboundFrame =
            serde_json::from_str(r#"{"to":"alice","content":"hi"}"#).unwrap();
        assert_eq!(to_frame.to.as_deref(), Some("alice"));

        let ticket_frame: InboundFrame =
            serde_json::from_str(r#"{"ticket_id":"t-1","content":"hi"}"#).unwrap();
        assert_eq!(ticket_frame.to, None);
        assert_eq!(ticket_frame.ticket_id.as_deref(), Some("t-1"));

        let broadcast_frame: InboundFrame = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(broadcast_frame.to, None);
        assert_eq!(broadcast_frame.ticket_id, None);
    }
}
