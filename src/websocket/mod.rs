//! Distributed WebSocket hub for acton-service
//!
//! WebSocket connections upgrade from HTTP on the same port as REST and
//! gRPC traffic. Everything authoritative - connection registry, user/ticket
//! routing, channel membership, cross-node presence - lives in the [`WsHub`]
//! actor; [`ws_upgrade_handler`] is the HTTP-side handshake that registers a
//! socket with it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use acton_service::prelude::*;
//! use acton_service::websocket::ws_upgrade_handler;
//!
//! let app = Router::new().route("/ws", get(ws_upgrade_handler::<MyState>));
//! ```

mod hub;
mod upgrade;

// Re-exports
pub use hub::{
    AssociateTicket, AssociateUser, BroadcastToChannel, ClientId, DrainOffline, GetHubStats,
    HubConnection, HubMessage, HubStats, JoinChannel, LeaveChannel, NodeHeartbeat,
    RegisterConnection, RouteMessage, RouteTarget, SendToClient, SendToUser, SharedWsHub,
    UnregisterConnection, WsHub,
};
pub use upgrade::ws_upgrade_handler;

// Re-export axum WebSocket types for convenience
pub use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
