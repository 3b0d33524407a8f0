// ABOUTME: WebSocket route handler for rel=me discovery streams
// ABOUTME: Upgrades /ws and hands the socket to the discovery connection manager
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use crate::websocket::WebSocketManager;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::debug;

/// WebSocket routes implementation
pub struct WebSocketRoutes;

impl WebSocketRoutes {
    /// Create the discovery endpoint with an injected `WebSocketManager`
    pub fn routes(manager: Arc<WebSocketManager>) -> Router {
        Router::new()
            .route("/ws", get(Self::handle_websocket))
            .with_state(manager)
    }

    /// Upgrade the connection and delegate to the manager
    async fn handle_websocket(
        ws: WebSocketUpgrade,
        State(manager): State<Arc<WebSocketManager>>,
    ) -> impl IntoResponse {
        ws.on_upgrade(move |socket: WebSocket| async move {
            debug!("discovery socket upgraded");
            manager.handle_connection(socket).await;
        })
    }
}
