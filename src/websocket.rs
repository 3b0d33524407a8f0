// ABOUTME: WebSocket discovery sessions streaming rel=me events to the chooser page
// ABOUTME: Runs one discovery request at a time per connection and tracks live connections
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! `WebSocket` support for method discovery
//!
//! A client sends `{Me, ClientID, RedirectURI, Force}` messages and receives
//! one JSON message per discovery event. Requests on a connection are handled
//! strictly one after another. A malformed message or a disconnect ends the
//! connection quietly.

use crate::discovery::{Discovery, DiscoveryError, DiscoveryEvent, DiscoveryMessage, DiscoveryRequest};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

// WebSocket message type alias for Axum
type Message = axum::extract::ws::Message;

/// Events buffered between a discovery run and the socket writer
const EVENT_BUFFER: usize = 16;

/// Bookkeeping for one live connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    /// When the connection was upgraded
    pub opened_at: DateTime<Utc>,
}

/// Live discovery connections and the engine serving them
pub struct WebSocketManager {
    discovery: Discovery,
    connections: Mutex<HashMap<Uuid, ConnectionInfo>>,
}

impl WebSocketManager {
    /// Create a manager serving requests with `discovery`
    #[must_use]
    pub fn new(discovery: Discovery) -> Self {
        Self {
            discovery,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Register a live connection
    pub async fn add(&self, id: Uuid) {
        self.connections.lock().await.insert(
            id,
            ConnectionInfo {
                opened_at: Utc::now(),
            },
        );
    }

    /// Forget a connection
    pub async fn remove(&self, id: Uuid) {
        self.connections.lock().await.remove(&id);
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Serve discovery requests on an upgraded socket until it closes
    pub async fn handle_connection(&self, ws: axum::extract::ws::WebSocket) {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::channel::<DiscoveryMessage>(EVENT_BUFFER);

        let connection_id = Uuid::new_v4();
        self.add(connection_id).await;
        debug!(connection_id = %connection_id, "discovery connection opened");

        // Spawn task to forward events to the socket
        let ws_send_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "could not encode discovery event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let request = match serde_json::from_str::<DiscoveryRequest>(&text) {
                        Ok(request) => request,
                        Err(e) => {
                            debug!(connection_id = %connection_id, error = %e, "undecodable discovery request");
                            break;
                        }
                    };

                    match self.discovery.run(&request, &tx).await {
                        Ok(()) => {}
                        Err(DiscoveryError::ListenerClosed) => break,
                        Err(DiscoveryError::Store(e)) => {
                            warn!(me = %request.me, error = %e, "discovery failed");
                            if tx.send(DiscoveryEvent::error().into()).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }

        // Let the writer flush what is already queued
        drop(tx);
        if let Err(e) = ws_send_task.await {
            warn!(connection_id = %connection_id, error = %e, "discovery writer task failed");
        }

        self.remove(connection_id).await;
        debug!(connection_id = %connection_id, "discovery connection closed");
    }
}
