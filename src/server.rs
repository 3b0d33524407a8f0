// ABOUTME: Server assembly: shared resources, router with middleware, and the serve loop
// ABOUTME: Wires the trust store, strategies, discovery and authorization engine together
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! # Server
//!
//! [`ServerResources`] is built once at startup and shared by every route.
//! The live-connection registry lives inside it, so it is created and dropped
//! together with the server.

use crate::authorization::AuthorizationServer;
use crate::client_trust::ClientTrustResolver;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::discovery::Discovery;
use crate::routes::{
    AuthContext, AuthorizationRoutes, CallbackRoutes, CookieSettings, HealthRoutes, PgpRoutes,
    TokenRoutes, WebSocketRoutes,
};
use crate::strategy::{ClearsignVerifier, Strategies};
use crate::websocket::WebSocketManager;
use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Upper bound for one HTTP request, discovery sockets excepted
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything the routes share
pub struct ServerResources {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
    /// Trust store
    pub database: Database,
    /// Registered strategies
    pub strategies: Arc<Strategies>,
    /// Authorization engine
    pub authorization: Arc<AuthorizationServer>,
    /// Discovery connections
    pub websocket: Arc<WebSocketManager>,
}

impl ServerResources {
    /// Open the database and build strategies from the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated
    pub async fn new(config: ServerConfig, verifier: Arc<dyn ClearsignVerifier>) -> Result<Self> {
        let database = Database::new(&config.database_url).await?;
        let strategies = Strategies::from_config(&config, verifier);
        Ok(Self::from_parts(config, database, strategies))
    }

    /// Assemble resources from already constructed parts
    #[must_use]
    pub fn from_parts(config: ServerConfig, database: Database, strategies: Strategies) -> Self {
        let strategies = Arc::new(strategies);
        let clients =
            ClientTrustResolver::new(database.clone(), &config.http_client, config.expiry.client);
        let authorization = Arc::new(AuthorizationServer::new(
            database.clone(),
            strategies.clone(),
            clients,
            config.expiry,
            config.base_url.clone(),
        ));
        let discovery = Discovery::new(
            database.clone(),
            strategies.clone(),
            &config.http_client,
            config.expiry.profile,
        );

        Self {
            config: Arc::new(config),
            database,
            strategies,
            authorization,
            websocket: Arc::new(WebSocketManager::new(discovery)),
        }
    }
}

/// The HTTP server
pub struct RelmeAuthServer {
    resources: Arc<ServerResources>,
}

impl RelmeAuthServer {
    /// Create a server over shared resources
    #[must_use]
    pub const fn new(resources: Arc<ServerResources>) -> Self {
        Self { resources }
    }

    /// All routes with tracing and a request timeout
    #[must_use]
    pub fn router(&self) -> Router {
        let context = AuthContext {
            server: self.resources.authorization.clone(),
            cookies: CookieSettings {
                secure: self.resources.config.secure_cookies,
                max_age: self.resources.config.expiry.login.num_seconds(),
            },
        };

        let http = Router::new()
            .merge(AuthorizationRoutes::routes(context.clone()))
            .merge(CallbackRoutes::routes(context))
            .merge(TokenRoutes::routes(self.resources.authorization.clone()))
            .merge(PgpRoutes::routes())
            .merge(HealthRoutes::routes())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

        Router::new()
            .merge(http)
            .merge(WebSocketRoutes::routes(self.resources.websocket.clone()))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until interrupted
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails
    pub async fn run(self) -> Result<()> {
        let config = &self.resources.config;
        let addr: SocketAddr = format!("{}:{}", config.host, config.http_port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!(address = %addr, strategies = ?self.resources.strategies.names(), "relme-auth listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("relme-auth stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
