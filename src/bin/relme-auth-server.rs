// ABOUTME: Server binary for the relme-auth authentication and authorization service
// ABOUTME: Loads configuration from the environment, applies CLI overrides and serves HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! # relme-auth server binary
//!
//! Starts the authorization server with the SQLite trust store and the
//! strategies enabled by the environment.

use anyhow::Result;
use clap::Parser;
use relme_auth::{
    config::environment::ServerConfig,
    logging,
    server::{RelmeAuthServer, ServerResources},
    strategy::GpgVerifier,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "relme-auth-server")]
#[command(about = "rel=me authentication and IndieAuth authorization server")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override database URL
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }

    logging::init_from_env()?;

    info!("Starting relme-auth");
    info!("{}", config.summary());

    let resources = Arc::new(ServerResources::new(config, Arc::new(GpgVerifier::default())).await?);
    info!(
        schema_version = resources.database.schema_version().await?,
        "Database initialized"
    );

    let server = RelmeAuthServer::new(resources);
    if let Err(e) = server.run().await {
        error!("Server error: {e:#}");
        return Err(e);
    }

    Ok(())
}
