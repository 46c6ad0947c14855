//! # deskflow-server
//!
//! HTTP backend for the Deskflow ticket desk.
//!
//! This binary provides:
//! - **Tickets** with an activity timeline and numbered document attachments
//! - **Monthly summary** comparing ticket counts against the previous month
//! - **Accounts**: sign-in, refresh credentials and directory synchronisation
//! - **Documents** stored on local disk beneath a single upload root

mod api;
mod auth;
mod blob_store;
mod config;
mod error;
mod response;
mod service;

use std::sync::Arc;

use deskflow_shared::{Clock, SystemClock};
use deskflow_store::Database;
use ed25519_dalek::SigningKey;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::auth::Authenticator;
use crate::blob_store::FsDocumentStore;
use crate::config::ServerConfig;
use crate::service::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,deskflow_server=debug,deskflow_store=debug")
        }))
        .init();

    info!("Starting Deskflow server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let db = Database::open_at(&config.database_path)?;
    info!(path = %config.database_path.display(), "Database ready");

    let files = FsDocumentStore::new(config.document_storage_path.clone()).await?;
    info!(path = %files.base_path().display(), "Document storage ready");

    let signing_key = match config.signing_seed {
        Some(seed) => SigningKey::from_bytes(&seed),
        None => {
            warn!("No CREDENTIAL_SIGNING_KEY set; credentials will not survive a restart");
            SigningKey::generate(&mut rand::rngs::OsRng)
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let auth = Authenticator::new(
        signing_key,
        config.access_token_ttl,
        config.refresh_token_ttl,
        clock.clone(),
    );

    let http_addr = config.http_addr;
    let store = Store::new(db, files).with_request_timeout(config.request_timeout);
    let app_state = AppState::new(config, store, auth, clock);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
