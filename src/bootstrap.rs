//! Bootstrap Module
//!
//! Wires the durable store, the voucher services and the web server
//! together from an `AppConfig`, then runs until interrupted.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::{AppConfig, DEV_JWT_SECRET};
use crate::core::issuer::VoucherIssuer;
use crate::core::redeemer::VoucherRedeemer;
use crate::core::store::Store;
use crate::infrastructure::auth::JwtService;
use crate::infrastructure::store::SqliteStore;
use crate::infrastructure::web::{start_web_server, AppState};

/// Build the shared application state backed by the SQLite store
pub fn build_state(config: &AppConfig) -> Result<Arc<AppState>> {
    // 确保数据库目录存在
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&config.db_path)?);
    info!("SQLite store ready at {}", config.db_path);

    Ok(Arc::new(AppState {
        issuer: VoucherIssuer::new(store.clone(), config.validate_owners),
        redeemer: VoucherRedeemer::new(store.clone()),
        jwt_service: JwtService::new(&config.jwt_secret),
        store,
    }))
}

/// Validate the configuration, assemble services and serve until ctrl-c
pub async fn run(config: AppConfig) -> Result<()> {
    config.validate()?;

    if config.jwt_secret == DEV_JWT_SECRET {
        warn!("JWT_SECRET not set, using the development default");
    }

    let state = build_state(&config)?;

    tokio::select! {
        result = start_web_server(&config.web_bind, state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
    }
}
