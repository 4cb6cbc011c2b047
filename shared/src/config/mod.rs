pub mod config;

pub use self::config::{load_config, parse_config};

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::server_config::AppConfig;

/// Shared handle to the running configuration.
///
/// Clones point at one `RwLock<AppConfig>`; after [`LiveConfig::reload`] every
/// holder reads the new values. Copy what you need out of the guard before
/// awaiting:
/// ```rust,no_run
/// // let cookies = state.config.read().await.cookies.clone();
/// ```
#[derive(Clone, Debug)]
pub struct LiveConfig(Arc<RwLock<AppConfig>>);

impl LiveConfig {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Read guard. Never hold it across `.await`.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.0.read().await
    }

    /// Swap in `new` and return the changed settings that only take effect
    /// after a restart (listener, pool, token service).
    pub async fn reload(&self, new: AppConfig) -> Vec<&'static str> {
        let mut guard = self.0.write().await;
        let pending = restart_only_changes(&guard, &new);
        *guard = new;
        pending
    }
}

fn restart_only_changes(old: &AppConfig, new: &AppConfig) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.server.addr() != new.server.addr() {
        changed.push("server.bind/port");
    }
    if old.server.request_timeout_secs != new.server.request_timeout_secs {
        changed.push("server.request_timeout_secs");
    }
    if old.database.url != new.database.url || old.database.max_connections != new.database.max_connections {
        changed.push("database");
    }
    if old.auth.access_token_expiry_secs() != new.auth.access_token_expiry_secs()
        || old.auth.refresh_token_expiry_secs() != new.auth.refresh_token_expiry_secs()
    {
        changed.push("auth token lifetimes");
    }
    if old.auth.resolved_jwt_secret() != new.auth.resolved_jwt_secret() {
        changed.push("auth.jwt_secret");
    }
    if old.cors.allowed_origins != new.cors.allowed_origins {
        changed.push("cors.allowed_origins");
    }
    if old.logging.level != new.logging.level {
        changed.push("logging.level");
    }
    changed
}
