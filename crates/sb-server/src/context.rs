//! Application context shared by every handler.

use std::sync::Arc;

use sb_core::config::Config;
use sb_fetch::FetchSubstrate;

use crate::assets::AssetTable;
use crate::registry::SessionRegistry;

/// Application context shared by all request handlers (via Axum state).
///
/// This is cheaply cloneable because it only holds `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Fetch substrate shared by every session.
    pub substrate: Arc<dyn FetchSubstrate>,
    /// Static assets served under every session path.
    pub assets: Arc<AssetTable>,
    /// Live bridge sessions.
    pub registry: SessionRegistry,
}

impl AppContext {
    pub fn new(config: Config, substrate: Arc<dyn FetchSubstrate>) -> Self {
        let config = Arc::new(config);
        let assets = Arc::new(AssetTable::load(config.bridge.assets_dir.as_deref()));
        let registry = SessionRegistry::new(config.clone(), substrate.clone(), assets.clone());
        Self {
            config,
            substrate,
            assets,
            registry,
        }
    }
}
