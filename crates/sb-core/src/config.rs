//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! sub-configs for the HTTP server, the bridge, the fetch substrate and the
//! player adapters. Every section defaults sensibly so a completely empty `{}`
//! file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub bridge: BridgeConfig,
    pub substrate: SubstrateConfig,
    pub player: PlayerConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.bridge.default_bandwidth == 0 {
            warnings.push("bridge.default_bandwidth is 0; players may reject the manifest".into());
        }

        if let Some(ref dir) = self.bridge.assets_dir {
            if !dir.is_dir() {
                warnings.push(format!("bridge.assets_dir {} is not a directory", dir.display()));
            }
        }

        match self.substrate.kind {
            SubstrateKind::Http => {
                if self.substrate.base_url.is_empty() {
                    warnings.push("substrate.base_url is empty".into());
                } else if !self.substrate.base_url.starts_with("http://")
                    && !self.substrate.base_url.starts_with("https://")
                {
                    warnings.push(format!(
                        "substrate.base_url '{}' is not an http(s) URL",
                        self.substrate.base_url
                    ));
                }
            }
            SubstrateKind::Dir => {
                if !self.substrate.root.is_dir() {
                    warnings.push(format!(
                        "substrate.root {} is not a directory",
                        self.substrate.root.display()
                    ));
                }
            }
        }

        if self.substrate.chunk_size == 0 {
            warnings.push("substrate.chunk_size is 0; the default will be used".into());
        }

        if self.player.status_interval_ms == 0 {
            warnings.push("player.status_interval_ms is 0; the default will be used".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8089,
        }
    }
}

/// Priority hint passed to the fetch substrate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Streaming bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory for segment temp files and transfer contexts
    /// (`None` = system temp dir).
    pub temp_dir: Option<PathBuf>,
    /// Extra static assets (e.g. `hls.js`) served next to the built-ins.
    pub assets_dir: Option<PathBuf>,
    /// Bandwidth advertised when a variant's size or duration is unknown.
    pub default_bandwidth: u64,
    /// Idle time after which a session is dropped by the cleanup task.
    pub session_expiry_secs: u64,
    pub cleanup_interval_secs: u64,
    pub fetch_priority: FetchPriority,
    /// After a miss, keep pulling the whole resource in the background for
    /// as long as the fetch context stays alive.
    pub prefetch_full_resource: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            assets_dir: None,
            default_bandwidth: 1_000_000,
            session_expiry_secs: 600,
            cleanup_interval_secs: 60,
            fetch_priority: FetchPriority::Normal,
            prefetch_full_resource: false,
        }
    }
}

impl BridgeConfig {
    /// Resolve the directory used for temporary files.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Which fetch substrate backs resource ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstrateKind {
    #[default]
    Http,
    Dir,
}

/// Fetch substrate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    pub kind: SubstrateKind,
    /// Base URL for the HTTP substrate; resources live at `{base_url}/{id}`.
    pub base_url: String,
    /// Root directory for the directory substrate.
    pub root: PathBuf,
    /// Preferred size of delivered chunks in bytes.
    pub chunk_size: usize,
    /// Upper bound of the HTTP substrate's shared in-memory cache.
    pub memory_cache_bytes: u64,
    /// Whether the directory substrate answers cache lookups directly.
    pub dir_cached: bool,
}

/// Default chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            kind: SubstrateKind::Http,
            base_url: "http://127.0.0.1:8000".into(),
            root: PathBuf::from("./media"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            memory_cache_bytes: 64 * 1024 * 1024,
            dir_cached: true,
        }
    }
}

impl SubstrateConfig {
    /// Chunk size with zero mapped to the default.
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }
}

/// Player adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Status report period at base rate 1.0.
    pub status_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 250,
        }
    }
}
