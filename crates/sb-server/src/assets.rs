//! Static assets served under every session path.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const PLAYER_JS: &str = include_str!("../assets/player.js");
const HLS_JS: &str = include_str!("../assets/hls.js");

/// Asset bytes together with their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAsset {
    pub bytes: Bytes,
    pub content_type: &'static str,
}

/// Exact-name lookup table of static assets.
#[derive(Debug, Clone, Default)]
pub struct AssetTable {
    assets: HashMap<String, StaticAsset>,
}

impl AssetTable {
    /// The built-in page, player script and `hls.js` fallback.
    pub fn builtin() -> Self {
        let mut table = Self::default();
        table.insert("index.html", Bytes::from_static(INDEX_HTML.as_bytes()));
        table.insert("player.js", Bytes::from_static(PLAYER_JS.as_bytes()));
        table.insert("hls.js", Bytes::from_static(HLS_JS.as_bytes()));
        table
    }

    /// Built-ins plus every regular file directly inside `dir`.
    ///
    /// Files in `dir` override built-ins of the same name. A missing or
    /// unreadable directory only logs a warning.
    pub fn load(dir: Option<&Path>) -> Self {
        let mut table = Self::builtin();
        let Some(dir) = dir else {
            return table;
        };

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read assets dir {}: {e}", dir.display());
                return table;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match std::fs::read(&path) {
                Ok(bytes) => {
                    tracing::debug!(asset = name, size = bytes.len(), "Loaded static asset");
                    table.insert(name, Bytes::from(bytes));
                }
                Err(e) => tracing::warn!("Failed to read asset {}: {e}", path.display()),
            }
        }
        table
    }

    pub fn insert(&mut self, name: &str, bytes: Bytes) {
        let asset = StaticAsset {
            bytes,
            content_type: content_type_for(name),
        };
        self.assets.insert(name.to_owned(), asset);
    }

    pub fn get(&self, name: &str) -> Option<&StaticAsset> {
        self.assets.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.assets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Guess the MIME type from a file name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next().unwrap_or("") {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" => "application/javascript",
        "css" => "text/css",
        "json" => "application/json",
        "m3u8" => "application/vnd.apple.mpegurl",
        "mp4" | "m4s" => "video/mp4",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}
