//! Shared test harness for integration tests.
//!
//! [`TestHarness`] lays out a media directory, configures a directory
//! substrate over it and serves the bridge on a random port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;

use sb_core::config::{Config, SubstrateKind};
use sb_core::MediaObject;
use sb_server::context::AppContext;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// A running bridge backed by files in a temp directory.
pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    pub media_dir: tempfile::TempDir,
    pub cancel: CancellationToken,
    pub client: reqwest::Client,
    server: Option<tokio::task::JoinHandle<sb_core::Result<()>>>,
}

impl TestHarness {
    /// Start a bridge over the default fixture media.
    pub async fn with_server() -> Self {
        Self::with_server_config(|_| {}).await
    }

    /// Start a bridge after letting `configure` adjust the config.
    pub async fn with_server_config(configure: impl FnOnce(&mut Config)) -> Self {
        let media_dir = tempfile::tempdir().expect("failed to create media dir");
        write_fixture_media(media_dir.path());

        let mut config = Config::default();
        config.substrate.kind = SubstrateKind::Dir;
        config.substrate.root = media_dir.path().to_path_buf();
        config.substrate.chunk_size = 4096;
        config.bridge.temp_dir = Some(media_dir.path().join("tmp"));
        configure(&mut config);

        let substrate =
            sb_fetch::build_substrate(&config.substrate).expect("failed to build substrate");
        let ctx = AppContext::new(config, substrate);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        let cancel = CancellationToken::new();
        let server = tokio::spawn(sb_server::serve(listener, ctx.clone(), cancel.clone()));

        Self {
            ctx,
            addr,
            media_dir,
            cancel,
            client: reqwest::Client::new(),
            server: Some(server),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Register `media` and return the new session id.
    pub async fn create_session(&self, media: &Value) -> String {
        let resp = self
            .client
            .post(self.url("/sessions"))
            .json(media)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["session_id"].as_str().unwrap().to_owned()
    }

    pub async fn get(&self, session: &str, file: &str) -> reqwest::Response {
        self.client
            .get(self.url(&format!("/{session}/{file}")))
            .send()
            .await
            .unwrap()
    }

    pub async fn get_range(&self, session: &str, file: &str, range: &str) -> reqwest::Response {
        self.client
            .get(self.url(&format!("/{session}/{file}")))
            .header("range", range)
            .send()
            .await
            .unwrap()
    }

    /// Files left under the configured temp dir.
    pub fn temp_files(&self) -> Vec<std::path::PathBuf> {
        let mut out = Vec::new();
        let tmp = self.media_dir.path().join("tmp");
        collect_files(&tmp, &mut out);
        out
    }

    /// Signal shutdown and wait for the server to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(server) = self.server.take() {
            server.await.unwrap().unwrap();
        }
    }
}

fn collect_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

/// Video bytes for the 480p variant: a repeating 0..=250 pattern.
pub fn video_480() -> Vec<u8> {
    (0..=250u8).cycle().take(10_000).collect()
}

pub fn video_1080() -> Vec<u8> {
    (0..=250u8).rev().cycle().take(40_000).collect()
}

fn write_fixture_media(dir: &Path) {
    std::fs::write(dir.join("v480.mp4"), video_480()).unwrap();
    std::fs::write(dir.join("v1080.mp4"), video_1080()).unwrap();
    std::fs::write(
        dir.join("p480.m3u8"),
        "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nreference-marker:10\n#EXT-X-ENDLIST\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("p1080.m3u8"),
        "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nreference-marker:11\n#EXT-X-ENDLIST\n",
    )
    .unwrap();
}

/// A media object with 480p and 1080p levels over the fixture files.
pub fn fixture_media() -> Value {
    json!({
        "id": 1,
        "resource": "base.mp4",
        "duration_secs": 10.0,
        "alternatives": [
            {
                "kind": "video",
                "object": { "id": 10, "resource": "v480.mp4", "size": 10000 },
                "width": 854,
                "height": 480,
                "codec": "h264"
            },
            {
                "kind": "video",
                "object": { "id": 11, "resource": "v1080.mp4" },
                "width": 1920,
                "height": 1080,
                "codec": "hevc"
            },
            {
                "kind": "playlist",
                "object": { "id": 20, "resource": "p480.m3u8" },
                "mime_type": "application/x-mpegurl",
                "reference": "reference-marker:10"
            },
            {
                "kind": "playlist",
                "object": { "id": 21, "resource": "p1080.m3u8" },
                "mime_type": "application/vnd.apple.mpegurl",
                "reference": "reference-marker:11"
            }
        ]
    })
}

/// Parse `value` the way the session endpoint does.
pub fn as_media(value: &Value) -> MediaObject {
    serde_json::from_value(value.clone()).unwrap()
}
