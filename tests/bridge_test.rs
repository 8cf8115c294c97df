//! HTTP-level tests for a session's address space.

mod common;

use common::{fixture_media, video_1080, video_480, TestHarness};

#[tokio::test]
async fn master_manifest_lists_levels_highest_first() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get(&session, "master.m3u8").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/vnd.apple.mpegurl"
    );
    let text = resp.text().await.unwrap();
    assert_eq!(
        text,
        "#EXTM3U\n\
         #EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION=1920x1080\n\
         hls_level_1080.m3u8\n\
         #EXT-X-STREAM-INF:BANDWIDTH=8000,RESOLUTION=854x480\n\
         hls_level_480.m3u8\n"
    );
    h.stop().await;
}

#[tokio::test]
async fn level_playlist_is_rewritten_to_segment_paths() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get(&session, "hls_level_480.m3u8").await;
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    assert!(text.contains("\nsegment-10.mp4\n"), "{text}");
    assert!(!text.contains("reference-marker"));

    let resp = h.get(&session, "hls_level_720.m3u8").await;
    assert_eq!(resp.status(), 404);
    h.stop().await;
}

#[tokio::test]
async fn full_segment_without_range_header() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get(&session, "segment-10.mp4").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"].to_str().unwrap(), "video/mp4");
    assert_eq!(resp.headers()["accept-ranges"].to_str().unwrap(), "bytes");
    assert_eq!(resp.headers()["content-length"].to_str().unwrap(), "10000");
    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..], &video_480()[..]);
    h.stop().await;
}

#[tokio::test]
async fn range_request_returns_partial_content() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get_range(&session, "segment-10.mp4", "bytes=100-199").await;
    assert_eq!(resp.status(), 206);
    assert_eq!(
        resp.headers()["content-range"].to_str().unwrap(),
        "bytes 100-199/10000"
    );
    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..], &video_480()[100..200]);
    h.stop().await;
}

#[tokio::test]
async fn range_end_is_clipped_to_size() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get_range(&session, "segment-10.mp4", "bytes=9990-20000").await;
    assert_eq!(resp.status(), 206);
    assert_eq!(
        resp.headers()["content-range"].to_str().unwrap(),
        "bytes 9990-9999/10000"
    );
    assert_eq!(resp.bytes().await.unwrap().len(), 10);
    h.stop().await;
}

#[tokio::test]
async fn suffix_range_returns_tail() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get_range(&session, "segment-10.mp4", "bytes=-500").await;
    assert_eq!(resp.status(), 206);
    assert_eq!(
        resp.headers()["content-range"].to_str().unwrap(),
        "bytes 9500-9999/10000"
    );
    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..], &video_480()[9500..]);
    h.stop().await;
}

#[tokio::test]
async fn range_past_end_is_unsatisfiable() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get_range(&session, "segment-10.mp4", "bytes=10000-").await;
    assert_eq!(resp.status(), 416);
    assert_eq!(
        resp.headers()["content-range"].to_str().unwrap(),
        "bytes */10000"
    );
    h.stop().await;
}

#[tokio::test]
async fn segment_of_unknown_size_learns_total() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get_range(&session, "segment-11.mp4", "bytes=39000-").await;
    assert_eq!(resp.status(), 206);
    assert_eq!(
        resp.headers()["content-range"].to_str().unwrap(),
        "bytes 39000-39999/40000"
    );
    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..], &video_1080()[39000..]);
    h.stop().await;
}

#[tokio::test]
async fn bounded_range_of_unknown_size_reports_full_total() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get_range(&session, "segment-11.mp4", "bytes=0-99").await;
    assert_eq!(resp.status(), 206);
    assert_eq!(
        resp.headers()["content-range"].to_str().unwrap(),
        "bytes 0-99/40000"
    );
    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..], &video_1080()[..100]);
    h.stop().await;
}

#[tokio::test]
async fn unknown_segment_is_404() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    assert_eq!(h.get(&session, "segment-999.mp4").await.status(), 404);
    // Playlist objects are not segments.
    assert_eq!(h.get(&session, "segment-20.mp4").await.status(), 404);
    h.stop().await;
}

#[tokio::test]
async fn static_assets_are_served() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get(&session, "index.html").await;
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(resp.text().await.unwrap().contains("player.js"));

    let resp = h.get(&session, "player.js").await;
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("playerLoad"));

    let resp = h.get(&session, "hls.js").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/javascript"
    );
    assert!(resp.text().await.unwrap().contains("isSupported"));

    assert_eq!(h.get(&session, "style.css").await.status(), 404);
    h.stop().await;
}

#[tokio::test]
async fn assets_dir_extends_builtins() {
    let assets = tempfile::tempdir().unwrap();
    std::fs::write(assets.path().join("hls.js"), "var Hls = function () {};").unwrap();
    let dir = assets.path().to_path_buf();
    let h = TestHarness::with_server_config(move |c| c.bridge.assets_dir = Some(dir)).await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get(&session, "hls.js").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/javascript"
    );
    assert_eq!(resp.text().await.unwrap(), "var Hls = function () {};");
    h.stop().await;
}

#[tokio::test]
async fn sessions_do_not_share_address_space() {
    let h = TestHarness::with_server().await;
    let a = h.create_session(&fixture_media()).await;
    let b = h.create_session(&fixture_media()).await;
    assert_ne!(a, b);

    assert_eq!(h.get(&a, "master.m3u8").await.status(), 200);
    assert_eq!(h.get(&b, "master.m3u8").await.status(), 200);

    let resp = h
        .client
        .delete(h.url(&format!("/sessions/{a}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(h.get(&a, "master.m3u8").await.status(), 404);
    assert_eq!(h.get(&b, "master.m3u8").await.status(), 200);
    h.stop().await;
}

#[tokio::test]
async fn ending_sessions_removes_transfer_files() {
    let h = TestHarness::with_server().await;
    let session = h.create_session(&fixture_media()).await;

    let resp = h.get_range(&session, "segment-10.mp4", "bytes=0-99").await;
    assert_eq!(resp.status(), 206);
    resp.bytes().await.unwrap();

    h.client
        .delete(h.url(&format!("/sessions/{session}")))
        .send()
        .await
        .unwrap();
    // The response body owns the staged segment file; give the server a
    // moment to drop it after the last byte went out.
    for _ in 0..50 {
        if h.temp_files().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(h.temp_files().is_empty(), "{:?}", h.temp_files());
    h.stop().await;
}
