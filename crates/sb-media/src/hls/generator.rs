//! HLS master playlist generation.

use super::types::MasterPlaylist;
use std::fmt::Write;

/// Bandwidth advertised when a variant's size or duration is unknown (bits/s).
pub const DEFAULT_BANDWIDTH: u64 = 1_000_000;

const LEVEL_PREFIX: &str = "hls_level_";
const LEVEL_SUFFIX: &str = ".m3u8";

/// Estimate a variant's bandwidth as `size / duration * 8`.
///
/// Falls back to `default` unless both values are known and positive.
pub fn estimate_bandwidth(size: Option<u64>, duration_secs: Option<f64>, default: u64) -> u64 {
    match (size, duration_secs) {
        (Some(size), Some(duration)) if size > 0 && duration > 0.0 && duration.is_finite() => {
            (size as f64 / duration * 8.0).round() as u64
        }
        _ => default,
    }
}

/// Relative path of the media playlist for a quality level.
pub fn level_playlist_path(height: u32) -> String {
    format!("{LEVEL_PREFIX}{height}{LEVEL_SUFFIX}")
}

/// Inverse of [`level_playlist_path`].
pub fn parse_level_playlist_path(name: &str) -> Option<u32> {
    name.strip_prefix(LEVEL_PREFIX)?
        .strip_suffix(LEVEL_SUFFIX)?
        .parse()
        .ok()
}

/// Generate an HLS master playlist (M3U8) from a [`MasterPlaylist`].
///
/// Output includes `#EXTM3U` header and `#EXT-X-STREAM-INF` for each variant,
/// in the order the variants are stored.
pub fn generate_master_playlist(playlist: &MasterPlaylist) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "#EXTM3U");

    for variant in &playlist.variants {
        let (w, h) = variant.resolution;
        let _ = writeln!(
            out,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}",
            variant.bandwidth, w, h
        );
        let _ = writeln!(out, "{}", variant.uri);
    }

    out
}
