//! sb-media: quality ladders, playlist placeholder rewriting, and HLS manifests.
//!
//! # Modules
//!
//! - [`ladder`] - Resolve a media object's alternatives into a height-keyed quality ladder
//! - [`rewrite`] - Rewrite placeholder tokens in fetched playlists into local segment paths
//! - [`hls`] - Master playlist (M3U8) model and rendering

pub mod hls;
pub mod ladder;
pub mod rewrite;

// Re-export commonly used items at the crate root.
pub use hls::{
    estimate_bandwidth, generate_master_playlist, level_playlist_path, parse_level_playlist_path,
    MasterPlaylist, Variant, DEFAULT_BANDWIDTH,
};
pub use ladder::{parse_reference, LadderError, QualityLadder, QualityLevel};
pub use rewrite::{parse_segment_path, rewrite_placeholders, segment_path, SEGMENT_EXTENSION};
