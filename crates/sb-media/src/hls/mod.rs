//! HLS master playlist model and generation.

mod generator;
mod types;

pub use generator::{
    estimate_bandwidth, generate_master_playlist, level_playlist_path, parse_level_playlist_path,
    DEFAULT_BANDWIDTH,
};
pub use types::{MasterPlaylist, Variant};
