//! HLS playlist types.

use serde::{Deserialize, Serialize};

use crate::ladder::QualityLadder;

/// A stream variant in a master playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Estimated bandwidth in bits per second.
    pub bandwidth: u64,
    /// Resolution as (width, height).
    pub resolution: (u32, u32),
    /// URI to the media playlist for this variant, relative to the master.
    pub uri: String,
}

/// An HLS master playlist listing one variant per quality level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPlaylist {
    /// Stream variants, highest resolution first.
    pub variants: Vec<Variant>,
}

impl MasterPlaylist {
    /// Build the master playlist for a ladder.
    ///
    /// `fallback_duration` is used for variants that do not carry their own
    /// duration; `default_bandwidth` when size or duration is unusable.
    pub fn from_ladder(
        ladder: &QualityLadder,
        fallback_duration: Option<f64>,
        default_bandwidth: u64,
    ) -> Self {
        let variants = ladder
            .levels_descending()
            .into_iter()
            .map(|level| Variant {
                bandwidth: super::estimate_bandwidth(
                    level.variant.size,
                    level.variant.duration_secs.or(fallback_duration),
                    default_bandwidth,
                ),
                resolution: (level.width, level.height),
                uri: super::level_playlist_path(level.height),
            })
            .collect();

        Self { variants }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::generate_master_playlist;
    use sb_core::{AlternativeRepresentation, MediaId, MediaObject, MediaVariant, ResourceId, VideoCodec};

    fn ladder(heights: &[u32], size: Option<u64>, duration: Option<f64>) -> QualityLadder {
        let mut alternatives = Vec::new();
        for (i, h) in heights.iter().enumerate() {
            let id = 100 + i as i64;
            alternatives.push(AlternativeRepresentation::Video {
                object: MediaVariant {
                    id: MediaId(id),
                    resource: ResourceId::new(format!("v{h}")),
                    size,
                    duration_secs: duration,
                },
                width: h * 16 / 9,
                height: *h,
                codec: VideoCodec::H264,
            });
            alternatives.push(AlternativeRepresentation::Playlist {
                object: MediaVariant {
                    id: MediaId(200 + i as i64),
                    resource: ResourceId::new(format!("p{h}")),
                    size: None,
                    duration_secs: None,
                },
                mime_type: "application/x-mpegurl".into(),
                reference: format!("reference-marker:{id}"),
            });
        }
        let media = MediaObject {
            id: MediaId(1),
            resource: ResourceId::from("base"),
            size: None,
            duration_secs: None,
            alternatives,
        };
        QualityLadder::build(&media).unwrap()
    }

    #[test]
    fn variants_are_listed_highest_first() {
        let l = ladder(&[480, 240, 1080], Some(10_000_000), Some(10.0));
        let m3u8 = generate_master_playlist(&MasterPlaylist::from_ladder(&l, None, 1));
        let p1080 = m3u8.find("hls_level_1080.m3u8").unwrap();
        let p480 = m3u8.find("hls_level_480.m3u8").unwrap();
        let p240 = m3u8.find("hls_level_240.m3u8").unwrap();
        assert!(p1080 < p480 && p480 < p240);
        assert!(m3u8.contains("#EXT-X-STREAM-INF:BANDWIDTH=8000000,RESOLUTION=1920x1080\n"));
    }

    #[test]
    fn fallback_duration_and_default_bandwidth() {
        let l = ladder(&[720], Some(10_000_000), None);
        let with_fallback = MasterPlaylist::from_ladder(&l, Some(20.0), 7);
        assert_eq!(with_fallback.variants[0].bandwidth, 4_000_000);

        let without = MasterPlaylist::from_ladder(&l, None, 7);
        assert_eq!(without.variants[0].bandwidth, 7);
    }
}
