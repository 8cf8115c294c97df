//! Quality ladder resolution.
//!
//! A [`QualityLadder`] pairs each supported video rendition of a media object
//! with the HLS playlist descriptor that references it. Resolution is a pure
//! function over already-available metadata; nothing is fetched here.

use std::collections::HashMap;

use sb_core::{AlternativeRepresentation, MediaId, MediaObject, MediaVariant, VideoCodec};

/// Placeholder prefix used by the encoding pipeline.
pub const REFERENCE_PREFIX: &str = "reference-marker:";
/// Prefix emitted by older encoders for the same reference.
const LEGACY_REFERENCE_PREFIX: &str = "mtproto:";

const HLS_MIME_TYPES: [&str; 2] = ["application/x-mpegurl", "application/vnd.apple.mpegurl"];

/// Failure to build a usable ladder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LadderError {
    /// Variant and playlist heights differ, or no playlist matched.
    #[error("incomplete quality ladder: variants {variant_heights:?}, playlists {playlist_heights:?}")]
    Incomplete {
        variant_heights: Vec<u32>,
        playlist_heights: Vec<u32>,
    },
}

impl From<LadderError> for sb_core::Error {
    fn from(e: LadderError) -> Self {
        sb_core::Error::Ladder(e.to_string())
    }
}

/// One rung of the ladder: an encoded variant and its companion playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityLevel {
    pub height: u32,
    pub width: u32,
    pub codec: VideoCodec,
    pub variant: MediaVariant,
    pub playlist: MediaVariant,
}

/// Mapping `height -> (variant, playlist)`, kept in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityLadder {
    levels: Vec<QualityLevel>,
}

struct VideoEntry<'a> {
    width: u32,
    codec: &'a VideoCodec,
    object: &'a MediaVariant,
}

impl QualityLadder {
    /// Resolve the ladder for `base`.
    ///
    /// Accepted only when the set of playlist heights is non-empty and equal
    /// to the set of supported variant heights.
    pub fn build(base: &MediaObject) -> Result<Self, LadderError> {
        let mut order: Vec<u32> = Vec::new();
        let mut variants: HashMap<u32, VideoEntry<'_>> = HashMap::new();

        for alt in &base.alternatives {
            let AlternativeRepresentation::Video {
                object,
                width,
                height,
                codec,
            } = alt
            else {
                continue;
            };

            if !codec.is_supported() {
                tracing::debug!(media_id = %object.id, codec = %codec, "Skipping unsupported variant");
                continue;
            }
            if variants.contains_key(height) {
                tracing::debug!(media_id = %object.id, height, "Duplicate variant height; keeping first");
                continue;
            }

            order.push(*height);
            variants.insert(
                *height,
                VideoEntry {
                    width: *width,
                    codec,
                    object,
                },
            );
        }

        let mut playlists: HashMap<u32, &MediaVariant> = HashMap::new();

        for alt in &base.alternatives {
            let AlternativeRepresentation::Playlist {
                object,
                mime_type,
                reference,
            } = alt
            else {
                continue;
            };

            if !is_hls_mime(mime_type) {
                continue;
            }
            let Some(target) = parse_reference(reference) else {
                tracing::debug!(media_id = %object.id, reference = %reference, "Unparseable playlist reference");
                continue;
            };

            let matched = variants
                .iter()
                .find(|(_, entry)| entry.object.id == target)
                .map(|(height, _)| *height);

            match matched {
                Some(height) => {
                    playlists.entry(height).or_insert(object);
                }
                None => {
                    tracing::debug!(media_id = %object.id, target = %target, "Playlist references no known variant");
                }
            }
        }

        let mut variant_heights: Vec<u32> = variants.keys().copied().collect();
        let mut playlist_heights: Vec<u32> = playlists.keys().copied().collect();
        variant_heights.sort_unstable();
        playlist_heights.sort_unstable();

        if playlist_heights.is_empty() || playlist_heights != variant_heights {
            return Err(LadderError::Incomplete {
                variant_heights,
                playlist_heights,
            });
        }

        let levels = order
            .into_iter()
            .filter_map(|height| {
                let entry = variants.get(&height)?;
                let playlist = playlists.get(&height)?;
                Some(QualityLevel {
                    height,
                    width: entry.width,
                    codec: entry.codec.clone(),
                    variant: entry.object.clone(),
                    playlist: (*playlist).clone(),
                })
            })
            .collect();

        Ok(Self { levels })
    }

    /// Levels in insertion order.
    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    /// Levels sorted by descending height; ties keep insertion order.
    pub fn levels_descending(&self) -> Vec<&QualityLevel> {
        let mut levels: Vec<&QualityLevel> = self.levels.iter().collect();
        levels.sort_by(|a, b| b.height.cmp(&a.height));
        levels
    }

    /// Heights, highest first.
    pub fn heights(&self) -> Vec<u32> {
        self.levels_descending().iter().map(|l| l.height).collect()
    }

    pub fn level(&self, height: u32) -> Option<&QualityLevel> {
        self.levels.iter().find(|l| l.height == height)
    }

    /// Find the level whose encoded variant has the given id.
    pub fn level_by_variant(&self, id: MediaId) -> Option<&QualityLevel> {
        self.levels.iter().find(|l| l.variant.id == id)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

fn is_hls_mime(mime_type: &str) -> bool {
    let mime = mime_type.trim();
    HLS_MIME_TYPES.iter().any(|m| m.eq_ignore_ascii_case(mime))
}

/// Recover the referenced media id from a placeholder reference.
pub fn parse_reference(reference: &str) -> Option<MediaId> {
    let reference = reference.trim();
    let digits = reference
        .strip_prefix(REFERENCE_PREFIX)
        .or_else(|| reference.strip_prefix(LEGACY_REFERENCE_PREFIX))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(MediaId)
}
