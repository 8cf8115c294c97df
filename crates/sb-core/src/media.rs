//! Media-object data model consumed by the bridge.
//!
//! A [`MediaObject`] is the base encoded video handed to a playback session.
//! Its [`AlternativeRepresentation`]s describe the encoded renditions and the
//! HLS playlist descriptors that reference them by [`MediaId`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{MediaId, ResourceId};

// ---------------------------------------------------------------------------
// ResourceRef
// ---------------------------------------------------------------------------

/// Backing bytes of a media object as known to the fetch substrate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: ResourceId,
    /// Total byte size, if known before fetching.
    pub size: Option<u64>,
}

impl ResourceRef {
    pub fn new(id: impl Into<ResourceId>, size: Option<u64>) -> Self {
        Self {
            id: id.into(),
            size,
        }
    }
}

// ---------------------------------------------------------------------------
// VideoCodec
// ---------------------------------------------------------------------------

/// Video codec of an encoded variant.
///
/// Serialized as a plain string; unknown identifiers are kept verbatim in
/// [`VideoCodec::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoCodec {
    H264,
    H265,
    Other(String),
}

impl VideoCodec {
    /// Parse a codec identifier, accepting the common aliases.
    pub fn parse(codec: &str) -> Self {
        match codec.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" | "avc1" => Self::H264,
            "h265" | "hevc" | "hvc1" | "hev1" => Self::H265,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Whether the bridge can serve this codec through the ladder.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "h264"),
            Self::H265 => write!(f, "h265"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

impl From<String> for VideoCodec {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<VideoCodec> for String {
    fn from(c: VideoCodec) -> Self {
        c.to_string()
    }
}

// ---------------------------------------------------------------------------
// MediaVariant / MediaObject
// ---------------------------------------------------------------------------

/// A fetchable media object referenced from an alternative representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaVariant {
    pub id: MediaId,
    pub resource: ResourceId,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl MediaVariant {
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            id: self.resource.clone(),
            size: self.size,
        }
    }
}

/// Either an encoded video rendition or a playlist descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlternativeRepresentation {
    Video {
        object: MediaVariant,
        width: u32,
        height: u32,
        codec: VideoCodec,
    },
    Playlist {
        object: MediaVariant,
        mime_type: String,
        /// Embedded textual reference to the variant, e.g. `reference-marker:42`.
        reference: String,
    },
}

/// Base encoded media entity handed to a playback session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaObject {
    pub id: MediaId,
    pub resource: ResourceId,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub alternatives: Vec<AlternativeRepresentation>,
}

impl MediaObject {
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            id: self.resource.clone(),
            size: self.size,
        }
    }
}
