//! Placeholder rewriting for fetched playlist text.
//!
//! Playlists produced by the encoding pipeline reference their segments as
//! `reference-marker:<id>` tokens. The bridge serves those segments itself, so
//! every token is replaced with a path the local router resolves.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use sb_core::MediaId;

/// Container extension of served segments.
pub const SEGMENT_EXTENSION: &str = "mp4";

const SEGMENT_PREFIX: &str = "segment-";
const LEGACY_SEGMENT_PREFIX: &str = "partfile";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"reference-marker:([0-9]+)").expect("valid placeholder pattern"));

/// Locally routable path of a segment.
pub fn segment_path(id: MediaId) -> String {
    format!("{SEGMENT_PREFIX}{id}.{SEGMENT_EXTENSION}")
}

/// Recover the media id from `segment-<id>.mp4` or `partfile<id>.mp4`.
pub fn parse_segment_path(name: &str) -> Option<MediaId> {
    let stem = name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
    let digits = stem
        .strip_prefix(SEGMENT_PREFIX)
        .or_else(|| stem.strip_prefix(LEGACY_SEGMENT_PREFIX))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(MediaId)
}

/// Replace every placeholder token in `text` with its segment path.
///
/// The captured digits are carried over verbatim, so ids of any width are
/// rewritten. The output holds no tokens, so applying this twice is the same
/// as once.
pub fn rewrite_placeholders(text: &str) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            format!("{SEGMENT_PREFIX}{}.{SEGMENT_EXTENSION}", &caps[1])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = "\
#EXTM3U
#EXT-X-VERSION:6
#EXT-X-TARGETDURATION:4
#EXT-X-MAP:URI=\"reference-marker:42\",BYTERANGE=\"800@0\"
#EXTINF:4.000000,
#EXT-X-BYTERANGE:50000@800
reference-marker:42
#EXTINF:4.000000,
#EXT-X-BYTERANGE:50000@0
reference-marker:7
#EXT-X-ENDLIST
";

    #[test]
    fn rewrites_every_token() {
        let out = rewrite_placeholders(PLAYLIST);
        assert!(!out.contains("reference-marker:"));
        assert_eq!(out.matches("segment-42.mp4").count(), 2);
        assert_eq!(out.matches("segment-7.mp4").count(), 1);
        let first = out.find("segment-42.mp4").unwrap();
        let seven = out.find("segment-7.mp4").unwrap();
        assert!(first < seven);
        assert!(out.contains("#EXT-X-MAP:URI=\"segment-42.mp4\",BYTERANGE=\"800@0\""));
    }

    #[test]
    fn inline_tokens_keep_surrounding_text() {
        let out = rewrite_placeholders("a reference-marker:42 b reference-marker:7 c");
        assert_eq!(out, "a segment-42.mp4 b segment-7.mp4 c");
    }

    #[test]
    fn ids_wider_than_i64_are_rewritten() {
        let out = rewrite_placeholders("a reference-marker:99999999999999999999 b");
        assert!(!out.contains("reference-marker:"));
        assert_eq!(out, "a segment-99999999999999999999.mp4 b");
    }

    #[test]
    fn leading_zeros_are_kept() {
        assert_eq!(rewrite_placeholders("reference-marker:007"), "segment-007.mp4");
    }

    #[test]
    fn rewrite_is_idempotent() {
        for text in [PLAYLIST, "", "no tokens here", "reference-marker:", "x reference-marker:1"] {
            let once = rewrite_placeholders(text);
            assert_eq!(rewrite_placeholders(&once), once);
        }
    }

    #[test]
    fn text_without_tokens_is_untouched() {
        assert_eq!(rewrite_placeholders("#EXTM3U\n"), "#EXTM3U\n");
    }

    #[test]
    fn segment_path_round_trip() {
        assert_eq!(segment_path(MediaId(42)), "segment-42.mp4");
        assert_eq!(parse_segment_path("segment-42.mp4"), Some(MediaId(42)));
        assert_eq!(parse_segment_path("partfile42.mp4"), Some(MediaId(42)));
        assert_eq!(parse_segment_path("segment-.mp4"), None);
        assert_eq!(parse_segment_path("segment-42.m4s"), None);
        assert_eq!(parse_segment_path("segment--1.mp4"), None);
    }
}
