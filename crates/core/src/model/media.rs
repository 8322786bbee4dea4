use std::fmt;

use url::Url;

//
// ─── VIDEO ID ──────────────────────────────────────────────────────────────────
//

/// Opaque identifier of a hosted streaming video (always 11 characters).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    pub const LEN: usize = 11;

    /// Accepts exactly [`VideoId::LEN`] characters; anything else yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        (raw.chars().count() == Self::LEN).then(|| Self(raw.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VideoId({})", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── MEDIA KIND ────────────────────────────────────────────────────────────────
//

/// Rendering/interaction strategy for a lesson's media reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    None,
    StreamingVideo(VideoId),
    RawVideo(String),
    Image(String),
    Document,
    Other,
}

impl MediaKind {
    /// Only hosted streaming video is observed by the playback watcher, so only it
    /// gates completion on playback.
    #[must_use]
    pub fn is_playback_gated(&self) -> bool {
        matches!(self, MediaKind::StreamingVideo(_))
    }

    #[must_use]
    pub fn video_id(&self) -> Option<&VideoId> {
        match self {
            MediaKind::StreamingVideo(id) => Some(id),
            _ => None,
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "avi"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf"];

/// Classify a lesson media reference. Never fails.
#[must_use]
pub fn classify(media_ref: Option<&str>) -> MediaKind {
    let Some(raw) = media_ref.map(str::trim).filter(|s| !s.is_empty()) else {
        return MediaKind::None;
    };

    if let Some(id) = streaming_video_id(raw) {
        return MediaKind::StreamingVideo(id);
    }

    match extension(raw) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Image(ext),
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::RawVideo(ext),
        Some(ext) if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Document,
        _ => MediaKind::Other,
    }
}

//
// ─── STREAMING VIDEO DETECTION ─────────────────────────────────────────────────
//

/// Path-style markers, checked in this order at each position.
const PATH_MARKERS: &[&str] = &["youtu.be/", "v/", "vi/", "embed/", "shorts/", "live/"];

/// Query-style markers (`watch?v=` is covered by `?v=`).
const QUERY_MARKERS: &[&str] = &["?vi=", "?v=", "&vi=", "&v="];

/// Finds the right-most marker and takes the run up to the next `#`, `&` or `?`.
/// The id is accepted only if that run is exactly 11 characters long; an earlier
/// marker is never retried.
fn streaming_video_id(raw: &str) -> Option<VideoId> {
    let start = raw
        .char_indices()
        .rev()
        .find_map(|(pos, _)| marker_len(&raw[pos..]).map(|len| pos + len))?;

    let rest = &raw[start..];
    let end = rest.find(['#', '&', '?']).unwrap_or(rest.len());
    VideoId::parse(&rest[..end])
}

fn marker_len(rest: &str) -> Option<usize> {
    if let Some(m) = PATH_MARKERS.iter().find(|m| rest.starts_with(**m)) {
        return Some(m.len());
    }

    // `u/<word char>/`
    let bytes = rest.as_bytes();
    if bytes.len() >= 4
        && bytes[0] == b'u'
        && bytes[1] == b'/'
        && (bytes[2].is_ascii_alphanumeric() || bytes[2] == b'_')
        && bytes[3] == b'/'
    {
        return Some(4);
    }

    QUERY_MARKERS
        .iter()
        .find(|m| rest.starts_with(**m))
        .map(|m| m.len())
}

//
// ─── EXTENSION ─────────────────────────────────────────────────────────────────
//

fn extension(raw: &str) -> Option<String> {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_owned(),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_owned(),
    };

    let segment = path.rsplit('/').next().unwrap_or_default();
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str) -> MediaKind {
        MediaKind::StreamingVideo(VideoId::parse(id).unwrap())
    }

    #[test]
    fn missing_or_blank_reference_is_none() {
        assert_eq!(classify(None), MediaKind::None);
        assert_eq!(classify(Some("")), MediaKind::None);
        assert_eq!(classify(Some("   ")), MediaKind::None);
    }

    #[test]
    fn recognises_common_streaming_url_shapes() {
        let cases = [
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/live/dQw4w9WgXcQ?feature=share",
            "https://www.youtube.com/watch?feature=player&v=dQw4w9WgXcQ",
            "https://www.youtube.com/u/x/dQw4w9WgXcQ",
        ];
        for case in cases {
            assert_eq!(classify(Some(case)), video("dQw4w9WgXcQ"), "{case}");
        }
    }

    #[test]
    fn bare_v_path_is_streaming_video() {
        assert_eq!(
            classify(Some("https://example.com/v/AbCdEfGhIjK")),
            video("AbCdEfGhIjK")
        );
    }

    #[test]
    fn wrong_length_id_falls_through_to_extension() {
        assert_eq!(
            classify(Some("https://youtu.be/short")),
            MediaKind::Other
        );
        assert_eq!(
            classify(Some("https://cdn.example.com/v/clip.mp4")),
            MediaKind::RawVideo("mp4".into())
        );
    }

    #[test]
    fn extension_classification_is_case_insensitive() {
        assert_eq!(classify(Some("lecture.pdf")), MediaKind::Document);
        assert_eq!(classify(Some("Slides.PDF")), MediaKind::Document);
        assert_eq!(
            classify(Some("https://cdn.example.com/img/Diagram.PNG?size=large")),
            MediaKind::Image("png".into())
        );
        assert_eq!(
            classify(Some("/uploads/intro.WebM")),
            MediaKind::RawVideo("webm".into())
        );
    }

    #[test]
    fn unknown_or_missing_extension_is_other() {
        assert_eq!(classify(Some("notes")), MediaKind::Other);
        assert_eq!(classify(Some("archive.zip")), MediaKind::Other);
        assert_eq!(classify(Some("https://example.com/files/")), MediaKind::Other);
    }

    #[test]
    fn only_streaming_video_is_gated() {
        assert!(video("dQw4w9WgXcQ").is_playback_gated());
        assert!(!MediaKind::RawVideo("mp4".into()).is_playback_gated());
        assert!(!MediaKind::None.is_playback_gated());
    }
}
