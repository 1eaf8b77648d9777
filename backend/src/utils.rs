use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VIDEO_ID_PATTERN: Option<Regex> = Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})").ok();
}

/// Returns the first 11-character video id found right after `v=` or `/`.
///
/// This is a syntactic search, not URL validation: any string carrying a
/// conforming token resolves.
pub fn extract_youtube_video_id(url: &str) -> Option<String> {
    if let Some(captures) = VIDEO_ID_PATTERN.as_ref()?.captures(url) {
        return captures.get(1).map(|m| m.as_str().to_string());
    }
    None
}

/// Parses a YouTube statistics counter, which the API sends as a decimal string.
pub fn parse_counter(value: Option<&str>) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}
