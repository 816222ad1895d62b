//! HTML entity decoding.

/// Decode HTML entities in redirect targets and inline attribute values.
/// Named, decimal and hex forms are all handled; bare ampersands are kept.
pub fn html_unescape(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}
