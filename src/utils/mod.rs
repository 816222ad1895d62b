//! Shared utility functions.
//!
//! This module contains reusable utilities used across the codebase:
//! - `html`: entity decoding for attribute values pulled out with regexes
//! - `text`: identifier and publisher-name normalisation
//! - `url`: link resolution and scheme clean-up

mod html;
mod text;
mod url;

pub use html::html_unescape;
pub use text::{is_same_publisher, normalize, normalize_doi};
pub use url::{
    clean_url, doi_url, extract_domain, fix_url_scheme, get_link_target, is_doi_url, netloc,
    strip_jsessionid,
};
