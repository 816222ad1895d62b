//! Document sniffing: PDFs and Word files, by header and by body.

use std::sync::LazyLock;

use regex::bytes::Regex as BytesRegex;

use super::rules::{first_match, RuleContext, BAD_HEADER_PUBLISHERS, FREE_MARKUP_RULES};
use crate::http_client::HttpResponse;
use crate::utils::is_same_publisher;

static ENCRYPTED: LazyLock<BytesRegex> = LazyLock::new(|| {
    BytesRegex::new(r"/Encrypt \d+ \d+ [A-Za-z]+\s>>\sstartxref").unwrap()
});

/// Smallest body a real PDF can have.
const MIN_PDF_BYTES: u64 = 128;
const MIN_WORD_BYTES: u64 = 512;
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const WORD_CONTENT_TYPES: &[&str] = &[
    "application/msword",
    "application/doc",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Whether the declared length is large enough, treating unparsable values as too small.
fn declared_length_at_least(response: &HttpResponse, min: u64) -> bool {
    match response.header("content-length") {
        Some(raw) => raw.trim().parse::<u64>().is_ok_and(|len| len >= min),
        None => true,
    }
}

pub fn is_pdf_from_header(response: &HttpResponse) -> bool {
    let typed = response
        .content_type()
        .is_some_and(|ct| ct.to_lowercase().contains("application/pdf"))
        || response
            .content_disposition()
            .is_some_and(|cd| cd.to_lowercase().contains("pdf"));

    typed && declared_length_at_least(response, MIN_PDF_BYTES)
}

/// Body starts with the PDF magic and is not encrypted.
pub fn is_pdf_body(body: &[u8]) -> bool {
    body.starts_with(b"%PDF") && !ENCRYPTED.is_match(body)
}

/// Decide whether `response` is the full text as a PDF, or a page known to
/// embed it.
pub fn is_a_pdf_page(response: &HttpResponse, ctx: &RuleContext<'_>) -> bool {
    let bad_headers = BAD_HEADER_PUBLISHERS
        .iter()
        .any(|p| is_same_publisher(ctx.publisher, p));

    if !bad_headers && is_pdf_from_header(response) {
        tracing::debug!("http header says this is a PDF: {}", response.url);
        return true;
    }

    let body = response.body();
    if body.starts_with(b"%PDF") {
        if !is_pdf_body(body) {
            tracing::info!("got encrypted PDF at {}", response.url);
        }
        return is_pdf_body(body);
    }

    let text = response.text();
    if let Some(rule) = first_match(&FREE_MARKUP_RULES, ctx, &text) {
        tracing::debug!("found free markup {} at {}", rule.regex.as_str(), response.url);
        return true;
    }

    false
}

pub fn is_word_doc_from_header(response: &HttpResponse) -> bool {
    let Some(content_type) = response.content_type() else {
        return false;
    };
    let content_type = content_type.to_lowercase();
    WORD_CONTENT_TYPES.iter().any(|t| content_type.contains(t))
        && declared_length_at_least(response, MIN_WORD_BYTES)
}

pub fn is_word_doc(response: &HttpResponse) -> bool {
    if is_word_doc_from_header(response) {
        return true;
    }

    let body = response.body();
    let url = response.url.to_lowercase();

    // A zip archive keeps its central directory record in the last 22 bytes.
    let tail = &body[body.len().saturating_sub(22)..];
    if tail.starts_with(b"PK")
        && (url.ends_with(".docx") || contains(body, b"word/document.xml"))
    {
        return true;
    }

    if body.starts_with(OLE_MAGIC) {
        return true;
    }

    url.contains("kuleuven.be") && url.ends_with(".rtf") && body.starts_with(b"{\\rtf")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
