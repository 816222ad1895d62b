//! PDF URL validity. A separate checker fetches candidate PDF links and
//! records whether they really served a PDF; resolution only reads that
//! record.

use std::collections::HashMap;

pub trait PdfUrlValidator: Send + Sync {
    /// Whether a location with this PDF URL may be kept.
    fn is_valid(&self, pdf_url: &str) -> bool;
}

/// Trusts every PDF URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllPdfUrls;

impl PdfUrlValidator for AcceptAllPdfUrls {
    fn is_valid(&self, _pdf_url: &str) -> bool {
        true
    }
}

/// Recorded check results. URLs that were never checked are kept.
#[derive(Debug, Clone, Default)]
pub struct CheckedPdfUrls {
    checked: HashMap<String, bool>,
}

impl CheckedPdfUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, pdf_url: &str, is_pdf: bool) {
        self.checked.insert(pdf_url.to_string(), is_pdf);
    }
}

impl FromIterator<(String, bool)> for CheckedPdfUrls {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            checked: iter.into_iter().collect(),
        }
    }
}

impl PdfUrlValidator for CheckedPdfUrls {
    fn is_valid(&self, pdf_url: &str) -> bool {
        self.checked.get(pdf_url).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchecked_urls_are_valid() {
        let mut checked = CheckedPdfUrls::new();
        checked.record("https://repo.example.edu/broken.pdf", false);
        checked.record("https://repo.example.edu/ok.pdf", true);
        assert!(!checked.is_valid("https://repo.example.edu/broken.pdf"));
        assert!(checked.is_valid("https://repo.example.edu/ok.pdf"));
        assert!(checked.is_valid("https://repo.example.edu/new.pdf"));
        assert!(AcceptAllPdfUrls.is_valid("anything"));
    }
}
