//! PDF text extraction through poppler's `pdftotext`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::ServiceError;

/// Text pulled out of a PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfText {
    /// The whole document as one string.
    pub raw: String,
    /// Text per page, in order.
    pub pages: Vec<String>,
}

impl PdfText {
    /// Split `pdftotext` output on its form-feed page separators.
    pub fn from_raw(raw: String) -> Self {
        let mut pages: Vec<String> = raw.split('\x0c').map(str::to_string).collect();
        while pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Self { raw, pages }
    }
}

/// Turns PDF bytes into plain text.
#[async_trait]
pub trait PdfTextExtractor: Send + Sync {
    /// Extract the text of at most `max_pages` pages.
    async fn extract(&self, pdf: &[u8], max_pages: u32) -> Result<PdfText, ServiceError>;
}

/// Runs `pdftotext` with the PDF on stdin.
#[derive(Debug, Clone)]
pub struct PdftotextExtractor {
    binary: String,
}

impl Default for PdftotextExtractor {
    fn default() -> Self {
        Self {
            binary: "pdftotext".to_string(),
        }
    }
}

impl PdftotextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }
}

#[async_trait]
impl PdfTextExtractor for PdftotextExtractor {
    async fn extract(&self, pdf: &[u8], max_pages: u32) -> Result<PdfText, ServiceError> {
        let last_page = max_pages.max(1).to_string();
        let spawned = Command::new(&self.binary)
            .args(["-enc", "UTF-8", "-f", "1", "-l", &last_page, "-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServiceError::ToolNotFound(format!(
                    "{} (install poppler-utils)",
                    self.binary
                )))
            }
            Err(e) => return Err(ServiceError::Io(e)),
        };

        if let Some(mut stdin) = child.stdin.take() {
            // pdftotext may stop reading early on a broken file.
            if let Err(e) = stdin.write_all(pdf).await {
                tracing::debug!("pdftotext closed stdin early: {}", e);
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError::ExtractionFailed(format!(
                "pdftotext failed: {}",
                stderr.trim()
            )));
        }
        Ok(PdfText::from_raw(
            String::from_utf8_lossy(&output.stdout).to_string(),
        ))
    }
}

/// Returns the same text for every PDF. For tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticPdfTextExtractor {
    pub text: Option<String>,
}

#[async_trait]
impl PdfTextExtractor for StaticPdfTextExtractor {
    async fn extract(&self, _pdf: &[u8], _max_pages: u32) -> Result<PdfText, ServiceError> {
        match &self.text {
            Some(text) => Ok(PdfText::from_raw(text.clone())),
            None => Err(ServiceError::ExtractionFailed("no text configured".to_string())),
        }
    }
}
