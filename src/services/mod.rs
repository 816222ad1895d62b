//! External collaborators the core calls through narrow contracts.
//!
//! - `archive`: durable storage for fetched bytes
//! - `pdf_text`: PDF text extraction
//! - `metrics`: counters for scrape attempts and outcomes

mod archive;
mod error;
mod metrics;
mod pdf_text;

pub use archive::{archive_quietly, ArchiveKind, ArchiveSink, FsArchiveSink, NullArchiveSink};
pub use error::ServiceError;
pub use metrics::{MemoryMetricsSink, MetricsSink, TracingMetricsSink};
pub use pdf_text::{PdfText, PdfTextExtractor, PdftotextExtractor, StaticPdfTextExtractor};
