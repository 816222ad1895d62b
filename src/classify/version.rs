//! Manuscript version and license cues, layered by how far each source is trusted.
//!
//! A [`VersionCascade`] starts at a policy guess and accepts later evidence
//! only from a source ranked at least as high as the one that set the current
//! value, so a weaker signal never undoes a stronger one.

use std::sync::LazyLock;

use regex::Regex;

use super::license::find_normalized_license;
use crate::models::{License, Version};
use crate::utils::extract_domain;

/// Where a version decision came from, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionSource {
    Default,
    RepositoryPolicy,
    RecordMetadata,
    PdfText,
    /// The harvested record names exactly this version in `dc:type`.
    StrictMetadata,
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCascade {
    version: Version,
    source: VersionSource,
    license: Option<License>,
}

impl VersionCascade {
    pub fn new(default: Version) -> Self {
        Self {
            version: default,
            source: VersionSource::Default,
            license: None,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn source(&self) -> VersionSource {
        self.source
    }

    pub fn license(&self) -> Option<License> {
        self.license
    }

    /// Take `version` unless the current value came from a more trusted source.
    pub fn offer(&mut self, version: Version, source: VersionSource) -> bool {
        if source < self.source {
            tracing::debug!(
                "ignoring {} from {:?}, already {} from {:?}",
                version.as_str(),
                source,
                self.version.as_str(),
                self.source
            );
            return false;
        }
        self.version = version;
        self.source = source;
        true
    }

    pub fn set_license(&mut self, license: Option<License>) {
        self.license = license;
    }

    /// Keep an earlier license; only fill in a missing one.
    pub fn fill_license(&mut self, license: Option<License>) {
        if self.license.is_none() {
            self.license = license;
        }
    }
}

/// Policy guess before any page evidence is seen.
pub fn default_version(no_submitted_versions: bool, pmh_id: Option<&str>) -> Version {
    if no_submitted_versions || pmh_id.is_some_and(|id| id.contains("oai:library.wur.nl:wurpubs")) {
        Version::Accepted
    } else {
        Version::Submitted
    }
}

/// Compile a static pattern table; panics on a bad pattern.
fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid version pattern {:?}: {}", p, e)))
        .collect()
}

static RECORD_ACCEPTED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?ims)accepted.?version",
        r"(?ims)version.?accepted",
        r"(?ims)accepted.?manuscript",
        r"(?ims)<dc:type>peer.?reviewed</dc:type>",
        r"(?ims)<dc:description>Refereed/Peer-reviewed</dc:description>",
    ])
});

static RECORD_PUBLISHED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?ims)<dc:type>.*publishedVersion</dc:type>",
        r"(?ims)<dc:type\.version>.*publishedVersion</dc:type\.version>",
        r"(?ims)<free_to_read>.*published.*</free_to_read>",
    ])
});

static RECORD_RIGHTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?ims)<dc:rights>(.*)</dc:rights>",
        r"(?ims)<dc:rights\.license>(.*)</dc:rights\.license>",
    ])
});

static ABERTAY_PDF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://rke\.abertay\.ac\.uk").unwrap());
static ABERTAY_PUBLISHED: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r"Publishe[dr]_?\d\d\d\d\.pdf$", r"\d\d\d\d_?Publishe[dr].pdf$"]));

static CROSSMARK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)crossmark\.[^/]*\.org/").unwrap());

static PDF_PUBLISHED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"©.?\d{4}",
        r"© The Author\(s\),? \d{4}",
        r"(?i)\(C\).?\d{4}",
        r"(?i)copyright.{0,6}\d{4}",
        r"(?ims)received.{0,100}revised.{0,100}accepted.{0,100}publication",
        r"(?i)all rights reserved",
        r"(?ims)This article is distributed under the terms of the Creative Commons",
        r"(?ims)This article is licensed under a Creative Commons",
        r"(?ims)this is an open access article",
        r"(?ims)This article is brought to you for free and open access by Works.",
    ])
});

static PDF_ACCEPTED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?ims)This is a post-peer-review, pre-copyedit version",
        r"(?ims)This is the peer reviewed version of the following article",
        r"(?ims)The present manuscript as of \d\d \w+ \d\d\d\d has been accepted",
        r"(?ims)Post-peer-review, pre-copyedit version of accepted manuscript",
        r#"(?ims)This is a "Post-Print" accepted manuscript"#,
    ])
});

static FIRST_PAGE_PUBLISHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ims)Document Version\s+Final published version.").unwrap());
static FIRST_PAGE_ACCEPTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ims)Document Version:\s*Peer reviewed version").unwrap());

const ACCEPTED_HEADINGS: &[&str] = &["final accepted version", "accepted manuscript"];

/// Records whose version every heuristic gets wrong.
const VERSION_OVERRIDES: &[(&str, Version)] = &[
    ("oai:dspace.cvut.cz:10467/86163", Version::Submitted),
    ("oai:repository.arizona.edu:10150/633848", Version::Accepted),
    ("oai:archive.ugent.be:6914822", Version::Accepted),
    ("oai:serval.unil.ch:BIB_E033703283B2", Version::Accepted),
    ("oai:serval.unil.ch:BIB_3108959306C9", Version::Accepted),
    ("oai:serval.unil.ch:BIB_08C9BAB31C2E", Version::Accepted),
    ("oai:serval.unil.ch:BIB_E8CC2511C152", Version::Accepted),
    ("oai:HAL:hal-01924005v1", Version::Accepted),
    ("oai:serval.unil.ch:BIB_FC320764865F", Version::Published),
    ("oai:serval.unil.ch:BIB_12B5A0826BD9", Version::Accepted),
    ("oai:upcommons.upc.edu:2117/115471", Version::Accepted),
    ("oai:zenodo.org:4267175", Version::Accepted),
    ("oai:europepmc.org:7435056", Version::Accepted),
];

/// Records whose license text is misleading.
const LICENSE_OVERRIDES: &[(&str, Option<License>)] =
    &[("oai:academiccommons.columbia.edu:10.7916/D8D80PCQ", None)];

pub fn version_override(pmh_id: &str) -> Option<Version> {
    VERSION_OVERRIDES
        .iter()
        .find(|(id, _)| *id == pmh_id)
        .map(|(_, v)| *v)
}

pub fn license_override(pmh_id: &str) -> Option<Option<License>> {
    LICENSE_OVERRIDES
        .iter()
        .find(|(id, _)| *id == pmh_id)
        .map(|(_, l)| *l)
}

/// Apply the repository policy and the harvested record.
pub fn apply_record(
    cascade: &mut VersionCascade,
    no_submitted_versions: bool,
    record_xml: Option<&str>,
    pmh_id: Option<&str>,
    pdf_url: Option<&str>,
) {
    if no_submitted_versions && cascade.version() != Version::Published {
        cascade.offer(Version::Accepted, VersionSource::RepositoryPolicy);
    }

    if let Some(xml) = record_xml {
        if RECORD_ACCEPTED.iter().any(|re| re.is_match(xml)) {
            cascade.offer(Version::Accepted, VersionSource::RecordMetadata);
        }
        if RECORD_PUBLISHED.iter().any(|re| re.is_match(xml)) {
            cascade.offer(Version::Published, VersionSource::RecordMetadata);
        }

        for re in RECORD_RIGHTS.iter() {
            for caps in re.captures_iter(xml) {
                if let Some(license) = caps.get(1).and_then(|m| find_normalized_license(m.as_str())) {
                    cascade.set_license(Some(license));
                }
            }
        }
    }

    if let Some(license) = pmh_id.and_then(license_override) {
        cascade.set_license(license);
    }

    if let Some(url) = pdf_url.filter(|u| ABERTAY_PDF.is_match(u)) {
        if ABERTAY_PUBLISHED.iter().any(|re| re.is_match(url)) {
            cascade.offer(Version::Published, VersionSource::RecordMetadata);
        }
    }

    if let Some(xml) = record_xml {
        let strict = format!("<dc:type>{}</dc:type>", cascade.version().as_str()).to_lowercase();
        if xml.to_lowercase().contains(&strict) {
            cascade.offer(cascade.version(), VersionSource::StrictMetadata);
        }
    }

    apply_overrides(cascade, pmh_id);
}

/// What the fetched PDF says about itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfEvidence<'a> {
    /// Lossy text of the raw bytes, searched for the crossmark widget.
    pub raw_text: &'a str,
    /// Extracted text, one entry per page.
    pub pages: &'a [String],
    pub url: &'a str,
}

/// Apply cues from the PDF body.
pub fn apply_pdf_text(cascade: &mut VersionCascade, pdf: &PdfEvidence<'_>) {
    if CROSSMARK.is_match(pdf.raw_text) {
        cascade.offer(Version::Published, VersionSource::PdfText);
    }

    let text = pdf.pages.join("\n");
    if text.is_empty() {
        return;
    }

    if cascade.version() != Version::Published {
        if let Some(re) = PDF_PUBLISHED.iter().find(|re| re.is_match(&text)) {
            if cascade.offer(Version::Published, VersionSource::PdfText) {
                tracing::info!("found {}, decided PDF is published version", re.as_str());
            }
        }
    }

    if cascade.version() != Version::Accepted {
        if let Some(re) = PDF_ACCEPTED.iter().find(|re| re.is_match(&text)) {
            if cascade.offer(Version::Accepted, VersionSource::PdfText) {
                tracing::info!("found {}, decided PDF is accepted version", re.as_str());
            }
        }

        if pdf.url.contains("61RMIT_INST") && text.contains("Version: Accepted") {
            cascade.offer(Version::Accepted, VersionSource::PdfText);
        }

        if let Some(first_page) = pdf.pages.first() {
            if first_page.contains("Version: Accepted") {
                cascade.offer(Version::Accepted, VersionSource::PdfText);
            }
            if FIRST_PAGE_PUBLISHED.is_match(first_page) {
                cascade.offer(Version::Published, VersionSource::PdfText);
            }
            if FIRST_PAGE_ACCEPTED.is_match(first_page) {
                cascade.offer(Version::Accepted, VersionSource::PdfText);
            }
        }

        let heading: String = text.chars().take(50).collect::<String>().to_lowercase();
        if ACCEPTED_HEADINGS.iter().any(|h| heading.contains(h)) {
            cascade.offer(Version::Accepted, VersionSource::PdfText);
        }
    }

    cascade.fill_license(find_normalized_license(&text));
}

pub fn apply_overrides(cascade: &mut VersionCascade, pmh_id: Option<&str>) {
    if let Some(version) = pmh_id.and_then(version_override) {
        cascade.offer(version, VersionSource::Override);
    }
}

/// Repository landing pages that state the version in prose.
pub fn version_from_landing_page(url: &str, html: &str) -> Option<Version> {
    let host = extract_domain(url)?;

    if host.ends_with("serval.unil.ch") {
        if html.contains("Version: Final published version") {
            return Some(Version::Published);
        }
        if html.contains("Version: Author's accepted manuscript") {
            return Some(Version::Accepted);
        }
    }

    if host.ends_with("repository.lboro.ac.uk") && html.contains("AM (Accepted Manuscript)") {
        return Some(Version::Accepted);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_tables_compile_completely() {
        assert_eq!(RECORD_ACCEPTED.len(), 5);
        assert_eq!(RECORD_PUBLISHED.len(), 3);
        assert_eq!(RECORD_RIGHTS.len(), 2);
        assert_eq!(ABERTAY_PUBLISHED.len(), 2);
        assert_eq!(PDF_PUBLISHED.len(), 10);
        assert_eq!(PDF_ACCEPTED.len(), 5);
    }

    #[test]
    #[should_panic(expected = "invalid version pattern")]
    fn test_bad_pattern_is_not_dropped() {
        compile(&[r"accepted", r"(unclosed"]);
    }

    #[test]
    fn test_default_version() {
        assert_eq!(default_version(false, None), Version::Submitted);
        assert_eq!(default_version(true, None), Version::Accepted);
        assert_eq!(
            default_version(false, Some("oai:library.wur.nl:wurpubs/1")),
            Version::Accepted
        );
    }

    #[test]
    fn test_weaker_source_never_regresses() {
        let mut cascade = VersionCascade::new(Version::Submitted);
        assert!(cascade.offer(Version::Published, VersionSource::StrictMetadata));
        assert!(!cascade.offer(Version::Accepted, VersionSource::PdfText));
        assert_eq!(cascade.version(), Version::Published);
        assert!(cascade.offer(Version::Accepted, VersionSource::Override));
        assert_eq!(cascade.version(), Version::Accepted);
    }

    #[test]
    fn test_record_cues_and_rights() {
        let xml = "<record><dc:type>info:eu-repo/semantics/acceptedVersion</dc:type>\
                   <dc:rights>http://creativecommons.org/licenses/by/4.0/</dc:rights></record>";
        let mut cascade = VersionCascade::new(default_version(false, None));
        apply_record(&mut cascade, false, Some(xml), Some("oai:x:1"), None);
        assert_eq!(cascade.version(), Version::Accepted);
        assert_eq!(cascade.source(), VersionSource::RecordMetadata);
        assert_eq!(cascade.license(), Some(License::CcBy));
    }

    #[test]
    fn test_strict_record_blocks_pdf_text() {
        let xml = "<dc:type>publishedVersion</dc:type>";
        let mut cascade = VersionCascade::new(Version::Submitted);
        apply_record(&mut cascade, false, Some(xml), None, None);
        assert_eq!(cascade.source(), VersionSource::StrictMetadata);

        let pages = vec!["This is a post-peer-review, pre-copyedit version of an article".to_string()];
        apply_pdf_text(
            &mut cascade,
            &PdfEvidence {
                raw_text: "",
                pages: &pages,
                url: "https://repo/a.pdf",
            },
        );
        assert_eq!(cascade.version(), Version::Published);
    }

    #[test]
    fn test_pdf_text_cues() {
        let pages = vec!["Journal of Things © 2019 Elsevier Ltd. All rights reserved.".to_string()];
        let mut cascade = VersionCascade::new(Version::Submitted);
        apply_pdf_text(
            &mut cascade,
            &PdfEvidence {
                raw_text: "",
                pages: &pages,
                url: "https://repo/a.pdf",
            },
        );
        assert_eq!(cascade.version(), Version::Published);

        let pages = vec!["Accepted Manuscript\nTitle of the paper".to_string()];
        let mut cascade = VersionCascade::new(Version::Submitted);
        apply_pdf_text(
            &mut cascade,
            &PdfEvidence {
                raw_text: "",
                pages: &pages,
                url: "https://repo/a.pdf",
            },
        );
        assert_eq!(cascade.version(), Version::Accepted);
    }

    #[test]
    fn test_crossmark_and_license_fill() {
        let pages = vec!["Distributed under CC BY 4.0".to_string()];
        let mut cascade = VersionCascade::new(Version::Submitted);
        apply_pdf_text(
            &mut cascade,
            &PdfEvidence {
                raw_text: "https://crossmark.crossref.org/dialog",
                pages: &pages,
                url: "https://repo/a.pdf",
            },
        );
        assert_eq!(cascade.version(), Version::Published);
        assert_eq!(cascade.license(), Some(License::CcBy));
    }

    #[test]
    fn test_overrides() {
        let mut cascade = VersionCascade::new(Version::Submitted);
        apply_record(
            &mut cascade,
            false,
            Some("<dc:type>submittedVersion</dc:type><dc:rights>CC BY</dc:rights>"),
            Some("oai:zenodo.org:4267175"),
            None,
        );
        assert_eq!(cascade.version(), Version::Accepted);
        assert_eq!(cascade.source(), VersionSource::Override);

        let mut cascade = VersionCascade::new(Version::Submitted);
        apply_record(
            &mut cascade,
            false,
            Some("<dc:rights>CC BY</dc:rights>"),
            Some("oai:academiccommons.columbia.edu:10.7916/D8D80PCQ"),
            None,
        );
        assert_eq!(cascade.license(), None);
    }

    #[test]
    fn test_abertay_filenames() {
        let mut cascade = VersionCascade::new(Version::Submitted);
        apply_record(
            &mut cascade,
            false,
            None,
            None,
            Some("https://rke.abertay.ac.uk/files/1/Smith_Published_2019.pdf"),
        );
        assert_eq!(cascade.version(), Version::Published);
    }

    #[test]
    fn test_landing_page_versions() {
        assert_eq!(
            version_from_landing_page(
                "https://serval.unil.ch/notice/serval:BIB_1",
                "<td>Version: Final published version</td>"
            ),
            Some(Version::Published)
        );
        assert_eq!(
            version_from_landing_page("https://repository.lboro.ac.uk/x", "AM (Accepted Manuscript)"),
            Some(Version::Accepted)
        );
        assert_eq!(version_from_landing_page("https://repo.example.edu/x", "AM (Accepted Manuscript)"), None);
    }
}
