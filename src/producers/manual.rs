//! Manual overrides. An override replaces every other candidate for its
//! work; an empty override means the work has no open location.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{load_file, ConfigError};
use crate::models::evidence::MANUAL;
use crate::models::{HostType, License, OpenLocation, Version, Work};
use crate::utils::normalize_doi;

/// Journals whose DOI links lead to a site that is no longer trusted.
const SUPPRESSED_ISSN_LS: &[&str] = &["0860-021X"];

/// Fields an override sets. Anything unset stays empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_type: Option<HostType>,
}

impl ManualOverride {
    pub fn is_empty(&self) -> bool {
        self.pdf_url.is_none() && self.metadata_url.is_none()
    }

    /// The single location this override stands for.
    ///
    /// Without an explicit host, a published copy is taken to be the
    /// publisher's and anything else a repository copy.
    pub fn location(&self, doi: &str) -> OpenLocation {
        let mut location = OpenLocation::new(MANUAL)
            .with_pdf_url(self.pdf_url.clone())
            .with_metadata_url(self.metadata_url.clone())
            .with_license(self.license)
            .with_version(self.version)
            .with_doi(doi);
        location.host_type = self.host_type.unwrap_or(match self.version {
            Some(Version::Published) => HostType::Publisher,
            _ => HostType::Repository,
        });
        location
    }
}

fn submitted(pdf_url: &str) -> ManualOverride {
    ManualOverride {
        pdf_url: Some(pdf_url.to_string()),
        version: Some(Version::Submitted),
        ..ManualOverride::default()
    }
}

/// Manual override table keyed by normalised DOI.
#[derive(Debug, Clone, Default)]
pub struct ManualOverrides {
    by_doi: HashMap<String, ManualOverride>,
}

impl ManualOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides collected from reader reports.
    pub fn builtin() -> Self {
        let mut overrides = Self::new();
        overrides.insert("10.1038/nature21360", submitted("https://arxiv.org/pdf/1703.01424.pdf"));
        overrides.insert(
            "10.1021/acs.jproteome.5b00852",
            ManualOverride {
                pdf_url: Some("http://pubs.acs.org/doi/pdfplus/10.1021/acs.jproteome.5b00852".into()),
                version: Some(Version::Published),
                host_type: Some(HostType::Publisher),
                ..ManualOverride::default()
            },
        );
        overrides.insert("10.1098/rspa.1998.0160", submitted("https://arxiv.org/pdf/quant-ph/9706064.pdf"));
        overrides.insert("10.3386/w23298", submitted("https://economics.mit.edu/files/12774"));
        overrides.insert(
            "10.1126/science.1150952",
            ManualOverride {
                host_type: Some(HostType::Repository),
                ..submitted("http://citeseerx.ist.psu.edu/viewdoc/download?doi=10.1.1.168.3796&rep=rep1&type=pdf")
            },
        );
        // Only a data deposit matches the title.
        overrides.insert("10.1126/science.aaf3777", ManualOverride::default());
        overrides.insert("10.1126/science.aad2622", ManualOverride::default());
        overrides.insert("10.1016/j.renene.2015.04.017", ManualOverride::default());
        overrides
    }

    pub fn insert(&mut self, doi: &str, entry: ManualOverride) {
        let key = normalize_doi(doi).unwrap_or_else(|| doi.to_lowercase());
        self.by_doi.insert(key, entry);
    }

    /// Merge `other` in; its entries win.
    pub fn extend(&mut self, other: ManualOverrides) {
        self.by_doi.extend(other.by_doi);
    }

    pub fn len(&self) -> usize {
        self.by_doi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_doi.is_empty()
    }

    /// Load overrides from a TOML, YAML or JSON map of DOI to override.
    /// A `null` or empty entry removes every location for that DOI.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw: HashMap<String, Option<ManualOverride>> = load_file(path).await?;
        let mut overrides = Self::new();
        for (doi, entry) in raw {
            overrides.insert(&doi, entry.unwrap_or_default());
        }
        tracing::debug!("Loaded {} manual overrides from {}", overrides.len(), path.display());
        Ok(overrides)
    }

    /// The replacement location set for `work`, or `None` if nothing overrides it.
    pub fn get(&self, work: &Work) -> Option<Vec<OpenLocation>> {
        if let Some(entry) = self.by_doi.get(&work.doi) {
            tracing::info!("manual override for {}", work.doi);
            if entry.is_empty() {
                return Some(Vec::new());
            }
            return Some(vec![entry.location(&work.doi)]);
        }
        if work
            .issn_l
            .as_deref()
            .is_some_and(|i| SUPPRESSED_ISSN_LS.contains(&i))
        {
            return Some(Vec::new());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_overrides() {
        let overrides = ManualOverrides::builtin();
        let work = Work::new("https://doi.org/10.1038/NATURE21360").unwrap();
        let locations = overrides.get(&work).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].evidence, MANUAL);
        assert_eq!(locations[0].host_type, HostType::Repository);
        assert_eq!(locations[0].version, Some(Version::Submitted));

        let suppressed = Work::new("10.1126/science.aaf3777").unwrap();
        assert_eq!(overrides.get(&suppressed), Some(Vec::new()));

        assert_eq!(overrides.get(&Work::new("10.1234/none").unwrap()), None);
    }

    #[test]
    fn test_suppressed_journal() {
        let mut work = Work::new("10.5114/biolsport.2020.1").unwrap();
        work.issn_l = Some("0860-021X".into());
        assert_eq!(ManualOverrides::new().get(&work), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("overrides.json");
        std::fs::write(
            &path,
            r#"{
                "10.1234/A": {"metadata_url": "https://publisher.example.com/a", "version": "publishedVersion", "license": "cc-by"},
                "10.1234/b": null,
                "10.1234/c": {}
            }"#,
        )
        .unwrap();

        let overrides = ManualOverrides::load(&path).await.unwrap();
        assert_eq!(overrides.len(), 3);

        let a = overrides.get(&Work::new("10.1234/a").unwrap()).unwrap();
        assert_eq!(a[0].host_type, HostType::Publisher);
        assert_eq!(a[0].license, Some(License::CcBy));
        assert!(overrides.get(&Work::new("10.1234/b").unwrap()).unwrap().is_empty());
        assert!(overrides.get(&Work::new("10.1234/c").unwrap()).unwrap().is_empty());
    }
}
