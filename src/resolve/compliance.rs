//! Reported-noncompliant copies: URLs that rights holders or readers have
//! reported as infringing or wrong for a particular work.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::config::{load_file, ConfigError};
use crate::models::OpenLocation;
use crate::utils::normalize_doi;

const BUILTIN_FRAGMENTS: &[(&str, &[&str])] = &[
    (
        "10.1016/j.tcb.2014.11.005",
        &[
            "doi.org/10.6084/m9.figshare.1409475",
            "figshare.com/articles/An_open_data_ecosystem_for_cell_migration_research_/1409475",
            "doi.org/10.6084/M9.FIGSHARE.3114679",
        ],
    ),
    (
        "10.1016/j.vaccine.2014.04.085",
        &["ruvzca.sk/sites/default/files/dodatocne-subory/meta-analysis_vaccin_autism_2014.pdf"],
    ),
    ("10.1093/nar/gkx1020", &["doi.org/10.1093/nar/gkx1020"]),
    (
        "10.1145/3342428.3342662",
        &[
            "http://hdl.handle.net/11693/52923",
            "https://hdl.handle.net/11511/31020",
            "https://open.metu.edu.tr/bitstream/handle/11511/31020/index.pdf",
        ],
    ),
    (
        "10.1016/j.micromeso.2021.110909",
        &[
            "https://chemrxiv.org/ndownloader/files/22221642",
            "https://s3-eu-west-1.amazonaws.com/itempdf74155353254prod/12073869/General_Cluster_Sorption_Isotherm_v1.pdf",
        ],
    ),
    ("10.1126/science.abf8003", &["https://doi.org/10.1126/science.abf8003"]),
    ("10.1007/978-3-662-05094-1", &["https://zenodo.org/record/4454681"]),
    ("10.1007/978-3-662-44874-8", &["https://zenodo.org/record/4454681"]),
    (
        "10.1386/jwcp.3.1.31_1",
        &["https://www.intellectbooks.com/asset/76511/1/JWCP_CallforTeamMembers_2023_1_.pdf"],
    ),
    ("10.5153/sro.3693", &["http://www.ejustice.just.fgov.be/mopdf/2013/04/11_1.pdf#Page41"]),
    (
        "10.29228/jamp.53876",
        &["https://academicmed.org/Uploads/Volume7Issue1/1.%20[4520.%20JAMP_MOGA]%201-5.pdf"],
    ),
];

/// URLs that are never a copy of any work.
const BUILTIN_BLACKLIST: &[&str] =
    &["https://pq-static-content.proquest.com/collateral/media2/documents/ebookcentral-dda.pdf"];

/// On-disk form of the registry.
#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    /// DOI to URL fragments.
    #[serde(default)]
    fragments: HashMap<String, Vec<String>>,
    /// Exact URLs rejected for every work.
    #[serde(default)]
    blacklist: Vec<String>,
}

/// Per-work URL fragments plus a global URL blacklist.
#[derive(Debug, Clone, Default)]
pub struct NoncompliantRegistry {
    fragments: HashMap<String, Vec<String>>,
    blacklist: HashSet<String>,
}

impl NoncompliantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (doi, fragments) in BUILTIN_FRAGMENTS {
            for fragment in *fragments {
                registry.add_fragment(doi, fragment);
            }
        }
        for url in BUILTIN_BLACKLIST {
            registry.blacklist.insert(url.to_string());
        }
        registry
    }

    /// Load a registry file (TOML, YAML or JSON).
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let file: RegistryFile = load_file(path).await?;
        let mut registry = Self::new();
        for (doi, fragments) in file.fragments {
            for fragment in fragments {
                registry.add_fragment(&doi, &fragment);
            }
        }
        registry.blacklist.extend(file.blacklist);
        tracing::debug!(
            "Loaded noncompliant registry from {}: {} works, {} blacklisted URLs",
            path.display(),
            registry.fragments.len(),
            registry.blacklist.len()
        );
        Ok(registry)
    }

    pub fn add_fragment(&mut self, doi: &str, fragment: &str) {
        let key = normalize_doi(doi).unwrap_or_else(|| doi.to_lowercase());
        self.fragments
            .entry(key)
            .or_default()
            .push(fragment.to_lowercase());
    }

    pub fn extend(&mut self, other: NoncompliantRegistry) {
        for (doi, fragments) in other.fragments {
            self.fragments.entry(doi).or_default().extend(fragments);
        }
        self.blacklist.extend(other.blacklist);
    }

    pub fn is_noncompliant_url(&self, doi: Option<&str>, url: &str) -> bool {
        if url.is_empty() {
            return false;
        }
        if self.blacklist.contains(url) {
            return true;
        }
        let Some(fragments) = doi
            .and_then(normalize_doi)
            .and_then(|doi| self.fragments.get(&doi))
        else {
            return false;
        };
        let url = url.to_lowercase();
        fragments.iter().any(|f| url.contains(f.as_str()))
    }

    /// Either URL of the location has been reported.
    pub fn is_noncompliant(&self, location: &OpenLocation) -> bool {
        let doi = location.doi.as_deref();
        [location.pdf_url.as_deref(), location.metadata_url.as_deref()]
            .into_iter()
            .flatten()
            .any(|url| self.is_noncompliant_url(doi, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::evidence;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_fragments_match_case_insensitively() {
        let registry = NoncompliantRegistry::builtin();
        assert!(registry.is_noncompliant_url(
            Some("10.1016/J.TCB.2014.11.005"),
            "https://doi.org/10.6084/M9.FIGSHARE.1409475"
        ));
        assert!(!registry.is_noncompliant_url(
            Some("10.1234/other"),
            "https://doi.org/10.6084/m9.figshare.1409475"
        ));
        assert!(!registry.is_noncompliant_url(None, "https://doi.org/10.6084/m9.figshare.1409475"));
    }

    #[test]
    fn test_blacklist_applies_to_every_work() {
        let registry = NoncompliantRegistry::builtin();
        let location = OpenLocation::new("oa repository (via OAI-PMH doi match)")
            .with_pdf_url(Some(BUILTIN_BLACKLIST[0].to_string()))
            .with_doi("10.1234/any");
        assert!(registry.is_noncompliant(&location));
    }

    #[test]
    fn test_metadata_url_is_checked() {
        let registry = NoncompliantRegistry::builtin();
        let location = OpenLocation::new(evidence::FREE_ARTICLE)
            .with_metadata_url(Some("https://doi.org/10.1126/science.abf8003".into()))
            .with_doi("10.1126/science.abf8003");
        assert!(registry.is_noncompliant(&location));
    }

    #[tokio::test]
    async fn test_load_toml_registry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("noncompliant.toml");
        std::fs::write(
            &path,
            r#"
blacklist = ["https://spam.example.com/all.pdf"]

[fragments]
"10.1234/A" = ["Mirror.Example.org/copy"]
"#,
        )
        .unwrap();

        let registry = NoncompliantRegistry::load(&path).await.unwrap();
        assert!(registry.is_noncompliant_url(Some("10.1234/a"), "https://mirror.example.org/copy/1.pdf"));
        assert!(registry.is_noncompliant_url(None, "https://spam.example.com/all.pdf"));
    }
}
