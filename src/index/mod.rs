use crate::Result;
use ohno::IntoAppError;
use serde::Deserialize;
use std::collections::HashMap;

const LOG_TARGET: &str = "    index";

/// Where the canonical-library index CSV is hosted.
pub const DEFAULT_INDEX_URL: &str = "https://unified-agent.s3.amazonaws.com/conan_index_url_map.csv";

/// One row of the canonical-library index: an upstream source URL mapped to a verified library
/// identity.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "conanDownloadUrl")]
    pub conan_download_url: String,

    #[serde(rename = "indexOwner")]
    pub owner: String,

    pub name: String,

    #[serde(rename = "indexVersion")]
    pub version: String,

    #[serde(rename = "repoUrl")]
    pub repo_url: String,

    #[serde(rename = "indexDownloadUrl")]
    pub download_url: String,
}

/// In-memory canonical index, keyed by upstream download URL.
///
/// Fetched once per run; read-only reference data.
#[derive(Debug, Clone, Default)]
pub struct CanonicalIndex {
    by_url: HashMap<String, IndexEntry>,
}

impl CanonicalIndex {
    /// Fetch and parse the remote index CSV.
    pub async fn fetch(index_url: &str) -> Result<Self> {
        log::info!(target: LOG_TARGET, "Fetching canonical library index from {index_url}");

        let body = reqwest::get(index_url)
            .await
            .into_app_err_with(|| format!("could not fetch the canonical index from '{index_url}'"))?
            .error_for_status()
            .into_app_err_with(|| format!("canonical index request to '{index_url}' was rejected"))?
            .bytes()
            .await
            .into_app_err("could not read the canonical index response")?;

        let entries = Self::parse_csv(&body)?;
        log::info!(target: LOG_TARGET, "Canonical index holds {} entries", entries.by_url.len());
        Ok(entries)
    }

    /// Parse index rows out of CSV bytes, keying them by upstream URL.
    pub fn parse_csv(data: &[u8]) -> Result<Self> {
        let mut by_url = HashMap::new();
        let mut reader = csv::Reader::from_reader(data);

        for row in reader.deserialize() {
            let entry: IndexEntry = row.into_app_err("malformed canonical index row")?;
            let _ = by_url.insert(entry.conan_download_url.clone(), entry);
        }

        Ok(Self { by_url })
    }

    #[must_use]
    pub fn lookup(&self, upstream_url: &str) -> Option<&IndexEntry> {
        self.by_url.get(upstream_url)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}
