use serde::Deserialize;

/// Library type string used for source libraries in inventory records.
pub const SOURCE_LIBRARY_TYPE: &str = "SOURCE_LIBRARY";

/// Library type string used for source libraries in keyword-search results.
pub const SOURCE_LIBRARY_SEARCH_TYPE: &str = "Source Library";

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationDetails {
    #[serde(rename = "orgName")]
    pub org_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductSummary {
    #[serde(rename = "productName")]
    pub product_name: String,

    #[serde(rename = "productToken")]
    pub product_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSummary {
    #[serde(rename = "projectName")]
    pub project_name: String,

    #[serde(rename = "projectToken")]
    pub project_token: String,
}

/// One row of the project due-diligence report.
#[derive(Debug, Clone, Deserialize)]
pub struct DueDiligenceEntry {
    /// Library display name; carries a trailing `*` when the library has more than one license.
    pub library: String,

    #[serde(rename = "downloadLink", default)]
    pub download_link: Option<String>,

    #[serde(default)]
    pub license: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceFileLibrary {
    #[serde(rename = "artifactId")]
    pub artifact_id: String,

    pub version: String,
}

/// One file of the project's scanned source-file inventory.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceFile {
    pub sha1: String,
    pub path: String,
    pub library: SourceFileLibrary,
}

/// One library of the project inventory.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryEntry {
    #[serde(rename = "keyUuid", default)]
    pub key_uuid: Option<String>,

    pub filename: String,

    #[serde(rename = "type", default)]
    pub library_type: String,
}

impl InventoryEntry {
    #[must_use]
    pub fn is_source_library(&self) -> bool {
        self.library_type == SOURCE_LIBRARY_TYPE
    }
}

/// One hit of a global library keyword search.
#[derive(Debug, Clone, Deserialize)]
pub struct LibrarySearchHit {
    #[serde(rename = "keyUuid")]
    pub key_uuid: String,

    #[serde(default)]
    pub filename: Option<String>,

    #[serde(rename = "type", default)]
    pub library_type: String,

    /// Canonical download URL of the library.
    #[serde(default)]
    pub url: Option<String>,
}

impl LibrarySearchHit {
    #[must_use]
    pub fn is_source_library(&self) -> bool {
        self.library_type == SOURCE_LIBRARY_SEARCH_TYPE
    }
}
