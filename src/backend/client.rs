use crate::Result;
use crate::backend::models::{DueDiligenceEntry, InventoryEntry, LibrarySearchHit, OrganizationDetails, ProductSummary, ProjectSummary, SourceFile};
use crate::backend::outcome::{ReassignOutcome, SyncOutcome};
use core::time::Duration;
use ohno::{IntoAppError, app_err, bail};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

const LOG_TARGET: &str = "  backend";

/// Path of the JSON API endpoint, relative to the organization URL.
const API_PATH: &str = "api/v1.4";

/// One request may hang on large report generation; mirror the server-side cap.
const REQUEST_TIMEOUT_SECS: u64 = 3600;

/// Result of one API call that may legitimately collide with existing server state.
enum ApiResponse {
    Ok(Value),
    Conflict,
}

/// Client for the backend analysis service.
///
/// Every operation is one JSON POST to a single endpoint, with the operation selected through a
/// `requestType` field and authenticated with the user key and organization token.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: String,
    user_key: String,
    org_token: String,
}

impl Client {
    pub fn new(api_url: &str, user_key: &str, org_token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("conan-scout")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/{API_PATH}", api_url.trim_end_matches('/')),
            user_key: user_key.to_owned(),
            org_token: org_token.to_owned(),
        })
    }

    /// Issue one API request, treating every non-success response as an error.
    async fn call(&self, request_type: &str, fields: Value) -> Result<Value> {
        match self.call_with_conflict(request_type, fields).await? {
            ApiResponse::Ok(value) => Ok(value),
            ApiResponse::Conflict => Err(app_err!("unexpected conflict response for '{request_type}'")),
        }
    }

    /// Issue one API request, mapping an HTTP 409 to an explicit conflict instead of an error.
    async fn call_with_conflict(&self, request_type: &str, fields: Value) -> Result<ApiResponse> {
        let mut body = json!({
            "requestType": request_type,
            "userKey": self.user_key,
            "orgToken": self.org_token,
        });

        if let (Some(body_map), Value::Object(extra)) = (body.as_object_mut(), fields) {
            body_map.extend(extra);
        }

        log::debug!(target: LOG_TARGET, "Calling backend API '{request_type}'");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .into_app_err_with(|| format!("backend request '{request_type}' could not be sent"))?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(ApiResponse::Conflict);
        }

        if !response.status().is_success() {
            bail!("backend request '{request_type}' failed with HTTP status {}", response.status());
        }

        let value: Value = response
            .json()
            .await
            .into_app_err_with(|| format!("backend response for '{request_type}' is not valid JSON"))?;

        // The service reports some failures inside a successful HTTP response.
        if let Some(error_code) = value.get("errorCode").and_then(Value::as_i64) {
            let message = value.get("errorMessage").and_then(Value::as_str).unwrap_or("(no message)");
            bail!("backend request '{request_type}' failed with error {error_code}: {message}");
        }

        Ok(ApiResponse::Ok(value))
    }

    /// Deserialize a named array field of an API response.
    fn field_vec<T: DeserializeOwned>(mut value: Value, key: &str) -> Result<Vec<T>> {
        let field = value
            .get_mut(key)
            .map(Value::take)
            .ok_or_else(|| app_err!("backend response is missing the '{key}' field"))?;

        serde_json::from_value(field).into_app_err_with(|| format!("backend response field '{key}' has an unexpected shape"))
    }

    pub async fn get_organization_details(&self) -> Result<OrganizationDetails> {
        let value = self.call("getOrganizationDetails", json!({})).await?;
        serde_json::from_value(value).into_app_err("organization details have an unexpected shape")
    }

    /// Resolve a product token from its display name.
    pub async fn get_product_token_by_name(&self, product_name: &str) -> Result<String> {
        let value = self.call("getAllProducts", json!({})).await?;
        let products: Vec<ProductSummary> = Self::field_vec(value, "products")?;

        products
            .into_iter()
            .find(|p| p.product_name == product_name)
            .map(|p| p.product_token)
            .ok_or_else(|| app_err!("product '{product_name}' was not found in the organization"))
    }

    /// Resolve a project token from its display name within a product.
    pub async fn get_project_token_by_name(&self, product_token: &str, project_name: &str) -> Result<String> {
        let value = self.call("getAllProjects", json!({ "productToken": product_token })).await?;
        let projects: Vec<ProjectSummary> = Self::field_vec(value, "projects")?;

        projects
            .into_iter()
            .find(|p| p.project_name == project_name)
            .map(|p| p.project_token)
            .ok_or_else(|| app_err!("project '{project_name}' was not found in the product"))
    }

    pub async fn get_due_diligence(&self, project_token: &str) -> Result<Vec<DueDiligenceEntry>> {
        let value = self
            .call("getProjectDueDiligenceReport", json!({ "projectToken": project_token, "format": "json" }))
            .await?;
        Self::field_vec(value, "libraries")
    }

    pub async fn get_source_file_inventory(&self, project_token: &str) -> Result<Vec<SourceFile>> {
        let value = self
            .call("getProjectSourceFileInventoryReport", json!({ "projectToken": project_token, "format": "json" }))
            .await?;
        Self::field_vec(value, "sourceFiles")
    }

    pub async fn get_inventory(&self, project_token: &str) -> Result<Vec<InventoryEntry>> {
        let value = self
            .call(
                "getProjectInventory",
                json!({ "projectToken": project_token, "includeInHouseData": true }),
            )
            .await?;
        Self::field_vec(value, "libraries")
    }

    /// Global keyword search across the backend's library catalog.
    pub async fn search_libraries(&self, keyword: &str) -> Result<Vec<LibrarySearchHit>> {
        let value = self.call("getLibraries", json!({ "searchValue": keyword })).await?;
        Self::field_vec(value, "libraries")
    }

    /// Register or look up a canonical source-library identity from an index descriptor.
    ///
    /// Never returns `Err`; an expected server-side collision is [`SyncOutcome::Conflict`] and
    /// everything else lands in [`SyncOutcome::Failed`] so callers can keep going per package.
    pub async fn sync_source_library(&self, owner: &str, name: &str, version: &str, host: &str, download_link: &str) -> SyncOutcome {
        let fields = json!({
            "owner": owner,
            "name": name,
            "version": version,
            "host": host,
            "downloadLink": download_link,
        });

        match self.call_with_conflict("getSourceLibraryInfo", fields).await {
            Ok(ApiResponse::Ok(value)) => match value.get("keyUuid").and_then(Value::as_str) {
                Some(key_uuid) => SyncOutcome::Synced {
                    key_uuid: key_uuid.to_owned(),
                },
                None => SyncOutcome::Failed(Arc::new(app_err!("source-library sync response is missing 'keyUuid'"))),
            },
            Ok(ApiResponse::Conflict) => SyncOutcome::Conflict,
            Err(e) => SyncOutcome::Failed(Arc::new(e)),
        }
    }

    /// Reassign the given source files (by hash) to the target library identity.
    ///
    /// Never returns `Err`; partial remapping is acceptable, so failures are explicit outcomes
    /// the caller logs and moves past.
    pub async fn reassign_source_files(&self, target_key_uuid: &str, sha1s: &[String], user_comments: &str) -> ReassignOutcome {
        let fields = json!({
            "targetKeyUuid": target_key_uuid,
            "sourceFiles": sha1s,
            "userComments": user_comments,
        });

        match self.call_with_conflict("changeOriginLibrary", fields).await {
            Ok(ApiResponse::Ok(_)) => ReassignOutcome::Applied,
            Ok(ApiResponse::Conflict) => ReassignOutcome::Conflict,
            Err(e) => ReassignOutcome::Failed(Arc::new(e)),
        }
    }

    /// Current upload-processing state of a scan request.
    pub async fn get_scan_status(&self, request_token: &str) -> Result<String> {
        let value = self.call("getRequestState", json!({ "requestToken": request_token })).await?;

        value
            .get("requestState")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| app_err!("scan status response is missing 'requestState'"))
    }
}
