//! Open data portal client.
//!
//! The portal is a CKAN instance. Its `package_show` action describes a dataset (package) and
//! lists its downloadable resources, typically one Parquet file per year.

use crate::error::EarError;
use crate::retry::RetryPolicy;

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// One downloadable artifact of a package.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub name: String,
    pub url: String,
    pub format: String,
}

impl ResourceDescriptor {
    /// Return a new ResourceDescriptor.
    pub fn new(name: &str, url: &str, format: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            format: format.to_string(),
        }
    }
}

/// Resolved description of a package: its resources in portal order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub resources: Vec<ResourceDescriptor>,
}

/// Source of package metadata.
///
/// Implemented by [PortalClient] over HTTP, and by in-memory stubs in tests.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch the metadata of a package.
    ///
    /// # Arguments
    ///
    /// * `package_id`: Dataset identifier
    async fn fetch(&self, package_id: &str) -> Result<PackageMetadata, EarError>;
}

/// Body of a `package_show` response.
#[derive(Debug, Deserialize)]
struct PackageShowResponse {
    #[serde(default)]
    success: bool,
    result: Option<PackageShowResult>,
}

#[derive(Debug, Deserialize)]
struct PackageShowResult {
    #[serde(default)]
    resources: Option<Vec<PortalResource>>,
}

// CKAN sends explicit nulls for unset fields.
#[derive(Debug, Deserialize)]
struct PortalResource {
    name: Option<String>,
    url: Option<String>,
    format: Option<String>,
}

impl From<PortalResource> for ResourceDescriptor {
    fn from(resource: PortalResource) -> Self {
        Self {
            name: resource.name.unwrap_or_default(),
            url: resource.url.unwrap_or_default(),
            format: resource.format.unwrap_or_default(),
        }
    }
}

/// HTTP client for the portal's `package_show` action.
#[derive(Debug)]
pub struct PortalClient {
    client: reqwest::Client,
    endpoint: Url,
    retry: RetryPolicy,
    timeout: Duration,
}

impl PortalClient {
    /// Create a new portal client.
    ///
    /// # Arguments
    ///
    /// * `client`: Shared reqwest client (carries the connect timeout)
    /// * `endpoint`: URL of the `package_show` action
    /// * `retry`: Retry policy for transient failures
    /// * `timeout`: Timeout of each request
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint,
            retry,
            timeout,
        }
    }
}

#[async_trait]
impl MetadataSource for PortalClient {
    #[tracing::instrument(level = "DEBUG", skip(self))]
    async fn fetch(&self, package_id: &str) -> Result<PackageMetadata, EarError> {
        tracing::info!("Fetching metadata for package_id={}", package_id);
        let unavailable = |reason: String| EarError::UpstreamUnavailable {
            url: self.endpoint.to_string(),
            reason,
        };
        let response = self
            .retry
            .send(|| {
                self.client
                    .get(self.endpoint.clone())
                    .query(&[("id", package_id)])
                    .timeout(self.timeout)
            })
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP status {}", response.status())));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        let body: PackageShowResponse = serde_json::from_slice(&body)
            .map_err(|err| EarError::InvalidResponse(err.to_string()))?;
        if !body.success {
            return Err(EarError::InvalidResponse(
                "success flag not set".to_string(),
            ));
        }
        let result = body
            .result
            .ok_or_else(|| EarError::InvalidResponse("missing result".to_string()))?;
        Ok(PackageMetadata {
            resources: result
                .resources
                .unwrap_or_default()
                .into_iter()
                .map(ResourceDescriptor::from)
                .collect(),
        })
    }
}
