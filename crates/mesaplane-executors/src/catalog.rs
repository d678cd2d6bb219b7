// crates/mesaplane-executors/src/catalog.rs
// ============================================================================
// Module: HTTP Catalog Client
// Description: REST-backed `CatalogClient` for the table-metadata catalog
//              service.
// Purpose: Give Bootstrap a concrete collaborator to wire into `AppState`
//          without `mesaplane-server` or `mesaplane-engine` depending on a
//          transport.
// Dependencies: mesaplane-core, reqwest
// ============================================================================

//! ## Overview
//! [`HttpCatalogClient`] mirrors [`crate::warm::WarmExecutor`]'s shape: an
//! operator-configured base URL, revalidated against
//! [`crate::net::EndpointPolicy`] on every call so a compromised DNS record
//! for the catalog host cannot redirect branch-management traffic onto
//! private infrastructure.

use async_trait::async_trait;
use mesaplane_core::CatalogBranch;
use mesaplane_core::CatalogClient;
use mesaplane_core::CatalogError;
use mesaplane_core::encode_branch_path_segment;
use reqwest::Client;
use reqwest::Url;

use crate::net::EndpointPolicy;
use crate::net::enforce_resolved_host_policy;
use crate::net::validate_endpoint_url;

/// REST client for a catalog service exposing `GET /branches` and
/// `DELETE /branches/{id}`.
pub struct HttpCatalogClient {
    base_url: Url,
    policy: EndpointPolicy,
    client: Client,
}

impl HttpCatalogClient {
    /// Builds a catalog client over `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when `base_url` fails policy validation or
    /// the underlying HTTP client cannot be built.
    pub fn new(base_url: Url, policy: EndpointPolicy) -> Result<Self, CatalogError> {
        validate_endpoint_url(&base_url, &policy).map_err(|err| CatalogError::Backend(err.to_string()))?;
        let client = Client::builder().build().map_err(|err| CatalogError::Backend(err.to_string()))?;
        Ok(Self { base_url, policy, client })
    }

    async fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        enforce_resolved_host_policy(&self.base_url, &self.policy)
            .await
            .map_err(|err| CatalogError::Backend(err.to_string()))?;
        self.base_url.join(path).map_err(|err| CatalogError::Backend(format!("building endpoint path {path}: {err}")))
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn list_branches(&self, prefix: &str) -> Result<Vec<CatalogBranch>, CatalogError> {
        let url = self.endpoint("branches").await?;
        let response = self
            .client
            .get(url)
            .query(&[("prefix", prefix)])
            .send()
            .await
            .map_err(|err| CatalogError::Backend(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CatalogError::Backend(format!("catalog returned {}", response.status())));
        }
        response.json().await.map_err(|err| CatalogError::Backend(err.to_string()))
    }

    async fn delete_branch(&self, branch_id: &str) -> Result<(), CatalogError> {
        let segment = encode_branch_path_segment(branch_id)?;
        let url = self.endpoint(&format!("branches/{segment}")).await?;
        let response = self.client.delete(url).send().await.map_err(|err| CatalogError::Backend(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CatalogError::Backend(format!("catalog returned {}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn rejects_base_url_with_disallowed_scheme() {
        let base_url = Url::parse("http://catalog.internal").expect("url");
        assert!(HttpCatalogClient::new(base_url, EndpointPolicy::default()).is_err());
    }

    #[test]
    fn accepts_https_base_url() {
        let base_url = Url::parse("https://catalog.internal").expect("url");
        assert!(HttpCatalogClient::new(base_url, EndpointPolicy::default()).is_ok());
    }
}
