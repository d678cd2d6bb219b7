// crates/mesaplane-executors/src/objects.rs
// ============================================================================
// Module: HTTP Object Store
// Description: REST-backed `ObjectStore` shim for an S3-style blob API.
// Purpose: Give Bootstrap a concrete collaborator to wire into `AppState`
//          without pulling in a full AWS SigV4 client.
// Dependencies: mesaplane-core, reqwest
// ============================================================================

//! ## Overview
//! [`HttpObjectStore`] is a thin shim, not a general S3 client: it issues
//! plain `GET`/`PUT`/`DELETE`/`GET ?prefix=` requests against an
//! operator-configured endpoint, authenticating with HTTP basic auth when
//! `access_key_id`/`secret_access_key` are configured. Anything that speaks
//! S3's REST surface behind a reverse proxy, or a purpose-built internal blob
//! service, satisfies this; pointing it at AWS S3 directly would need SigV4
//! signing this crate does not implement.

use async_trait::async_trait;
use mesaplane_core::ObjectStore;
use mesaplane_core::ObjectStoreError;
use reqwest::Client;
use reqwest::Url;
use serde::Deserialize;

use crate::net::EndpointPolicy;
use crate::net::enforce_resolved_host_policy;
use crate::net::validate_endpoint_url;

#[derive(Debug, Deserialize)]
struct ListResponse {
    keys: Vec<String>,
}

/// Minimal REST client for an S3-style object store.
pub struct HttpObjectStore {
    base_url: Url,
    policy: EndpointPolicy,
    client: Client,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
}

impl HttpObjectStore {
    /// Builds an object store client over `base_url`, optionally
    /// authenticating with HTTP basic auth.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when `base_url` fails policy validation
    /// or the underlying HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        policy: EndpointPolicy,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
    ) -> Result<Self, ObjectStoreError> {
        validate_endpoint_url(&base_url, &policy).map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        let client = Client::builder().build().map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        Ok(Self { base_url, policy, client, access_key_id, secret_access_key })
    }

    async fn endpoint(&self, path: &str) -> Result<Url, ObjectStoreError> {
        enforce_resolved_host_policy(&self.base_url, &self.policy)
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        self.base_url.join(path).map_err(|err| ObjectStoreError::Backend(format!("building endpoint path {path}: {err}")))
    }

    fn authenticate(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_key_id {
            Some(key) => builder.basic_auth(key, self.secret_access_key.as_ref()),
            None => builder,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError> {
        mesaplane_core::validate_object_path(path)?;
        let url = self.endpoint(path).await?;
        let response = self
            .authenticate(self.client.get(url))
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(ObjectStoreError::Backend(format!("object store returned {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn write(&self, path: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        mesaplane_core::validate_object_path(path)?;
        let url = self.endpoint(path).await?;
        let response = self
            .authenticate(self.client.put(url))
            .body(bytes)
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ObjectStoreError::Backend(format!("object store returned {}", response.status())));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), ObjectStoreError> {
        mesaplane_core::validate_object_path(path)?;
        let url = self.endpoint(path).await?;
        let response = self
            .authenticate(self.client.delete(url))
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::Backend(format!("object store returned {}", response.status())));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let url = self.endpoint("").await?;
        let response = self
            .authenticate(self.client.get(url))
            .query(&[("prefix", prefix)])
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ObjectStoreError::Backend(format!("object store returned {}", response.status())));
        }
        let parsed: ListResponse = response.json().await.map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        Ok(parsed.keys)
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
        let base_url = Url::parse("http://objects.internal").expect("url");
        assert!(HttpObjectStore::new(base_url, EndpointPolicy::default(), None, None).is_err());
    }

    #[test]
    fn accepts_https_base_url_with_credentials() {
        let base_url = Url::parse("https://objects.internal").expect("url");
        let store = HttpObjectStore::new(
            base_url,
            EndpointPolicy::default(),
            Some("key".to_string()),
            Some("secret".to_string()),
        );
        assert!(store.is_ok());
    }
}
