// src/store/client.rs

//! Thin HTTP binding of the record store API (v1).

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::{Document, ExperimentRecord, ExperimentStatus, RemoteStore, StoreError, StoreFuture};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for the record store.
///
/// Every endpoint lives below `<base_uri>/v1`, and any response other than
/// `200 OK` is turned into [`StoreError::Status`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_uri: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_uri: &str) -> Result<Self, StoreError> {
        Self::with_timeout(base_uri, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_uri: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_uri: base_uri.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Fetch the current record.
    pub async fn get(&self, id: &str) -> Result<ExperimentRecord, StoreError> {
        let resp = self
            .send(self.http.get(self.endpoint(&format!("/_get/{id}"))))
            .await?;
        Ok(resp.json().await?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_uri, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let resp = request.send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn post_document(&self, path: &str, doc: &Document) -> Result<ExperimentRecord, StoreError> {
        debug!(endpoint = %path, "store request");
        let resp = self.send(self.http.post(self.endpoint(path)).json(doc)).await?;
        Ok(resp.json().await?)
    }
}

impl RemoteStore for ApiClient {
    fn create<'a>(&'a self, name: &'a str, mut fields: Document) -> StoreFuture<'a, ExperimentRecord> {
        Box::pin(async move {
            fields.insert("name".to_string(), Value::String(name.to_string()));
            self.post_document("/_create", &fields).await
        })
    }

    fn update<'a>(&'a self, id: &'a str, fields: Document) -> StoreFuture<'a, ExperimentRecord> {
        Box::pin(async move { self.post_document(&format!("/_update/{id}"), &fields).await })
    }

    fn heartbeat<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let url = self.endpoint(&format!("/_heartbeat/{id}"));
            self.send(self.http.post(url).body(Vec::new())).await?;
            Ok(())
        })
    }

    fn get_file<'a>(&'a self, id: &'a str, relative_path: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let path = validate_relpath(relative_path)?;
            let url = self.endpoint(&format!("/_getfile/{id}/{path}"));
            let resp = self.send(self.http.get(url)).await?;
            Ok(resp.bytes().await?.to_vec())
        })
    }

    fn set_finished<'a>(
        &'a self,
        id: &'a str,
        status: ExperimentStatus,
        mut fields: Document,
    ) -> StoreFuture<'a, ExperimentRecord> {
        Box::pin(async move {
            fields.insert("status".to_string(), Value::String(status.to_string()));
            self.post_document(&format!("/_set_finished/{id}"), &fields).await
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let url = self.endpoint(&format!("/_delete/{id}"));
            let resp = self.send(self.http.post(url).body(Vec::new())).await?;
            Ok(resp.json().await?)
        })
    }
}

/// Check that `path` is a plain relative path below the storage directory.
pub fn validate_relpath(path: &str) -> Result<&str, StoreError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|part| part == "..");
    if invalid {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relpath_validation() {
        assert!(validate_relpath("a/b.txt").is_ok());
        assert!(validate_relpath("needle.txt").is_ok());
        for bad in ["", "/etc/passwd", "../x", "a/../../b", "a\\b"] {
            assert!(
                matches!(validate_relpath(bad), Err(StoreError::InvalidPath(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = ApiClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.base_uri(), "http://localhost:8080");
        assert_eq!(
            client.endpoint("/_create"),
            "http://localhost:8080/v1/_create"
        );
    }
}
