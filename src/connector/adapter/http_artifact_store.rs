use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::application::ArtifactStore;
use crate::connector::adapter::http_support::{
    authorize, build_client, endpoint_url, parse_base_url, status_error, transport_error,
};
use crate::domain::{DomainError, OutputLocation};

pub const ARTIFACT_STORE_URL_ENV: &str = "ARTIFACT_STORE_URL";
/// Bearer token for the store. The inference token is never sent here.
pub const ARTIFACT_STORE_TOKEN_ENV: &str = "ARTIFACT_STORE_TOKEN";

/// Checks for finished artifacts with a path-style `HEAD` request.
pub struct HttpArtifactStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpArtifactStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, DomainError> {
        Ok(Self {
            client: build_client(Duration::from_secs(15)),
            base_url: parse_base_url(base_url)?,
            token,
        })
    }

    pub fn from_env(region: &str) -> Result<Self, DomainError> {
        let base = std::env::var(ARTIFACT_STORE_URL_ENV)
            .unwrap_or_else(|_| format!("https://s3.{region}.amazonaws.com"));
        let token = std::env::var(ARTIFACT_STORE_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::new(&base, token)
    }

    fn object_url(&self, location: &OutputLocation, key: &str) -> Result<Url, DomainError> {
        let segments = std::iter::once(location.bucket()).chain(key.split('/'));
        endpoint_url(&self.base_url, segments)
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn exists(&self, location: &OutputLocation) -> Result<Option<String>, DomainError> {
        let key = location.artifact_key();
        let url = self.object_url(location, &key)?;
        debug!("HEAD {}", url);

        let response = authorize(self.client.head(url), self.token.as_deref())
            .send()
            .await
            .map_err(|e| transport_error("artifact check", e))?;

        match response.status() {
            status if status.is_success() => Ok(Some(key)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(status_error("artifact check", status, &location.uri())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one response with `status_line` and hand back the raw request.
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_lowercase()
        });
        (base, handle)
    }

    #[tokio::test]
    async fn store_without_token_sends_no_credentials() {
        let (base, request) = serve_once("404 Not Found").await;
        let store = HttpArtifactStore::new(&base, None).unwrap();

        let found = store.exists(&OutputLocation::new("videos", "job1")).await.unwrap();
        assert!(found.is_none());

        let request = request.await.unwrap();
        assert!(request.starts_with("head /videos/job1/output.mp4"));
        assert!(!request.contains("authorization"));
    }

    #[tokio::test]
    async fn forbidden_is_permanent_and_throttling_is_transient() {
        let (base, _request) = serve_once("403 Forbidden").await;
        let store = HttpArtifactStore::new(&base, Some("store-token".into())).unwrap();
        let err = store.exists(&OutputLocation::new("videos", "")).await.unwrap_err();
        assert!(err.is_backend_error());

        let (base, _request) = serve_once("503 Service Unavailable").await;
        let store = HttpArtifactStore::new(&base, None).unwrap();
        let err = store.exists(&OutputLocation::new("videos", "")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn object_url_is_path_style() {
        let store = HttpArtifactStore::new("https://store.test", None).unwrap();
        let location = OutputLocation::new("videos", "reel/abc123");
        let url = store
            .object_url(&location, &location.artifact_key())
            .unwrap();
        assert_eq!(url.as_str(), "https://store.test/videos/reel/abc123/output.mp4");
    }
}
