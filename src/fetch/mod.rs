//! The network primitive: `fetch(url) -> {status, headers, body}`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self { status: 200, headers: Vec::new(), body: body.into() }
    }

    pub fn status(status: u16) -> Self {
        Self { status, headers: Vec::new(), body: Bytes::new() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetch: Send + Sync {
    /// Transport failures are `Err`; any HTTP status is `Ok`.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, String>;
}

/// `http:`/`https:` through reqwest, `file:` from the local disk.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: Client,
}

impl HttpFetch {
    pub fn new() -> Result<Self, String> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("nestpm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| format!("http client: {e}"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, String> {
        let parsed = Url::parse(url).map_err(|e| format!("invalid url: {e}"))?;
        if parsed.scheme() == "file" {
            let path = parsed.to_file_path().map_err(|_| format!("not a local path: {url}"))?;
            return match tokio::fs::read(&path).await {
                Ok(data) => Ok(FetchResponse::ok(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FetchResponse::status(404)),
                Err(e) => Err(format!("{}: {e}", path.display())),
            };
        }

        let resp = self.client.get(parsed).send().await.map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = resp.bytes().await.map_err(|e| e.to_string())?;
        Ok(FetchResponse { status, headers, body })
    }
}
