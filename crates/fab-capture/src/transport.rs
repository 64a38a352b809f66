use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// One outbound HTTP exchange as the capture layer sees it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        FetchRequest {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        FetchRequest::new("GET", url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Fully buffered response. The capture layer needs the body at rest to
/// peek at it, so streaming stops here.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid http method `{0}`")]
    Method(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The seam the capture pipeline decorates. Implementations perform the
/// exchange; decorators add behavior around it without changing it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, req: FetchRequest) -> Result<FetchResponse, TransportError>;
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Client with harmonized defaults shared by the capture-side HTTP users.
pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(format!("fab-capture/{}", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(
            env_u64("FAB_HTTP_CONNECT_TIMEOUT_SECS", 3).max(1),
        ))
        .timeout(Duration::from_secs(env_u64("FAB_HTTP_TIMEOUT_SECS", 20).max(1)))
        .build()
        .expect("http client")
}

/// Real [`Transport`] backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        ReqwestTransport {
            client: build_client(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        ReqwestTransport::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, req: FetchRequest) -> Result<FetchResponse, TransportError> {
        let method: reqwest::Method = req
            .method
            .parse()
            .map_err(|_| TransportError::Method(req.method.clone()))?;
        let mut builder = self.client.request(method, &req.url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }
        let resp = builder.send().await?;
        let url = resp.url().to_string();
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    String::from_utf8_lossy(v.as_bytes()).to_string(),
                )
            })
            .collect();
        let body = resp.bytes().await?;
        Ok(FetchResponse {
            url,
            status,
            headers,
            body,
        })
    }
}
