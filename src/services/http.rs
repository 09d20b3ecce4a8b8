use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BotError, Result};

const USER_AGENT: &str = concat!("biasbot/", env!("CARGO_PKG_VERSION"));

/// Raw bytes of a fetched image plus the declared content type
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Anything that can fetch an image by URL
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

/// Shared image source type
pub type SharedImageSource = Arc<dyn ImageSource>;

/// Plain HTTP(S) image source
pub struct HttpImageSource {
    http_client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BotError::Internal {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let response = self.http_client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotError::TransientFetch {
                url: url.to_string(),
                message: format!("expected status 200, got {}", status),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(normalize_content_type);

        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

/// "image/PNG; charset=binary" -> "image/png"
pub fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}
