use crate::app::ports::FeedSourcePort;
use crate::config::FeedConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::ingestion::feed::FeedWindow;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// NeoWs feed endpoint over reqwest
pub struct NasaFeedClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NasaFeedClient {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| PipelineError::Config("NASA_NEO_API_KEY is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl FeedSourcePort for NasaFeedClient {
    async fn fetch(&self, window: &FeedWindow) -> Result<Value> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("start_date", window.start_date.as_str()),
                ("end_date", window.end_date.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(redacted)?;
        let status = resp.status();
        debug!(status = status.as_u16(), "feed responded");
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PipelineError::FeedStatus { status: status.as_u16(), message });
        }
        resp.json::<Value>().await.map_err(redacted)
    }
}

/// The request URL carries the API key; keep it out of error text and logs.
fn redacted(e: reqwest::Error) -> PipelineError {
    PipelineError::Http(e.without_url())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        let config = FeedConfig::default();
        assert!(matches!(NasaFeedClient::new(&config), Err(PipelineError::Config(_))));

        let config = FeedConfig { api_key: Some("DEMO_KEY".to_string()), ..FeedConfig::default() };
        assert!(NasaFeedClient::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        let config = FeedConfig {
            base_url: "http://127.0.0.1:1/feed".to_string(),
            api_key: Some("SECRET_KEY_123".to_string()),
            timeout_seconds: 2,
            ..FeedConfig::default()
        };
        let client = NasaFeedClient::new(&config).unwrap();
        let window = FeedWindow {
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-02".to_string(),
        };

        let err = client.fetch(&window).await.unwrap_err();
        assert!(matches!(err, PipelineError::Http(_)));
        assert!(!err.to_string().contains("SECRET_KEY_123"));
        assert!(!format!("{:?}", err).contains("SECRET_KEY_123"));
    }
}
