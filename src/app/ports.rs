use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::notification::Notification;
use crate::pipeline::ingestion::feed::FeedWindow;

// Ingest-side port
#[async_trait]
pub trait FeedSourcePort: Send + Sync {
    /// Raw feed payload for the window, as returned by the source.
    async fn fetch(&self, window: &FeedWindow) -> Result<Value>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}
