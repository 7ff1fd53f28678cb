use crate::app::ports::NotificationSink;
use crate::notification::Notification;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Logs every notification through tracing
pub struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&notification.payload)?;
        info!(
            subject = %notification.subject,
            recipients = ?notification.recipients,
            payload = %payload,
            "notification"
        );
        Ok(())
    }
}

/// File-based sink
/// Appends each notification as one NDJSON line
pub struct OutboxSink {
    file_writer: Mutex<BufWriter<std::fs::File>>,
    file_path: PathBuf,
}

impl OutboxSink {
    pub fn new(file_path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = file_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        info!("Opening notification outbox: {}", file_path.display());

        let file_writer = BufWriter::new(OpenOptions::new().create(true).append(true).open(file_path)?);

        Ok(Self {
            file_writer: Mutex::new(file_writer),
            file_path: file_path.to_path_buf(),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

#[async_trait::async_trait]
impl NotificationSink for OutboxSink {
    fn name(&self) -> &'static str {
        "outbox"
    }

    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        let json_line = serde_json::to_string(notification)?;

        let mut writer = self
            .file_writer
            .lock()
            .map_err(|_| anyhow::anyhow!("outbox writer lock poisoned"))?;
        writeln!(writer, "{}", json_line)?;
        writer.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoadOutcome;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_outbox_appends_ndjson_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mail").join("outbox.ndjson");
        let sink = OutboxSink::new(&path).unwrap();

        let recipients = vec!["ops@example.org".to_string()];
        sink.deliver(&Notification::load_status(&recipients, &LoadOutcome::Skipped)).await.unwrap();
        sink.deliver(&Notification::pipeline_halted(&recipients, &["Duplicate nasa_id found".to_string()]))
            .await
            .unwrap();

        let content = std::fs::read_to_string(sink.file_path()).unwrap();
        let lines: Vec<Notification> = content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].payload.kind(), "load_status");
        assert_eq!(lines[1].payload.kind(), "pipeline_halted");
    }
}
