//! JSONL audit trail of trade notifications

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use super::{Notifier, TradeNotification};
use crate::types::Result;

/// Appends one JSON line per notification
pub struct AuditLogNotifier {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl AuditLogNotifier {
    /// Open (or create) the log for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Trade audit log initialized to {}", path.display());
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl Notifier for AuditLogNotifier {
    async fn notify(&self, notification: &TradeNotification) -> Result<()> {
        let line = serde_json::to_string(notification)?;
        let mut writer = self.writer.lock().await;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}
