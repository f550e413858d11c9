use std::path::Path;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entry::AuditEntry;
use crate::writer::{AuditWriteError, AuditWriter};

/// Channel buffer size used between request handlers and the writer task.
const CHANNEL_BUFFER: usize = 1024;

/// Flush the writer after this many seconds without new entries.
const FLUSH_INTERVAL_SECS: u64 = 1;

/// Cloneable handle for submitting [`AuditEntry`] values to the background
/// writer.
///
/// A sink built with [`AuditSink::disabled`] accepts entries and drops them,
/// which is what the gateway uses when no audit path is configured.
#[derive(Clone)]
pub struct AuditSink {
    tx: Option<mpsc::Sender<AuditEntry>>,
}

impl AuditSink {
    /// Spawn the background writer for the file at `path` and return the
    /// sink together with the writer task handle.
    ///
    /// The task flushes after a second of inactivity and once more when the
    /// last sink clone is dropped. Write errors are logged and the entry is
    /// skipped; the task never panics.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), AuditWriteError> {
        let (tx, rx) = mpsc::channel::<AuditEntry>(CHANNEL_BUFFER);

        let mut writer = AuditWriter::new(path).await?;

        let handle = tokio::spawn(async move {
            run_writer_loop(&mut writer, rx).await;
        });

        Ok((Self { tx: Some(tx) }, handle))
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue an entry for writing. Waits while the channel is full.
    pub async fn log(&self, entry: AuditEntry) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(err) = tx.send(entry).await {
            tracing::warn!(
                event_type = ?err.0.event_type,
                "audit sink channel closed, entry dropped"
            );
        }
    }

}

async fn run_writer_loop(writer: &mut AuditWriter, mut rx: mpsc::Receiver<AuditEntry>) {
    let flush_interval = tokio::time::Duration::from_secs(FLUSH_INTERVAL_SECS);
    let mut dirty = false;

    loop {
        match tokio::time::timeout(flush_interval, rx.recv()).await {
            Ok(Some(entry)) => {
                if let Err(err) = writer.write(&entry).await {
                    tracing::error!(
                        %err,
                        path = %writer.path().display(),
                        "failed to write audit entry"
                    );
                } else {
                    dirty = true;
                }
            }
            Ok(None) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "failed to flush audit log on shutdown");
                    }
                }
                tracing::debug!("audit writer shutting down");
                return;
            }
            Err(_) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "periodic audit log flush failed");
                    } else {
                        dirty = false;
                    }
                }
            }
        }
    }
}
