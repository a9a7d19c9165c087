use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use studio_core::types::{FlowEvent, RunId};

/// JSONL run logger.
///
/// Consumes run events and writes one JSON object per line. The format is
/// append-only: if the process dies mid-run, every line already written is
/// intact.
pub struct RunLogger {
    log_dir: PathBuf,
}

/// A single line of the JSONL file.
#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a FlowEvent,
}

impl RunLogger {
    /// Logs are written to `{log_dir}/{run_id}.jsonl`.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    /// Path of the log file for `run_id`.
    pub fn log_path(&self, run_id: &RunId) -> PathBuf {
        log_path(&self.log_dir, run_id)
    }

    /// Write events for `run_id` until the run ends, the channel closes, or
    /// `cancel` fires.
    ///
    /// Takes a receiver rather than the bus so the caller can subscribe
    /// before the first event is published.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<FlowEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let path = self.log_path(&run_id);
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.run_id() != &run_id {
                                continue;
                            }
                            let line = LogLine {
                                timestamp: Utc::now().to_rfc3339(),
                                event: &event,
                            };
                            if let Ok(json) = serde_json::to_string(&line) {
                                if let Err(e) = writer.write_all(format!("{}\n", json).as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }
                            if event.is_terminal() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %path.display(), "RunLogger finished");
    }
}

fn log_path(dir: &Path, run_id: &RunId) -> PathBuf {
    dir.join(format!("{}.jsonl", run_id))
}
