//! Audit trail for orphan reclamation
//!
//! Appends one JSONL line per reclaim decision so an operator can review what
//! a sweep did (or would have done) after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use crate::collector::{ReclaimOutcome, ReclaimReport};
use crate::db::schemas::StorageKind;

/// One reclaim decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    /// Collector run this decision belongs to (set by the logger)
    #[serde(default)]
    pub run_id: Option<Uuid>,
    pub namespace: String,
    pub storage_id: String,
    pub kind: Option<StorageKind>,
    #[serde(flatten)]
    pub outcome: ReclaimOutcome,
    pub dry_run: bool,
}

impl AuditEvent {
    pub fn from_report(report: &ReclaimReport, dry_run: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id: None,
            namespace: report.namespace.clone(),
            storage_id: report.storage_id.clone(),
            kind: report.kind,
            outcome: report.outcome.clone(),
            dry_run,
        }
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit logger that writes events to a JSONL file
#[derive(Clone)]
pub struct AuditLogger {
    inner: Arc<Mutex<AuditLoggerInner>>,
    run_id: Uuid,
}

struct AuditLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl AuditLogger {
    /// Logger for one collector run; writes nothing until [`Self::init_file`]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuditLoggerInner {
                writer: None,
                path: None,
            })),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append to the file at `path`, creating it if needed
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut inner = self.inner.lock().await;
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.clone());

        info!(run_id = %self.run_id, "Audit logging initialized to {}", path.display());
        Ok(())
    }

    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }

    pub async fn log(&self, mut event: AuditEvent) {
        event.run_id = Some(self.run_id);
        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;

        if let Some(ref mut writer) = inner.writer {
            if let Err(e) = writeln!(writer, "{}", jsonl) {
                error!("Failed to write audit event: {}", e);
            }
            // Every decision must survive a crash of the sweep
            if let Err(e) = writer.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}
