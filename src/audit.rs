/// Audit logging for redirect reconciliations
///
/// Every `apply` run appends one JSON line recording what was asked for and
/// what happened, so operators can tell when the rule was first installed and
/// why later runs failed.
use crate::core::error::Error;
use crate::core::reconcile::ReconcileOutcome;
use crate::core::rule::RedirectSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    RuleInstalled,
    RuleAlreadyPresent,
    ReconcileFailed,
}

impl From<ReconcileOutcome> for EventType {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Installed => Self::RuleInstalled,
            ReconcileOutcome::AlreadyPresent => Self::RuleAlreadyPresent,
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Type of event
    pub event_type: EventType,

    /// Whether the operation succeeded
    pub success: bool,

    /// The redirect that was reconciled
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    /// Builds the event describing one reconciliation of `spec`
    pub fn for_reconcile(spec: &RedirectSpec, result: &Result<ReconcileOutcome, Error>) -> Self {
        let (event_type, error) = match result {
            Ok(outcome) => (EventType::from(*outcome), None),
            Err(e) => (EventType::ReconcileFailed, Some(e.to_string())),
        };

        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success: result.is_ok(),
            details: serde_json::json!({
                "app_port": spec.app_port,
                "metadata_address": spec.metadata_address,
                "host_interface": spec.host_interface,
                "host_ip": spec.host_ip,
                "rule": spec.rule_expression().as_str(),
            }),
            error,
        }
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Opens the audit log in the state directory, creating the directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined or created
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::ensure_state_dir()?.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    /// Audit log at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: path.into(),
        }
    }

    /// Appends an event as one JSON line
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Reads the most recent events, newest first
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .take(count)
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        Ok(events)
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

/// Records a reconciliation. Audit failures are logged, never returned.
pub async fn log_reconcile(spec: &RedirectSpec, result: &Result<ReconcileOutcome, Error>) {
    let audit = match AuditLog::new() {
        Ok(audit) => audit,
        Err(e) => {
            tracing::warn!("Audit log unavailable: {}", e);
            return;
        }
    };

    if let Err(e) = audit.log(&AuditEvent::for_reconcile(spec, result)).await {
        tracing::warn!("Failed to write audit log {:?}: {}", audit.path(), e);
    }
}
