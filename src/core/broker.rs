use crate::core::db;
use crate::core::error::QuarterdeckError;
use crate::core::schemas;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Acting identity supplied by the (external) authentication layer.
///
/// The engine never evaluates access-control policy; it only records who
/// acted and stamps agency ownership onto created submissions.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub role: String,
    pub agency_id: String,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            role: "system".to_string(),
            agency_id: String::new(),
        }
    }
}

/// The DB broker is the thin waist for state access: an in-process serialized
/// request layer plus an append-only audit trail of every operation.
pub struct DbBroker {
    audit_log_path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub user_id: String,
    pub role: String,
    pub agency_id: String,
    pub op: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            audit_log_path: root.join(schemas::REPORTING_EVENTS_NAME),
        }
    }

    /// Execute a closure with a serialized connection to the reporting DB.
    pub fn with_conn<F, R>(
        &self,
        db_path: &Path,
        actor: &Actor,
        op_name: &str,
        f: F,
    ) -> Result<R, QuarterdeckError>
    where
        F: FnOnce(&Connection) -> Result<R, QuarterdeckError>,
    {
        // In-process serialization; cross-process races are resolved by the
        // uniqueness constraints in the schema.
        static DB_LOCK: Mutex<()> = Mutex::new(());
        let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let conn = db::db_connect(db_path)?;
        let result = f(&conn);

        // The mutation has already committed by this point; a failed audit
        // append must not turn a completed operation into an error.
        let status = if result.is_ok() { "success" } else { "error" };
        if let Err(log_err) = self.log_event(actor, op_name, status) {
            eprintln!("quarterdeck: audit log append failed: {log_err}");
        }

        result
    }

    fn log_event(&self, actor: &Actor, op: &str, status: &str) -> Result<(), QuarterdeckError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let ev = BrokerEvent {
            ts: time::now_rfc3339(),
            event_id: time::new_id(),
            user_id: actor.user_id.clone(),
            role: actor.role.clone(),
            agency_id: actor.agency_id.clone(),
            op: op.to_string(),
            status: status.to_string(),
        };

        if let Some(parent) = self.audit_log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)?;
        let line = serde_json::to_string(&ev)
            .map_err(|e| QuarterdeckError::Validation(format!("audit event encode: {e}")))?;
        writeln!(f, "{}", line)?;
        Ok(())
    }
}
