//! Retention worker.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    auth::{AuthBackend, SessionError, SessionStore, SharedSessionStore},
    config::RetentionConfig,
    db::{DbError, DbPool},
    observability::metrics,
};

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Results from a single retention run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RetentionRunResult {
    pub pgt_ious_deleted: u64,
    pub sessions_deleted: u64,
    pub session_tickets_deleted: u64,
}

impl RetentionRunResult {
    pub fn total(&self) -> u64 {
        self.pgt_ious_deleted + self.sessions_deleted + self.session_tickets_deleted
    }

    pub fn has_deletions(&self) -> bool {
        self.total() > 0
    }
}

/// Starts the retention worker as a background task.
///
/// Runs until the task is dropped, sleeping `config.interval()` between runs.
pub async fn start_retention_worker(
    db: Arc<DbPool>,
    sessions: SharedSessionStore,
    config: RetentionConfig,
) {
    if !config.enabled {
        tracing::info!("Retention worker disabled by configuration");
        return;
    }

    tracing::info!(
        interval_minutes = config.interval_minutes,
        purge_sessions = config.purge_sessions,
        "Starting retention worker"
    );

    let interval = config.interval();
    let sessions = config.purge_sessions.then_some(sessions);

    loop {
        match run_retention(&db, sessions.as_deref(), Utc::now()).await {
            Ok(result) if result.has_deletions() => {
                tracing::info!(
                    pgt_ious = result.pgt_ious_deleted,
                    sessions = result.sessions_deleted,
                    session_tickets = result.session_tickets_deleted,
                    total = result.total(),
                    "Retention run complete"
                );
            }
            Ok(_) => {
                tracing::debug!("Retention run complete, no records to delete");
            }
            Err(e) => {
                tracing::error!(error = %e, "Error running retention");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// Run a single retention pass as of `now`.
///
/// `sessions` is `None` when expired sessions should be left alone.
pub async fn run_retention(
    db: &DbPool,
    sessions: Option<&dyn SessionStore>,
    now: DateTime<Utc>,
) -> Result<RetentionRunResult, RetentionError> {
    let mut result = RetentionRunResult {
        pgt_ious_deleted: db.tickets().purge_expired_pgt_ious(now).await?,
        ..Default::default()
    };
    if result.pgt_ious_deleted > 0 {
        metrics::record_retention_deletion("pgt_ious", result.pgt_ious_deleted);
    }

    if let Some(sessions) = sessions {
        let expired = sessions.cleanup().await?;
        result.sessions_deleted = expired.len() as u64;

        let registry = db.session_tickets();
        for session in expired.iter().filter(|s| s.backend == AuthBackend::Cas) {
            result.session_tickets_deleted +=
                registry.delete_by_session_key(&session.key()).await?;
        }

        if result.sessions_deleted > 0 {
            metrics::record_retention_deletion("sessions", result.sessions_deleted);
        }
        if result.session_tickets_deleted > 0 {
            metrics::record_retention_deletion(
                "session_service_tickets",
                result.session_tickets_deleted,
            );
        }
    }

    Ok(result)
}
