use anyhow::Result;
use tracing::info;

use crate::Database;

/// Club messages older than this are pruned.
pub const MESSAGE_RETENTION_HOURS: u32 = 24;
/// Accounts never activated within this window are removed.
pub const ACTIVATION_WINDOW_DAYS: u32 = 30;

/// Rows removed by one maintenance pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub messages: usize,
    pub inactive_users: usize,
    pub reset_tokens: usize,
}

impl MaintenanceReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Database {
    /// Deletes club messages older than `max_age_hours`. Notifications already
    /// delivered for them keep their preview.
    pub fn prune_club_messages(&self, max_age_hours: u32) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM book_club_messages WHERE created_at < datetime('now', ?1)",
                [format!("-{max_age_hours} hours")],
            )?)
        })
    }

    /// Deletes accounts still inactive `max_age_days` after registration.
    pub fn prune_inactive_users(&self, max_age_days: u32) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM users WHERE is_active = 0 AND created_at < datetime('now', ?1)",
                [format!("-{max_age_days} days")],
            )?)
        })
    }

    pub fn clear_expired_reset_tokens(&self) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE users SET reset_token = NULL, reset_expires_at = NULL
                 WHERE reset_token IS NOT NULL AND reset_expires_at <= datetime('now')",
                [],
            )?)
        })
    }

    /// One full pass with the default retention windows.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let report = MaintenanceReport {
            messages: self.prune_club_messages(MESSAGE_RETENTION_HOURS)?,
            inactive_users: self.prune_inactive_users(ACTIVATION_WINDOW_DAYS)?,
            reset_tokens: self.clear_expired_reset_tokens()?,
        };
        if !report.is_empty() {
            info!(
                messages = report.messages,
                inactive_users = report.inactive_users,
                reset_tokens = report.reset_tokens,
                "Maintenance pass removed rows"
            );
        }
        Ok(report)
    }
}
