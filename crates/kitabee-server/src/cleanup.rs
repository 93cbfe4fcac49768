use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use kitabee_api::AppState;

/// Background task that prunes old club messages, stale inactive accounts
/// and expired reset tokens.
pub async fn run_cleanup_loop(state: AppState, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        let task_state = Arc::clone(&state);
        match tokio::task::spawn_blocking(move || task_state.db.run_maintenance()).await {
            Ok(Ok(report)) => {
                if report.is_empty() {
                    debug!("Cleanup: nothing to prune");
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {:#}", e),
            Err(e) => warn!("Cleanup task panicked: {}", e),
        }
    }
}
