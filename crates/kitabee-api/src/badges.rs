use axum::{Extension, Json, extract::State};
use tracing::warn;

use kitabee_db::Database;
use kitabee_types::api::{BadgeResponse, Claims};

use crate::convert;
use crate::error::ApiResult;
use crate::state::{AppState, blocking};

/// Runs the badge engine after an action. A failure here never fails the
/// action that triggered it; the user just gets no toast this time.
pub(crate) fn fresh_badges(db: &Database, user_id: i64) -> Vec<BadgeResponse> {
    match db.evaluate_and_unlock(user_id) {
        Ok(badges) => badges.into_iter().map(convert::new_badge).collect(),
        Err(e) => {
            warn!(user_id, "Badge evaluation failed: {:#}", e);
            Vec::new()
        }
    }
}

pub async fn my_badges(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<BadgeResponse>>> {
    let rows = blocking(&state, move |db| Ok(db.list_user_badges(claims.sub)?)).await?;
    Ok(Json(convert::all(rows, convert::unlocked_badge)))
}
