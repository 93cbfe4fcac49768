use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use kitabee_types::api::{ActionResponse, Claims, NotificationListResponse, NotificationResponse};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<NotificationListResponse>> {
    let limit = query.limit.clamp(1, 200);
    let (unread, rows) = blocking(&state, move |db| {
        Ok((db.unread_count(claims.sub)?, db.list_notifications(claims.sub, limit)?))
    })
    .await?;

    Ok(Json(NotificationListResponse {
        unread,
        notifications: convert::all(rows, convert::notification),
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let marked = blocking(&state, move |db| {
        Ok(db.mark_notification_read(claims.sub, notification_id)?)
    })
    .await?;
    if !marked {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_invites(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<NotificationResponse>>> {
    let rows = blocking(&state, move |db| Ok(db.list_pending_invites(claims.sub)?)).await?;
    Ok(Json(convert::all(rows, convert::notification)))
}

pub async fn accept_invite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
) -> ApiResult<Json<ActionResponse>> {
    let accepted = blocking(&state, move |db| Ok(db.accept_invite(claims.sub, club_id)?)).await?;
    if !accepted {
        return Err(ApiError::NotFound);
    }
    Ok(Json(ActionResponse {
        ok: true,
        new_badges: vec![],
    }))
}

pub async fn decline_invite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let declined = blocking(&state, move |db| Ok(db.decline_invite(claims.sub, club_id)?)).await?;
    if !declined {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
