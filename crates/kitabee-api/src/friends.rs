use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use kitabee_types::api::{
    ActionResponse, Claims, FriendRequestsResponse, FriendResponse, FriendStatusResponse,
};

use crate::badges::fresh_badges;
use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<FriendResponse>>> {
    let rows = blocking(&state, move |db| Ok(db.list_friends(claims.sub)?)).await?;
    Ok(Json(convert::all(rows, convert::friend)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<FriendRequestsResponse>> {
    let (incoming, outgoing) = blocking(&state, move |db| {
        Ok((
            db.list_incoming_requests(claims.sub)?,
            db.list_outgoing_requests(claims.sub)?,
        ))
    })
    .await?;

    Ok(Json(FriendRequestsResponse {
        incoming: convert::all(incoming, convert::friend),
        outgoing: convert::all(outgoing, convert::friend),
    }))
}

pub async fn friend_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<FriendStatusResponse>> {
    let status = blocking(&state, move |db| {
        if db.get_user_by_id(user_id)?.is_none() {
            return Err(ApiError::NotFound);
        }
        Ok(db.friend_status(claims.sub, user_id)?)
    })
    .await?;
    Ok(Json(FriendStatusResponse { status }))
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> ApiResult<StatusCode> {
    if user_id == claims.sub {
        return Err(ApiError::invalid("cannot befriend yourself"));
    }
    blocking(&state, move |db| {
        if db.get_user_by_id(user_id)?.is_none() {
            return Err(ApiError::NotFound);
        }
        if !db.send_friend_request(claims.sub, user_id)? {
            return Err(ApiError::Conflict("a friend relation already exists"));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::CREATED)
}

/// Both sides gain a friend, so both get evaluated; only the caller's toast is returned.
pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<ActionResponse>> {
    let new_badges = blocking(&state, move |db| {
        if !db.accept_friend_request(claims.sub, user_id)? {
            return Err(ApiError::NotFound);
        }
        fresh_badges(db, user_id);
        Ok(fresh_badges(db, claims.sub))
    })
    .await?;

    Ok(Json(ActionResponse { ok: true, new_badges }))
}

pub async fn decline_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let declined = blocking(&state, move |db| {
        Ok(db.decline_friend_request(claims.sub, user_id)?)
    })
    .await?;
    if !declined {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let cancelled = blocking(&state, move |db| {
        Ok(db.cancel_friend_request(claims.sub, user_id)?)
    })
    .await?;
    if !cancelled {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let removed = blocking(&state, move |db| Ok(db.remove_friend(claims.sub, user_id)?)).await?;
    if !removed {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
