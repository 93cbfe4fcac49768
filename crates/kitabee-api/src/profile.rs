use axum::{Extension, Json, extract::State, http::StatusCode};
use tracing::info;

use kitabee_types::api::{ActionResponse, Claims, ProfileResponse, SetAvatarRequest};

use crate::badges::fresh_badges;
use crate::convert::parse_timestamp;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

const MAX_AVATAR_LEN: usize = 64;

/// Avatars are preset names such as `owl-3`; the images are served elsewhere.
fn valid_avatar(avatar: &str) -> bool {
    !avatar.is_empty()
        && avatar.len() <= MAX_AVATAR_LEN
        && avatar.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ProfileResponse>> {
    let user = blocking(&state, move |db| Ok(db.get_user_by_id(claims.sub)?))
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(ProfileResponse {
        id: user.id,
        login: user.login,
        email: user.email,
        avatar: user.avatar,
        created_at: parse_timestamp(&user.created_at),
    }))
}

pub async fn set_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetAvatarRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let avatar = req.avatar.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
    if avatar.as_deref().is_some_and(|a| !valid_avatar(a)) {
        return Err(ApiError::invalid("unknown avatar preset"));
    }

    let new_badges = blocking(&state, move |db| {
        if !db.set_avatar(claims.sub, avatar.as_deref())? {
            return Err(ApiError::NotFound);
        }
        Ok(fresh_badges(db, claims.sub))
    })
    .await?;

    Ok(Json(ActionResponse { ok: true, new_badges }))
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let deleted = blocking(&state, move |db| Ok(db.delete_user(claims.sub)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    info!(user_id = claims.sub, login = %claims.login, "Account closed by user");
    Ok(StatusCode::NO_CONTENT)
}
