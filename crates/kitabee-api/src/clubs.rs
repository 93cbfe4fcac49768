use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{info, warn};

use kitabee_db::Database;
use kitabee_db::clubs::{MAX_CLUB_NAME_CHARS, MAX_MESSAGE_CHARS};
use kitabee_db::models::ClubAccess;
use kitabee_db::notifications::FanoutOutcome;
use kitabee_types::api::{
    AddClubBookRequest, Claims, ClubBookResponse, ClubDetailResponse, ClubResponse,
    CreateClubRequest, MemberResponse, MessageResponse, PostMessageRequest, PostMessageResponse,
    TargetUserRequest,
};
use kitabee_types::models::ClubRole;

use crate::books::valid_book_id;
use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Non-members get 404, members without the owner role get 403.
fn require_owner(db: &Database, club_id: i64, user_id: i64) -> ApiResult<ClubAccess> {
    let access = db.get_club(club_id, user_id)?.ok_or(ApiError::NotFound)?;
    if access.role != ClubRole::Owner {
        return Err(ApiError::Forbidden("only the club owner can do this"));
    }
    Ok(access)
}

pub async fn list_clubs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ClubResponse>>> {
    let clubs = blocking(&state, move |db| Ok(db.list_clubs_for(claims.sub)?)).await?;
    Ok(Json(convert::all(clubs, convert::club)))
}

pub async fn create_club(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateClubRequest>,
) -> ApiResult<(StatusCode, Json<ClubResponse>)> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_CLUB_NAME_CHARS {
        return Err(ApiError::invalid("club name must be 1-100 characters"));
    }

    let access = blocking(&state, move |db| {
        let club_id = db
            .create_club(claims.sub, &name, req.description.as_deref())?
            .ok_or_else(|| ApiError::invalid("invalid club name"))?;
        db.get_club(club_id, claims.sub)?.ok_or(ApiError::NotFound)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::club(access))))
}

/// Opening a club marks its message notifications read for the caller.
pub async fn get_club(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
) -> ApiResult<Json<ClubDetailResponse>> {
    let visit = blocking(&state, move |db| {
        db.open_club(club_id, claims.sub)?.ok_or(ApiError::NotFound)
    })
    .await?;

    Ok(Json(ClubDetailResponse {
        club: convert::club(visit.access),
        unread_messages: visit.unread_before,
    }))
}

pub async fn delete_club(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        require_owner(db, club_id, claims.sub)?;
        if !db.delete_club(club_id, claims.sub)? {
            return Err(anyhow::anyhow!("deletion of club {} was rolled back", club_id).into());
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
) -> ApiResult<Json<Vec<MemberResponse>>> {
    let rows = blocking(&state, move |db| {
        db.list_members(club_id, claims.sub)?.ok_or(ApiError::NotFound)
    })
    .await?;
    Ok(Json(convert::all(rows, convert::member)))
}

/// Direct add by the owner, without an invite round trip.
pub async fn add_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
    Json(req): Json<TargetUserRequest>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        require_owner(db, club_id, claims.sub)?;
        if db.get_user_by_id(req.user_id)?.is_none() {
            return Err(ApiError::NotFound);
        }
        if !db.add_member(club_id, claims.sub, req.user_id)? {
            return Err(ApiError::Conflict("user is already a member"));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((club_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        require_owner(db, club_id, claims.sub)?;
        if !db.remove_member(club_id, claims.sub, user_id)? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_club(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        let access = db.get_club(club_id, claims.sub)?.ok_or(ApiError::NotFound)?;
        if access.role == ClubRole::Owner {
            return Err(ApiError::Forbidden("the owner cannot leave; delete the club instead"));
        }
        if !db.leave_club(club_id, claims.sub)? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn invite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
    Json(req): Json<TargetUserRequest>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        require_owner(db, club_id, claims.sub)?;
        if db.get_user_by_id(req.user_id)?.is_none() {
            return Err(ApiError::NotFound);
        }
        if !db.invite_to_club(club_id, claims.sub, req.user_id)? {
            return Err(ApiError::Conflict("user is already a member or invited"));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::CREATED)
}

pub async fn list_books(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
) -> ApiResult<Json<Vec<ClubBookResponse>>> {
    let rows = blocking(&state, move |db| {
        db.club_books(club_id, claims.sub)?.ok_or(ApiError::NotFound)
    })
    .await?;
    Ok(Json(convert::all(rows, convert::club_book)))
}

pub async fn add_book(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
    Json(req): Json<AddClubBookRequest>,
) -> ApiResult<StatusCode> {
    let book_id = req.google_book_id.trim().to_string();
    if book_id.is_empty() {
        return Err(ApiError::invalid("google_book_id is required"));
    }
    if !valid_book_id(&book_id) {
        return Err(ApiError::invalid("malformed google_book_id"));
    }
    blocking(&state, move |db| {
        if !db.add_club_book(club_id, claims.sub, &book_id)? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_book(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((club_id, book_id)): Path<(i64, String)>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        db.get_club(club_id, claims.sub)?.ok_or(ApiError::NotFound)?;
        if !db.remove_club_book(club_id, claims.sub, &book_id)? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
    Query(query): Query<MessageQuery>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let limit = query.limit.clamp(1, 200);
    let rows = blocking(&state, move |db| {
        db.list_messages(club_id, claims.sub, limit)?.ok_or(ApiError::NotFound)
    })
    .await?;
    Ok(Json(convert::all(rows, convert::message)))
}

/// The message is stored even when notifying the other members fails;
/// `notified` is zero in that case.
pub async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(club_id): Path<i64>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<PostMessageResponse>)> {
    let content = req.content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::invalid("message must be 1-2000 characters"));
    }

    let posted = blocking(&state, move |db| {
        db.post_message(club_id, claims.sub, &content)?.ok_or(ApiError::NotFound)
    })
    .await?;

    match &posted.fanout {
        FanoutOutcome::Delivered(n) => info!(
            club_id,
            message_id = posted.message_id,
            notified = *n,
            "Club message posted"
        ),
        FanoutOutcome::Failed(reason) => warn!(
            club_id,
            message_id = posted.message_id,
            "Club message posted without notifications: {}",
            reason
        ),
    }

    Ok((
        StatusCode::CREATED,
        Json(PostMessageResponse {
            message_id: posted.message_id,
            notified: posted.fanout.notified(),
        }),
    ))
}
