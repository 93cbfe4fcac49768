use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use kitabee_types::api::{
    ActionResponse, AddLibraryRequest, AddWishlistRequest, Claims, LibraryEntryResponse,
    UpdateLibraryRequest, WishlistEntryResponse,
};
use kitabee_types::models::BookSnapshot;

use crate::badges::fresh_badges;
use crate::books::valid_book_id;
use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

fn check_rating(rating: Option<u8>) -> ApiResult<()> {
    match rating {
        Some(r) if !(1..=5).contains(&r) => {
            Err(ApiError::invalid("rating must be between 1 and 5"))
        }
        _ => Ok(()),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn snapshot(
    google_book_id: String,
    title: Option<String>,
    authors: Option<String>,
    thumbnail: Option<String>,
) -> ApiResult<BookSnapshot> {
    let google_book_id = google_book_id.trim().to_string();
    if google_book_id.is_empty() {
        return Err(ApiError::invalid("google_book_id is required"));
    }
    if !valid_book_id(&google_book_id) {
        return Err(ApiError::invalid("malformed google_book_id"));
    }
    Ok(BookSnapshot {
        google_book_id,
        title: non_blank(title),
        authors: non_blank(authors),
        thumbnail: non_blank(thumbnail),
    })
}

pub async fn list_library(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<LibraryEntryResponse>>> {
    let rows = blocking(&state, move |db| Ok(db.list_library(claims.sub)?)).await?;
    Ok(Json(convert::all(rows, convert::library_entry)))
}

/// Marks a book as read, moving it off the wishlist. Missing display fields
/// are looked up in the book API before the row is written.
pub async fn add_to_library(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddLibraryRequest>,
) -> ApiResult<(StatusCode, Json<ActionResponse>)> {
    check_rating(req.rating)?;
    let book = snapshot(req.google_book_id, req.title, req.authors, req.thumbnail)?;
    let book = state.books.complete(book).await;
    let comment = non_blank(req.comment);

    let new_badges = blocking(&state, move |db| {
        if !db.add_to_library(claims.sub, &book, req.rating, comment.as_deref())? {
            return Err(ApiError::Conflict("book already in library"));
        }
        Ok(fresh_badges(db, claims.sub))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ActionResponse { ok: true, new_badges })))
}

pub async fn update_library_entry(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(book_id): Path<String>,
    Json(req): Json<UpdateLibraryRequest>,
) -> ApiResult<Json<LibraryEntryResponse>> {
    check_rating(req.rating)?;
    let comment = non_blank(req.comment);

    let row = blocking(&state, move |db| {
        if !db.update_library_entry(claims.sub, &book_id, req.rating, comment.as_deref())? {
            return Err(ApiError::NotFound);
        }
        db.library_entry(claims.sub, &book_id)?.ok_or(ApiError::NotFound)
    })
    .await?;

    Ok(Json(convert::library_entry(row)))
}

pub async fn remove_from_library(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(book_id): Path<String>,
) -> ApiResult<StatusCode> {
    let removed = blocking(&state, move |db| {
        Ok(db.remove_from_library(claims.sub, &book_id)?)
    })
    .await?;
    if !removed {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_wishlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<WishlistEntryResponse>>> {
    let rows = blocking(&state, move |db| Ok(db.list_wishlist(claims.sub)?)).await?;
    Ok(Json(convert::all(rows, convert::wishlist_entry)))
}

pub async fn add_to_wishlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddWishlistRequest>,
) -> ApiResult<(StatusCode, Json<ActionResponse>)> {
    let book = snapshot(req.google_book_id, req.title, req.authors, req.thumbnail)?;
    let book = state.books.complete(book).await;

    let new_badges = blocking(&state, move |db| {
        if !db.add_to_wishlist(claims.sub, &book)? {
            return Err(ApiError::Conflict("book already on wishlist"));
        }
        Ok(fresh_badges(db, claims.sub))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ActionResponse { ok: true, new_badges })))
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(book_id): Path<String>,
) -> ApiResult<StatusCode> {
    let removed = blocking(&state, move |db| {
        Ok(db.remove_from_wishlist(claims.sub, &book_id)?)
    })
    .await?;
    if !removed {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
