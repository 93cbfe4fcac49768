use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{BookSnapshot, ClubRole, FriendStatus, NotificationKind};

// -- JWT Claims --

/// JWT claims issued at login and checked by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub login: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub login: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub login: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub password: String,
}

// -- Profile --

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetAvatarRequest {
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeResponse {
    pub code: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    /// Missing for badges reported as freshly unlocked by the current request.
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// Returned by every action that may unlock badges.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub ok: bool,
    pub new_badges: Vec<BadgeResponse>,
}

// -- Library / wishlist --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddLibraryRequest {
    pub google_book_id: String,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub thumbnail: Option<String>,
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateLibraryRequest {
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddWishlistRequest {
    pub google_book_id: String,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LibraryEntryResponse {
    #[serde(flatten)]
    pub book: BookSnapshot,
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WishlistEntryResponse {
    #[serde(flatten)]
    pub book: BookSnapshot,
    pub added_at: DateTime<Utc>,
}

// -- Friends --

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendResponse {
    pub user_id: i64,
    pub login: String,
    pub avatar: Option<String>,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendRequestsResponse {
    pub incoming: Vec<FriendResponse>,
    pub outgoing: Vec<FriendResponse>,
}

/// Relation between the caller and another user; `None` when there is none.
#[derive(Debug, Serialize, Deserialize)]
pub struct FriendStatusResponse {
    pub status: Option<FriendStatus>,
}

// -- Clubs --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateClubRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClubResponse {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub role: ClubRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClubDetailResponse {
    #[serde(flatten)]
    pub club: ClubResponse,
    /// Unread message notifications for this club just before the visit marked them read.
    pub unread_messages: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberResponse {
    pub user_id: i64,
    pub login: String,
    pub avatar: Option<String>,
    pub role: ClubRole,
    pub joined_at: DateTime<Utc>,
}

/// Body of both the direct add-member and the invite endpoints.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetUserRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddClubBookRequest {
    pub google_book_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClubBookResponse {
    pub id: i64,
    pub google_book_id: String,
    pub added_by: i64,
    pub added_by_login: String,
    pub added_at: DateTime<Utc>,
    /// Sourced from the adder's library; null once they removed the book there.
    pub book: Option<BookSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub club_id: i64,
    pub author_id: i64,
    pub author_login: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostMessageResponse {
    pub message_id: i64,
    /// Members notified; zero when the fanout failed.
    pub notified: usize,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub kind: NotificationKind,
    pub from_user_id: i64,
    pub from_login: String,
    pub club_id: Option<i64>,
    pub club_name: Option<String>,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationListResponse {
    pub unread: usize,
    pub notifications: Vec<NotificationResponse>,
}
