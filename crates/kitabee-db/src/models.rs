//! Database row types. These map directly to SQLite rows.
//! Timestamps stay in SQLite's `YYYY-MM-DD HH:MM:SS` text form; the API layer parses them.
use kitabee_types::models::{BookSnapshot, ClubRole, NotificationKind};

pub struct UserRow {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

/// The other side of a friend relation, seen from the querying user.
pub struct FriendRow {
    pub user_id: i64,
    pub login: String,
    pub avatar: Option<String>,
    /// Acceptance time for friends, request time for pending requests.
    pub since: String,
}

pub struct ClubRow {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

/// A club together with the requester's role in it.
pub struct ClubAccess {
    pub club: ClubRow,
    pub role: ClubRole,
}

/// Result of visiting a club page.
pub struct ClubVisit {
    pub access: ClubAccess,
    pub unread_before: usize,
}

pub struct MemberRow {
    pub user_id: i64,
    pub login: String,
    pub avatar: Option<String>,
    pub role: ClubRole,
    pub joined_at: String,
}

pub struct ClubBookRow {
    pub id: i64,
    pub club_id: i64,
    pub google_book_id: String,
    pub added_by: i64,
    pub added_by_login: String,
    pub added_at: String,
    /// `None` when the adder no longer has the book in their library.
    pub snapshot: Option<BookSnapshot>,
}

pub struct MessageRow {
    pub id: i64,
    pub club_id: i64,
    pub user_id: i64,
    pub author_login: String,
    pub content: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub from_user_id: i64,
    pub from_login: String,
    pub club_id: Option<i64>,
    pub club_name: Option<String>,
    pub kind: NotificationKind,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}

pub struct LibraryRow {
    pub id: i64,
    pub user_id: i64,
    pub book: BookSnapshot,
    pub rating: Option<u8>,
    pub private_comment: Option<String>,
    pub added_at: String,
}

pub struct WishlistRow {
    pub id: i64,
    pub user_id: i64,
    pub book: BookSnapshot,
    pub added_at: String,
}

pub struct UserBadgeRow {
    pub code: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub unlocked_at: String,
}
