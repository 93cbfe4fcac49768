//! Row-to-response mapping shared by the handlers.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use kitabee_db::models::{
    ClubAccess, ClubBookRow, FriendRow, LibraryRow, MemberRow, MessageRow, NotificationRow,
    UserBadgeRow, WishlistRow,
};
use kitabee_types::api::{
    BadgeResponse, ClubBookResponse, ClubResponse, FriendResponse, LibraryEntryResponse,
    MemberResponse, MessageResponse, NotificationResponse, WishlistEntryResponse,
};
use kitabee_types::badges::BadgeDefinition;

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without a zone; they are UTC.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn club(access: ClubAccess) -> ClubResponse {
    ClubResponse {
        id: access.club.id,
        owner_id: access.club.owner_id,
        name: access.club.name,
        description: access.club.description,
        role: access.role,
        created_at: parse_timestamp(&access.club.created_at),
    }
}

pub fn member(row: MemberRow) -> MemberResponse {
    MemberResponse {
        user_id: row.user_id,
        login: row.login,
        avatar: row.avatar,
        role: row.role,
        joined_at: parse_timestamp(&row.joined_at),
    }
}

pub fn club_book(row: ClubBookRow) -> ClubBookResponse {
    ClubBookResponse {
        id: row.id,
        google_book_id: row.google_book_id,
        added_by: row.added_by,
        added_by_login: row.added_by_login,
        added_at: parse_timestamp(&row.added_at),
        book: row.snapshot,
    }
}

pub fn message(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        club_id: row.club_id,
        author_id: row.user_id,
        author_login: row.author_login,
        content: row.content,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn notification(row: NotificationRow) -> NotificationResponse {
    NotificationResponse {
        id: row.id,
        kind: row.kind,
        from_user_id: row.from_user_id,
        from_login: row.from_login,
        club_id: row.club_id,
        club_name: row.club_name,
        content: row.content,
        is_read: row.is_read,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn friend(row: FriendRow) -> FriendResponse {
    FriendResponse {
        user_id: row.user_id,
        login: row.login,
        avatar: row.avatar,
        since: parse_timestamp(&row.since),
    }
}

pub fn library_entry(row: LibraryRow) -> LibraryEntryResponse {
    LibraryEntryResponse {
        book: row.book,
        rating: row.rating,
        comment: row.private_comment,
        added_at: parse_timestamp(&row.added_at),
    }
}

pub fn wishlist_entry(row: WishlistRow) -> WishlistEntryResponse {
    WishlistEntryResponse {
        book: row.book,
        added_at: parse_timestamp(&row.added_at),
    }
}

pub fn unlocked_badge(row: UserBadgeRow) -> BadgeResponse {
    BadgeResponse {
        code: row.code,
        name: row.name,
        description: row.description,
        icon: row.icon,
        unlocked_at: Some(parse_timestamp(&row.unlocked_at)),
    }
}

pub fn new_badge(badge: &BadgeDefinition) -> BadgeResponse {
    BadgeResponse {
        code: badge.code.to_string(),
        name: badge.name.to_string(),
        description: badge.description.to_string(),
        icon: badge.icon.to_string(),
        unlocked_at: None,
    }
}

pub fn all<R, T>(rows: Vec<R>, f: fn(R) -> T) -> Vec<T> {
    rows.into_iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn sqlite_timestamps_parse_as_utc() {
        let ts = parse_timestamp("2024-03-09 17:04:05");
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 3, 9));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (17, 4, 5));
    }

    #[test]
    fn rfc3339_is_accepted_and_garbage_falls_back() {
        assert_eq!(parse_timestamp("2024-03-09T17:04:05Z"), parse_timestamp("2024-03-09 17:04:05"));
        assert_eq!(parse_timestamp("not a date"), DateTime::<Utc>::default());
    }
}
