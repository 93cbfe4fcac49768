use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored enum column holds a value this build does not know.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Role of a user inside a club. Exactly one owner per club.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClubRole {
    Owner,
    Member,
}

impl ClubRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }
}

impl FromStr for ClubRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "member" => Ok(Self::Member),
            other => Err(UnknownVariant {
                kind: "club role",
                value: other.to_string(),
            }),
        }
    }
}

/// State of a friend relation row. Declined and removed relations are deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendStatus {
    Pending,
    Accepted,
}

impl FriendStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }
}

impl FromStr for FriendStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            other => Err(UnknownVariant {
                kind: "friend status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ClubInvite,
    ClubMessage,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClubInvite => "club_invite",
            Self::ClubMessage => "club_message",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "club_invite" => Ok(Self::ClubInvite),
            "club_message" => Ok(Self::ClubMessage),
            other => Err(UnknownVariant {
                kind: "notification type",
                value: other.to_string(),
            }),
        }
    }
}

/// Display metadata copied onto a library or wishlist row when the book is added.
/// Every field except the id may be missing when the book API was unreachable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub google_book_id: String,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub thumbnail: Option<String>,
}

/// Volume metadata as returned by the third-party book API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub google_book_id: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub categories: Vec<String>,
}

impl BookMetadata {
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            google_book_id: self.google_book_id.clone(),
            title: self.title.clone(),
            authors: (!self.authors.is_empty()).then(|| self.authors.join(", ")),
            thumbnail: self.thumbnail.clone(),
        }
    }
}
