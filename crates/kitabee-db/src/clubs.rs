use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use kitabee_types::models::{BookSnapshot, ClubRole};

use crate::models::{ClubAccess, ClubBookRow, ClubRow, MemberRow, MessageRow};
use crate::notifications::{FanoutOutcome, fan_out_club_message};
use crate::users::user_exists;
use crate::{Database, enum_column};

pub const MAX_CLUB_NAME_CHARS: usize = 100;
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// A committed club message together with the result of its notification fanout.
#[derive(Debug)]
pub struct PostedMessage {
    pub message_id: i64,
    pub fanout: FanoutOutcome,
}

/// Rows removed by a club deletion.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ClubCascade {
    pub notifications: usize,
    pub messages: usize,
    pub books: usize,
    pub members: usize,
}

impl Database {
    /// Creates a club and its owner membership atomically.
    /// Returns `None` when the trimmed name is empty or too long.
    pub fn create_club(
        &self,
        owner_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<i64>> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_CLUB_NAME_CHARS {
            return Ok(None);
        }
        let description = description.map(str::trim).filter(|d| !d.is_empty());

        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO book_clubs (owner_id, name, description) VALUES (?1, ?2, ?3)",
                params![owner_id, name, description],
            )?;
            let club_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO book_club_members (club_id, user_id, role) VALUES (?1, ?2, 'owner')",
                params![club_id, owner_id],
            )?;
            info!(club_id, owner_id, "Club created");
            Ok(Some(club_id))
        })
    }

    /// The club and the requester's role, or `None` when the requester is not a member.
    /// Non-members cannot tell a private club from a missing one.
    pub fn get_club(&self, club_id: i64, requester: i64) -> Result<Option<ClubAccess>> {
        self.with_conn(|conn| club_access(conn, club_id, requester))
    }

    pub fn list_clubs_for(&self, user_id: i64) -> Result<Vec<ClubAccess>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.owner_id, c.name, c.description, c.created_at, m.role
                 FROM book_club_members m
                 JOIN book_clubs c ON c.id = m.club_id
                 WHERE m.user_id = ?1
                 ORDER BY c.name COLLATE NOCASE, c.id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ClubAccess {
                        club: club_row(row)?,
                        role: enum_column(row, 5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Owner-only. Deletes messages, books, memberships, notifications and the club
    /// in one transaction. Any failure inside the cascade rolls everything back and
    /// is reported as `false`.
    pub fn delete_club(&self, club_id: i64, requester: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        if role_in(&conn, club_id, requester)? != Some(ClubRole::Owner) {
            return Ok(false);
        }

        let tx = conn.transaction()?;
        let outcome = cascade_delete(&tx, club_id).and_then(|removed| {
            tx.commit()?;
            Ok(removed)
        });

        match outcome {
            Ok(removed) => {
                info!(
                    club_id,
                    members = removed.members,
                    books = removed.books,
                    messages = removed.messages,
                    notifications = removed.notifications,
                    "Club deleted"
                );
                Ok(true)
            }
            Err(e) => {
                warn!(club_id, "Club deletion rolled back: {:#}", e);
                Ok(false)
            }
        }
    }

    /// Owner-only direct add. Any unread invite the user held for the club is consumed.
    pub fn add_member(&self, club_id: i64, requester: i64, user_id: i64) -> Result<bool> {
        self.with_tx(|tx| {
            if role_in(tx, club_id, requester)? != Some(ClubRole::Owner)
                || !user_exists(tx, user_id)?
            {
                return Ok(false);
            }
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO book_club_members (club_id, user_id, role)
                 VALUES (?1, ?2, 'member')",
                params![club_id, user_id],
            )?;
            tx.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE user_id = ?1 AND club_id = ?2 AND type = 'club_invite' AND is_read = 0",
                params![user_id, club_id],
            )?;
            Ok(inserted == 1)
        })
    }

    /// Owner-only. The owner row itself can never be removed.
    pub fn remove_member(&self, club_id: i64, requester: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            if role_in(conn, club_id, requester)? != Some(ClubRole::Owner) {
                return Ok(false);
            }
            let changed = conn.execute(
                "DELETE FROM book_club_members
                 WHERE club_id = ?1 AND user_id = ?2 AND role = 'member'",
                params![club_id, user_id],
            )?;
            Ok(changed == 1)
        })
    }

    /// A member leaves on their own. The owner has to delete the club instead.
    pub fn leave_club(&self, club_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM book_club_members
                 WHERE club_id = ?1 AND user_id = ?2 AND role = 'member'",
                params![club_id, user_id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn list_members(&self, club_id: i64, requester: i64) -> Result<Option<Vec<MemberRow>>> {
        self.with_conn(|conn| {
            if role_in(conn, club_id, requester)?.is_none() {
                return Ok(None);
            }
            let mut stmt = conn.prepare(
                "SELECT u.id, u.login, u.avatar, m.role, m.joined_at
                 FROM book_club_members m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.club_id = ?1
                 ORDER BY m.role = 'owner' DESC, m.joined_at, u.login",
            )?;
            let rows = stmt
                .query_map([club_id], |row| {
                    Ok(MemberRow {
                        user_id: row.get(0)?,
                        login: row.get(1)?,
                        avatar: row.get(2)?,
                        role: enum_column(row, 3)?,
                        joined_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(rows))
        })
    }

    /// Shares a book with the club. Any member may add; adding a book the club
    /// already has is accepted silently and leaves the existing row alone.
    pub fn add_club_book(
        &self,
        club_id: i64,
        requester: i64,
        google_book_id: &str,
    ) -> Result<bool> {
        let google_book_id = google_book_id.trim();
        if google_book_id.is_empty() {
            return Ok(false);
        }
        self.with_conn(|conn| {
            if role_in(conn, club_id, requester)?.is_none() {
                return Ok(false);
            }
            conn.execute(
                "INSERT OR IGNORE INTO book_club_books (club_id, google_book_id, added_by)
                 VALUES (?1, ?2, ?3)",
                params![club_id, google_book_id, requester],
            )?;
            Ok(true)
        })
    }

    /// The adder or the club owner may take a book off the club shelf.
    pub fn remove_club_book(
        &self,
        club_id: i64,
        requester: i64,
        google_book_id: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = match role_in(conn, club_id, requester)? {
                Some(ClubRole::Owner) => conn.execute(
                    "DELETE FROM book_club_books WHERE club_id = ?1 AND google_book_id = ?2",
                    params![club_id, google_book_id],
                )?,
                Some(ClubRole::Member) => conn.execute(
                    "DELETE FROM book_club_books
                     WHERE club_id = ?1 AND google_book_id = ?2 AND added_by = ?3",
                    params![club_id, google_book_id, requester],
                )?,
                None => 0,
            };
            Ok(changed == 1)
        })
    }

    /// Club shelf, newest first. Display metadata comes from the adder's library entry.
    pub fn club_books(&self, club_id: i64, requester: i64) -> Result<Option<Vec<ClubBookRow>>> {
        self.with_conn(|conn| {
            if role_in(conn, club_id, requester)?.is_none() {
                return Ok(None);
            }
            let mut stmt = conn.prepare(
                "SELECT cb.id, cb.club_id, cb.google_book_id, cb.added_by, u.login, cb.added_at,
                        l.id, l.title, l.authors, l.thumbnail
                 FROM book_club_books cb
                 JOIN users u ON u.id = cb.added_by
                 LEFT JOIN user_library l
                   ON l.user_id = cb.added_by AND l.google_book_id = cb.google_book_id
                 WHERE cb.club_id = ?1
                 ORDER BY cb.added_at DESC, cb.id DESC",
            )?;
            let rows = stmt
                .query_map([club_id], |row| {
                    let google_book_id: String = row.get(2)?;
                    let library_id: Option<i64> = row.get(6)?;
                    let snapshot = match library_id {
                        Some(_) => Some(BookSnapshot {
                            google_book_id: google_book_id.clone(),
                            title: row.get(7)?,
                            authors: row.get(8)?,
                            thumbnail: row.get(9)?,
                        }),
                        None => None,
                    };
                    Ok(ClubBookRow {
                        id: row.get(0)?,
                        club_id: row.get(1)?,
                        google_book_id,
                        added_by: row.get(3)?,
                        added_by_login: row.get(4)?,
                        added_at: row.get(5)?,
                        snapshot,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(rows))
        })
    }

    /// Appends a message to the club thread, then notifies every other member.
    ///
    /// The message commits before the fanout starts; a failed fanout is reported
    /// in [`PostedMessage::fanout`] and never undoes the message. Returns `None`
    /// for non-members and for blank or oversized content.
    pub fn post_message(
        &self,
        club_id: i64,
        author: i64,
        content: &str,
    ) -> Result<Option<PostedMessage>> {
        let content = content.trim();
        if content.is_empty() || content.chars().count() > MAX_MESSAGE_CHARS {
            return Ok(None);
        }
        self.with_conn(|conn| {
            if role_in(conn, club_id, author)?.is_none() {
                return Ok(None);
            }
            conn.execute(
                "INSERT INTO book_club_messages (club_id, user_id, content) VALUES (?1, ?2, ?3)",
                params![club_id, author, content],
            )?;
            let message_id = conn.last_insert_rowid();

            let fanout = fan_out_club_message(conn, club_id, author, content);
            Ok(Some(PostedMessage { message_id, fanout }))
        })
    }

    /// The latest `limit` messages of the thread, oldest first.
    pub fn list_messages(
        &self,
        club_id: i64,
        requester: i64,
        limit: u32,
    ) -> Result<Option<Vec<MessageRow>>> {
        self.with_conn(|conn| {
            if role_in(conn, club_id, requester)?.is_none() {
                return Ok(None);
            }
            let mut stmt = conn.prepare(
                "SELECT m.id, m.club_id, m.user_id, u.login, m.content, m.created_at
                 FROM book_club_messages m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.club_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt
                .query_map(params![club_id, limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        club_id: row.get(1)?,
                        user_id: row.get(2)?,
                        author_login: row.get(3)?,
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(Some(rows))
        })
    }
}

/// Membership is the only access gate: no row, no access.
pub(crate) fn role_in(conn: &Connection, club_id: i64, user_id: i64) -> Result<Option<ClubRole>> {
    let role = conn
        .query_row(
            "SELECT role FROM book_club_members WHERE club_id = ?1 AND user_id = ?2",
            params![club_id, user_id],
            |row| enum_column(row, 0),
        )
        .optional()?;
    Ok(role)
}

pub(crate) fn club_access(
    conn: &Connection,
    club_id: i64,
    requester: i64,
) -> Result<Option<ClubAccess>> {
    let access = conn
        .query_row(
            "SELECT c.id, c.owner_id, c.name, c.description, c.created_at, m.role
             FROM book_clubs c
             JOIN book_club_members m ON m.club_id = c.id AND m.user_id = ?2
             WHERE c.id = ?1",
            params![club_id, requester],
            |row| {
                Ok(ClubAccess {
                    club: club_row(row)?,
                    role: enum_column(row, 5)?,
                })
            },
        )
        .optional()?;
    Ok(access)
}

fn club_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClubRow> {
    Ok(ClubRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn cascade_delete(conn: &Connection, club_id: i64) -> Result<ClubCascade> {
    let removed = ClubCascade {
        notifications: conn.execute("DELETE FROM notifications WHERE club_id = ?1", [club_id])?,
        messages: conn.execute("DELETE FROM book_club_messages WHERE club_id = ?1", [club_id])?,
        books: conn.execute("DELETE FROM book_club_books WHERE club_id = ?1", [club_id])?,
        members: conn.execute("DELETE FROM book_club_members WHERE club_id = ?1", [club_id])?,
    };
    conn.execute("DELETE FROM book_clubs WHERE id = ?1", [club_id])?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::testing::active_user;

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?)).unwrap()
    }

    fn club_with_members(db: &Database) -> (i64, i64, i64) {
        let owner = active_user(db, "owner");
        let member = active_user(db, "member");
        let club = db.create_club(owner, "Sci-Fi Club", Some("  rockets  ")).unwrap().unwrap();
        assert!(db.add_member(club, owner, member).unwrap());
        (club, owner, member)
    }

    #[test]
    fn create_requires_a_name() {
        let db = Database::open_in_memory().unwrap();
        let owner = active_user(&db, "owner");
        assert!(db.create_club(owner, "   ", None).unwrap().is_none());
        let long_name = "x".repeat(MAX_CLUB_NAME_CHARS + 1);
        assert!(db.create_club(owner, &long_name, None).unwrap().is_none());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_clubs"), 0);
    }

    #[test]
    fn create_adds_owner_membership() {
        let db = Database::open_in_memory().unwrap();
        let owner = active_user(&db, "owner");
        let club = db.create_club(owner, "  Sci-Fi Club ", Some("  ")).unwrap().unwrap();

        let access = db.get_club(club, owner).unwrap().unwrap();
        assert_eq!(access.club.name, "Sci-Fi Club");
        assert_eq!(access.club.description, None);
        assert_eq!(access.role, ClubRole::Owner);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_club_members"), 1);
    }

    #[test]
    fn create_rolls_back_when_owner_row_fails() {
        let db = Database::open_in_memory().unwrap();
        let owner = active_user(&db, "owner");
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER block_members BEFORE INSERT ON book_club_members
                 BEGIN SELECT RAISE(ABORT, 'induced failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        assert!(db.create_club(owner, "Orphan Club", None).is_err());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_clubs"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_club_members"), 0);
    }

    #[test]
    fn non_members_see_nothing() {
        let db = Database::open_in_memory().unwrap();
        let (club, _, _) = club_with_members(&db);
        let outsider = active_user(&db, "outsider");

        assert!(db.get_club(club, outsider).unwrap().is_none());
        assert!(db.list_members(club, outsider).unwrap().is_none());
        assert!(db.club_books(club, outsider).unwrap().is_none());
        assert!(db.list_messages(club, outsider, 50).unwrap().is_none());
        assert!(db.post_message(club, outsider, "hi").unwrap().is_none());
        assert!(!db.add_club_book(club, outsider, "b1").unwrap());
    }

    #[test]
    fn member_management_is_owner_only() {
        let db = Database::open_in_memory().unwrap();
        let (club, owner, member) = club_with_members(&db);
        let other = active_user(&db, "other");

        assert!(!db.add_member(club, member, other).unwrap());
        assert!(db.add_member(club, owner, other).unwrap());
        assert!(!db.add_member(club, owner, other).unwrap());
        assert!(!db.remove_member(club, member, other).unwrap());
        assert!(db.remove_member(club, owner, other).unwrap());
        assert!(!db.add_member(club, owner, 4242).unwrap());
    }

    #[test]
    fn owner_cannot_be_removed_or_leave() {
        let db = Database::open_in_memory().unwrap();
        let (club, owner, member) = club_with_members(&db);

        assert!(!db.remove_member(club, owner, owner).unwrap());
        assert!(!db.leave_club(club, owner).unwrap());
        assert!(db.leave_club(club, member).unwrap());

        let members = db.list_members(club, owner).unwrap().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, ClubRole::Owner);
    }

    #[test]
    fn second_owner_row_is_rejected_by_schema() {
        let db = Database::open_in_memory().unwrap();
        let (club, _, member) = club_with_members(&db);
        let result = db.with_conn(|conn| {
            conn.execute(
                "UPDATE book_club_members SET role = 'owner' WHERE club_id = ?1 AND user_id = ?2",
                params![club, member],
            )?;
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_book_is_ignored() {
        let db = Database::open_in_memory().unwrap();
        let (club, owner, member) = club_with_members(&db);

        assert!(db.add_club_book(club, owner, "b1").unwrap());
        assert!(db.add_club_book(club, member, "b1").unwrap());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_club_books"), 1);

        let books = db.club_books(club, member).unwrap().unwrap();
        assert_eq!(books[0].added_by, owner);
    }

    #[test]
    fn book_removal_by_adder_or_owner() {
        let db = Database::open_in_memory().unwrap();
        let (club, owner, member) = club_with_members(&db);
        db.add_club_book(club, owner, "by-owner").unwrap();
        db.add_club_book(club, member, "by-member").unwrap();

        assert!(!db.remove_club_book(club, member, "by-owner").unwrap());
        assert!(db.remove_club_book(club, member, "by-member").unwrap());
        db.add_club_book(club, member, "by-member").unwrap();
        assert!(db.remove_club_book(club, owner, "by-member").unwrap());
    }

    #[test]
    fn book_metadata_follows_the_adders_library() {
        let db = Database::open_in_memory().unwrap();
        let (club, owner, member) = club_with_members(&db);
        let snapshot = BookSnapshot {
            google_book_id: "dune".into(),
            title: Some("Dune".into()),
            authors: Some("Frank Herbert".into()),
            thumbnail: None,
        };
        db.add_to_library(owner, &snapshot, Some(5), None).unwrap();
        db.add_club_book(club, owner, "dune").unwrap();

        let books = db.club_books(club, member).unwrap().unwrap();
        assert_eq!(books[0].snapshot.as_ref(), Some(&snapshot));

        db.remove_from_library(owner, "dune").unwrap();
        let books = db.club_books(club, member).unwrap().unwrap();
        assert_eq!(books.len(), 1);
        assert!(books[0].snapshot.is_none());
    }

    #[test]
    fn delete_is_owner_only_and_cascades() {
        let db = Database::open_in_memory().unwrap();
        let (club, owner, member) = club_with_members(&db);
        let keep = db.create_club(member, "Other", None).unwrap().unwrap();
        db.add_club_book(club, owner, "b1").unwrap();
        db.add_club_book(club, member, "b2").unwrap();
        db.post_message(club, owner, "one").unwrap();
        db.post_message(club, member, "two").unwrap();
        db.post_message(keep, member, "kept").unwrap();

        assert!(!db.delete_club(club, member).unwrap());
        assert!(db.delete_club(club, owner).unwrap());

        for table in [
            "book_club_members",
            "book_club_books",
            "book_club_messages",
            "notifications",
        ] {
            let left = count(&db, &format!("SELECT COUNT(*) FROM {table} WHERE club_id = {club}"));
            assert_eq!(left, 0, "{table} not cleaned");
        }
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_clubs"), 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_club_messages"), 1);
    }

    #[test]
    fn failed_cascade_rolls_back_everything() {
        let db = Database::open_in_memory().unwrap();
        let (club, owner, member) = club_with_members(&db);
        db.add_club_book(club, member, "b1").unwrap();
        db.post_message(club, member, "hello").unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER block_club_delete BEFORE DELETE ON book_clubs
                 BEGIN SELECT RAISE(ABORT, 'induced failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        assert!(!db.delete_club(club, owner).unwrap());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_clubs"), 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_club_members"), 2);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_club_books"), 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_club_messages"), 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM notifications"), 1);
    }

    #[test]
    fn messages_are_trimmed_and_bounded() {
        let db = Database::open_in_memory().unwrap();
        let (club, owner, _) = club_with_members(&db);
        assert!(db.post_message(club, owner, "   ").unwrap().is_none());
        let long = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(db.post_message(club, owner, &long).unwrap().is_none());

        db.post_message(club, owner, "  first ").unwrap().unwrap();
        db.post_message(club, owner, "second").unwrap().unwrap();
        db.post_message(club, owner, "third").unwrap().unwrap();

        let contents: Vec<_> = db
            .list_messages(club, owner, 2)
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["second", "third"]);
        assert_eq!(db.list_messages(club, owner, 10).unwrap().unwrap()[0].content, "first");
    }

    #[test]
    fn clubs_listed_with_role() {
        let db = Database::open_in_memory().unwrap();
        let (club, _, member) = club_with_members(&db);
        let own = db.create_club(member, "Another", None).unwrap().unwrap();

        let clubs = db.list_clubs_for(member).unwrap();
        let summary: Vec<_> = clubs.iter().map(|c| (c.club.id, c.role)).collect();
        assert_eq!(summary, [(own, ClubRole::Owner), (club, ClubRole::Member)]);
    }
}
