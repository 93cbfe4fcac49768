use anyhow::Result;
use rusqlite::{Connection, params};
use tracing::{info, warn};

use kitabee_types::models::ClubRole;

use crate::clubs::{club_access, role_in};
use crate::models::{ClubVisit, NotificationRow};
use crate::users::{login_of, user_exists};
use crate::{Database, enum_column};

/// Message previews keep this many characters.
pub const PREVIEW_CHARS: usize = 120;
const ELLIPSIS: &str = "...";

/// Outcome of a best-effort notification fanout. Callers may log a failure but
/// must not treat it as a failure of the action that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutOutcome {
    Delivered(usize),
    Failed(String),
}

impl FanoutOutcome {
    pub fn notified(&self) -> usize {
        match self {
            Self::Delivered(n) => *n,
            Self::Failed(_) => 0,
        }
    }
}

/// First [`PREVIEW_CHARS`] characters of `content`, with an ellipsis when cut.
pub fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &content[..cut]),
        None => content.to_string(),
    }
}

/// Inserts one `club_message` notification for every member except the author.
pub(crate) fn fan_out_club_message(
    conn: &Connection,
    club_id: i64,
    author: i64,
    content: &str,
) -> FanoutOutcome {
    let result = conn.execute(
        "INSERT INTO notifications (user_id, from_user_id, club_id, type, content)
         SELECT user_id, ?2, ?1, 'club_message', ?3
         FROM book_club_members
         WHERE club_id = ?1 AND user_id <> ?2",
        params![club_id, author, preview(content)],
    );
    match result {
        Ok(n) => FanoutOutcome::Delivered(n),
        Err(e) => {
            warn!(club_id, author, "Message fanout failed: {}", e);
            FanoutOutcome::Failed(e.to_string())
        }
    }
}

const NOTIFICATION_SELECT: &str =
    "SELECT n.id, n.user_id, n.from_user_id, u.login, n.club_id, c.name,
            n.type, n.content, n.is_read, n.created_at
     FROM notifications n
     JOIN users u ON u.id = n.from_user_id
     LEFT JOIN book_clubs c ON c.id = n.club_id";

impl Database {
    /// Owner invites a non-member. Creates a single `club_invite` notification;
    /// the membership only appears once the invitee accepts.
    pub fn invite_to_club(&self, club_id: i64, inviter: i64, invitee: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let Some(access) = club_access(conn, club_id, inviter)? else {
                return Ok(false);
            };
            if access.role != ClubRole::Owner
                || !user_exists(conn, invitee)?
                || role_in(conn, club_id, invitee)?.is_some()
                || has_pending_invite(conn, invitee, club_id)?
            {
                return Ok(false);
            }
            let inviter_login = login_of(conn, inviter)?.unwrap_or_default();
            conn.execute(
                "INSERT INTO notifications (user_id, from_user_id, club_id, type, content)
                 VALUES (?1, ?2, ?3, 'club_invite', ?4)",
                params![
                    invitee,
                    inviter,
                    club_id,
                    preview(&format!("{} invited you to join {}", inviter_login, access.club.name)),
                ],
            )?;
            info!(club_id, inviter, invitee, "Club invite sent");
            Ok(true)
        })
    }

    /// Consumes the pending invite and joins the club as a member.
    /// A second concurrent accept finds no unread invite, and the membership
    /// insert is idempotent anyway.
    pub fn accept_invite(&self, user_id: i64, club_id: i64) -> Result<bool> {
        self.with_tx(|tx| {
            let consumed = tx.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE user_id = ?1 AND club_id = ?2 AND type = 'club_invite' AND is_read = 0",
                params![user_id, club_id],
            )?;
            if consumed == 0 {
                return Ok(false);
            }
            tx.execute(
                "INSERT OR IGNORE INTO book_club_members (club_id, user_id, role)
                 VALUES (?1, ?2, 'member')",
                params![club_id, user_id],
            )?;
            info!(club_id, user_id, "Club invite accepted");
            Ok(true)
        })
    }

    pub fn decline_invite(&self, user_id: i64, club_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let consumed = conn.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE user_id = ?1 AND club_id = ?2 AND type = 'club_invite' AND is_read = 0",
                params![user_id, club_id],
            )?;
            Ok(consumed > 0)
        })
    }

    pub fn list_pending_invites(&self, user_id: i64) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            query_notifications(
                conn,
                &format!(
                    "{NOTIFICATION_SELECT}
                     WHERE n.user_id = ?1 AND n.type = 'club_invite' AND n.is_read = 0
                     ORDER BY n.created_at DESC, n.id DESC
                     LIMIT ?2"
                ),
                user_id,
                u32::MAX,
            )
        })
    }

    /// Most recent notifications, read or not.
    pub fn list_notifications(&self, user_id: i64, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            query_notifications(
                conn,
                &format!(
                    "{NOTIFICATION_SELECT}
                     WHERE n.user_id = ?1
                     ORDER BY n.created_at DESC, n.id DESC
                     LIMIT ?2"
                ),
                user_id,
                limit,
            )
        })
    }

    pub fn unread_count(&self, user_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |r| r.get(0),
            )?)
        })
    }

    pub fn mark_notification_read(&self, user_id: i64, notification_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE id = ?1 AND user_id = ?2 AND is_read = 0",
                params![notification_id, user_id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Club page visit: access check, then read marking. The unread count is the
    /// one observed before marking, for the badge shown on entry.
    pub fn open_club(&self, club_id: i64, user_id: i64) -> Result<Option<ClubVisit>> {
        self.with_tx(|tx| {
            let Some(access) = club_access(tx, club_id, user_id)? else {
                return Ok(None);
            };
            let unread_before = mark_club_read(tx, user_id, club_id)?;
            Ok(Some(ClubVisit {
                access,
                unread_before,
            }))
        })
    }
}

fn mark_club_read(conn: &Connection, user_id: i64, club_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE notifications SET is_read = 1
         WHERE user_id = ?1 AND club_id = ?2 AND type = 'club_message' AND is_read = 0",
        params![user_id, club_id],
    )?)
}

fn has_pending_invite(conn: &Connection, user_id: i64, club_id: i64) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM notifications
             WHERE user_id = ?1 AND club_id = ?2 AND type = 'club_invite' AND is_read = 0
         )",
        params![user_id, club_id],
        |r| r.get(0),
    )?)
}

fn query_notifications(
    conn: &Connection,
    sql: &str,
    user_id: i64,
    limit: u32,
) -> Result<Vec<NotificationRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![user_id, limit], |row| {
            Ok(NotificationRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                from_user_id: row.get(2)?,
                from_login: row.get(3)?,
                club_id: row.get(4)?,
                club_name: row.get(5)?,
                kind: enum_column(row, 6)?,
                content: row.get(7)?,
                is_read: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::testing::active_user;
    use kitabee_types::models::NotificationKind;

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?)).unwrap()
    }

    #[test]
    fn preview_truncates_on_characters() {
        assert_eq!(preview("short"), "short");

        let exact = "é".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&exact), exact);

        let long = "é".repeat(PREVIEW_CHARS + 1);
        let cut = preview(&long);
        assert_eq!(cut, format!("{}...", "é".repeat(PREVIEW_CHARS)));
    }

    #[test]
    fn fanout_skips_the_author() {
        let db = Database::open_in_memory().unwrap();
        let owner = active_user(&db, "owner");
        let club = db.create_club(owner, "Club", None).unwrap().unwrap();
        let mut others = Vec::new();
        for login in ["m1", "m2", "m3"] {
            let id = active_user(&db, login);
            db.add_member(club, owner, id).unwrap();
            others.push(id);
        }

        let posted = db.post_message(club, others[0], &"x".repeat(300)).unwrap().unwrap();
        assert_eq!(posted.fanout, FanoutOutcome::Delivered(3));

        let notes = db.list_notifications(owner, 10).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::ClubMessage);
        assert_eq!(notes[0].content.chars().count(), PREVIEW_CHARS + ELLIPSIS.len());
        assert!(db.list_notifications(others[0], 10).unwrap().is_empty());
    }

    #[test]
    fn failed_fanout_keeps_the_message() {
        let db = Database::open_in_memory().unwrap();
        let owner = active_user(&db, "owner");
        let member = active_user(&db, "member");
        let club = db.create_club(owner, "Club", None).unwrap().unwrap();
        db.add_member(club, owner, member).unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER block_fanout BEFORE INSERT ON notifications
                 WHEN NEW.type = 'club_message'
                 BEGIN SELECT RAISE(ABORT, 'induced failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let posted = db.post_message(club, owner, "hello").unwrap().unwrap();
        assert!(matches!(posted.fanout, FanoutOutcome::Failed(_)));
        assert_eq!(posted.fanout.notified(), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM book_club_messages"), 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM notifications"), 0);
    }

    #[test]
    fn invite_rules() {
        let db = Database::open_in_memory().unwrap();
        let owner = active_user(&db, "owner");
        let member = active_user(&db, "member");
        let guest = active_user(&db, "guest");
        let club = db.create_club(owner, "Club", None).unwrap().unwrap();
        db.add_member(club, owner, member).unwrap();

        assert!(!db.invite_to_club(club, member, guest).unwrap());
        assert!(!db.invite_to_club(club, owner, member).unwrap());
        assert!(!db.invite_to_club(club, owner, 4242).unwrap());
        assert!(db.invite_to_club(club, owner, guest).unwrap());
        assert!(!db.invite_to_club(club, owner, guest).unwrap());

        let invites = db.list_pending_invites(guest).unwrap();
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0].content, "owner invited you to join Club");
        assert_eq!(invites[0].club_name.as_deref(), Some("Club"));
        assert!(db.get_club(club, guest).unwrap().is_none());
    }

    #[test]
    fn accept_joins_once_and_decline_does_not() {
        let db = Database::open_in_memory().unwrap();
        let owner = active_user(&db, "owner");
        let a = active_user(&db, "a");
        let b = active_user(&db, "b");
        let club = db.create_club(owner, "Club", None).unwrap().unwrap();

        assert!(!db.accept_invite(a, club).unwrap());

        db.invite_to_club(club, owner, a).unwrap();
        db.invite_to_club(club, owner, b).unwrap();
        assert!(db.accept_invite(a, club).unwrap());
        assert!(!db.accept_invite(a, club).unwrap());
        assert_eq!(db.get_club(club, a).unwrap().unwrap().role, ClubRole::Member);

        assert!(db.decline_invite(b, club).unwrap());
        assert!(db.get_club(club, b).unwrap().is_none());
        assert!(db.list_pending_invites(b).unwrap().is_empty());
    }

    #[test]
    fn open_club_reports_unread_before_marking() {
        let db = Database::open_in_memory().unwrap();
        let owner = active_user(&db, "owner");
        let member = active_user(&db, "member");
        let club = db.create_club(owner, "Club", None).unwrap().unwrap();
        db.add_member(club, owner, member).unwrap();
        db.post_message(club, owner, "one").unwrap();
        db.post_message(club, owner, "two").unwrap();

        assert_eq!(db.unread_count(member).unwrap(), 2);
        let visit = db.open_club(club, member).unwrap().unwrap();
        assert_eq!(visit.unread_before, 2);
        assert_eq!(db.unread_count(member).unwrap(), 0);
        assert_eq!(db.open_club(club, member).unwrap().unwrap().unread_before, 0);

        let outsider = active_user(&db, "outsider");
        assert!(db.open_club(club, outsider).unwrap().is_none());
    }

    #[test]
    fn read_marking_is_per_recipient_and_one_way() {
        let db = Database::open_in_memory().unwrap();
        let owner = active_user(&db, "owner");
        let member = active_user(&db, "member");
        let club = db.create_club(owner, "Club", None).unwrap().unwrap();
        db.add_member(club, owner, member).unwrap();
        db.post_message(club, owner, "hello").unwrap();

        let id = db.list_notifications(member, 1).unwrap()[0].id;
        assert!(!db.mark_notification_read(owner, id).unwrap());
        assert!(db.mark_notification_read(member, id).unwrap());
        assert!(!db.mark_notification_read(member, id).unwrap());
        assert!(db.list_notifications(member, 1).unwrap()[0].is_read);
    }
}
