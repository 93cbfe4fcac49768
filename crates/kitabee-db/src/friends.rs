use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use kitabee_types::models::FriendStatus;

use crate::models::FriendRow;
use crate::users::user_exists;
use crate::{Database, enum_column};

impl Database {
    /// Sends a friend request from `me` to `other`.
    ///
    /// Fails when `other == me`, when `other` does not exist, or when any relation
    /// already links the pair in either direction. The unique pair index makes the
    /// last check race-free.
    pub fn send_friend_request(&self, me: i64, other: i64) -> Result<bool> {
        if me == other {
            return Ok(false);
        }
        self.with_conn(|conn| {
            if !user_exists(conn, other)? {
                return Ok(false);
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO user_friends (user_id, friend_id, status)
                 VALUES (?1, ?2, 'pending')",
                params![me, other],
            )?;
            if inserted == 1 {
                info!(from = me, to = other, "Friend request sent");
            }
            Ok(inserted == 1)
        })
    }

    /// Accepts the pending request `other` sent to `me`. Only the addressee can accept.
    pub fn accept_friend_request(&self, me: i64, other: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE user_friends SET status = 'accepted', accepted_at = datetime('now')
                 WHERE user_id = ?1 AND friend_id = ?2 AND status = 'pending'",
                params![other, me],
            )?;
            if changed == 1 {
                info!(user_id = me, friend_id = other, "Friend request accepted");
            }
            Ok(changed == 1)
        })
    }

    /// Deletes the pending request `other` sent to `me`.
    pub fn decline_friend_request(&self, me: i64, other: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM user_friends
                 WHERE user_id = ?1 AND friend_id = ?2 AND status = 'pending'",
                params![other, me],
            )?;
            Ok(changed == 1)
        })
    }

    /// Withdraws a pending request `me` sent to `other`.
    pub fn cancel_friend_request(&self, me: i64, other: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM user_friends
                 WHERE user_id = ?1 AND friend_id = ?2 AND status = 'pending'",
                params![me, other],
            )?;
            Ok(changed == 1)
        })
    }

    /// Removes an accepted friendship, whoever requested it.
    pub fn remove_friend(&self, me: i64, other: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM user_friends
                 WHERE status = 'accepted'
                   AND ((user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1))",
                params![me, other],
            )?;
            if changed == 1 {
                info!(user_id = me, friend_id = other, "Friendship removed");
            }
            Ok(changed == 1)
        })
    }

    pub fn list_friends(&self, me: i64) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| {
            query_friend_rows(
                conn,
                "SELECT u.id, u.login, u.avatar, COALESCE(f.accepted_at, f.created_at)
                 FROM user_friends f
                 JOIN users u
                   ON u.id = CASE WHEN f.user_id = ?1 THEN f.friend_id ELSE f.user_id END
                 WHERE (f.user_id = ?1 OR f.friend_id = ?1) AND f.status = 'accepted'
                 ORDER BY u.login",
                me,
            )
        })
    }

    /// Pending requests addressed to `me`.
    pub fn list_incoming_requests(&self, me: i64) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| {
            query_friend_rows(
                conn,
                "SELECT u.id, u.login, u.avatar, f.created_at
                 FROM user_friends f
                 JOIN users u ON u.id = f.user_id
                 WHERE f.friend_id = ?1 AND f.status = 'pending'
                 ORDER BY f.created_at DESC, f.id DESC",
                me,
            )
        })
    }

    /// Pending requests `me` sent.
    pub fn list_outgoing_requests(&self, me: i64) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| {
            query_friend_rows(
                conn,
                "SELECT u.id, u.login, u.avatar, f.created_at
                 FROM user_friends f
                 JOIN users u ON u.id = f.friend_id
                 WHERE f.user_id = ?1 AND f.status = 'pending'
                 ORDER BY f.created_at DESC, f.id DESC",
                me,
            )
        })
    }

    /// Status of the relation between two users, in whichever direction it exists.
    pub fn friend_status(&self, me: i64, other: i64) -> Result<Option<FriendStatus>> {
        self.with_conn(|conn| {
            let status = conn
                .query_row(
                    "SELECT status FROM user_friends
                     WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                    params![me, other],
                    |row| enum_column(row, 0),
                )
                .optional()?;
            Ok(status)
        })
    }
}

pub(crate) fn accepted_friend_count(conn: &Connection, user_id: i64) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM user_friends
         WHERE (user_id = ?1 OR friend_id = ?1) AND status = 'accepted'",
        [user_id],
        |r| r.get(0),
    )?)
}

fn query_friend_rows(conn: &Connection, sql: &str, me: i64) -> Result<Vec<FriendRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([me], |row| {
            Ok(FriendRow {
                user_id: row.get(0)?,
                login: row.get(1)?,
                avatar: row.get(2)?,
                since: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::testing::active_user;

    fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let a = active_user(&db, "alice");
        let b = active_user(&db, "bob");
        (db, a, b)
    }

    fn relation_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM user_friends", [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn request_to_self_fails() {
        let (db, a, _) = setup();
        assert!(!db.send_friend_request(a, a).unwrap());
        assert_eq!(relation_rows(&db), 0);
    }

    #[test]
    fn request_to_unknown_user_fails() {
        let (db, a, _) = setup();
        assert!(!db.send_friend_request(a, 4242).unwrap());
    }

    #[test]
    fn one_relation_per_pair_in_any_direction() {
        let (db, a, b) = setup();
        assert!(db.send_friend_request(a, b).unwrap());
        assert!(!db.send_friend_request(a, b).unwrap());
        assert!(!db.send_friend_request(b, a).unwrap());
        assert_eq!(relation_rows(&db), 1);

        assert!(db.accept_friend_request(b, a).unwrap());
        assert!(!db.send_friend_request(b, a).unwrap());
        assert_eq!(relation_rows(&db), 1);
    }

    #[test]
    fn only_the_addressee_accepts_and_only_once() {
        let (db, a, b) = setup();
        db.send_friend_request(a, b).unwrap();

        assert!(!db.accept_friend_request(a, b).unwrap());
        assert!(db.accept_friend_request(b, a).unwrap());
        assert!(!db.accept_friend_request(b, a).unwrap());
        assert_eq!(db.friend_status(a, b).unwrap(), Some(FriendStatus::Accepted));
    }

    #[test]
    fn decline_deletes_pending_only() {
        let (db, a, b) = setup();
        db.send_friend_request(a, b).unwrap();
        assert!(!db.decline_friend_request(a, b).unwrap());
        assert!(db.decline_friend_request(b, a).unwrap());
        assert_eq!(db.friend_status(a, b).unwrap(), None);

        db.send_friend_request(a, b).unwrap();
        db.accept_friend_request(b, a).unwrap();
        assert!(!db.decline_friend_request(b, a).unwrap());
    }

    #[test]
    fn remove_works_from_either_side() {
        let (db, a, b) = setup();
        db.send_friend_request(a, b).unwrap();
        assert!(!db.remove_friend(a, b).unwrap());

        db.accept_friend_request(b, a).unwrap();
        assert!(db.remove_friend(b, a).unwrap());
        assert_eq!(relation_rows(&db), 0);
    }

    #[test]
    fn listings_are_symmetric_for_friends() {
        let (db, a, b) = setup();
        let c = active_user(&db, "carol");
        db.send_friend_request(a, b).unwrap();
        db.send_friend_request(c, a).unwrap();

        assert_eq!(db.list_outgoing_requests(a).unwrap()[0].user_id, b);
        assert_eq!(db.list_incoming_requests(a).unwrap()[0].user_id, c);
        assert!(db.list_friends(a).unwrap().is_empty());

        db.accept_friend_request(b, a).unwrap();
        db.accept_friend_request(a, c).unwrap();

        let logins: Vec<_> = db.list_friends(a).unwrap().into_iter().map(|f| f.login).collect();
        assert_eq!(logins, ["bob", "carol"]);
        assert_eq!(db.list_friends(b).unwrap()[0].user_id, a);
        db.with_conn(|conn| {
            assert_eq!(accepted_friend_count(conn, a)?, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn cancel_withdraws_own_request() {
        let (db, a, b) = setup();
        db.send_friend_request(a, b).unwrap();
        assert!(!db.cancel_friend_request(b, a).unwrap());
        assert!(db.cancel_friend_request(a, b).unwrap());
        assert!(db.list_incoming_requests(b).unwrap().is_empty());
    }
}
