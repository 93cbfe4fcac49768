use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use uuid::Uuid;

use crate::Database;
use crate::models::UserRow;

/// Password reset tokens stay valid for this long.
const RESET_TOKEN_TTL: &str = "+1 hour";

const USER_COLUMNS: &str = "id, login, email, password_hash, avatar, is_active, created_at";

impl Database {
    /// Creates an inactive account. Returns `None` when the login or email is taken,
    /// otherwise the new id and the activation token to mail out.
    pub fn create_user(
        &self,
        login: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<(i64, String)>> {
        let token = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (login, email, password_hash, activation_token)
                 VALUES (?1, ?2, ?3, ?4)",
                params![login, email, password_hash, token],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            let id = conn.last_insert_rowid();
            info!(user_id = id, "Account created (inactive)");
            Ok(Some((id, token)))
        })
    }

    pub fn activate_user(&self, token: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = 1, activation_token = NULL
                 WHERE activation_token = ?1 AND is_active = 0",
                [token],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id))
    }

    pub fn get_user_by_login(&self, login: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "login", &login))
    }

    /// Sets or clears the avatar preset. Returns false for an unknown user.
    pub fn set_avatar(&self, user_id: i64, avatar: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET avatar = ?2 WHERE id = ?1",
                params![user_id, avatar],
            )?;
            Ok(changed == 1)
        })
    }

    /// Issues a reset token for an active account, replacing any earlier one.
    pub fn create_reset_token(&self, email: &str) -> Result<Option<String>> {
        let token = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET reset_token = ?2, reset_expires_at = datetime('now', ?3)
                 WHERE email = ?1 AND is_active = 1",
                params![email, token, RESET_TOKEN_TTL],
            )?;
            Ok((changed == 1).then_some(token))
        })
    }

    /// Consumes a non-expired reset token and stores the new password hash.
    pub fn reset_password(&self, token: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET password_hash = ?2, reset_token = NULL, reset_expires_at = NULL
                 WHERE reset_token = ?1 AND reset_expires_at > datetime('now')",
                params![token, password_hash],
            )?;
            Ok(changed == 1)
        })
    }

    /// Self-service account deletion. Owned clubs, relations and shelves cascade.
    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
            if changed == 1 {
                info!(user_id, "Account deleted");
            }
            Ok(changed == 1)
        })
    }
}

pub(crate) fn user_exists(conn: &Connection, user_id: i64) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", [user_id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn login_of(conn: &Connection, user_id: i64) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT login FROM users WHERE id = ?1", [user_id], |r| r.get(0))
        .optional()?)
}

fn query_user(
    conn: &Connection,
    column: &str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<UserRow>> {
    // `column` is always one of the literals above, never user input
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn
        .query_row(&sql, [value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                login: row.get(1)?,
                email: row.get(2)?,
                password_hash: row.get(3)?,
                avatar: row.get(4)?,
                is_active: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_login_or_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user("ada", "ada@example.com", "h").unwrap().is_some());
        assert!(db.create_user("ada", "other@example.com", "h").unwrap().is_none());
        assert!(db.create_user("bob", "ada@example.com", "h").unwrap().is_none());
    }

    #[test]
    fn activation_token_works_once() {
        let db = Database::open_in_memory().unwrap();
        let (id, token) = db.create_user("ada", "ada@example.com", "h").unwrap().unwrap();
        assert!(!db.get_user_by_id(id).unwrap().unwrap().is_active);

        assert!(db.activate_user(&token).unwrap());
        assert!(!db.activate_user(&token).unwrap());
        assert!(db.get_user_by_login("ada").unwrap().unwrap().is_active);
    }

    #[test]
    fn reset_token_requires_active_account_and_is_consumed() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("ada", "ada@example.com", "old").unwrap().unwrap();
        assert!(db.create_reset_token("ada@example.com").unwrap().is_none());

        let id = testing::active_user(&db, "bob");
        let token = db.create_reset_token("bob@example.com").unwrap().unwrap();
        assert!(db.reset_password(&token, "new").unwrap());
        assert!(!db.reset_password(&token, "newer").unwrap());
        assert_eq!(db.get_user_by_id(id).unwrap().unwrap().password_hash, "new");
    }

    #[test]
    fn expired_reset_token_is_refused() {
        let db = Database::open_in_memory().unwrap();
        testing::active_user(&db, "ada");
        let token = db.create_reset_token("ada@example.com").unwrap().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET reset_expires_at = datetime('now', '-1 minute')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(!db.reset_password(&token, "new").unwrap());
    }

    #[test]
    fn avatar_set_and_clear() {
        let db = Database::open_in_memory().unwrap();
        let id = testing::active_user(&db, "ada");
        assert!(db.set_avatar(id, Some("owl")).unwrap());
        assert_eq!(db.get_user_by_id(id).unwrap().unwrap().avatar.as_deref(), Some("owl"));
        assert!(db.set_avatar(id, None).unwrap());
        assert!(db.get_user_by_id(id).unwrap().unwrap().avatar.is_none());
        assert!(!db.set_avatar(999, Some("owl")).unwrap());
    }
}
