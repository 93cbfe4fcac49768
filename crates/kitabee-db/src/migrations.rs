use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE users (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                login               TEXT NOT NULL UNIQUE,
                email               TEXT NOT NULL UNIQUE,
                password_hash       TEXT NOT NULL,
                avatar              TEXT,
                is_active           INTEGER NOT NULL DEFAULT 0,
                activation_token    TEXT UNIQUE,
                reset_token         TEXT UNIQUE,
                reset_expires_at    TEXT,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- user_id is the requester, friend_id the addressee
            CREATE TABLE user_friends (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                friend_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status      TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'accepted')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                accepted_at TEXT,
                CHECK (user_id <> friend_id)
            );

            CREATE UNIQUE INDEX idx_user_friends_pair
                ON user_friends(min(user_id, friend_id), max(user_id, friend_id));
            CREATE INDEX idx_user_friends_addressee ON user_friends(friend_id, status);

            CREATE TABLE book_clubs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                description TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE book_club_members (
                club_id     INTEGER NOT NULL REFERENCES book_clubs(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role        TEXT NOT NULL DEFAULT 'member'
                            CHECK (role IN ('owner', 'member')),
                joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (club_id, user_id)
            );

            CREATE UNIQUE INDEX idx_book_club_single_owner
                ON book_club_members(club_id) WHERE role = 'owner';
            CREATE INDEX idx_book_club_members_user ON book_club_members(user_id);

            CREATE TABLE book_club_books (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                club_id         INTEGER NOT NULL REFERENCES book_clubs(id) ON DELETE CASCADE,
                google_book_id  TEXT NOT NULL,
                added_by        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                added_at        TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (club_id, google_book_id)
            );

            CREATE TABLE book_club_messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                club_id     INTEGER NOT NULL REFERENCES book_clubs(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_book_club_messages_club
                ON book_club_messages(club_id, created_at);

            CREATE TABLE notifications (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                from_user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                club_id         INTEGER REFERENCES book_clubs(id) ON DELETE CASCADE,
                type            TEXT NOT NULL CHECK (type IN ('club_invite', 'club_message')),
                content         TEXT NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_notifications_recipient
                ON notifications(user_id, is_read, created_at);

            CREATE TABLE user_library (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                google_book_id  TEXT NOT NULL,
                title           TEXT,
                authors         TEXT,
                thumbnail       TEXT,
                rating          INTEGER CHECK (rating BETWEEN 1 AND 5),
                private_comment TEXT,
                added_at        TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, google_book_id)
            );

            CREATE TABLE user_wishlist (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                google_book_id  TEXT NOT NULL,
                title           TEXT,
                authors         TEXT,
                thumbnail       TEXT,
                added_at        TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, google_book_id)
            );

            CREATE TABLE badges (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                code        TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                description TEXT NOT NULL,
                icon        TEXT NOT NULL
            );

            CREATE TABLE user_badges (
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                badge_id    INTEGER NOT NULL REFERENCES badges(id) ON DELETE CASCADE,
                unlocked_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, badge_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerun_is_a_noop() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn failed_migration_leaves_no_partial_schema() {
        let conn = Connection::open_in_memory().unwrap();
        // clashes with a table created late in v1
        conn.execute_batch("CREATE TABLE badges (id INTEGER PRIMARY KEY);")
            .unwrap();

        assert!(run(&conn).is_err());

        let users: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'users'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(users, 0);
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 0);

        conn.execute_batch("DROP TABLE badges;").unwrap();
        run(&conn).unwrap();
    }
}
