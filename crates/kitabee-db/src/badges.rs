use std::collections::HashSet;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use kitabee_types::badges::{BadgeDefinition, BadgeRule, CATALOG};

use crate::friends::accepted_friend_count;
use crate::library::{library_count, recent_library_count, wishlist_count};
use crate::models::UserBadgeRow;
use crate::Database;

/// Upserts the static catalog into `badges` so unlocks never have to create rows.
pub(crate) fn seed_catalog(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO badges (code, name, description, icon) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(code) DO UPDATE SET
             name = excluded.name,
             description = excluded.description,
             icon = excluded.icon",
    )?;
    for badge in CATALOG {
        stmt.execute(params![badge.code, badge.name, badge.description, badge.icon])?;
    }
    debug!("Badge catalog seeded ({} badges)", CATALOG.len());
    Ok(())
}

impl Database {
    /// Evaluates every catalog rule for `user_id` and unlocks the satisfied ones.
    ///
    /// Only badges unlocked by this call are returned, so a caller can show the
    /// "new badge" toast exactly once. Badges are never re-locked. Two concurrent
    /// evaluations may both pass the already-unlocked check; the `(user_id, badge_id)`
    /// key lets exactly one of them insert, and only that one reports the badge.
    pub fn evaluate_and_unlock(&self, user_id: i64) -> Result<Vec<&'static BadgeDefinition>> {
        self.with_conn(|conn| {
            let unlocked = unlocked_codes(conn, user_id)?;
            let mut fresh = Vec::new();

            for badge in CATALOG {
                if unlocked.contains(badge.code) {
                    continue;
                }
                if !rule_satisfied(conn, user_id, badge.rule)? {
                    continue;
                }
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO user_badges (user_id, badge_id)
                     SELECT ?1, id FROM badges WHERE code = ?2",
                    params![user_id, badge.code],
                )?;
                if inserted == 1 {
                    info!(user_id, badge = badge.code, "Badge unlocked");
                    fresh.push(badge);
                }
            }

            Ok(fresh)
        })
    }

    pub fn list_user_badges(&self, user_id: i64) -> Result<Vec<UserBadgeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT b.code, b.name, b.description, b.icon, ub.unlocked_at
                 FROM user_badges ub
                 JOIN badges b ON b.id = ub.badge_id
                 WHERE ub.user_id = ?1
                 ORDER BY ub.unlocked_at, b.id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(UserBadgeRow {
                        code: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        icon: row.get(3)?,
                        unlocked_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn unlocked_codes(conn: &Connection, user_id: i64) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT b.code FROM user_badges ub JOIN badges b ON b.id = ub.badge_id
         WHERE ub.user_id = ?1",
    )?;
    let codes = stmt
        .query_map([user_id], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<String>, _>>()?;
    Ok(codes)
}

fn rule_satisfied(conn: &Connection, user_id: i64, rule: BadgeRule) -> Result<bool> {
    let satisfied = match rule {
        BadgeRule::WishlistCount(n) => wishlist_count(conn, user_id)? >= n,
        BadgeRule::LibraryCount(n) => library_count(conn, user_id)? >= n,
        BadgeRule::RecentLibraryCount { count, days } => {
            recent_library_count(conn, user_id, days)? >= count
        }
        BadgeRule::AcceptedFriends(n) => accepted_friend_count(conn, user_id)? >= n,
        BadgeRule::HasAvatar => conn
            .query_row(
                "SELECT avatar IS NOT NULL AND avatar <> '' FROM users WHERE id = ?1",
                [user_id],
                |r| r.get(0),
            )
            .optional()?
            .unwrap_or(false),
    };
    Ok(satisfied)
}
