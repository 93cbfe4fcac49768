use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use kitabee_types::models::BookSnapshot;

use crate::Database;
use crate::models::{LibraryRow, WishlistRow};

fn valid_rating(rating: Option<u8>) -> bool {
    rating.is_none_or(|r| (1..=5).contains(&r))
}

impl Database {
    /// Marks a book as read. The book leaves the wishlist in the same transaction.
    ///
    /// Returns true when a new library entry was created, false when the book was
    /// already there, the id is blank or the rating is outside 1..=5.
    pub fn add_to_library(
        &self,
        user_id: i64,
        book: &BookSnapshot,
        rating: Option<u8>,
        comment: Option<&str>,
    ) -> Result<bool> {
        let google_book_id = book.google_book_id.trim();
        if google_book_id.is_empty() || !valid_rating(rating) {
            return Ok(false);
        }
        self.with_tx(|tx| {
            tx.execute(
                "DELETE FROM user_wishlist WHERE user_id = ?1 AND google_book_id = ?2",
                params![user_id, google_book_id],
            )?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO user_library
                     (user_id, google_book_id, title, authors, thumbnail, rating, private_comment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user_id,
                    google_book_id,
                    book.title,
                    book.authors,
                    book.thumbnail,
                    rating,
                    comment,
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn update_library_entry(
        &self,
        user_id: i64,
        google_book_id: &str,
        rating: Option<u8>,
        comment: Option<&str>,
    ) -> Result<bool> {
        if !valid_rating(rating) {
            return Ok(false);
        }
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE user_library SET rating = ?3, private_comment = ?4
                 WHERE user_id = ?1 AND google_book_id = ?2",
                params![user_id, google_book_id, rating, comment],
            )?;
            Ok(changed == 1)
        })
    }

    /// Puts a book on the wishlist. The book leaves the library in the same transaction.
    pub fn add_to_wishlist(&self, user_id: i64, book: &BookSnapshot) -> Result<bool> {
        let google_book_id = book.google_book_id.trim();
        if google_book_id.is_empty() {
            return Ok(false);
        }
        self.with_tx(|tx| {
            tx.execute(
                "DELETE FROM user_library WHERE user_id = ?1 AND google_book_id = ?2",
                params![user_id, google_book_id],
            )?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO user_wishlist
                     (user_id, google_book_id, title, authors, thumbnail)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, google_book_id, book.title, book.authors, book.thumbnail],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn remove_from_library(&self, user_id: i64, google_book_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM user_library WHERE user_id = ?1 AND google_book_id = ?2",
                params![user_id, google_book_id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn remove_from_wishlist(&self, user_id: i64, google_book_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM user_wishlist WHERE user_id = ?1 AND google_book_id = ?2",
                params![user_id, google_book_id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn list_library(&self, user_id: i64) -> Result<Vec<LibraryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, google_book_id, title, authors, thumbnail,
                        rating, private_comment, added_at
                 FROM user_library
                 WHERE user_id = ?1
                 ORDER BY added_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], library_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn library_entry(&self, user_id: i64, google_book_id: &str) -> Result<Option<LibraryRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, google_book_id, title, authors, thumbnail,
                            rating, private_comment, added_at
                     FROM user_library
                     WHERE user_id = ?1 AND google_book_id = ?2",
                    params![user_id, google_book_id],
                    library_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_wishlist(&self, user_id: i64) -> Result<Vec<WishlistRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, google_book_id, title, authors, thumbnail, added_at
                 FROM user_wishlist
                 WHERE user_id = ?1
                 ORDER BY added_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(WishlistRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        book: BookSnapshot {
                            google_book_id: row.get(2)?,
                            title: row.get(3)?,
                            authors: row.get(4)?,
                            thumbnail: row.get(5)?,
                        },
                        added_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn library_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LibraryRow> {
    Ok(LibraryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        book: BookSnapshot {
            google_book_id: row.get(2)?,
            title: row.get(3)?,
            authors: row.get(4)?,
            thumbnail: row.get(5)?,
        },
        rating: row.get(6)?,
        private_comment: row.get(7)?,
        added_at: row.get(8)?,
    })
}

pub(crate) fn library_count(conn: &Connection, user_id: i64) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM user_library WHERE user_id = ?1",
        [user_id],
        |r| r.get(0),
    )?)
}

pub(crate) fn recent_library_count(conn: &Connection, user_id: i64, days: u32) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM user_library
         WHERE user_id = ?1 AND added_at >= datetime('now', ?2)",
        params![user_id, format!("-{days} days")],
        |r| r.get(0),
    )?)
}

pub(crate) fn wishlist_count(conn: &Connection, user_id: i64) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM user_wishlist WHERE user_id = ?1",
        [user_id],
        |r| r.get(0),
    )?)
}
