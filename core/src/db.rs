use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{Comment, NewPost, Post, PostSort, SavedRecipeRef, Session, UpdatePost, User};
use crate::resolver::{SavedRecipeStore, StoreError};

pub struct Database {
    conn: Connection,
}

/// Stored credentials for a user, only ever read by the account layer.
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
    pub salt: String,
}

// Fixed-width timestamps so ORDER BY created_at sorts chronologically
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    salt TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS saved_recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    recipe_id TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS posts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    content TEXT,
                    image_url TEXT,
                    recipe_id TEXT,
                    upvotes INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                CREATE INDEX IF NOT EXISTS idx_saved_recipes_user ON saved_recipes(user_id);
                CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at);
                CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // Saving the same recipe twice is a no-op
            self.conn.execute_batch(
                "DELETE FROM saved_recipes WHERE id NOT IN (
                     SELECT MIN(id) FROM saved_recipes GROUP BY user_id, recipe_id
                 );
                 CREATE UNIQUE INDEX IF NOT EXISTS idx_saved_recipes_user_recipe
                     ON saved_recipes(user_id, recipe_id);
                 PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    // Expects columns: 0: s.token, 1: s.user_id, 2: u.email, 3: s.created_at
    fn session_from_row(row: &rusqlite::Row) -> rusqlite::Result<Session> {
        Ok(Session {
            token: row.get(0)?,
            user_id: row.get(1)?,
            email: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn saved_ref_from_row(row: &rusqlite::Row) -> rusqlite::Result<SavedRecipeRef> {
        Ok(SavedRecipeRef {
            id: row.get(0)?,
            user_id: row.get(1)?,
            recipe_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn post_from_row(row: &rusqlite::Row) -> rusqlite::Result<Post> {
        Ok(Post {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            image_url: row.get(4)?,
            recipe_id: row.get(5)?,
            upvotes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn comment_from_row(row: &rusqlite::Row) -> rusqlite::Result<Comment> {
        Ok(Comment {
            id: row.get(0)?,
            post_id: row.get(1)?,
            user_id: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // --- Users ---

    pub fn insert_user(&self, email: &str, password_hash: &str, salt: &str) -> Result<User> {
        self.conn
            .execute(
                "INSERT INTO users (email, password_hash, salt, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![email, password_hash, salt, now()],
            )
            .with_context(|| format!("Failed to create user '{email}'"))?;
        let id = self.conn.last_insert_rowid();
        self.get_user_by_id(id)
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                "SELECT id, email, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .context("User not found")
    }

    pub fn get_credentials(&self, email: &str) -> Result<Option<Credentials>> {
        let creds = self
            .conn
            .query_row(
                "SELECT id, email, created_at, password_hash, salt FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(Credentials {
                        user: Self::user_from_row(row)?,
                        password_hash: row.get(3)?,
                        salt: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(creds)
    }

    // --- Sessions ---

    pub fn create_session(&self, user_id: i64) -> Result<Session> {
        let token = Uuid::new_v4().simple().to_string();
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, now()],
        )?;
        self.get_session(&token)?
            .context("Session vanished after insert")
    }

    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT s.token, s.user_id, u.email, s.created_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1",
                params![token],
                Self::session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    // --- Saved recipes ---

    pub fn save_recipe(&self, user_id: i64, recipe_id: &str) -> Result<SavedRecipeRef> {
        self.conn.execute(
            "INSERT OR IGNORE INTO saved_recipes (user_id, recipe_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, recipe_id, now()],
        )?;
        self.conn
            .query_row(
                "SELECT id, user_id, recipe_id, created_at FROM saved_recipes
                 WHERE user_id = ?1 AND recipe_id = ?2",
                params![user_id, recipe_id],
                Self::saved_ref_from_row,
            )
            .context("Failed to read saved recipe")
    }

    pub fn delete_saved_recipe(&self, user_id: i64, recipe_id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM saved_recipes WHERE user_id = ?1 AND recipe_id = ?2",
            params![user_id, recipe_id],
        )?;
        Ok(rows > 0)
    }

    pub fn is_recipe_saved(&self, user_id: i64, recipe_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM saved_recipes WHERE user_id = ?1 AND recipe_id = ?2",
            params![user_id, recipe_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Saved recipes for a user in the order they were saved.
    pub fn list_saved_recipes(&self, user_id: i64) -> Result<Vec<SavedRecipeRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, recipe_id, created_at FROM saved_recipes
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let refs = stmt
            .query_map(params![user_id], Self::saved_ref_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(refs)
    }

    // --- Posts ---

    pub fn insert_post(&self, user_id: i64, post: &NewPost) -> Result<Post> {
        let now = now();
        self.conn.execute(
            "INSERT INTO posts (user_id, title, content, image_url, recipe_id, upvotes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                user_id,
                post.title,
                post.content,
                post.image_url,
                post.recipe_id,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_post(id)?.context("Post vanished after insert")
    }

    pub fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let post = self
            .conn
            .query_row(
                "SELECT id, user_id, title, content, image_url, recipe_id, upvotes, created_at, updated_at
                 FROM posts WHERE id = ?1",
                params![id],
                Self::post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    pub fn list_posts(&self, search: Option<&str>, sort: PostSort) -> Result<Vec<Post>> {
        let order = sort.order_by();
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let posts = if let Some(query) = search {
            let escaped = query
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            let pattern = format!("%{escaped}%");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT id, user_id, title, content, image_url, recipe_id, upvotes, created_at, updated_at
                 FROM posts WHERE title LIKE ?1 ESCAPE '\\' ORDER BY {order}"
            ))?;
            stmt.query_map(params![pattern], Self::post_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT id, user_id, title, content, image_url, recipe_id, upvotes, created_at, updated_at
                 FROM posts ORDER BY {order}"
            ))?;
            stmt.query_map([], Self::post_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(posts)
    }

    pub fn update_post(&self, id: i64, update: &UpdatePost) -> Result<Post> {
        let existing = self.get_post(id)?.context("Post not found")?;

        let title = update.title.as_ref().unwrap_or(&existing.title);
        let content = match &update.content {
            Some(v) => v.as_ref(),
            None => existing.content.as_ref(),
        };
        let image_url = match &update.image_url {
            Some(v) => v.as_ref(),
            None => existing.image_url.as_ref(),
        };
        let recipe_id = update.recipe_id.as_ref().or(existing.recipe_id.as_ref());

        self.conn.execute(
            "UPDATE posts SET title = ?1, content = ?2, image_url = ?3, recipe_id = ?4, updated_at = ?5
             WHERE id = ?6",
            params![title, content, image_url, recipe_id, now(), id],
        )?;
        self.get_post(id)?.context("Post not found")
    }

    pub fn delete_post(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Atomically add one upvote. Returns `None` if the post does not exist.
    pub fn increment_upvotes(&self, id: i64) -> Result<Option<Post>> {
        let rows = self.conn.execute(
            "UPDATE posts SET upvotes = upvotes + 1 WHERE id = ?1",
            params![id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_post(id)
    }

    // --- Comments ---

    pub fn insert_comment(&self, post_id: i64, user_id: i64, content: &str) -> Result<Comment> {
        self.conn.execute(
            "INSERT INTO comments (post_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![post_id, user_id, content, now()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, post_id, user_id, content, created_at FROM comments WHERE id = ?1",
                params![id],
                Self::comment_from_row,
            )
            .context("Comment not found")
    }

    pub fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, post_id, user_id, content, created_at FROM comments
             WHERE post_id = ?1 ORDER BY created_at, id",
        )?;
        let comments = stmt
            .query_map(params![post_id], Self::comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }
}

impl SavedRecipeStore for Database {
    fn list_saved(&self, user_id: i64) -> Result<Vec<SavedRecipeRef>, StoreError> {
        self.list_saved_recipes(user_id).map_err(StoreError)
    }
}
