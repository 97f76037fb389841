//! Users, their past evaluations, and the image files those point at.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use image::DynamicImage;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::StoreError;

const CURRENT_SCHEMA_VERSION: i32 = 1;
const THUMBNAIL_SIZE: u32 = 120;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    score REAL NOT NULL,
    comment TEXT,
    image_path TEXT,
    thumbnail_path TEXT,
    timestamp TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users (id)
);
";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub score: f64,
    pub comment: String,
    pub thumbnail_path: PathBuf,
    pub timestamp: String,
}

pub struct HistoryStore {
    conn: Mutex<Connection>,
    image_dir: PathBuf,
}

impl HistoryStore {
    pub fn open(db_path: &Path, image_dir: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        info!(db = %db_path.display(), images = %image_dir.display(), "opened history store");
        Self::with_connection(conn, image_dir)
    }

    pub fn open_in_memory(image_dir: &Path) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, image_dir)
    }

    fn with_connection(mut conn: Connection, image_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(image_dir)?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            image_dir: image_dir.to_path_buf(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// `Ok(false)` when the username is taken.
    pub fn create_user(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            params![username, hash_password(password)],
        );

        match inserted {
            Ok(_) => {
                info!(username, "created user");
                Ok(true)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                debug!(username, "username already taken");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn authenticate_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<i64>, StoreError> {
        let conn = self.conn()?;
        let record: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(record.and_then(|(id, stored)| verify_password(&stored, password).then_some(id)))
    }

    pub fn user_exists(&self, user_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found = conn
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![user_id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Writes the image and its thumbnail, then records the evaluation.
    /// Returns the new row id.
    pub fn add_history_entry(
        &self,
        user_id: i64,
        score: f64,
        comment: &str,
        image: &DynamicImage,
        timestamp: &str,
    ) -> Result<i64, StoreError> {
        let (image_path, thumb_path) = self.save_image_and_get_paths(image, user_id, timestamp)?;

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO history (user_id, score, comment, image_path, thumbnail_path, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                score,
                comment,
                image_path.to_string_lossy(),
                thumb_path.to_string_lossy(),
                timestamp
            ],
        );
        if let Err(err) = inserted {
            // no row points at the files, so they go too
            for path in [&image_path, &thumb_path] {
                if let Err(io_err) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %io_err, "could not remove orphaned image");
                }
            }
            return Err(err.into());
        }
        let id = conn.last_insert_rowid();
        info!(user_id, id, score, "recorded history entry");
        Ok(id)
    }

    /// Newest first.
    pub fn get_user_history(&self, user_id: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT score, comment, thumbnail_path, timestamp FROM history
             WHERE user_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(HistoryEntry {
                score: row.get(0)?,
                comment: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                thumbnail_path: PathBuf::from(row.get::<_, Option<String>>(2)?.unwrap_or_default()),
                timestamp: row.get(3)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn save_image_and_get_paths(
        &self,
        image: &DynamicImage,
        user_id: i64,
        timestamp: &str,
    ) -> Result<(PathBuf, PathBuf), StoreError> {
        let safe_timestamp = timestamp.replace(':', "-").replace(' ', "_");
        let image_name = format!("user_{user_id}_{safe_timestamp}.png");
        let image_path = self.image_dir.join(&image_name);
        save_png(image, &image_path)?;

        let thumb_path = self.image_dir.join(format!("thumb_{image_name}"));
        save_png(&thumbnail(image), &thumb_path)?;

        Ok((image_path, thumb_path))
    }
}

fn save_png(image: &DynamicImage, path: &Path) -> Result<(), StoreError> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|source| StoreError::Image {
            path: path.display().to_string(),
            source,
        })
}

/// Fits inside 120x120 keeping the aspect ratio; small images are left alone.
fn thumbnail(image: &DynamicImage) -> DynamicImage {
    if image.width() <= THUMBNAIL_SIZE && image.height() <= THUMBNAIL_SIZE {
        return image.clone();
    }
    image.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE)
}

fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn verify_password(stored_hash: &str, password: &str) -> bool {
    stored_hash == hash_password(password)
}

fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database version ({version}) is newer than supported schema ({CURRENT_SCHEMA_VERSION})"
        )));
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1)?;
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    info!(version = CURRENT_SCHEMA_VERSION, "applied schema");
    Ok(())
}
