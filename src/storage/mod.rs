use crate::config::StorageConfig;
use crate::error::{GatewayError, Result};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod types;
pub use types::{DailyDraw, SubjectProfile};

#[cfg(test)]
pub mod memory;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persistence seam for profiles and daily draws
///
/// The draw generator only needs these three operations; the HTTP layer and
/// tests can swap the backend freely.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up a profile by id
    async fn fetch_profile(&self, profile_id: &str) -> Result<Option<SubjectProfile>>;

    /// Look up the draw stored for a profile on a given day
    async fn fetch_draw(&self, profile_id: &str, date: NaiveDate) -> Result<Option<DailyDraw>>;

    /// Insert a draw unless one already exists for the same profile and day
    ///
    /// Returns `true` when this call wrote the row.
    async fn insert_draw_if_absent(&self, draw: &DailyDraw) -> Result<bool>;
}

/// SQLite-backed store
///
/// Opens a fresh connection per call; every async method hops onto the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create a store in the user's data directory
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "fate", "fate-gateway")
            .ok_or_else(|| GatewayError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| GatewayError::Storage(e.to_string()))?;

        Self::new_with_path(data_dir.join("fate.db"))
    }

    /// Create a store backed by the given database file
    ///
    /// # Examples
    ///
    /// ```
    /// use fate_gateway::storage::SqliteStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SqliteStore::new_with_path(dir.path().join("fate.db")).unwrap();
    /// assert!(store.db_path().ends_with("fate.db"));
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| GatewayError::Storage(e.to_string()))?;
        }

        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    /// Create a store from configuration, falling back to the data directory
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match &config.db_path {
            Some(path) => Self::new_with_path(path.clone()),
            None => Self::new(),
        }
    }

    /// Path of the underlying database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| GatewayError::Storage(e.to_string()).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                gender TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                location_detail TEXT NOT NULL DEFAULT '',
                solar TEXT NOT NULL DEFAULT '',
                lunar TEXT NOT NULL DEFAULT '',
                true_solar TEXT NOT NULL DEFAULT '',
                longitude REAL,
                latitude REAL
            );
            CREATE TABLE IF NOT EXISTS draws (
                profile_id TEXT NOT NULL,
                draw_date TEXT NOT NULL,
                card_name TEXT NOT NULL,
                keywords JSON NOT NULL,
                interpretation TEXT NOT NULL,
                advice TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(profile_id, draw_date)
            );",
        )
        .context("Failed to create tables")
        .map_err(|e| GatewayError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Insert or replace a profile
    ///
    /// Profiles belong to the profile service; this exists for seeding.
    pub fn upsert_profile(&self, profile: &SubjectProfile) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO profiles
                (id, name, gender, location, location_detail, solar, lunar, true_solar, longitude, latitude)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                gender = excluded.gender,
                location = excluded.location,
                location_detail = excluded.location_detail,
                solar = excluded.solar,
                lunar = excluded.lunar,
                true_solar = excluded.true_solar,
                longitude = excluded.longitude,
                latitude = excluded.latitude",
            params![
                profile.id,
                profile.name,
                profile.gender,
                profile.location,
                profile.location_detail,
                profile.solar,
                profile.lunar,
                profile.true_solar,
                profile.longitude,
                profile.latitude,
            ],
        )
        .context("Failed to upsert profile")
        .map_err(|e| GatewayError::Storage(e.to_string()))?;
        Ok(())
    }

    fn load_profile(&self, profile_id: &str) -> Result<Option<SubjectProfile>> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, name, gender, location, location_detail, solar, lunar, true_solar, longitude, latitude
            FROM profiles WHERE id = ?",
            params![profile_id],
            |row| {
                Ok(SubjectProfile {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    gender: row.get(2)?,
                    location: row.get(3)?,
                    location_detail: row.get(4)?,
                    solar: row.get(5)?,
                    lunar: row.get(6)?,
                    true_solar: row.get(7)?,
                    longitude: row.get(8)?,
                    latitude: row.get(9)?,
                })
            },
        )
        .optional()
        .context("Failed to query profile")
        .map_err(|e| GatewayError::Storage(e.to_string()).into())
    }

    fn load_draw(&self, profile_id: &str, date: NaiveDate) -> Result<Option<DailyDraw>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT card_name, keywords, interpretation, advice
                FROM draws WHERE profile_id = ? AND draw_date = ?",
                params![profile_id, date.format(DATE_FORMAT).to_string()],
                |row| {
                    let card_name: String = row.get(0)?;
                    let keywords_json: String = row.get(1)?;
                    let interpretation: String = row.get(2)?;
                    let advice: String = row.get(3)?;
                    Ok((card_name, keywords_json, interpretation, advice))
                },
            )
            .optional()
            .context("Failed to query draw")
            .map_err(|e| GatewayError::Storage(e.to_string()))?;

        match row {
            Some((card_name, keywords_json, interpretation, advice)) => {
                let keywords: Vec<String> = serde_json::from_str(&keywords_json)
                    .context("Failed to deserialize keywords")
                    .map_err(|e| GatewayError::Storage(e.to_string()))?;
                Ok(Some(DailyDraw {
                    subject_id: profile_id.to_string(),
                    date,
                    card_name,
                    keywords,
                    interpretation,
                    advice,
                }))
            }
            None => Ok(None),
        }
    }

    fn write_draw(&self, draw: &DailyDraw) -> Result<bool> {
        let conn = self.open()?;
        let keywords_json = serde_json::to_string(&draw.keywords)
            .context("Failed to serialize keywords")
            .map_err(|e| GatewayError::Storage(e.to_string()))?;

        let inserted = conn
            .execute(
                "INSERT INTO draws
                    (profile_id, draw_date, card_name, keywords, interpretation, advice, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(profile_id, draw_date) DO NOTHING",
                params![
                    draw.subject_id,
                    draw.date.format(DATE_FORMAT).to_string(),
                    draw.card_name,
                    keywords_json,
                    draw.interpretation,
                    draw.advice,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to insert draw")
            .map_err(|e| GatewayError::Storage(e.to_string()))?;

        Ok(inserted > 0)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(SqliteStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|e| GatewayError::Storage(format!("storage task failed: {}", e)))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn fetch_profile(&self, profile_id: &str) -> Result<Option<SubjectProfile>> {
        let id = profile_id.to_string();
        self.blocking(move |store| store.load_profile(&id)).await
    }

    async fn fetch_draw(&self, profile_id: &str, date: NaiveDate) -> Result<Option<DailyDraw>> {
        let id = profile_id.to_string();
        self.blocking(move |store| store.load_draw(&id, date)).await
    }

    async fn insert_draw_if_absent(&self, draw: &DailyDraw) -> Result<bool> {
        let draw = draw.clone();
        self.blocking(move |store| store.write_draw(&draw)).await
    }
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn fetch_profile(&self, profile_id: &str) -> Result<Option<SubjectProfile>> {
        (**self).fetch_profile(profile_id).await
    }

    async fn fetch_draw(&self, profile_id: &str, date: NaiveDate) -> Result<Option<DailyDraw>> {
        (**self).fetch_draw(profile_id, date).await
    }

    async fn insert_draw_if_absent(&self, draw: &DailyDraw) -> Result<bool> {
        (**self).insert_draw_if_absent(draw).await
    }
}
