//! In-memory [`Store`] for unit tests

use crate::error::{GatewayError, Result};
use crate::storage::{DailyDraw, Store, SubjectProfile};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Map-backed store with an optional failure switch
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: Mutex<HashMap<String, SubjectProfile>>,
    draws: Mutex<HashMap<(String, NaiveDate), DailyDraw>>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile
    pub fn put_profile(&self, profile: SubjectProfile) {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(profile.id.clone(), profile);
        }
    }

    /// Number of stored draws
    pub fn draw_count(&self) -> usize {
        self.draws.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Make every call fail with a storage error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Storage("store unavailable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_profile(&self, profile_id: &str) -> Result<Option<SubjectProfile>> {
        self.check()?;
        let profiles = self
            .profiles
            .lock()
            .map_err(|_| GatewayError::Storage("poisoned".to_string()))?;
        Ok(profiles.get(profile_id).cloned())
    }

    async fn fetch_draw(&self, profile_id: &str, date: NaiveDate) -> Result<Option<DailyDraw>> {
        self.check()?;
        let draws = self
            .draws
            .lock()
            .map_err(|_| GatewayError::Storage("poisoned".to_string()))?;
        Ok(draws.get(&(profile_id.to_string(), date)).cloned())
    }

    async fn insert_draw_if_absent(&self, draw: &DailyDraw) -> Result<bool> {
        self.check()?;
        let mut draws = self
            .draws
            .lock()
            .map_err(|_| GatewayError::Storage("poisoned".to_string()))?;
        let key = (draw.subject_id.clone(), draw.date);
        if draws.contains_key(&key) {
            return Ok(false);
        }
        draws.insert(key, draw.clone());
        Ok(true)
    }
}
