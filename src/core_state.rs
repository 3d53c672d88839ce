//! Shared application state for HTTP handlers and generation jobs.
//!
//! Wrapped in `Arc` at startup. Database access is connection-per-call;
//! the only in-memory mutable state is planning progress, which is
//! streamed to clients and never persisted.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use crate::auth::hash_password;
use crate::config::{AppConfig, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};
use crate::db;
use crate::db::repository::ensure_default_admin;
use crate::models::PlanProgress;
use crate::pipeline::{AiProvider, HttpAiProvider, ImageStore};

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub config: AppConfig,
    ai: Arc<dyn AiProvider>,
    images: ImageStore,
    /// Planning progress keyed by presentation id.
    plan_progress: Mutex<HashMap<String, PlanProgress>>,
}

impl CoreState {
    /// State wired to the configured AI service.
    pub fn new(config: AppConfig) -> Self {
        let ai = Arc::new(HttpAiProvider::from_config(&config));
        Self::with_provider(config, ai)
    }

    /// State with an explicit AI provider (tests, offline runs).
    pub fn with_provider(config: AppConfig, ai: Arc<dyn AiProvider>) -> Self {
        let images = ImageStore::new(config.images_dir());
        Self {
            config,
            ai,
            images,
            plan_progress: Mutex::new(HashMap::new()),
        }
    }

    /// Create storage directories, migrate the database and seed the
    /// default admin when none exists.
    pub fn bootstrap(&self) -> Result<(), CoreError> {
        fs::create_dir_all(self.config.images_dir())?;
        let conn = self.open_db()?;
        if db::repository::count_admins(&conn)? == 0 {
            let hash = hash_password(DEFAULT_ADMIN_PASSWORD, self.config.password_iterations);
            if ensure_default_admin(&conn, DEFAULT_ADMIN_USERNAME, &hash)? {
                tracing::warn!(
                    username = DEFAULT_ADMIN_USERNAME,
                    "Default admin created; change its password"
                );
            }
        }
        tracing::info!(storage = %self.config.storage_dir.display(), "Storage ready");
        Ok(())
    }

    /// Open a fresh connection with pragmas and migrations applied.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.config.db_path()).map_err(CoreError::Database)
    }

    pub fn ai(&self) -> &dyn AiProvider {
        self.ai.as_ref()
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    // ── Plan progress ───────────────────────────────────────

    pub fn set_plan_progress(&self, presentation_id: &str, progress: PlanProgress) -> Result<(), CoreError> {
        let mut map = self.plan_progress.lock().map_err(|_| CoreError::LockPoisoned)?;
        map.insert(presentation_id.to_string(), progress);
        Ok(())
    }

    /// Current planning progress, or the idle payload if planning never
    /// started for this presentation.
    pub fn plan_progress(&self, presentation_id: &str) -> Result<PlanProgress, CoreError> {
        let map = self.plan_progress.lock().map_err(|_| CoreError::LockPoisoned)?;
        Ok(map
            .get(presentation_id)
            .cloned()
            .unwrap_or_else(PlanProgress::idle))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}
