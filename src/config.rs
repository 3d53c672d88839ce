use std::path::{Path, PathBuf};

/// Application-level constants
pub const APP_NAME: &str = "Slidecraft";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BASE_URL: &str = "https://api.geekai.pro";
pub const DEFAULT_MODEL_LOGIC: &str = "google/gemini-3-pro-preview";
pub const DEFAULT_MODEL_IMAGE: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_JWT_SECRET: &str = "slidecraft-dev-secret-change-me";
pub const DEFAULT_PORT: u16 = 8002;

/// Bootstrap admin seeded into an empty admins table.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "slidecraft=info,slidecraft_lib=info,tower_http=warn"
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// OpenAI-compatible gateway serving both the chat and image models.
    pub base_url: String,
    pub api_key: String,
    pub model_logic: String,
    pub model_image: String,
    pub jwt_secret: String,
    /// Set when `JWT_SECRET_KEY` was absent and the development secret is in use.
    pub jwt_secret_is_default: bool,
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub llm_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub password_iterations: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse_or = |key: &str, default: u64| {
            get(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(default)
        };

        let jwt_secret = get("JWT_SECRET_KEY");
        Self {
            base_url: get("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            api_key: get("API_KEY").unwrap_or_default(),
            model_logic: get("MODEL_LOGIC").unwrap_or_else(|| DEFAULT_MODEL_LOGIC.into()),
            model_image: get("MODEL_IMAGE").unwrap_or_else(|| DEFAULT_MODEL_IMAGE.into()),
            jwt_secret_is_default: jwt_secret.is_none(),
            jwt_secret: jwt_secret.unwrap_or_else(|| DEFAULT_JWT_SECRET.into()),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: get("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            storage_dir: expand_home(&get("STORAGE_DIR").unwrap_or_else(|| "storage".into())),
            llm_timeout_secs: parse_or("LLM_TIMEOUT_SECS", 300),
            image_timeout_secs: parse_or("IMAGE_TIMEOUT_SECS", 120),
            password_iterations: parse_or(
                "PASSWORD_HASH_ITERATIONS",
                crate::auth::DEFAULT_PASSWORD_ITERATIONS as u64,
            )
            .clamp(1, u32::MAX as u64) as u32,
        }
    }

    /// Isolated configuration rooted at `dir`, with cheap password hashing.
    pub fn for_tests(dir: &Path) -> Self {
        let mut config = Self::from_lookup(|_| None);
        config.storage_dir = dir.to_path_buf();
        config.jwt_secret = "test-secret".into();
        config.password_iterations = 10;
        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join("presentations.db")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.storage_dir.join("images")
    }
}

/// Resolve a leading `~/` against the home directory.
fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}
