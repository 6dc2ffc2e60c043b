use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use cookbuddy_core::mealdb::DEFAULT_BASE_URL;
use cookbuddy_core::resolver::{DEFAULT_CONCURRENCY, ResolverConfig, RetryPolicy};

const DEFAULT_LOOKUP_RETRIES: u32 = 1;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub mealdb_url: String,
    pub lookup_concurrency: usize,
    /// Extra attempts after the first failed lookup.
    pub lookup_retries: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os("COOKBUDDY_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "cookbuddy")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };

        let mut config = Self::with_data_dir(&data_dir)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Defaults rooted at `data_dir`, creating it if needed.
    pub fn with_data_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            data_dir: data_dir.to_path_buf(),
            db_path: data_dir.join("cookbuddy.db"),
            mealdb_url: DEFAULT_BASE_URL.to_string(),
            lookup_concurrency: DEFAULT_CONCURRENCY,
            lookup_retries: DEFAULT_LOOKUP_RETRIES,
        })
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("COOKBUDDY_MEALDB_URL") {
            let url = url.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                self.mealdb_url = url.trim_end_matches('/').to_string();
            } else {
                warn!(value = url, "ignoring COOKBUDDY_MEALDB_URL: not an http(s) URL");
            }
        }
        self.lookup_concurrency = parse_var(
            &var,
            "COOKBUDDY_LOOKUP_CONCURRENCY",
            self.lookup_concurrency,
            |n: &usize| *n > 0,
        );
        self.lookup_retries = parse_var(
            &var,
            "COOKBUDDY_LOOKUP_RETRIES",
            self.lookup_retries,
            |n: &u32| *n <= 10,
        );
    }

    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            concurrency: self.lookup_concurrency,
            retry: RetryPolicy {
                max_attempts: self.lookup_retries + 1,
                base_delay: RETRY_BASE_DELAY,
                ..RetryPolicy::default()
            },
        }
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join("session")
    }

    /// Token of the signed-in user, if any.
    pub fn load_session_token(&self) -> Result<Option<String>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let token = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let token = token.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    pub fn save_session_token(&self, token: &str) -> Result<()> {
        let path = self.session_path();
        std::fs::write(&path, token).context("Failed to write session file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set session file permissions")?;
        }
        Ok(())
    }

    pub fn clear_session_token(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

fn parse_var<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr + Copy,
{
    let Some(raw) = var(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) if valid(&v) => v,
        _ => {
            warn!(name, value = %raw, "ignoring invalid value, using default");
            default
        }
    }
}
