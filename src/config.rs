//! Update settings and per-user directories.

use crate::error::{Result, UpdateError};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const APP_DIR_NAME: &str = "KiotaUiClient";
const CONFIG_FILE: &str = "update.toml";

const DEFAULT_REPO_OWNER: &str = "archteck";
const DEFAULT_REPO_NAME: &str = "KiotaUiClient";
const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PARENT_WAIT_SECS: u64 = 30;
pub const DEFAULT_COPY_RETRY_DELAY_MS: u64 = 200;

/// Settings for the self-update flow, read from `update.toml` in the
/// per-user data directory. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub repo_owner: String,
    pub repo_name: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub updates_dir: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
    pub parent_wait_secs: u64,
    pub copy_retry_delay_ms: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            repo_owner: DEFAULT_REPO_OWNER.to_string(),
            repo_name: DEFAULT_REPO_NAME.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            updates_dir: None,
            install_dir: None,
            parent_wait_secs: DEFAULT_PARENT_WAIT_SECS,
            copy_retry_delay_ms: DEFAULT_COPY_RETRY_DELAY_MS,
        }
    }
}

impl UpdateConfig {
    /// Load from the default location. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        match config_file_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(UpdateError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        toml::from_str(&text)
            .map_err(|e| UpdateError::Config(format!("invalid {}: {e}", path.display())))
    }

    /// `<api_base_url>/repos/<owner>/<name>/releases/latest`
    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base_url.trim_end_matches('/'),
            self.repo_owner,
            self.repo_name
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn parent_wait(&self) -> Duration {
        Duration::from_secs(self.parent_wait_secs)
    }

    pub fn copy_retry_delay(&self) -> Duration {
        Duration::from_millis(self.copy_retry_delay_ms)
    }

    /// Where downloaded artifacts land. Not created here.
    pub fn updates_dir(&self) -> PathBuf {
        self.updates_dir
            .clone()
            .unwrap_or_else(|| app_data_dir().join("updates"))
    }

    /// The running installation's directory: configured, or the folder holding
    /// the current executable.
    pub fn install_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.install_dir {
            return Ok(dir.clone());
        }
        let exe = env::current_exe()?;
        exe.parent().map(Path::to_path_buf).ok_or_else(|| {
            UpdateError::Config(format!("executable {} has no parent directory", exe.display()))
        })
    }
}

/// `<data-local>/KiotaUiClient`, falling back to the temp dir on systems
/// without a per-user data directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR_NAME)
}

pub fn config_file_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE))
}
