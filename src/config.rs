//! Application configuration and on-disk locations

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const APP_DIR_NAME: &str = "PlaylistPlus";
const HOME_OVERRIDE_VAR: &str = "PLAYLIST_PLUS_HOME";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 5;

/// Files and directories owned by the application
#[derive(Clone, Debug)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub cache_file: PathBuf,
    pub token_cache_file: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> anyhow::Result<Self> {
        let root = match std::env::var_os(HOME_OVERRIDE_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or_else(|| anyhow::anyhow!("Could not determine a configuration directory"))?,
        };
        fs::create_dir_all(&root)?;
        Ok(Self::under(&root))
    }

    pub fn under(root: &Path) -> Self {
        Self {
            config_file: root.join("config.json"),
            cache_file: root.join("cache.json"),
            token_cache_file: root.join(".spotify_token_cache.json"),
            log_dir: root.join("logs"),
        }
    }
}

/// User settings, edited by the settings window and read here
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Target playlist, either a bare id or a share URL
    #[serde(default)]
    pub playlist_id: Option<String>,
    /// Key combination such as `ctrl+alt+s`; empty means no hotkey
    #[serde(default)]
    pub hotkey: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
}

fn default_remote_timeout_secs() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            playlist_id: None,
            hotkey: String::new(),
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    /// Load the config file. A missing or unreadable file yields the defaults.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not read config file");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Config file is corrupted");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// The bare playlist id, with share URLs reduced to their id segment.
    pub fn playlist_id(&self) -> Option<String> {
        self.playlist_id.as_deref().and_then(extract_playlist_id)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs.max(1))
    }
}

/// Accepts `https://open.spotify.com/playlist/<id>?si=...`, `spotify:playlist:<id>` or a bare id.
pub fn extract_playlist_id(url_or_id: &str) -> Option<String> {
    let trimmed = url_or_id.trim();

    let id = if let Some((_, rest)) = trimmed.split_once("open.spotify.com/playlist/") {
        rest.split(['?', '/', '#']).next().unwrap_or_default()
    } else if let Some(rest) = trimmed.strip_prefix("spotify:playlist:") {
        rest
    } else {
        trimmed
    };

    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
