use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "KNOWME";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_media_bucket")]
    pub media_bucket: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            anon_key: String::new(),
            user_agent: default_user_agent(),
            media_bucket: default_media_bucket(),
        }
    }
}

fn default_user_agent() -> String {
    "knowme-tui/0.1 (+https://github.com/knowme-app/knowme-tui)".to_string()
}

fn default_media_bucket() -> String {
    "answers".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: i64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: i64,
    #[serde(default = "default_media_ttl_duration", with = "humantime_serde")]
    pub default_ttl: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_cache_bytes: default_max_cache_bytes(),
            max_upload_bytes: default_max_upload_bytes(),
            default_ttl: default_media_ttl_duration(),
        }
    }
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("knowme"))
}

fn default_max_cache_bytes() -> i64 {
    200 * 1024 * 1024
}

fn default_max_upload_bytes() -> i64 {
    10 * 1024 * 1024
}

fn default_media_ttl_duration() -> Duration {
    Duration::from_secs(6 * 60 * 60)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_player_command")]
    pub command: Vec<String>,
    #[serde(default = "default_player_detach")]
    pub detach: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
            detach: default_player_detach(),
        }
    }
}

fn default_player_command() -> Vec<String> {
    vec!["mpv".into(), "--fs".into(), "%URL%".into()]
}

fn default_player_detach() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix)?);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.backend.base_url.is_empty() {
        base.backend.base_url = other.backend.base_url;
    }
    if !other.backend.anon_key.is_empty() {
        base.backend.anon_key = other.backend.anon_key;
    }
    if !other.backend.user_agent.is_empty() {
        base.backend.user_agent = other.backend.user_agent;
    }
    if !other.backend.media_bucket.is_empty() {
        base.backend.media_bucket = other.backend.media_bucket;
    }

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }

    if other.media.cache_dir.is_some() {
        base.media.cache_dir = other.media.cache_dir;
    }
    if other.media.max_cache_bytes != 0 {
        base.media.max_cache_bytes = other.media.max_cache_bytes;
    }
    if other.media.max_upload_bytes != 0 {
        base.media.max_upload_bytes = other.media.max_upload_bytes;
    }
    base.media.default_ttl = other.media.default_ttl;

    if !other.player.command.is_empty() {
        base.player.command = other.player.command;
    }
    base.player.detach = other.player.detach;

    base
}

fn load_env(prefix: &str) -> Result<Config> {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    if map.is_empty() {
        return Ok(Config::default());
    }

    let mut cfg = Config::default();

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.base_url" => cfg.backend.base_url = value,
        "backend.anon_key" => cfg.backend.anon_key = value,
        "backend.user_agent" => cfg.backend.user_agent = value,
        "backend.media_bucket" => cfg.backend.media_bucket = value,
        "ui.theme" => cfg.ui.theme = value,
        "media.cache_dir" => cfg.media.cache_dir = Some(PathBuf::from(value)),
        "media.max_cache_bytes" => {
            if let Ok(parsed) = value.parse::<i64>() {
                cfg.media.max_cache_bytes = parsed;
            }
        }
        "media.max_upload_bytes" => {
            if let Ok(parsed) = value.parse::<i64>() {
                cfg.media.max_upload_bytes = parsed;
            }
        }
        "media.default_ttl" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.media.default_ttl = duration;
            }
        }
        "player.command" => {
            cfg.player.command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "player.detach" => {
            cfg.player.detach = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("knowme").join("config.yaml"))
}

pub fn save_backend_settings(
    path: Option<PathBuf>,
    base_url: &str,
    anon_key: &str,
) -> Result<PathBuf> {
    let base_url = base_url.trim();
    let anon_key = anon_key.trim();

    anyhow::ensure!(
        !base_url.is_empty(),
        "config: backend.base_url is required"
    );
    anyhow::ensure!(
        !anon_key.is_empty(),
        "config: backend.anon_key is required"
    );

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.backend.base_url = base_url.to_string();
    cfg.backend.anon_key = anon_key.to_string();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("KNOWME_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "default");
        assert_eq!(cfg.backend.media_bucket, "answers");
        assert_eq!(cfg.media.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn save_backend_settings_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        save_backend_settings(
            Some(path.clone()),
            "https://example.supabase.co",
            "anon-key",
        )
        .unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved.backend.base_url, "https://example.supabase.co");
        assert_eq!(saved.backend.anon_key, "anon-key");
    }

    #[test]
    fn env_overrides() {
        env::set_var("KNOWME_ENVTEST_UI__THEME", "dracula");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("KNOWME_ENVTEST".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "dracula");
        env::remove_var("KNOWME_ENVTEST_UI__THEME");
    }
}
