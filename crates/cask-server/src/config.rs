//! Server configuration.
//!
//! Loaded from a TOML file with precedence:
//! 1. Environment variables (CASK_CONFIG, CASK_LISTEN)
//! 2. Config file (~/.cask/config.toml)
//! 3. Default values
//!
//! ```toml
//! listen = "127.0.0.1:3000"
//!
//! [session]
//! key = "cask.sess"
//! max_age = 86400000      # milliseconds, or "session"
//! rolling = false
//! renew = false
//! store = "memory"        # or "cookie"
//!
//! [session.cookie]
//! path = "/"
//! http_only = true
//! secure = false
//! same_site = "lax"
//! ```

use anyhow::{bail, Context, Result};
use cask_core::transport::{CookieAttributes, SameSite};
use cask_core::{MaxAge, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path the configuration was loaded from
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Socket address to listen on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Session settings
    #[serde(default)]
    pub session: SessionSettings,
}

/// Where session data lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Whole session encoded into the cookie
    #[default]
    Cookie,
    /// In-process store, cookie carries the key
    Memory,
}

/// `max_age` as written in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxAgeSetting {
    Millis(u64),
    Named(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_key")]
    pub key: String,

    #[serde(default = "default_max_age")]
    pub max_age: MaxAgeSetting,

    #[serde(default)]
    pub rolling: bool,

    #[serde(default)]
    pub renew: bool,

    #[serde(default)]
    pub store: StoreKind,

    #[serde(default)]
    pub cookie: CookieSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSettings {
    #[serde(default = "default_path")]
    pub path: String,

    pub domain: Option<String>,

    #[serde(default = "default_true")]
    pub http_only: bool,

    #[serde(default)]
    pub secure: bool,

    #[serde(default = "default_same_site")]
    pub same_site: String,
}

// Default value functions
fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_key() -> String {
    cask_core::config::DEFAULT_KEY.to_string()
}

fn default_max_age() -> MaxAgeSetting {
    MaxAgeSetting::Millis(24 * 60 * 60 * 1000)
}

fn default_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_same_site() -> String {
    "lax".to_string()
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cask")
        .join("config.toml")
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            key: default_key(),
            max_age: default_max_age(),
            rolling: false,
            renew: false,
            store: StoreKind::default(),
            cookie: CookieSettings::default(),
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            path: default_path(),
            domain: None,
            http_only: default_true(),
            secure: false,
            same_site: default_same_site(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            listen: default_listen(),
            session: SessionSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Config {
                config_path,
                ..Config::default()
            }
        };

        if let Ok(listen) = std::env::var("CASK_LISTEN") {
            config.listen = listen;
        }

        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let mut config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CASK_CONFIG") {
            PathBuf::from(path)
        } else {
            default_config_path()
        }
    }
}

impl SessionSettings {
    pub fn max_age(&self) -> Result<MaxAge> {
        match &self.max_age {
            MaxAgeSetting::Millis(ms) => Ok(MaxAge::Millis(*ms)),
            MaxAgeSetting::Named(name) if name == "session" => Ok(MaxAge::Session),
            MaxAgeSetting::Named(other) => {
                bail!("Invalid max_age: {:?} (expected milliseconds or \"session\")", other)
            }
        }
    }

    /// Build the core session options (without a store).
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        let config = SessionConfig::new()
            .with_key(self.key.clone())
            .with_max_age(self.max_age()?)
            .with_rolling(self.rolling)
            .with_renew(self.renew)
            .with_cookie_attributes(self.cookie.to_attributes()?);
        config.validate()?;
        Ok(config)
    }
}

impl CookieSettings {
    pub fn to_attributes(&self) -> Result<CookieAttributes> {
        let same_site = match self.same_site.to_ascii_lowercase().as_str() {
            "strict" => SameSite::Strict,
            "lax" => SameSite::Lax,
            "none" => SameSite::None,
            other => bail!("Invalid same_site: {:?}", other),
        };
        Ok(CookieAttributes {
            max_age: None,
            path: self.path.clone(),
            domain: self.domain.clone(),
            http_only: self.http_only,
            secure: self.secure,
            same_site,
        })
    }
}
