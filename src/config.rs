//! Configuration management for tgsend
//!
//! Settings come from three layers, highest priority first: command-line
//! flags, environment variables, and an optional YAML file. The merged
//! result is validated into an immutable [`TransferRequest`].

use crate::error::{Error, Result};
use crate::upload::{validate_part_size, DEFAULT_PART_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Default target: the account's own Saved Messages
pub const DEFAULT_TARGET: &str = "me";

/// Default directory for session files
pub const DEFAULT_SESSION_DIR: &str = "sessions";

/// Where the file to upload comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    File(PathBuf),
    Url(String),
}

/// Everything one run needs, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Telegram API ID (get from my.telegram.org)
    pub api_id: i32,

    /// Telegram API hash
    pub api_hash: String,

    /// Phone number in international format
    pub phone: String,

    /// File to upload
    pub source: SourceSpec,

    /// Username, chat id, or "me"
    pub target: String,

    /// Message caption; defaults to the file name
    pub caption: Option<String>,

    /// Upload part size in bytes
    pub part_size: usize,

    /// Directory holding session files
    pub session_dir: PathBuf,
}

/// One layer of optional settings
///
/// Field names in the YAML file are upper case (`API_ID`, `API_HASH`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Settings {
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub phone: Option<String>,
    pub file: Option<PathBuf>,
    pub url: Option<String>,
    pub target: Option<String>,
    pub caption: Option<String>,
    pub part_size_kib: Option<usize>,
    pub session_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path.as_ref(), e))
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {:?}: {}", path.as_ref(), e))
        })
    }

    /// Load `path` if given, else the default file if it exists
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Settings::default()),
        }
    }

    /// Settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Settings from a variable lookup
    ///
    /// A set but unparsable `TELEGRAM_APP_ID` is a configuration error.
    pub fn from_vars<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_id = non_empty("TELEGRAM_APP_ID")
            .map(|v| {
                v.parse::<i32>().map_err(|e| {
                    Error::Config(format!("TELEGRAM_APP_ID is not a number: {:?} ({})", v, e))
                })
            })
            .transpose()?;

        Ok(Settings {
            api_id,
            api_hash: non_empty("TELEGRAM_APP_HASH"),
            phone: non_empty("TELEGRAM_PHONE"),
            session_dir: non_empty("TGSEND_SESSION_DIR").map(PathBuf::from),
            ..Settings::default()
        })
    }

    /// Fill every unset field from `lower`
    pub fn or(self, lower: Settings) -> Settings {
        // A source on this layer shadows both source fields of the lower one
        let (file, url) = if self.file.is_some() || self.url.is_some() {
            (self.file, self.url)
        } else {
            (lower.file, lower.url)
        };

        Settings {
            api_id: self.api_id.or(lower.api_id),
            api_hash: self.api_hash.or(lower.api_hash),
            phone: self.phone.or(lower.phone),
            file,
            url,
            target: self.target.or(lower.target),
            caption: self.caption.or(lower.caption),
            part_size_kib: self.part_size_kib.or(lower.part_size_kib),
            session_dir: self.session_dir.or(lower.session_dir),
        }
    }

    /// Validate and freeze into a request
    pub fn into_request(self) -> Result<TransferRequest> {
        let api_id = match self.api_id {
            Some(id) if id != 0 => id,
            _ => {
                return Err(Error::Config(
                    "API ID is required (--api-id, TELEGRAM_APP_ID or API_ID in config)".to_string(),
                ))
            }
        };

        let api_hash = self
            .api_hash
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "API hash is required (--api-hash, TELEGRAM_APP_HASH or API_HASH in config)"
                        .to_string(),
                )
            })?;

        let phone = self
            .phone
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "Phone number is required (--phone, TELEGRAM_PHONE or PHONE in config)"
                        .to_string(),
                )
            })?;

        let source = match (self.file, self.url) {
            (Some(file), _) => SourceSpec::File(file),
            (None, Some(url)) if !url.trim().is_empty() => SourceSpec::Url(url),
            _ => {
                return Err(Error::Config(
                    "Either a file path (--file) or a URL (--url) is required".to_string(),
                ))
            }
        };

        let part_size = match self.part_size_kib {
            Some(kib) => kib
                .checked_mul(1024)
                .ok_or_else(|| Error::Config(format!("part size {} KiB is too large", kib)))?,
            None => DEFAULT_PART_SIZE,
        };
        validate_part_size(part_size)?;

        Ok(TransferRequest {
            api_id,
            api_hash,
            phone: phone.trim().to_string(),
            source,
            target: self.target.unwrap_or_else(|| DEFAULT_TARGET.to_string()),
            caption: self.caption,
            part_size,
            session_dir: self
                .session_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_DIR)),
        })
    }
}
