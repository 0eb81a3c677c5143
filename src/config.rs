//! Configuration loading.
//!
//! Options come from an optional TOML file and from environment variables;
//! the environment wins. Every required option that is still missing after
//! both are read is reported in a single error, before any network call.
//!
//! # Example
//!
//! ```toml
//! [portal]
//! base_url = "https://learning.example.org"
//! email = "student@example.org"
//! password = "hunter2"
//! organization_domain = "example.org"
//! session_cookie = "_session=abc123"
//!
//! [store]
//! token = "secret_xyz"
//! database_id = "0123456789abcdef0123456789abcdef"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | TOML key | Required |
//! |----------|----------|----------|
//! | `LEARNING_URL_BASE` | `portal.base_url` | yes |
//! | `GOOGLE_EMAIL` | `portal.email` | yes |
//! | `GOOGLE_PASSWORD` | `portal.password` | yes |
//! | `GOOGLE_ORGANIZATION_DOMAIN` | `portal.organization_domain` | no |
//! | `LEARNING_SESSION_COOKIE` | `portal.session_cookie` | yes |
//! | `NOTION_TOKEN` | `store.token` | yes |
//! | `NOTION_CALENDAR_DATABASE_ID` | `store.database_id` | yes |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use url::Url;

use crate::error::{SyncError, SyncResult};

pub const ENV_BASE_URL: &str = "LEARNING_URL_BASE";
pub const ENV_EMAIL: &str = "GOOGLE_EMAIL";
pub const ENV_PASSWORD: &str = "GOOGLE_PASSWORD";
pub const ENV_ORGANIZATION_DOMAIN: &str = "GOOGLE_ORGANIZATION_DOMAIN";
pub const ENV_SESSION_COOKIE: &str = "LEARNING_SESSION_COOKIE";
pub const ENV_NOTION_TOKEN: &str = "NOTION_TOKEN";
pub const ENV_DATABASE_ID: &str = "NOTION_CALENDAR_DATABASE_ID";

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub portal: PortalConfig,
    pub store: StoreConfig,
}

#[derive(Clone)]
pub struct PortalConfig {
    /// Portal origin without a trailing slash.
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub organization_domain: Option<String>,
    pub session_cookie: String,
}

#[derive(Clone)]
pub struct StoreConfig {
    pub token: String,
    pub database_id: String,
}

// Secrets stay out of logs and error output.
impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("organization_domain", &self.organization_domain)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("database_id", &self.database_id)
            .finish_non_exhaustive()
    }
}

impl PortalConfig {
    /// URL that starts Google sign-in for the portal.
    pub fn sign_in_url(&self) -> SyncResult<Url> {
        let mut url = Url::parse(&format!(
            "{}/do/authentication/google/google_begin",
            self.base_url
        ))
        .map_err(|e| SyncError::Config(format!("{} is not a valid URL: {}", ENV_BASE_URL, e)))?;
        if let Some(ref domain) = self.organization_domain {
            url.query_pairs_mut().append_pair("google_domain", domain);
        }
        Ok(url)
    }
}

/// Contents of the optional TOML file. Every key may be omitted.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub portal: FilePortalConfig,
    #[serde(default)]
    pub store: FileStoreConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FilePortalConfig {
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub organization_domain: Option<String>,
    pub session_cookie: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileStoreConfig {
    pub token: Option<String>,
    pub database_id: Option<String>,
}

/// Read the TOML file (if given) and overlay the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let file = match path {
        Some(path) => read_file_config(path)?,
        None => FileConfig::default(),
    };
    Ok(Config::resolve(file, |name| std::env::var(name).ok())?)
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

impl Config {
    /// Merge file values with an environment lookup and validate.
    ///
    /// Empty strings count as missing.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let mut missing = Vec::new();
        let mut pick = |name: &'static str, file_value: Option<String>, required: bool| {
            let value = env(name)
                .filter(|v| !v.trim().is_empty())
                .or(file_value.filter(|v| !v.trim().is_empty()));
            if value.is_none() && required {
                missing.push(name);
            }
            value.unwrap_or_default()
        };

        let base_url = pick(ENV_BASE_URL, file.portal.base_url, true);
        let email = pick(ENV_EMAIL, file.portal.email, true);
        let password = pick(ENV_PASSWORD, file.portal.password, true);
        let organization_domain = pick(ENV_ORGANIZATION_DOMAIN, file.portal.organization_domain, false);
        let session_cookie = pick(ENV_SESSION_COOKIE, file.portal.session_cookie, true);
        let token = pick(ENV_NOTION_TOKEN, file.store.token, true);
        let database_id = pick(ENV_DATABASE_ID, file.store.database_id, true);

        if !missing.is_empty() {
            return Err(SyncError::missing_options(&missing));
        }

        Ok(Config {
            portal: PortalConfig {
                base_url: validate_base_url(&base_url)?,
                email,
                password,
                organization_domain: Some(organization_domain).filter(|d| !d.is_empty()),
                session_cookie,
            },
            store: StoreConfig { token, database_id },
        })
    }
}

fn validate_base_url(raw: &str) -> SyncResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| SyncError::Config(format!("{} is not a valid URL: {}", ENV_BASE_URL, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(SyncError::Config(format!(
            "{} must be an http(s) origin, got {:?}",
            ENV_BASE_URL, raw
        )));
    }
    Ok(trimmed.to_string())
}
