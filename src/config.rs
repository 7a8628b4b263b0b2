// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Runtime settings.
//!
//! Everything record-linker needs to know before it talks to Baserow is
//! gathered once at startup into one [`Settings`] value, which is then handed
//! by reference to whoever needs it. Nothing reads the environment after that.
//!
//! # Layering
//!
//! Settings are resolved in three layers, later layers winning:
//!
//! 1. Built-in defaults.
//! 2. Optional TOML settings file. String values in the `[baserow]` table go
//!    through shell expansion, so secrets can stay in the environment, e.g.,
//!    `token = "$BASEROW_API_TOKEN"`.
//! 3. Environment variables `BASEROW_URL`, `BASEROW_API_TOKEN`, and
//!    `CONFIG_TABLE_ID`.
//!
//! # General Layout
//!
//! ```toml
//! [baserow]
//! url = "https://baserow.example.com"
//! token = "$BASEROW_API_TOKEN"
//! config_table_id = 1234
//!
//! [client]
//! page_size = 200
//! request_timeout_secs = 30
//! max_retries = 3
//! initial_backoff_ms = 500
//! max_backoff_ms = 10000
//! write_concurrency = 4
//!
//! [link]
//! skip_linked = false
//! ignore_case = false
//! ```

use crate::{
    path::default_settings_path,
    table::{client::RetryPolicy, TableId},
};

use serde::Deserialize;
use std::{
    env::{self, VarError},
    fmt::{Debug, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::{debug, info};

/// Environment variable naming the Baserow instance URL.
pub const URL_VAR: &str = "BASEROW_URL";

/// Environment variable holding the Baserow database token.
pub const TOKEN_VAR: &str = "BASEROW_API_TOKEN";

/// Environment variable naming the configuration table.
pub const CONFIG_TABLE_VAR: &str = "CONFIG_TABLE_ID";

/// Full settings layout.
#[derive(Default, Debug, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where and how to reach Baserow.
    pub baserow: BaserowSettings,

    /// Request behavior of the table client.
    pub client: ClientSettings,

    /// Linking behavior.
    pub link: LinkSettings,
}

impl Settings {
    /// Resolve settings from every layer.
    ///
    /// If `path` is given, that settings file must exist. Otherwise the default
    /// settings file is used when present.
    ///
    /// # Errors
    ///
    /// - Return [`SettingsError::Read`] if settings file cannot be read.
    /// - Return [`SettingsError::Deserialize`] if settings file is invalid.
    /// - Return [`SettingsError::InvalidEnv`] if an environment variable cannot
    ///   be parsed.
    /// - Return [`SettingsError::OutOfRange`] if a client setting cannot work.
    /// - Return [`SettingsError::Missing`] if a required setting is absent from
    ///   every layer.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_settings_path().ok().filter(|path| path.is_file()),
        };

        let mut settings: Settings = match path {
            Some(path) => {
                info!("load settings from {:?}", path.display());
                read_to_string(&path)
                    .map_err(|source| SettingsError::Read { source, path })?
                    .parse()?
            }
            None => {
                debug!("no settings file, use defaults");
                Settings::default()
            }
        };

        settings.apply_env()?;
        settings.client.validate()?;
        settings.config_table_id()?;
        if settings.baserow.url.is_empty() {
            return Err(SettingsError::Missing { key: URL_VAR });
        }
        if settings.baserow.token.is_empty() {
            return Err(SettingsError::Missing { key: TOKEN_VAR });
        }

        Ok(settings)
    }

    /// Override settings with environment variables that are set.
    ///
    /// # Errors
    ///
    /// - Return [`SettingsError::InvalidEnv`] if `CONFIG_TABLE_ID` is not a
    ///   table identifier.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_var(URL_VAR)? {
            self.baserow.url = url;
        }

        if let Some(token) = env_var(TOKEN_VAR)? {
            self.baserow.token = token;
        }

        if let Some(id) = env_var(CONFIG_TABLE_VAR)? {
            let id = id
                .trim()
                .parse::<u64>()
                .map_err(|_| SettingsError::InvalidEnv {
                    var: CONFIG_TABLE_VAR,
                    value: id.clone(),
                })?;
            self.baserow.config_table_id = Some(TableId::new(id));
        }

        Ok(())
    }

    /// Table holding the link configurations.
    ///
    /// # Errors
    ///
    /// - Return [`SettingsError::Missing`] if no layer named it.
    pub fn config_table_id(&self) -> Result<TableId> {
        self.baserow
            .config_table_id
            .ok_or(SettingsError::Missing {
                key: CONFIG_TABLE_VAR,
            })
    }
}

impl FromStr for Settings {
    type Err = SettingsError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data)?;

        // INVARIANT: Perform shell expansion on connection strings.
        settings.baserow.url = shellexpand::full(&settings.baserow.url)?.into_owned();
        settings.baserow.token = shellexpand::full(&settings.baserow.token)?.into_owned();

        Ok(settings)
    }
}

/// Connection settings for Baserow.
#[derive(Default, PartialEq, Eq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaserowSettings {
    /// Base URL of the Baserow instance.
    pub url: String,

    /// Database token.
    pub token: String,

    /// Table holding link configurations.
    pub config_table_id: Option<TableId>,
}

impl Debug for BaserowSettings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("BaserowSettings")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("config_table_id", &self.config_table_id)
            .finish()
    }
}

/// Request behavior of the table client.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    /// Rows requested per page.
    pub page_size: u32,

    /// Timeout of a single request in seconds.
    pub request_timeout_secs: u64,

    /// Retries of a transient failure, not counting the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound of any retry delay in milliseconds.
    pub max_backoff_ms: u64,

    /// Writes in flight at once during write-back.
    pub write_concurrency: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            page_size: 200,
            request_timeout_secs: 30,
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            write_concurrency: 4,
        }
    }
}

impl ClientSettings {
    /// Largest page Baserow serves in one list request.
    pub const MAX_PAGE_SIZE: u32 = 200;

    /// Reject values that would make every request fail.
    ///
    /// # Errors
    ///
    /// - Return [`SettingsError::OutOfRange`] for the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > Self::MAX_PAGE_SIZE {
            return Err(SettingsError::OutOfRange {
                key: "client.page_size",
                value: self.page_size.into(),
                expected: "between 1 and 200",
            });
        }

        if self.request_timeout_secs == 0 {
            return Err(SettingsError::OutOfRange {
                key: "client.request_timeout_secs",
                value: 0,
                expected: "at least 1",
            });
        }

        if self.write_concurrency == 0 {
            return Err(SettingsError::OutOfRange {
                key: "client.write_concurrency",
                value: 0,
                expected: "at least 1",
            });
        }

        Ok(())
    }

    /// Retry policy described by these settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: 2.0,
        }
    }

    /// Timeout of a single request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Linking behavior.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkSettings {
    /// Leave source rows alone whose reference field is already filled.
    pub skip_linked: bool,

    /// Compare text match values without regard to case.
    pub ignore_case: bool,
}

fn env_var(var: &'static str) -> Result<Option<String>> {
    match env::var(var) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(value)) => Err(SettingsError::InvalidEnv {
            var,
            value: value.to_string_lossy().into_owned(),
        }),
    }
}

/// Settings error types.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Settings file cannot be read.
    #[error("failed to read settings file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Settings file is not valid.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Shell expansion of a setting failed.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<VarError>),

    /// Environment variable holds a value that cannot be used.
    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    /// Setting holds a value that cannot work.
    #[error("setting {key} is {value}, expected {expected}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        expected: &'static str,
    },

    /// Required setting is absent from every layer.
    #[error("missing required setting {key}")]
    Missing { key: &'static str },
}

/// Friendly result alias :3
type Result<T, E = SettingsError> = std::result::Result<T, E>;
