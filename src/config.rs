//! Configuration management for the Amber Electric client
//!
//! This module handles loading, validation, and management of the client
//! configuration from YAML files, with environment variable fallbacks for
//! account credentials.

use crate::error::{AmberError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

mod defaults;

/// Environment variable consulted when no username is configured
pub const USERNAME_ENV: &str = "AMBER_USERNAME";

/// Environment variable consulted when no password is configured
pub const PASSWORD_ENV: &str = "AMBER_PASSWORD";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Location used to resolve the market region
    pub location: Location,

    /// Account credentials; session-scoped data is unavailable without them
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Explicit market postcode; skips reverse geocoding when set
    ///
    /// Takes precedence over `location` for market data, even when the two
    /// disagree.
    #[serde(default)]
    pub postcode: Option<String>,

    /// Upstream endpoints and request behaviour
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Immutable latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Stable key used to cache lookups for this point
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.latitude, self.longitude)
    }
}

/// Account username and password
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Build credentials, rejecting empty values
    pub fn new<S: Into<String>>(username: S, password: S) -> Result<Self> {
        let creds = Self {
            username: username.into(),
            password: password.into(),
        };
        creds.validate()?;
        Ok(creds)
    }

    fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(AmberError::validation(
                "credentials.username",
                "Username cannot be empty",
            ));
        }
        if self.password.is_empty() {
            return Err(AmberError::validation(
                "credentials.password",
                "Password cannot be empty",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Upstream endpoints and request behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the account API (authentication, price, usage)
    pub base_url: String,

    /// Public market price list endpoint
    pub market_url: String,

    /// Reverse geocoding endpoint (Nominatim compatible)
    pub geocode_url: String,

    /// Upper bound for every outbound request in milliseconds
    pub request_timeout_ms: u64,

    /// User-Agent sent with every request
    pub user_agent: String,

    /// Referer header sent with every request
    pub referer: String,

    /// Origin header sent to the account API
    pub origin: String,

    /// Contact address passed to the geocoder so its operators can reach us
    pub contact_email: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Directory or file path for the rolling log; console only when unset
    pub file: Option<String>,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl ClientConfig {
    /// Configuration for a location with no credentials and default endpoints
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            location: Location::new(latitude, longitude),
            credentials: None,
            postcode: None,
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Attach account credentials
    pub fn with_credentials<S: Into<String>>(mut self, username: S, password: S) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Use a fixed market postcode instead of reverse geocoding
    ///
    /// The postcode wins over the location: market updates use it as-is and
    /// never consult the geocoder.
    pub fn with_postcode<S: Into<String>>(mut self, postcode: S) -> Self {
        self.postcode = Some(postcode.into());
        self
    }

    /// Override the per-request timeout
    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.api.request_timeout_ms = timeout_ms;
        self
    }

    /// Fill missing credentials from `AMBER_USERNAME` / `AMBER_PASSWORD`
    pub fn with_env_credentials(mut self) -> Self {
        if self.credentials.is_none()
            && let (Ok(username), Ok(password)) =
                (std::env::var(USERNAME_ENV), std::env::var(PASSWORD_ENV))
            && !username.is_empty()
            && !password.is_empty()
        {
            self.credentials = Some(Credentials { username, password });
        }
        self
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations, then apply env credentials
    pub fn load() -> Result<Self> {
        let default_paths = [
            "amber_config.yaml",
            "/data/amber_config.yaml",
            "/etc/amber-electric/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Ok(Self::from_file(path)?.with_env_credentials());
            }
        }

        // Location has no sensible default, so there is nothing to fall back to
        Err(AmberError::config(format!(
            "No configuration file found (searched: {})",
            default_paths.join(", ")
        )))
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let Location {
            latitude,
            longitude,
        } = self.location;

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AmberError::validation(
                "location.latitude",
                "Must be a finite value between -90 and 90",
            ));
        }

        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AmberError::validation(
                "location.longitude",
                "Must be a finite value between -180 and 180",
            ));
        }

        if let Some(creds) = &self.credentials {
            creds.validate()?;
        }

        if let Some(postcode) = &self.postcode
            && postcode.trim().is_empty()
        {
            return Err(AmberError::validation(
                "postcode",
                "Postcode cannot be blank when set",
            ));
        }

        if self.api.request_timeout_ms == 0 {
            return Err(AmberError::validation(
                "api.request_timeout_ms",
                "Must be greater than 0",
            ));
        }

        for (field, url) in [
            ("api.base_url", &self.api.base_url),
            ("api.market_url", &self.api.market_url),
            ("api.geocode_url", &self.api.geocode_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AmberError::validation(
                    field,
                    "Must be an http(s) URL",
                ));
            }
        }

        Ok(())
    }
}
