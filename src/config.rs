//! Configuration loading with layered overrides.
//!
//! Config is loaded in order (each layer overrides the previous):
//! 1. Default values
//! 2. Config file (TOML)
//! 3. Environment variables
//! 4. Explicit overrides (typically CLI arguments)
//!
//! JWT secret is never read from config files - it must come from an
//! environment variable or an explicit override.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Config shared between the server and every request context.
pub type SharedConfig = Arc<Config>;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub rbac: Rbac,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Production mode. Outside production, expired tokens are still accepted.
    #[serde(default)]
    pub production: bool,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            production: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data.db".to_string()
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    /// JWT secret for token signing/verification.
    /// Must be provided via environment variable or override - never from config file.
    #[serde(default)]
    pub jwt_secret: String,

    /// Token expiry in days.
    #[serde(default = "default_token_expiry_days")]
    pub token_expiry_days: u32,

    /// Name of the HTTP-only cookie carrying the browser token.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Peer hosts whose calls authenticate with the `Authorization` header.
    /// Every other caller must present the token cookie.
    #[serde(default = "default_service_hosts")]
    pub service_hosts: Vec<String>,
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiry_days: default_token_expiry_days(),
            cookie_name: default_cookie_name(),
            service_hosts: default_service_hosts(),
        }
    }
}

fn default_token_expiry_days() -> u32 {
    30
}

fn default_cookie_name() -> String {
    "auth_token".to_string()
}

fn default_service_hosts() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "::1".to_string()]
}

/// Access control settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rbac {
    /// Username or email of the account that always holds the admin role.
    #[serde(default)]
    pub super_admin: Option<String>,
}

/// Explicit overrides applied after the environment layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides<'a> {
    pub host: Option<&'a str>,
    pub port: Option<u16>,
    pub database_url: Option<&'a str>,
    pub jwt_secret: Option<&'a str>,
    pub super_admin: Option<&'a str>,
}

/// Builder for loading configuration with customizable options.
#[derive(Debug, Clone)]
pub struct Loader {
    /// Environment variable prefix (e.g., "MYAPP" -> MYAPP_HOST, MYAPP_PORT)
    pub env_prefix: String,
    /// Name of the JWT secret environment variable (without prefix)
    pub jwt_secret_env: String,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            env_prefix: "WARDEN".to_string(),
            jwt_secret_env: "JWT_SECRET".to_string(),
        }
    }
}

impl Loader {
    /// Create a new config loader with the given environment prefix.
    pub fn new(env_prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: env_prefix.into(),
            ..Default::default()
        }
    }

    /// Load configuration from file, environment, and explicit overrides.
    pub fn load(
        &self,
        config_path: Option<&Path>,
        overrides: Overrides<'_>,
    ) -> crate::Result<Config> {
        // Start with file config or defaults
        let mut config: Config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?
        } else {
            Config::default()
        };

        // Clear any jwt_secret from config file
        config.auth.jwt_secret = String::new();

        // Override with environment variables
        let prefix = &self.env_prefix;

        if let Ok(host) = std::env::var(format!("{prefix}_HOST")) {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var(format!("{prefix}_PORT"))
            && let Ok(p) = port.parse()
        {
            config.server.port = p;
        }
        if let Ok(production) = std::env::var(format!("{prefix}_PRODUCTION")) {
            config.server.production = matches!(production.as_str(), "1" | "true" | "yes");
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(secret) = std::env::var(format!("{}_{}", prefix, self.jwt_secret_env)) {
            config.auth.jwt_secret = secret;
        }
        if let Ok(admin) = std::env::var(format!("{prefix}_SUPER_ADMIN")) {
            config.rbac.super_admin = Some(admin);
        }

        // Override with explicit values
        if let Some(host) = overrides.host {
            config.server.host = host.to_string();
        }
        if let Some(port) = overrides.port {
            config.server.port = port;
        }
        if let Some(url) = overrides.database_url {
            config.database.url = url.to_string();
        }
        if let Some(secret) = overrides.jwt_secret {
            config.auth.jwt_secret = secret.to_string();
        }
        if let Some(admin) = overrides.super_admin {
            config.rbac.super_admin = Some(admin.to_string());
        }

        // Validate required fields
        if config.auth.jwt_secret.is_empty() {
            return Err(Error::Config(format!(
                "{}_{} must be set via environment variable or --jwt-secret flag",
                prefix, self.jwt_secret_env
            )));
        }

        Ok(config)
    }
}
