//! Configuration management
//!
//! Configuration is loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Hosted data store configuration
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Outbound mail configuration
    #[serde(default)]
    pub mail: MailConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// Admin workspace configuration
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Public content cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Route unauthenticated admin access is redirected to
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Route an already authenticated login visit is redirected to
    #[serde(default = "default_admin_path")]
    pub admin_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            login_path: default_login_path(),
            admin_path: default_admin_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_admin_path() -> String {
    "/admin".to_string()
}

/// Hosted data store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the hosted backend (auth, rest and storage live below it)
    #[serde(default = "default_remote_url")]
    pub url: String,
    /// Public (anonymous) API key
    #[serde(default)]
    pub anon_key: String,
    /// Storage bucket holding uploaded images
    #[serde(default = "default_storage_bucket")]
    pub storage_bucket: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: default_remote_url(),
            anon_key: String::new(),
            storage_bucket: default_storage_bucket(),
        }
    }
}

fn default_remote_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_storage_bucket() -> String {
    "images".to_string()
}

/// Outbound mail configuration for contact notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Transport security; derived from the port when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<SmtpTls>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address
    #[serde(default)]
    pub from: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Addresses notified of each new contact request
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            tls: None,
            username: String::new(),
            password: String::new(),
            from: String::new(),
            from_name: default_from_name(),
            recipients: Vec::new(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Keystone".to_string()
}

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// TLS from the first byte (SMTPS, usually port 465)
    Wrapper,
    /// Plain connection upgraded with STARTTLS (submission, usually port 587)
    Starttls,
    /// No encryption; local relays only
    #[serde(alias = "none")]
    Plain,
}

impl std::str::FromStr for SmtpTls {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wrapper" | "tls" | "smtps" => Ok(Self::Wrapper),
            "starttls" => Ok(Self::Starttls),
            "plain" | "none" => Ok(Self::Plain),
            _ => Err(format!("Invalid SMTP TLS mode: {}", s)),
        }
    }
}

impl MailConfig {
    /// Whether enough is configured to hand a message to the SMTP relay
    pub fn is_configured(&self) -> bool {
        !self.smtp_host.is_empty() && !self.from.is_empty() && !self.recipients.is_empty()
    }

    /// The configured TLS mode, or the one the port conventionally uses
    pub fn tls_mode(&self) -> SmtpTls {
        match (self.tls, self.smtp_port) {
            (Some(tls), _) => tls,
            (None, 465) => SmtpTls::Wrapper,
            (None, _) => SmtpTls::Starttls,
        }
    }
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
        "image/svg+xml".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }
}

/// Admin workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Seconds of inactivity after which a mounted workspace is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// Upper bound on concurrently mounted workspaces
    #[serde(default = "default_max_workspaces")]
    pub max_workspaces: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
            max_workspaces: default_max_workspaces(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_max_workspaces() -> u64 {
    64
}

/// Public content cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    60
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - KEYSTONE_SERVER_HOST / KEYSTONE_SERVER_PORT (or PORT)
    /// - KEYSTONE_SERVER_CORS_ORIGIN
    /// - KEYSTONE_REMOTE_URL / KEYSTONE_REMOTE_ANON_KEY / KEYSTONE_REMOTE_STORAGE_BUCKET
    /// - KEYSTONE_MAIL_SMTP_HOST / KEYSTONE_MAIL_SMTP_PORT
    /// - KEYSTONE_MAIL_TLS (wrapper, starttls or plain)
    /// - KEYSTONE_MAIL_USERNAME / KEYSTONE_MAIL_PASSWORD
    /// - KEYSTONE_MAIL_FROM / KEYSTONE_MAIL_RECIPIENTS (comma separated)
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("KEYSTONE_SERVER_HOST") {
            self.server.host = host;
        }
        // PORT is honoured for platforms that inject it; the prefixed form wins
        for key in ["PORT", "KEYSTONE_SERVER_PORT"] {
            if let Ok(port) = std::env::var(key) {
                if let Ok(port) = port.parse::<u16>() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(cors_origin) = std::env::var("KEYSTONE_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(url) = std::env::var("KEYSTONE_REMOTE_URL") {
            self.remote.url = url;
        }
        if let Ok(key) = std::env::var("KEYSTONE_REMOTE_ANON_KEY") {
            self.remote.anon_key = key;
        }
        if let Ok(bucket) = std::env::var("KEYSTONE_REMOTE_STORAGE_BUCKET") {
            self.remote.storage_bucket = bucket;
        }

        if let Ok(host) = std::env::var("KEYSTONE_MAIL_SMTP_HOST") {
            self.mail.smtp_host = host;
        }
        if let Ok(port) = std::env::var("KEYSTONE_MAIL_SMTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.mail.smtp_port = port;
            }
        }
        if let Ok(tls) = std::env::var("KEYSTONE_MAIL_TLS") {
            match tls.parse::<SmtpTls>() {
                Ok(tls) => self.mail.tls = Some(tls),
                Err(e) => tracing::warn!("{}, keeping the configured mode", e),
            }
        }
        if let Ok(username) = std::env::var("KEYSTONE_MAIL_USERNAME") {
            self.mail.username = username;
        }
        if let Ok(password) = std::env::var("KEYSTONE_MAIL_PASSWORD") {
            self.mail.password = password;
        }
        if let Ok(from) = std::env::var("KEYSTONE_MAIL_FROM") {
            self.mail.from = from;
        }
        if let Ok(recipients) = std::env::var("KEYSTONE_MAIL_RECIPIENTS") {
            self.mail.recipients = recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Reject values that would make the server unusable
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.login_path.starts_with('/') || !self.server.admin_path.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "server.login_path and server.admin_path must start with '/'".to_string(),
            ));
        }
        if self.remote.url.trim().is_empty() {
            return Err(ConfigError::ValidationError("remote.url must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
