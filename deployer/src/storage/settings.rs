//! Settings: an optional JSON file overlaid with environment variables

use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::SecretBox;
use serde::Deserialize;

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::storage::layout::DEFAULT_DEPLOY_ROOT;

/// Deployer settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shared HMAC secret. Missing or empty rejects every webhook.
    pub webhook_secret: Option<SecretBox<String>>,

    /// Root holding one directory per owner
    pub deploy_root: PathBuf,

    /// Address the HTTP server binds to
    pub host: String,
    pub port: u16,

    /// Registry prefix of generated image references
    pub registry: String,

    /// Port the applications listen on inside their containers
    pub container_port: u16,

    pub restart_policy: String,

    /// Container path of the `data/` volume
    pub data_mount: String,

    /// External network generated services join
    pub network: Option<String>,

    /// Bound on each compose phase
    pub deploy_timeout_secs: u64,

    /// Compose command line, split on whitespace
    pub compose_command: String,

    pub log_level: LogLevel,
    pub log_json: bool,
    pub log_dir: Option<PathBuf>,

    pub max_shutdown_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            deploy_root: PathBuf::from(DEFAULT_DEPLOY_ROOT),
            host: "0.0.0.0".to_string(),
            port: 5000,
            registry: "ghcr.io".to_string(),
            container_port: 5000,
            restart_policy: "unless-stopped".to_string(),
            data_mount: "/app/data".to_string(),
            network: None,
            deploy_timeout_secs: 120,
            compose_command: "docker compose".to_string(),
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            max_shutdown_delay_secs: 30,
        }
    }
}

impl Settings {
    /// Read `path` if given, then apply the process environment
    pub async fn load(path: Option<&Path>) -> Result<Self, DeployerError> {
        let mut settings = match path {
            Some(path) => File::new(path).read_json::<Settings>().await.map_err(|e| {
                DeployerError::ConfigError(format!(
                    "unable to read settings file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => Settings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Override fields from environment-style variables. Empty values are
    /// ignored except for the secret.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), DeployerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(secret) = lookup("WEBHOOK_SECRET") {
            self.webhook_secret = Some(SecretBox::new(Box::new(secret)));
        }
        if let Some(root) = var("DEPLOY_ROOT") {
            self.deploy_root = PathBuf::from(root);
        }
        if let Some(host) = var("WEBHOOK_HOST") {
            self.host = host;
        }
        if let Some(port) = var("WEBHOOK_PORT") {
            self.port = parse_var("WEBHOOK_PORT", &port)?;
        }
        if let Some(registry) = var("DEPLOY_REGISTRY") {
            self.registry = registry;
        }
        if let Some(port) = var("CONTAINER_PORT") {
            self.container_port = parse_var("CONTAINER_PORT", &port)?;
        }
        if let Some(policy) = var("RESTART_POLICY") {
            self.restart_policy = policy;
        }
        if let Some(mount) = var("DATA_MOUNT") {
            self.data_mount = mount;
        }
        if let Some(network) = var("DEPLOY_NETWORK") {
            self.network = Some(network);
        }
        if let Some(secs) = var("DEPLOY_TIMEOUT_SECS") {
            self.deploy_timeout_secs = parse_var("DEPLOY_TIMEOUT_SECS", &secs)?;
        }
        if let Some(command) = var("COMPOSE_COMMAND") {
            self.compose_command = command;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level.parse().map_err(DeployerError::ConfigError)?;
        }
        if let Some(json) = var("LOG_JSON") {
            self.log_json = parse_bool("LOG_JSON", &json)?;
        }
        if let Some(dir) = var("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, DeployerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DeployerError::ConfigError(format!("{key}={value:?}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, DeployerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DeployerError::ConfigError(format!(
            "{key}={value:?}: expected a boolean"
        ))),
    }
}
