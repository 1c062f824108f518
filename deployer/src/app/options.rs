//! Application configuration options

use std::time::Duration;

use secrecy::ExposeSecret;

use crate::authn::secret::WebhookSecret;
use crate::deploy::compose::DescriptorTemplate;
use crate::deploy::executor::ComposeCommand;
use crate::deploy::pipeline::DEFAULT_PHASE_TIMEOUT;
use crate::errors::DeployerError;
use crate::logs::LogOptions;
use crate::storage::layout::DeployLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Deployment configuration
    pub deploy: DeployOptions,

    /// Shared webhook secret
    pub secret: WebhookSecret,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            deploy: DeployOptions::default(),
            secret: WebhookSecret::new(Vec::new()),
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self, DeployerError> {
        let secret = settings
            .webhook_secret
            .as_ref()
            .map(|s| WebhookSecret::new(s.expose_secret().as_bytes()))
            .unwrap_or_else(|| WebhookSecret::new(Vec::new()));

        Ok(Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            server: ServerOptions {
                host: settings.host.clone(),
                port: settings.port,
            },
            deploy: DeployOptions {
                layout: DeployLayout::new(&settings.deploy_root),
                template: DescriptorTemplate {
                    registry: settings.registry.clone(),
                    container_port: settings.container_port,
                    restart_policy: settings.restart_policy.clone(),
                    data_mount: settings.data_mount.clone(),
                    network: settings.network.clone(),
                },
                compose: ComposeCommand::parse(&settings.compose_command)?,
                phase_timeout: Duration::from_secs(settings.deploy_timeout_secs),
            },
            secret,
        })
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Deployment options
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub layout: DeployLayout,
    pub template: DescriptorTemplate,
    pub compose: ComposeCommand,

    /// Bound on each compose phase
    pub phase_timeout: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            layout: DeployLayout::default(),
            template: DescriptorTemplate::default(),
            compose: ComposeCommand::default(),
            phase_timeout: DEFAULT_PHASE_TIMEOUT,
        }
    }
}

/// Build logging options from the settings
pub fn log_options(settings: &Settings) -> LogOptions {
    LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
        log_dir: settings.log_dir.clone(),
        ..Default::default()
    }
}
