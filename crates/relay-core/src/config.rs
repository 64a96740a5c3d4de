use serde::Deserialize;
use std::{env, path::Path};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub app: AppConfig,
    pub commerce: CommerceConfig,
    pub states: StatesConfig,
    pub email: EmailConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    pub service_name: String,
    pub port: u16,
    /// "dev" echoes raw error messages in masked responses; anything else
    /// returns the generic body.
    pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommerceConfig {
    pub api_url: String,
    pub auth_url: String,
    pub project_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

/// Keys of the workflow states orders are transitioned to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatesConfig {
    pub order_need_approval_state_key: String,
    pub order_approved_state_key: String,
    pub order_rejected_state_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmailConfig {
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub export_traces: bool,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ConfigBuild(config::ConfigError),
    #[error("failed to parse configuration: {0}")]
    Deserialize(config::ConfigError),
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid APP_PORT override: {0}")]
    InvalidPort(std::num::ParseIntError),
}

impl Config {
    /// Load configuration from the provided path, apply environment overrides,
    /// and resolve any `env:` indirections.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(ConfigError::ConfigBuild)?;

        let mut cfg: Config = raw.try_deserialize().map_err(ConfigError::Deserialize)?;
        cfg.apply_env_overrides()?;
        cfg.resolve_env_markers()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var("APP_PORT") {
            let port: u16 = port.parse().map_err(ConfigError::InvalidPort)?;
            self.app.port = port;
        }

        if let Ok(otlp) = env::var("OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = Some(otlp);
        }

        Ok(())
    }

    fn resolve_env_markers(&mut self) -> Result<(), ConfigError> {
        apply_env_marker(&mut self.app.service_name)?;
        apply_env_marker(&mut self.app.env)?;
        apply_env_marker(&mut self.commerce.api_url)?;
        apply_env_marker(&mut self.commerce.auth_url)?;
        apply_env_marker(&mut self.commerce.project_key)?;
        apply_env_marker(&mut self.commerce.client_id)?;
        apply_env_marker(&mut self.commerce.client_secret)?;
        apply_env_marker(&mut self.commerce.scope)?;
        apply_env_marker(&mut self.states.order_need_approval_state_key)?;
        apply_env_marker(&mut self.states.order_approved_state_key)?;
        apply_env_marker(&mut self.states.order_rejected_state_key)?;
        apply_env_marker(&mut self.email.api_key)?;
        apply_env_marker(&mut self.email.sender_email)?;
        apply_env_marker(&mut self.email.sender_name)?;
        if let Some(endpoint) = &mut self.telemetry.otlp_endpoint {
            apply_env_marker(endpoint)?;
        }
        Ok(())
    }

    pub fn is_dev(&self) -> bool {
        self.app.env.eq_ignore_ascii_case("dev")
    }
}

fn apply_env_marker(value: &mut String) -> Result<(), ConfigError> {
    if let Some(rest) = value.strip_prefix("env:") {
        let resolved = env::var(rest).map_err(|_| ConfigError::MissingEnvVar(rest.to_string()))?;
        *value = resolved;
    }
    Ok(())
}
