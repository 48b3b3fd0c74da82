use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cli::Cli;
use crate::scope::LabelMatcher;

/// Label Traefik itself reads to pick the network of a container.
pub const DEFAULT_NETWORK_LABEL: &str = "traefik.docker.network";

const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),

    #[error("configuration file {0} does not exist")]
    MissingFile(PathBuf),

    #[error("`{0}` must be set")]
    MissingField(&'static str),

    #[error("invalid monitored label pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid log level `{0}`")]
    InvalidLogLevel(String),

    #[error("invalid TLS settings: {0}")]
    Tls(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    pub enabled: bool,
    /// CA certificate used to verify the engine.
    pub verify: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DockerConfig {
    /// Engine address.  When unset the local defaults apply (`DOCKER_HOST`
    /// or the unix socket).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(alias = "timeoutSecs")]
    pub timeout_secs: u64,
    pub tls: TlsConfig,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            timeout_secs: DEFAULT_DOCKER_TIMEOUT_SECS,
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogLevelConfig {
    /// Level for every module, dependencies included.
    pub general: String,
    /// Level for this crate's own modules.
    pub application: String,
}

impl Default for LogLevelConfig {
    fn default() -> Self {
        Self {
            general: "warn".into(),
            application: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraefikConfig {
    #[serde(alias = "containerName")]
    pub container_name: String,
    /// Regular expression matched against label keys.
    #[serde(alias = "monitoredLabel")]
    pub monitored_label: String,
    #[serde(alias = "networkLabel")]
    pub network_label: String,
}

impl Default for TraefikConfig {
    fn default() -> Self {
        Self {
            container_name: String::new(),
            monitored_label: String::new(),
            network_label: DEFAULT_NETWORK_LABEL.into(),
        }
    }
}

impl TraefikConfig {
    pub fn matcher(&self) -> Result<LabelMatcher, ConfigError> {
        LabelMatcher::new(&self.monitored_label).map_err(|source| ConfigError::InvalidPattern {
            pattern: self.monitored_label.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub docker: DockerConfig,
    #[serde(alias = "logLevel")]
    pub log_level: LogLevelConfig,
    pub traefik: TraefikConfig,
}

impl Config {
    /// Load the configuration, lowest precedence first: defaults,
    /// `netsync.{toml,json,yaml}` in the working directory, the file given
    /// with `--config`, `NETSYNC_*` environment variables, then flags.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let config: Config = Self::figment(cli)?.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(cli: &Cli) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("netsync.toml"))
            .merge(Json::file("netsync.json"))
            .merge(Yaml::file("netsync.yaml"));

        if let Some(path) = &cli.config {
            figment = merge_file(figment, path)?;
        }

        figment = figment.merge(Env::prefixed("NETSYNC_").split("__"));

        for (key, value) in cli.overrides() {
            figment = figment.merge(Serialized::default(key, value));
        }
        if cli.docker_tls {
            figment = figment.merge(Serialized::default("docker.tls.enabled", true));
        }
        Ok(figment)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.traefik.container_name.trim().is_empty() {
            return Err(ConfigError::MissingField("traefik.container_name"));
        }
        if self.traefik.monitored_label.is_empty() {
            return Err(ConfigError::MissingField("traefik.monitored_label"));
        }
        if self.traefik.network_label.is_empty() {
            return Err(ConfigError::MissingField("traefik.network_label"));
        }
        self.traefik.matcher()?;

        crate::logging::parse_level(&self.log_level.general)?;
        crate::logging::parse_level(&self.log_level.application)?;

        let tls = &self.docker.tls;
        if tls.enabled {
            match self.docker.host.as_deref() {
                None => return Err(ConfigError::Tls("`docker.host` is required with TLS".into())),
                Some(host) if host.starts_with("unix://") => {
                    return Err(ConfigError::Tls(format!("{host} is a local socket")))
                }
                Some(_) => {}
            }
            for (name, path) in [("verify", &tls.verify), ("cert", &tls.cert), ("key", &tls.key)] {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Tls(format!("`docker.tls.{name}` is empty")));
                }
            }
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()));
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("json") => figment.merge(Json::file(path)),
        Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
        _ => figment.merge(Toml::file(path)),
    })
}
