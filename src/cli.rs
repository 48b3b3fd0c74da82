//! Command-line interface.
//!
//! Every flag except `--config` overrides the matching configuration key and
//! wins over files and environment variables.

use std::path::PathBuf;

use clap::Parser;

/// Keep a Traefik container attached to the networks of the containers it routes to
#[derive(Debug, Default, Parser)]
#[command(name = "traefik-netsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML, chosen by extension)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Docker engine address (unix://, tcp:// or http://)
    #[arg(long)]
    pub docker_host: Option<String>,

    /// Use TLS client certificates for the Docker connection
    #[arg(long)]
    pub docker_tls: bool,

    /// Log level for dependencies
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log level for this daemon's own messages
    #[arg(long)]
    pub app_log_level: Option<String>,

    /// Name of the Traefik container
    #[arg(long)]
    pub container_name: Option<String>,

    /// Regular expression matched against label keys of routable containers
    #[arg(long)]
    pub monitored_label: Option<String>,

    /// Label restricting which networks of a container Traefik joins
    #[arg(long)]
    pub network_label: Option<String>,
}

impl Cli {
    /// Flags that were given, as `(config key, value)` pairs.
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        let flags = [
            ("docker.host", &self.docker_host),
            ("log_level.general", &self.log_level),
            ("log_level.application", &self.app_log_level),
            ("traefik.container_name", &self.container_name),
            ("traefik.monitored_label", &self.monitored_label),
            ("traefik.network_label", &self.network_label),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                overrides.push((key, value.clone()));
            }
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_given_flags_become_overrides() {
        let cli = Cli::parse_from([
            "traefik-netsync",
            "--container-name",
            "proxy",
            "--monitored-label",
            "^traefik\\.",
        ]);
        assert_eq!(
            cli.overrides(),
            vec![
                ("traefik.container_name", "proxy".to_string()),
                ("traefik.monitored_label", "^traefik\\.".to_string()),
            ]
        );
        assert!(!cli.docker_tls);
        assert!(cli.config.is_none());
    }

    #[test]
    fn config_path_is_not_an_override() {
        let cli = Cli::parse_from(["traefik-netsync", "-c", "/etc/netsync.yaml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/netsync.yaml")));
        assert!(cli.overrides().is_empty());
    }
}
