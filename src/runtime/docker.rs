use super::{ContainerRuntime, EventStream, Result, RuntimeError};
use crate::config::DockerConfig;
use crate::types::{EventAction, EventKind, NetworkInfo, RuntimeEvent, WorkloadContainer};
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{ContainerInspectResponse, EndpointSettings, EventMessage, Network};
use bollard::network::{ConnectNetworkOptions, DisconnectNetworkOptions, InspectNetworkOptions};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::future;
use futures_util::stream::StreamExt;
use log::{debug, info};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Build a client for the engine described by `cfg`.  No request is made
    /// until the first call.
    pub fn connect(cfg: &DockerConfig) -> Result<Self> {
        let timeout = cfg.timeout_secs;
        let docker = match cfg.host.as_deref() {
            // Handles DOCKER_HOST and the unix socket on Linux.
            None => Docker::connect_with_local_defaults()?,
            Some(host) if cfg.tls.enabled => Docker::connect_with_ssl(
                host,
                &cfg.tls.key,
                &cfg.tls.cert,
                &cfg.tls.verify,
                timeout,
                API_DEFAULT_VERSION,
            )?,
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_socket(host, timeout, API_DEFAULT_VERSION)?
            }
            Some(host) => Docker::connect_with_http(host, timeout, API_DEFAULT_VERSION)?,
        };
        Ok(Self { docker })
    }

    /// Engine version, used at startup to fail fast on an unreachable engine.
    pub async fn engine_version(&self) -> Result<String> {
        let version = self.docker.version().await?;
        Ok(version.version.unwrap_or_else(|| "unknown".into()))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running_containers(&self) -> Result<Vec<WorkloadContainer>> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(opts)).await?;

        // Inspect each one so listing and lookup share one conversion.
        let mut containers = Vec::with_capacity(summaries.len());
        for id in summaries.into_iter().filter_map(|c| c.id) {
            match self.get_container(&id).await {
                Ok(container) => containers.push(container),
                Err(e) if e.is_not_found() => {
                    debug!("Container {} vanished while listing, skipping", id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(containers)
    }

    async fn get_container(&self, id_or_name: &str) -> Result<WorkloadContainer> {
        self.docker
            .inspect_container(id_or_name, None::<InspectContainerOptions>)
            .await
            .map(container_from_inspect)
            .map_err(|e| classify(e, || format!("container {id_or_name}")))
    }

    async fn get_network(&self, name: &str) -> Result<NetworkInfo> {
        self.docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
            .map(network_from_inspect)
            .map_err(|e| classify(e, || format!("network {name}")))
    }

    async fn connect(&self, network: &str, container: &str) -> Result<()> {
        let opts = ConnectNetworkOptions {
            container,
            endpoint_config: EndpointSettings::default(),
        };
        self.docker
            .connect_network(network, opts)
            .await
            .map_err(|e| classify(e, || format!("network {network} or container {container}")))
    }

    async fn disconnect(&self, network: &str, container: &str) -> Result<()> {
        let opts = DisconnectNetworkOptions {
            container,
            force: false,
        };
        self.docker
            .disconnect_network(network, opts)
            .await
            .map_err(|e| classify(e, || format!("network {network} or container {container}")))
    }

    fn events(&self) -> EventStream {
        // bollard only sends the request on the first poll, so pin the start
        // of the feed to now.
        let opts = events_options(SystemTime::now());

        info!("Subscribing to Docker events");
        self.docker
            .events(Some(opts))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(event) => event_from_message(event).map(Ok),
                    Err(e) => Some(Err(RuntimeError::Docker(e))),
                })
            })
            .boxed()
    }
}

/// Container events from `since` onwards, at the engine's one second
/// resolution.
fn events_options(since: SystemTime) -> EventsOptions<String> {
    let since = since
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    EventsOptions {
        since: Some(since.to_string()),
        until: None,
        filters: HashMap::from([("type".to_string(), vec!["container".to_string()])]),
    }
}

/// Map a 404 from the engine to `NotFound`; keep everything else as is.
fn classify(err: bollard::errors::Error, resource: impl FnOnce() -> String) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::not_found(resource()),
        other => RuntimeError::Docker(other),
    }
}

fn container_from_inspect(detail: ContainerInspectResponse) -> WorkloadContainer {
    WorkloadContainer {
        id: detail.id.unwrap_or_default(),
        name: detail
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        running: detail.state.and_then(|s| s.running).unwrap_or(false),
        labels: detail.config.and_then(|c| c.labels).unwrap_or_default(),
        networks: detail
            .network_settings
            .and_then(|s| s.networks)
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default(),
    }
}

fn network_from_inspect(detail: Network) -> NetworkInfo {
    NetworkInfo {
        name: detail.name.unwrap_or_default(),
        labels: detail.labels.unwrap_or_default(),
        members: detail
            .containers
            .map(|members| members.into_keys().collect())
            .unwrap_or_default(),
    }
}

/// Events without a subject ID carry nothing we can act on and are dropped.
fn event_from_message(event: EventMessage) -> Option<RuntimeEvent> {
    let container_id = event.actor.and_then(|actor| actor.id)?;
    if container_id.is_empty() {
        return None;
    }
    let kind = event
        .typ
        .map(|t| EventKind::from(t.to_string().as_str()))
        .unwrap_or_else(|| EventKind::Other(String::new()));
    let action = EventAction::from(event.action.as_deref().unwrap_or_default());
    Some(RuntimeEvent {
        kind,
        action,
        container_id,
    })
}
