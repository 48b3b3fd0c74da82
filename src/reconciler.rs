//! Connects and disconnects the proxy container.
//!
//! Every operation reads the proxy and the networks fresh from the runtime
//! and treats `NotFound` as "the world moved on": it is logged and the
//! remaining networks are still processed.  Networks are decided
//! independently, so a failure on one never blocks another.

use std::sync::Arc;

use log::{debug, info};

use crate::config::{ConfigError, TraefikConfig};
use crate::runtime::{ContainerRuntime, Result, RuntimeError};
use crate::scope::{LabelMatcher, NetworkScope};
use crate::types::{NetworkInfo, WorkloadContainer};

/// Network modes a container cannot be connected to or disconnected from.
const UNJOINABLE_NETWORKS: [&str; 2] = ["host", "none"];

/// What the reconciler needs to know about the proxy and its routes.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub proxy_name: String,
    pub matcher: LabelMatcher,
    /// Label restricting which networks of a container the proxy joins.
    pub scope_label: String,
}

impl ReconcileSettings {
    pub fn from_config(cfg: &TraefikConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            proxy_name: cfg.container_name.clone(),
            matcher: cfg.matcher()?,
            scope_label: cfg.network_label.clone(),
        })
    }
}

/// Networks touched by one reconciler operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub connected: Vec<String>,
    pub disconnected: Vec<String>,
    /// Networks whose call failed for a reason other than `NotFound`, with
    /// the error message.
    pub failed: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.connected.is_empty() && self.disconnected.is_empty() && self.failed.is_empty()
    }

    fn merge(&mut self, other: ReconcileReport) {
        self.connected.extend(other.connected);
        self.disconnected.extend(other.disconnected);
        self.failed.extend(other.failed);
    }

    fn fail(&mut self, network: &str, error: RuntimeError) {
        debug!("Call for network {} failed: {}", network, error);
        self.failed.push((network.to_string(), error.to_string()));
    }
}

pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: ReconcileSettings) -> Self {
        Self { runtime, settings }
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn is_proxy(&self, container: &WorkloadContainer) -> bool {
        container.name == self.settings.proxy_name
    }

    pub fn is_monitored(&self, container: &WorkloadContainer) -> bool {
        self.settings.matcher.matches(container)
    }

    /// Fresh lookup of the proxy.  `None` when it does not exist.
    async fn proxy(&self) -> Result<Option<WorkloadContainer>> {
        match self.runtime.get_container(&self.settings.proxy_name).await {
            Ok(proxy) => Ok(Some(proxy)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn proxy_running(&self) -> Result<bool> {
        Ok(self.proxy().await?.is_some_and(|proxy| proxy.running))
    }

    /// Connect the proxy to the networks of every running monitored container.
    ///
    /// Safe to repeat: networks the proxy already joined are skipped.
    pub async fn bootstrap_all(&self) -> Result<ReconcileReport> {
        let containers = self.runtime.list_running_containers().await?;
        self.bootstrap(&containers).await
    }

    /// [`bootstrap_all`](Self::bootstrap_all) over an existing listing of
    /// running containers.
    pub async fn bootstrap(&self, containers: &[WorkloadContainer]) -> Result<ReconcileReport> {
        debug!("Connecting {} to all relevant networks", self.settings.proxy_name);
        let mut report = ReconcileReport::default();
        for container in containers
            .iter()
            .filter(|c| !self.is_proxy(c) && self.is_monitored(c))
        {
            report.merge(self.connect_one(container).await?);
        }
        info!(
            "Bootstrap connected {} to {} network(s)",
            self.settings.proxy_name,
            report.connected.len()
        );
        Ok(report)
    }

    /// Connect the proxy to every in-scope network of `container` it is not
    /// yet a member of.
    pub async fn connect_one(&self, container: &WorkloadContainer) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let Some(proxy) = self.proxy().await? else {
            info!("Proxy container {} not found, skipping connect", self.settings.proxy_name);
            return Ok(report);
        };
        debug!("Connecting {} to networks of {}", proxy.name, container.name);

        let scope = NetworkScope::resolve(container, &self.settings.scope_label);
        for network in &container.networks {
            if UNJOINABLE_NETWORKS.contains(&network.as_str()) {
                continue;
            }
            if proxy.is_attached_to(network) {
                debug!("{} already connected to network {}, skipping", proxy.name, network);
                continue;
            }
            match self.in_scope(container, &scope, network).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Network {} is outside the scope of {}", network, container.name);
                    continue;
                }
                Err(e) if e.is_not_found() => {
                    debug!("Network {} disappeared, skipping", network);
                    continue;
                }
                Err(e) => {
                    report.fail(network, e);
                    continue;
                }
            }

            match self.runtime.connect(network, &proxy.id).await {
                Ok(()) => {
                    info!("{} connected to network {}", proxy.name, network);
                    report.connected.push(network.clone());
                }
                Err(e) if e.is_not_found() => {
                    info!("Could not connect {} to network {}: {}", proxy.name, network, e);
                }
                Err(e) => report.fail(network, e),
            }
        }
        Ok(report)
    }

    /// Disconnect the proxy from the networks of a departing container that
    /// no other running monitored container needs.
    pub async fn disconnect_one(&self, container: &WorkloadContainer) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let Some(proxy) = self.proxy().await? else {
            info!("Proxy container {} not found, skipping disconnect", self.settings.proxy_name);
            return Ok(report);
        };
        debug!("Disconnecting {} from networks of {}", proxy.name, container.name);

        for network in &container.networks {
            if UNJOINABLE_NETWORKS.contains(&network.as_str()) {
                continue;
            }
            if !proxy.is_attached_to(network) {
                debug!("{} not connected to network {}, skipping", proxy.name, network);
                continue;
            }
            let info = match self.runtime.get_network(network).await {
                Ok(info) => info,
                Err(e) if e.is_not_found() => {
                    debug!("Network {} disappeared, skipping", network);
                    continue;
                }
                Err(e) => {
                    report.fail(network, e);
                    continue;
                }
            };

            match self.still_needed(&info, &proxy.id, &container.id).await {
                Ok(true) => {
                    info!("Network {} still has routed containers, keeping {}", network, proxy.name);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    report.fail(network, e);
                    continue;
                }
            }

            match self.runtime.disconnect(network, &proxy.id).await {
                Ok(()) => {
                    info!("{} disconnected from network {}", proxy.name, network);
                    report.disconnected.push(network.clone());
                }
                Err(e) if e.is_not_found() => {
                    info!("Could not disconnect {} from network {}: {}", proxy.name, network, e);
                }
                Err(e) => report.fail(network, e),
            }
        }
        Ok(report)
    }

    async fn in_scope(
        &self,
        container: &WorkloadContainer,
        scope: &NetworkScope,
        network: &str,
    ) -> Result<bool> {
        if !scope.needs_network_labels(container) {
            return Ok(scope.allows(network));
        }
        let info = self.runtime.get_network(network).await?;
        Ok(scope.permits(container, &info))
    }

    /// Whether any member of `network` other than the proxy and the
    /// departing container still needs the proxy there.
    async fn still_needed(&self, network: &NetworkInfo, proxy_id: &str, departing_id: &str) -> Result<bool> {
        for member in &network.members {
            if member == proxy_id || member == departing_id {
                continue;
            }
            let container = match self.runtime.get_container(member).await {
                Ok(container) => container,
                Err(e) if e.is_not_found() => {
                    debug!("Member {} of network {} is gone", member, network.name);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.routes_through(&container, network) {
                debug!("{} still routes through network {}", container.name, network.name);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn routes_through(&self, container: &WorkloadContainer, network: &NetworkInfo) -> bool {
        if !container.running || self.is_proxy(container) || !self.is_monitored(container) {
            return false;
        }
        NetworkScope::resolve(container, &self.settings.scope_label).permits(container, network)
    }
}
