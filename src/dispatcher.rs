//! Drives the cache and the reconciler from the runtime's event feed.

use anyhow::{anyhow, Context};
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};

use crate::cache::ContainerCache;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::runtime::{EventStream, Result};
use crate::types::{EventAction, EventKind, RuntimeEvent, WorkloadContainer};

/// What handling one event amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not a container event, or an action that is not tracked.
    Ignored,
    /// The container was removed from the engine and dropped from the cache.
    Evicted,
    /// The proxy is not running; only the cache was updated.
    ProxyDown,
    /// The container is not in the cache, most likely already removed.
    Unknown,
    /// The proxy itself stopped.
    ProxyStopped,
    /// The container carries no monitored label.
    Unmonitored,
    Bootstrapped(ReconcileReport),
    Connected(ReconcileReport),
    Disconnected(ReconcileReport),
}

/// Lifecycle transitions the reconciler reacts to.
enum Transition {
    Start,
    Die,
}

pub struct EventDispatcher {
    reconciler: Reconciler,
    cache: ContainerCache,
}

impl EventDispatcher {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            cache: ContainerCache::new(),
        }
    }

    pub fn cache(&self) -> &ContainerCache {
        &self.cache
    }

    /// Subscribe, bootstrap, then handle events one at a time until the feed
    /// breaks.  Only returns on a feed error or end, which is fatal.
    pub async fn run(mut self) -> anyhow::Result<()> {
        // The feed starts at subscription, so events raised while the
        // bootstrap runs are still delivered afterwards.
        let events = self.reconciler.runtime().events();
        self.bootstrap().await;
        self.consume(events).await
    }

    /// Seed the cache from the running containers and, if the proxy is
    /// already up, connect everything once.  Failures are logged: the next
    /// proxy start bootstraps again.
    pub async fn bootstrap(&mut self) {
        let containers = match self.scan().await {
            Ok(containers) => containers,
            Err(e) => {
                error!("Initial container scan failed: {}", e);
                return;
            }
        };
        let proxy_name = &self.reconciler.settings().proxy_name;
        match self.reconciler.proxy_running().await {
            Ok(true) => match self.reconciler.bootstrap(&containers).await {
                Ok(report) => log_failures(&report),
                Err(e) => error!("Initial bootstrap failed: {}", e),
            },
            Ok(false) => info!("Proxy container {} is not running, waiting for it to start", proxy_name),
            Err(e) => error!("Could not look up proxy container {}: {}", proxy_name, e),
        }
    }

    /// List the running containers and record each one in the cache.
    async fn scan(&mut self) -> Result<Vec<WorkloadContainer>> {
        let containers = self.reconciler.runtime().list_running_containers().await?;
        for container in &containers {
            self.cache.insert(container.clone());
        }
        debug!("Cached {} running container(s)", containers.len());
        Ok(containers)
    }

    pub async fn consume(&mut self, mut events: EventStream) -> anyhow::Result<()> {
        info!("Listening for container events...");
        while let Some(event) = events.next().await {
            let event = event.context("runtime event feed failed")?;
            match self.handle(event.clone()).await {
                Ok(outcome) => match &outcome {
                    Outcome::Bootstrapped(report)
                    | Outcome::Connected(report)
                    | Outcome::Disconnected(report) => log_failures(report),
                    _ => debug!("Event {} on {}: {:?}", event.action, event.container_id, outcome),
                },
                Err(e) => error!(
                    "Failed to handle {} event for {}: {}",
                    event.action, event.container_id, e
                ),
            }
        }
        Err(anyhow!("runtime event feed ended"))
    }

    pub async fn handle(&mut self, event: RuntimeEvent) -> Result<Outcome> {
        let RuntimeEvent {
            kind,
            action,
            container_id: id,
        } = event;

        match kind {
            EventKind::Container => {}
            EventKind::Network | EventKind::Other(_) => return Ok(Outcome::Ignored),
        }

        // Refresh even while the proxy is down so the entry is current when
        // it comes back.
        self.cache.upsert(self.reconciler.runtime(), &id).await?;

        let transition = match action {
            EventAction::Start => Transition::Start,
            EventAction::Die => Transition::Die,
            EventAction::Destroy => {
                self.cache.evict(&id);
                return Ok(Outcome::Evicted);
            }
            EventAction::Other(_) => return Ok(Outcome::Ignored),
        };
        debug!("Event detected: {} on container {}", action, id);

        if !self.reconciler.proxy_running().await? {
            info!("Proxy container is not running, skipping event handling");
            return Ok(Outcome::ProxyDown);
        }

        let Some(container) = self.cache.get(&id).cloned() else {
            warn!("Container {} not found", id);
            return Ok(Outcome::Unknown);
        };

        if self.reconciler.is_proxy(&container) {
            return match transition {
                Transition::Start => {
                    info!("Proxy container {} started, reconnecting all networks", container.name);
                    let containers = self.scan().await?;
                    Ok(Outcome::Bootstrapped(self.reconciler.bootstrap(&containers).await?))
                }
                Transition::Die => Ok(Outcome::ProxyStopped),
            };
        }

        if !self.reconciler.is_monitored(&container) {
            return Ok(Outcome::Unmonitored);
        }

        match transition {
            Transition::Start => {
                info!("Container {} started, connecting proxy to its networks", container.name);
                Ok(Outcome::Connected(self.reconciler.connect_one(&container).await?))
            }
            Transition::Die => {
                info!("Container {} stopped, disconnecting proxy from unused networks", container.name);
                let report = self.reconciler.disconnect_one(&container).await?;
                self.cache.evict(&id);
                Ok(Outcome::Disconnected(report))
            }
        }
    }
}

fn log_failures(report: &ReconcileReport) {
    for (network, e) in &report.failed {
        error!("Reconciling network {} failed: {}", network, e);
    }
}
