#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use traefik_netsync::runtime::{ContainerRuntime, EventStream, Result, RuntimeError};
use traefik_netsync::scope::LabelMatcher;
use traefik_netsync::types::{NetworkInfo, RuntimeEvent, WorkloadContainer};
use traefik_netsync::{ReconcileSettings, Reconciler};

pub const PROXY_NAME: &str = "traefik";
pub const PROXY_ID: &str = "proxy-id";
pub const SCOPE_LABEL: &str = "traefik.docker.network";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect { network: String, container: String },
    Disconnect { network: String, container: String },
}

#[derive(Default)]
struct State {
    containers: HashMap<String, WorkloadContainer>,
    networks: HashMap<String, NetworkInfo>,
    calls: Vec<Call>,
    failing_networks: HashSet<String>,
    failing_lookups: HashSet<String>,
    events: Vec<RuntimeEvent>,
    journal: Vec<&'static str>,
}

/// In-memory engine.  Network members are derived from the running
/// containers attached to each network, plus whatever members the stored
/// `NetworkInfo` lists explicitly (useful for members that no longer exist).
///
/// Like the Docker feed, the event stream is lazy: events queued after
/// subscribing but before the first poll are still delivered.
#[derive(Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<State>>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add the proxy, running and attached to no network.
    pub fn with_proxy(running: bool) -> Arc<Self> {
        let runtime = Self::new();
        runtime.add_container(WorkloadContainer::new(PROXY_ID, PROXY_NAME).running(running));
        runtime
    }

    pub fn add_container(&self, container: WorkloadContainer) {
        let mut state = self.state.lock().unwrap();
        for network in &container.networks {
            state
                .networks
                .entry(network.clone())
                .or_insert_with(|| NetworkInfo::new(network.clone()));
        }
        state.containers.insert(container.id.clone(), container);
    }

    /// Register a network, replacing any implicit one.
    pub fn add_network(&self, network: NetworkInfo) {
        let mut state = self.state.lock().unwrap();
        state.networks.insert(network.name.clone(), network);
    }

    pub fn remove_network(&self, name: &str) {
        self.state.lock().unwrap().networks.remove(name);
    }

    pub fn remove_container(&self, id: &str) {
        self.state.lock().unwrap().containers.remove(id);
    }

    pub fn set_running(&self, id: &str, running: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.get_mut(id) {
            container.running = running;
        }
    }

    /// Calls touching `network` fail with an engine error.
    pub fn fail_network(&self, network: &str) {
        self.state.lock().unwrap().failing_networks.insert(network.to_string());
    }

    /// Lookups of `id` fail with an engine error.
    pub fn fail_lookup(&self, id: &str) {
        self.state.lock().unwrap().failing_lookups.insert(id.to_string());
    }

    pub fn push_event(&self, event: RuntimeEvent) {
        self.state.lock().unwrap().events.push(event);
    }

    pub fn networks_of(&self, id: &str) -> BTreeSet<String> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(id)
            .map(|c| c.networks.clone())
            .unwrap_or_default()
    }

    pub fn proxy_networks(&self) -> BTreeSet<String> {
        self.networks_of(PROXY_ID)
    }

    /// Subscriptions and listings, in the order they happened.
    pub fn journal(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().journal.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Connect { network, .. } => Some(network),
                Call::Disconnect { .. } => None,
            })
            .collect()
    }

    pub fn disconnects(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Disconnect { network, .. } => Some(network),
                Call::Connect { .. } => None,
            })
            .collect()
    }

    fn lookup(state: &State, id_or_name: &str) -> Result<WorkloadContainer> {
        if state.failing_lookups.contains(id_or_name) {
            return Err(RuntimeError::Other(format!("lookup of {id_or_name} failed")));
        }
        state
            .containers
            .get(id_or_name)
            .or_else(|| state.containers.values().find(|c| c.name == id_or_name))
            .cloned()
            .ok_or_else(|| RuntimeError::not_found(format!("container {id_or_name}")))
    }

    fn check_call(state: &State, network: &str, container: &str) -> Result<String> {
        if state.failing_networks.contains(network) {
            return Err(RuntimeError::Other(format!("network {network} is broken")));
        }
        if !state.networks.contains_key(network) {
            return Err(RuntimeError::not_found(format!("network {network}")));
        }
        Ok(Self::lookup(state, container)?.id)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_running_containers(&self) -> Result<Vec<WorkloadContainer>> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("list");
        let mut containers: Vec<_> = state.containers.values().filter(|c| c.running).cloned().collect();
        containers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(containers)
    }

    async fn get_container(&self, id_or_name: &str) -> Result<WorkloadContainer> {
        let state = self.state.lock().unwrap();
        Self::lookup(&state, id_or_name)
    }

    async fn get_network(&self, name: &str) -> Result<NetworkInfo> {
        let state = self.state.lock().unwrap();
        if state.failing_networks.contains(name) {
            return Err(RuntimeError::Other(format!("network {name} is broken")));
        }
        let mut network = state
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::not_found(format!("network {name}")))?;
        let mut attached: Vec<_> = state
            .containers
            .values()
            .filter(|c| c.running && c.is_attached_to(name))
            .map(|c| c.id.clone())
            .collect();
        attached.sort();
        network.members.extend(attached);
        Ok(network)
    }

    async fn connect(&self, network: &str, container: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = Self::check_call(&state, network, container)?;
        state.calls.push(Call::Connect {
            network: network.to_string(),
            container: id.clone(),
        });
        if let Some(c) = state.containers.get_mut(&id) {
            c.networks.insert(network.to_string());
        }
        Ok(())
    }

    async fn disconnect(&self, network: &str, container: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = Self::check_call(&state, network, container)?;
        state.calls.push(Call::Disconnect {
            network: network.to_string(),
            container: id.clone(),
        });
        if let Some(c) = state.containers.get_mut(&id) {
            c.networks.remove(network);
        }
        Ok(())
    }

    /// Replays the events queued by the first poll, then ends.
    fn events(&self) -> EventStream {
        self.state.lock().unwrap().journal.push("subscribe");
        let state = Arc::clone(&self.state);
        stream::once(async move { std::mem::take(&mut state.lock().unwrap().events) })
            .flat_map(|events| stream::iter(events.into_iter().map(Ok)))
            .boxed()
    }
}

pub fn settings(pattern: &str) -> ReconcileSettings {
    ReconcileSettings {
        proxy_name: PROXY_NAME.to_string(),
        matcher: LabelMatcher::new(pattern).unwrap(),
        scope_label: SCOPE_LABEL.to_string(),
    }
}

pub fn reconciler(runtime: &Arc<FakeRuntime>) -> Reconciler {
    let runtime: Arc<dyn ContainerRuntime> = runtime.clone();
    Reconciler::new(runtime, settings(r"traefik\.enable"))
}

/// A running container routed by Traefik.
pub fn routed(id: &str, networks: &[&str]) -> WorkloadContainer {
    networks.iter().fold(
        WorkloadContainer::new(id, format!("{id}-name"))
            .running(true)
            .with_label("traefik.enable", "true"),
        |c, n| c.with_network(*n),
    )
}

pub fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}
