//! Data structures shared by the cache, the reconciler and the runtime.
//!
//! These are deliberately runtime-agnostic snapshots: the Docker
//! implementation converts `bollard` models into them, and the tests build
//! them by hand.  Nothing here talks to the daemon.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A snapshot of one container as seen by the runtime.
///
/// The proxy itself is represented with the same type; it is only
/// distinguished by its configured name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkloadContainer {
    /// Full container ID.  Stable for the lifetime of the container.
    pub id: String,
    /// Container name without the leading `/` the engine reports.
    pub name: String,
    pub running: bool,
    pub labels: HashMap<String, String>,
    /// Names of the networks the container is attached to.  Ordered so that
    /// reconciliation visits networks in a stable order.
    pub networks: BTreeSet<String>,
}

impl WorkloadContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn running(mut self, running: bool) -> Self {
        self.running = running;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.networks.insert(network.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn is_attached_to(&self, network: &str) -> bool {
        self.networks.contains(network)
    }
}

/// A snapshot of one network.  Never cached: always read fresh before a
/// membership decision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
    /// IDs of the containers currently attached.
    pub members: Vec<String>,
}

impl NetworkInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Subject type of a runtime event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Container,
    Network,
    /// Images, volumes, daemon events and anything newer engines add.
    Other(String),
}

impl From<&str> for EventKind {
    fn from(kind: &str) -> Self {
        match kind {
            "container" => Self::Container,
            "network" => Self::Network,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Lifecycle action carried by a runtime event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    Start,
    Die,
    /// The container has been removed from the engine.
    Destroy,
    Other(String),
}

impl From<&str> for EventAction {
    fn from(action: &str) -> Self {
        match action {
            "start" => Self::Start,
            "die" => Self::Die,
            "destroy" => Self::Destroy,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Die => f.write_str("die"),
            Self::Destroy => f.write_str("destroy"),
            Self::Other(action) => f.write_str(action),
        }
    }
}

/// One message from the runtime's live event feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub kind: EventKind,
    pub action: EventAction,
    /// ID of the subject.  For container events this is the container ID.
    pub container_id: String,
}

impl RuntimeEvent {
    pub fn container(action: EventAction, container_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Container,
            action,
            container_id: container_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_and_action_parse_engine_strings() {
        assert_eq!(EventKind::from("container"), EventKind::Container);
        assert_eq!(EventKind::from("network"), EventKind::Network);
        assert_eq!(EventKind::from("image"), EventKind::Other("image".into()));

        assert_eq!(EventAction::from("start"), EventAction::Start);
        assert_eq!(EventAction::from("die"), EventAction::Die);
        assert_eq!(EventAction::from("destroy"), EventAction::Destroy);
        assert_eq!(
            EventAction::from("exec_start: sh"),
            EventAction::Other("exec_start: sh".into())
        );
        assert_eq!(EventAction::Other("kill".into()).to_string(), "kill");
    }

    #[test]
    fn builder_collects_labels_and_networks() {
        let c = WorkloadContainer::new("abc", "web")
            .running(true)
            .with_label("traefik.enable", "true")
            .with_network("n2")
            .with_network("n1");

        assert!(c.running);
        assert_eq!(c.label("traefik.enable"), Some("true"));
        assert!(c.is_attached_to("n1"));
        assert!(!c.is_attached_to("n3"));
        let order: Vec<_> = c.networks.iter().map(String::as_str).collect();
        assert_eq!(order, vec!["n1", "n2"]);
    }
}
