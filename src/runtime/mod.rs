use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::types::{NetworkInfo, RuntimeEvent, WorkloadContainer};

pub mod docker;
pub use docker::DockerRuntime;

/// Errors returned by a [`ContainerRuntime`].
///
/// `NotFound` is expected whenever the engine state moves between an event
/// and the call acting on it, and callers treat it as benign.  Everything
/// else is a real engine or transport failure.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("docker engine error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("runtime error: {0}")]
    Other(String),
}

impl RuntimeError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Live, unbounded feed of runtime events.  Ends only when the connection to
/// the engine is lost.
pub type EventStream = BoxStream<'static, Result<RuntimeEvent>>;

/// The operations the reconciler needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// All containers currently running.
    async fn list_running_containers(&self) -> Result<Vec<WorkloadContainer>>;

    /// Look up a container by ID or name.
    async fn get_container(&self, id_or_name: &str) -> Result<WorkloadContainer>;

    async fn get_network(&self, name: &str) -> Result<NetworkInfo>;

    async fn connect(&self, network: &str, container: &str) -> Result<()>;

    async fn disconnect(&self, network: &str, container: &str) -> Result<()>;

    /// Subscribe to container lifecycle events.  The feed starts when this
    /// is called, not when the stream is first polled: events emitted in
    /// between are delivered in order once it is.
    fn events(&self) -> EventStream;
}
