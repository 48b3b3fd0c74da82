//! Keeps a Traefik container attached to the networks of the containers it
//! routes to.
//!
//! The [`dispatcher`] reads container lifecycle events from a
//! [`runtime::ContainerRuntime`], keeps the [`cache`] current and asks the
//! [`reconciler`] to connect or disconnect the proxy.  Which networks a
//! container exposes to the proxy is decided by [`scope`].

pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod reconciler;
pub mod runtime;
pub mod scope;
pub mod types;

pub use cache::ContainerCache;
pub use config::Config;
pub use dispatcher::{EventDispatcher, Outcome};
pub use reconciler::{ReconcileReport, ReconcileSettings, Reconciler};
pub use runtime::{ContainerRuntime, DockerRuntime, RuntimeError};
