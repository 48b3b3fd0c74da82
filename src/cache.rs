//! Local mirror of the containers seen on the event feed or in a listing
//! scan.
//!
//! The proxy's own memberships and network member lists are always read from
//! the runtime, never from here.

use std::collections::HashMap;

use log::debug;

use crate::runtime::{ContainerRuntime, Result};
use crate::types::WorkloadContainer;

#[derive(Debug, Default)]
pub struct ContainerCache {
    containers: HashMap<String, WorkloadContainer>,
}

impl ContainerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read `id` from the runtime and store it.
    ///
    /// A container that is already gone leaves the cache untouched and is
    /// not an error.  Returns whether an entry was written.
    pub async fn upsert(&mut self, runtime: &dyn ContainerRuntime, id: &str) -> Result<bool> {
        match runtime.get_container(id).await {
            Ok(container) => {
                self.insert(container);
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                debug!("Container {} is gone, cache not updated", id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Store a snapshot under the ID the runtime reported for it.
    pub fn insert(&mut self, container: WorkloadContainer) {
        self.containers.insert(container.id.clone(), container);
    }

    pub fn evict(&mut self, id: &str) -> Option<WorkloadContainer> {
        self.containers.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&WorkloadContainer> {
        self.containers.get(id)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}
