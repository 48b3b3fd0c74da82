//! Label matching and network scoping.
//!
//! Everything in here is pure: decisions are made from container and
//! network snapshots only.

use regex::Regex;

use crate::types::{NetworkInfo, WorkloadContainer};

/// Set by compose on containers and networks it creates.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
/// Set by compose on networks: the network name as written in the compose file.
pub const COMPOSE_NETWORK_LABEL: &str = "com.docker.compose.network";

/// Decides whether a container is one the proxy routes to.
///
/// The pattern is tested against every label key of the container and is
/// anchored at the start of the key, so `traefik` matches `traefik.enable`
/// but not `com.traefik`.  Label values are never looked at.
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    pattern: Regex,
}

impl LabelMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!("^(?:{pattern})"))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, container: &WorkloadContainer) -> bool {
        container.labels.keys().any(|key| self.pattern.is_match(key))
    }
}

/// Networks the proxy may join on behalf of one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkScope {
    /// No scope label: every attached network is allowed.
    Unrestricted,
    /// Names listed in the scope label.  These are logical (compose) names
    /// until [`NetworkScope::apply_compose_alias`] rewrites them.
    Only(Vec<String>),
}

impl NetworkScope {
    /// Read the scope from `scope_label` on `container`.
    ///
    /// The value is split on `,` and nothing else: entries are not trimmed,
    /// so `"a, b"` names `a` and ` b`.  An empty value yields a single empty
    /// name, which matches no network.
    pub fn resolve(container: &WorkloadContainer, scope_label: &str) -> Self {
        match container.label(scope_label) {
            None => Self::Unrestricted,
            Some(value) => Self::Only(value.split(',').map(str::to_string).collect()),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    /// Whether deciding on a network for `container` needs that network's
    /// labels, i.e. whether a compose rewrite could change the answer.
    pub fn needs_network_labels(&self, container: &WorkloadContainer) -> bool {
        !self.is_unrestricted() && container.label(COMPOSE_PROJECT_LABEL).is_some()
    }

    /// Replace the logical name of `network` with its real name, when the
    /// network belongs to the same compose project as `container`.
    ///
    /// The real name is taken from the network itself rather than assembled
    /// as `{project}_{logical}`.  The two agree for default compose networks;
    /// a compose network declared with its own `name:` only resolves this way.
    pub fn apply_compose_alias(&mut self, container: &WorkloadContainer, network: &NetworkInfo) {
        let Self::Only(names) = self else {
            return;
        };
        let Some(logical) = compose_logical_name(container, network) else {
            return;
        };
        for name in names.iter_mut().filter(|name| name.as_str() == logical) {
            *name = network.name.clone();
        }
    }

    pub fn allows(&self, network: &str) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Only(names) => names.iter().any(|name| name == network),
        }
    }

    /// Scope check for a single network, with the compose rewrite applied
    /// for that network only.
    pub fn permits(&self, container: &WorkloadContainer, network: &NetworkInfo) -> bool {
        if !self.needs_network_labels(container) {
            return self.allows(&network.name);
        }
        let mut scope = self.clone();
        scope.apply_compose_alias(container, network);
        scope.allows(&network.name)
    }
}

/// Logical name of `network` if it was created by the compose project
/// `container` belongs to.
fn compose_logical_name<'a>(container: &WorkloadContainer, network: &'a NetworkInfo) -> Option<&'a str> {
    let project = container.label(COMPOSE_PROJECT_LABEL)?;
    if network.label(COMPOSE_PROJECT_LABEL) != Some(project) {
        return None;
    }
    network.label(COMPOSE_NETWORK_LABEL)
}
