//! Server discovery of quotable resources.
//!
//! A resource is quotable when the server exposes it with the verbs create,
//! list, watch and delete. The probe is injected into the controller as a
//! closure so tests can exercise both fixed and dynamic sets.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use kube::Client;
use kube::api::ApiResource;
use kube::discovery::{Discovery, verbs};

use crate::util::Error;

/// Group/resource pair, the identity evaluators and replenishment use.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// Group/version/resource triple identifying one monitored kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(&self.group, &self.resource)
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// The currently quotable kinds, with the `ApiResource` needed to open a
/// dynamic watch on each.
pub type QuotableSet = BTreeMap<GroupVersionResource, ApiResource>;

/// `(set, error)` where a non-empty set alongside an error means partial
/// discovery: the caller unions instead of shrinking. Empty set plus error
/// is a failed probe and the tick is skipped.
pub type ProbeResult = (QuotableSet, Option<Error>);

pub type DiscoveryProbe = Arc<dyn Fn() -> BoxFuture<'static, ProbeResult> + Send + Sync>;

/// Resources never monitored even when the server advertises them.
pub fn default_ignored() -> HashSet<GroupResource> {
    [
        GroupResource::new("", "events"),
        GroupResource::new("events.k8s.io", "events"),
        GroupResource::new("", "bindings"),
    ]
    .into()
}

/// Probe backed by live server discovery. Ignore rules are applied by the
/// controller, not here, so every probe implementation is treated alike.
pub fn cluster_probe(client: Client) -> DiscoveryProbe {
    Arc::new(move || -> BoxFuture<'static, ProbeResult> {
        let client = client.clone();
        Box::pin(async move {
            let discovery = match Discovery::new(client).run().await {
                Ok(discovery) => discovery,
                Err(e) => return (QuotableSet::new(), Some(e.into())),
            };
            let mut set = QuotableSet::new();
            for group in discovery.groups() {
                for (ar, caps) in group.recommended_resources() {
                    let quotable = [verbs::CREATE, verbs::LIST, verbs::WATCH, verbs::DELETE]
                        .iter()
                        .all(|verb| caps.supports_operation(verb));
                    if !quotable {
                        continue;
                    }
                    let gvr = GroupVersionResource {
                        group: ar.group.clone(),
                        version: ar.version.clone(),
                        resource: ar.plural.clone(),
                    };
                    set.insert(gvr, ar);
                }
            }
            (set, None)
        })
    })
}

/// Folds a probe result into the previously remembered set.
///
/// Total failure keeps the old set untouched; partial failure unions so the
/// monitored set never shrinks on flaky discovery; a clean probe replaces.
pub fn fold_probe_result(previous: &QuotableSet, result: ProbeResult) -> Option<QuotableSet> {
    let (fresh, err) = result;
    match err {
        Some(e) if fresh.is_empty() => {
            eprintln!("discovery probe failed: {e}");
            None
        }
        Some(e) => {
            eprintln!("partial discovery ({e}); keeping previous resources as lower bound");
            let mut union = previous.clone();
            union.extend(fresh);
            Some(union)
        }
        None => Some(fresh),
    }
}

/// `(added, removed)` between the remembered and the newly observed set.
pub fn diff(
    previous: &QuotableSet,
    next: &QuotableSet,
) -> (Vec<GroupVersionResource>, Vec<GroupVersionResource>) {
    let added = next
        .keys()
        .filter(|gvr| !previous.contains_key(*gvr))
        .cloned()
        .collect();
    let removed = previous
        .keys()
        .filter(|gvr| !next.contains_key(*gvr))
        .cloned()
        .collect();
    (added, removed)
}
