//! Dynamic watch fleet over the quotable resource set.
//!
//! One monitor per group/version/resource: a watcher feeding a reflector
//! store plus an event pipeline that collapses every object change into a
//! `{group/resource, namespace}` tuple on the shared change queue. The
//! controller drains that queue and maps each change back onto the account
//! quotas it affects.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use kube::Client;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::runtime::reflector::Store;
use kube::runtime::reflector::store::Writer;
use kube::runtime::{WatchStreamExt, watcher};
use owo_colors::OwoColorize;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::discovery::{GroupResource, GroupVersionResource, QuotableSet};
use super::queue::WorkQueue;
use super::registry::ObjectSource;
use crate::util::Error;
use crate::util::colors::{FG1, FG2};

/// One object-level change, collapsed to what replenishment needs. A `None`
/// namespace is a resync nudge covering every namespace of the resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceChange {
    pub group_resource: GroupResource,
    pub namespace: Option<String>,
}

pub type ReplenishmentFn = Box<dyn Fn(&ResourceChange) + Send + Sync>;

struct Monitor {
    store: Store<DynamicObject>,
    synced: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

pub struct QuotaMonitor {
    client: Client,
    replenishment_resync: Duration,
    replenishment: ReplenishmentFn,
    monitors: RwLock<HashMap<GroupVersionResource, Monitor>>,
    resource_changes: WorkQueue<ResourceChange>,
}

impl QuotaMonitor {
    pub fn new(
        client: Client,
        replenishment_resync: Duration,
        replenishment: ReplenishmentFn,
    ) -> Self {
        Self {
            client,
            replenishment_resync,
            replenishment,
            monitors: RwLock::new(HashMap::new()),
            resource_changes: WorkQueue::new(),
        }
    }

    /// Reconciles the live monitors to exactly the requested set: new kinds
    /// get a watcher, removed kinds are cancelled. A kind that cannot be
    /// started is reported but does not fail the rest.
    pub fn sync_monitors(&self, desired: &QuotableSet) -> Result<(), Error> {
        let mut monitors = self.monitors.write();

        let removed: Vec<GroupVersionResource> = monitors
            .keys()
            .filter(|gvr| !desired.contains_key(*gvr))
            .cloned()
            .collect();
        for gvr in removed {
            if let Some(monitor) = monitors.remove(&gvr) {
                monitor.cancel.cancel();
                println!(
                    "{}{}",
                    "🔍 Stopped monitor for ".color(FG1),
                    gvr.to_string().color(FG2)
                );
            }
        }

        let mut errors = Vec::new();
        for (gvr, api_resource) in desired {
            if monitors.contains_key(gvr) {
                continue;
            }
            match self.start_monitor(gvr, api_resource) {
                Ok(monitor) => {
                    monitors.insert(gvr.clone(), monitor);
                    println!(
                        "{}{}",
                        "🔍 Started monitor for ".color(FG1),
                        gvr.to_string().color(FG2)
                    );
                }
                Err(e) => errors.push(e),
            }
        }
        Error::aggregate(errors)
    }

    fn start_monitor(
        &self,
        gvr: &GroupVersionResource,
        api_resource: &ApiResource,
    ) -> Result<Monitor, Error> {
        if api_resource.plural.is_empty() || api_resource.version.is_empty() {
            return Err(Error::UserInput(format!(
                "resource '{}' has no servable endpoint",
                gvr
            )));
        }
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), api_resource);
        let writer = Writer::<DynamicObject>::new(api_resource.clone());
        let store = writer.as_reader();
        let synced = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let group_resource = gvr.group_resource();
        let changes = self.resource_changes.clone();
        let resync_period = self.replenishment_resync;
        let task = tokio::spawn({
            let synced = synced.clone();
            let cancel = cancel.clone();
            async move {
                let mut resync =
                    tokio::time::interval_at(tokio::time::Instant::now() + resync_period, resync_period);
                let mut stream = watcher(api, watcher::Config::default())
                    .default_backoff()
                    .reflect(writer)
                    .boxed();
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = resync.tick() => changes.add(ResourceChange {
                            group_resource: group_resource.clone(),
                            namespace: None,
                        }),
                        event = stream.next() => match event {
                            Some(Ok(watcher::Event::InitDone)) => {
                                synced.store(true, Ordering::SeqCst);
                            }
                            Some(Ok(
                                watcher::Event::InitApply(object)
                                | watcher::Event::Apply(object)
                                | watcher::Event::Delete(object),
                            )) => changes.add(ResourceChange {
                                group_resource: group_resource.clone(),
                                namespace: object.metadata.namespace.clone(),
                            }),
                            Some(Ok(watcher::Event::Init)) => {}
                            Some(Err(e)) => {
                                eprintln!("watch error for {}: {}", group_resource, e);
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(Monitor {
            store,
            synced,
            cancel,
            task,
        })
    }

    /// True once every live monitor has delivered its initial list.
    pub fn is_synced(&self) -> bool {
        self.monitors
            .read()
            .values()
            .all(|m| m.synced.load(Ordering::SeqCst))
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.read().len()
    }

    /// Drains the change queue into the replenishment callback until the
    /// stop signal, then tears the monitor fleet down.
    pub async fn run(&self, stop: CancellationToken) {
        println!("{}", "🔭 Starting quota monitor...".green());
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                change = self.resource_changes.get() => {
                    let Some(change) = change else { break };
                    (self.replenishment)(&change);
                    self.resource_changes.done(&change);
                }
            }
        }
        self.resource_changes.shut_down();
        let mut monitors = self.monitors.write();
        for (_, monitor) in monitors.drain() {
            monitor.cancel.cancel();
            monitor.task.abort();
        }
        println!("{}", "🔭 Quota monitor stopped".red());
    }
}

impl ObjectSource for QuotaMonitor {
    fn namespaced_objects(
        &self,
        group_resource: &GroupResource,
        namespace: &str,
    ) -> Option<Vec<Arc<DynamicObject>>> {
        let monitors = self.monitors.read();
        let monitor = monitors
            .iter()
            .find(|(gvr, _)| gvr.group_resource() == *group_resource)
            .map(|(_, monitor)| monitor)?;
        Some(
            monitor
                .store
                .state()
                .into_iter()
                .filter(|object| object.metadata.namespace.as_deref() == Some(namespace))
                .collect(),
        )
    }
}
