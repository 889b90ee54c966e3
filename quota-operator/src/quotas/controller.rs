//! The account quota controller.
//!
//! Aggregates per-namespace usage across every namespace owned by an
//! account and drives each `AccountQuota`'s status to match. Workers drain
//! two rate-limited queues (primary recalculation and missing-usage
//! priority) under a shared lock; the discovery sync loop takes the lock
//! exclusively while it reshapes the monitor fleet.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbor_common::labels;
use arbor_types::{AccountQuota, AccountQuotaStatus};
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::reflector::{ObjectRef, Store, store::Writer};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, ResourceExt};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use super::aggregate::{self, EnqueueTarget, NamespaceUsage};
use super::discovery::{self, DiscoveryProbe, GroupResource, QuotableSet};
use super::monitor::{QuotaMonitor, ReplenishmentFn, ResourceChange};
use super::quantity::{self, UsedMap};
use super::queue::WorkQueue;
use super::registry::Registry;
use crate::util::{
    self, Error,
    colors::{FG1, FG2},
    patch,
};

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

#[derive(Clone)]
pub struct ControllerConfig {
    /// Cadence of the full requeue of every account quota.
    pub resync_period: Duration,

    /// Cadence of each monitor's namespace-wide replenishment nudge.
    pub replenishment_resync_period: Duration,

    /// Cadence of the discovery re-probe.
    pub discovery_sync_period: Duration,

    /// Resources never monitored.
    pub ignored_resources: HashSet<GroupResource>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resync_period: util::DEFAULT_RESYNC_PERIOD,
            replenishment_resync_period: util::DEFAULT_REPLENISHMENT_RESYNC_PERIOD,
            discovery_sync_period: util::DEFAULT_DISCOVERY_SYNC_PERIOD,
            ignored_resources: discovery::default_ignored(),
        }
    }
}

pub struct AccountQuotaController {
    client: Client,
    config: ControllerConfig,
    registry: Arc<Registry>,
    probe: DiscoveryProbe,
    monitor: Arc<QuotaMonitor>,
    quotas: Store<AccountQuota>,
    namespaces: Store<Namespace>,
    primary: WorkQueue<String>,
    priority: WorkQueue<String>,

    /// Workers hold this shared; the sync loop holds it exclusive while the
    /// monitor fleet is being reconfigured.
    worker_lock: Arc<tokio::sync::RwLock<()>>,

    /// The most recently committed quotable set.
    quotable: parking_lot::Mutex<QuotableSet>,

    router_writers: parking_lot::Mutex<Option<(Writer<AccountQuota>, Writer<Namespace>)>>,

    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
}

impl AccountQuotaController {
    pub fn new(
        client: Client,
        registry: Arc<Registry>,
        probe: DiscoveryProbe,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let quota_writer = Writer::<AccountQuota>::default();
        let quotas = quota_writer.as_reader();
        let namespace_writer = Writer::<Namespace>::default();
        let namespaces = namespace_writer.as_reader();

        let primary: WorkQueue<String> = WorkQueue::new();
        let priority: WorkQueue<String> = WorkQueue::new();

        let replenishment: ReplenishmentFn = {
            let quotas = quotas.clone();
            let namespaces = namespaces.clone();
            let registry = registry.clone();
            let primary = primary.clone();
            Box::new(move |change| {
                replenish(&quotas, &namespaces, &registry, &primary, change);
            })
        };
        let monitor = Arc::new(QuotaMonitor::new(
            client.clone(),
            config.replenishment_resync_period,
            replenishment,
        ));

        Arc::new(Self {
            client,
            config,
            registry,
            probe,
            monitor,
            quotas,
            namespaces,
            primary,
            priority,
            worker_lock: Arc::new(tokio::sync::RwLock::new(())),
            quotable: parking_lot::Mutex::new(QuotableSet::new()),
            router_writers: parking_lot::Mutex::new(Some((quota_writer, namespace_writer))),
            #[cfg(feature = "metrics")]
            metrics: ControllerMetrics::new(),
        })
    }

    /// Starts the monitor, `workers` consumers per queue, the full-resync
    /// ticker and the discovery sync loop, then blocks until the stop
    /// signal and drains everything.
    pub async fn run(
        self: Arc<Self>,
        workers: usize,
        stop: CancellationToken,
    ) -> Result<(), Error> {
        println!("{}", "⚖️ Starting account quota controller...".green());

        let (quota_writer, namespace_writer) = self
            .router_writers
            .lock()
            .take()
            .ok_or_else(|| Error::UserInput("controller already running".to_string()))?;

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(
            self.clone().route_account_quotas(quota_writer, stop.clone()),
        ));
        tasks.push(tokio::spawn(
            self.clone().route_namespaces(namespace_writer, stop.clone()),
        ));

        if let Err(e) = self.wait_for_cache(&stop).await {
            for task in tasks {
                task.abort();
            }
            if stop.is_cancelled() {
                return Ok(());
            }
            return Err(e);
        }

        // Establish the initial monitor fleet before any worker starts.
        self.sync_quotable_resources().await;

        tasks.push(tokio::spawn({
            let monitor = self.monitor.clone();
            let stop = stop.clone();
            async move { monitor.run(stop).await }
        }));

        let mut worker_handles = Vec::new();
        for _ in 0..workers {
            worker_handles.push(tokio::spawn(
                self.clone().worker(self.primary.clone(), "primary"),
            ));
            worker_handles.push(tokio::spawn(
                self.clone().worker(self.priority.clone(), "priority"),
            ));
        }

        tasks.push(tokio::spawn({
            let controller = self.clone();
            let stop = stop.clone();
            async move { controller.full_resync_loop(stop).await }
        }));
        tasks.push(tokio::spawn({
            let controller = self.clone();
            let stop = stop.clone();
            async move { controller.discovery_sync_loop(stop).await }
        }));

        println!(
            "{}{}{}",
            "🚀 Account quota controller started • workers=".green(),
            format!("{}", workers).green().dimmed(),
            " per queue".green(),
        );

        stop.cancelled().await;
        println!("{}", "⚖️ Shutting down account quota controller...".red());
        self.primary.shut_down();
        self.priority.shut_down();
        for handle in worker_handles {
            handle.await.ok();
        }
        for task in tasks {
            task.await.ok();
        }
        println!("{}", "⚖️ Account quota controller stopped".red());
        Ok(())
    }

    async fn wait_for_cache(&self, stop: &CancellationToken) -> Result<(), Error> {
        let ready = async {
            self.quotas.wait_until_ready().await.ok();
            self.namespaces.wait_until_ready().await.ok();
        };
        tokio::select! {
            _ = stop.cancelled() => Err(Error::CacheSync),
            outcome = tokio::time::timeout(util::CACHE_SYNC_TIMEOUT, ready) => {
                outcome.map_err(|_| Error::CacheSync)
            }
        }
    }

    /// One tick of the discovery reconciliation described in the sync loop:
    /// probe, union on partial failure, reconfigure the monitor fleet under
    /// the write lock, then wait out cache warm-up with the lock released.
    async fn sync_quotable_resources(&self) {
        let result = (self.probe)().await;
        let previous = self.quotable.lock().clone();
        let Some(mut next) = discovery::fold_probe_result(&previous, result) else {
            return;
        };
        next.retain(|gvr, _| {
            !self
                .config
                .ignored_resources
                .contains(&gvr.group_resource())
        });
        if previous.keys().eq(next.keys()) {
            return;
        }
        let (added, removed) = discovery::diff(&previous, &next);
        println!(
            "{}{}{}{}",
            "🔭 Quotable resources changed • added=".color(FG1),
            format!("{}", added.len()).color(FG2),
            " removed=".color(FG1),
            format!("{}", removed.len()).color(FG2),
        );

        {
            let _exclusive = self.worker_lock.write().await;
            if let Err(e) = self.monitor.sync_monitors(&next) {
                eprintln!("{}", format!("failed to start some monitors: {e}").red());
            }
        }

        // Workers may resume against the new fleet while caches warm up;
        // holding the lock here would deadlock against in-flight API calls.
        let deadline = tokio::time::Instant::now() + self.config.discovery_sync_period;
        let mut poll = tokio::time::interval(Duration::from_millis(100));
        let synced = loop {
            if self.monitor.is_synced() {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            poll.tick().await;
        };
        if !synced {
            eprintln!(
                "{}",
                "⚠️ Timed out waiting for monitor caches; continuing with a partially synced fleet"
                    .yellow()
            );
        }

        *self.quotable.lock() = next;

        #[cfg(feature = "metrics")]
        self.metrics
            .monitor_count
            .set(self.monitor.monitor_count() as i64);
    }

    async fn discovery_sync_loop(self: Arc<Self>, stop: CancellationToken) {
        let period = self.config.discovery_sync_period;
        let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tick.tick() => self.sync_quotable_resources().await,
            }
        }
    }

    /// Re-enqueues every known account quota at the configured cadence.
    async fn full_resync_loop(self: Arc<Self>, stop: CancellationToken) {
        let period = self.config.resync_period;
        let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tick.tick() => {
                    for quota in self.quotas.state() {
                        if let Some(name) = quota.metadata.name.clone() {
                            self.primary.add(name);
                        }
                    }
                }
            }
        }
    }

    async fn route_account_quotas(
        self: Arc<Self>,
        writer: Writer<AccountQuota>,
        stop: CancellationToken,
    ) {
        let api = Api::<AccountQuota>::all(self.client.clone());
        let mut stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .boxed();
        // Hard limits last seen per quota; our own status writes come back
        // with an unchanged hard set and are dropped here.
        let mut known_hard: HashMap<String, UsedMap> = HashMap::new();
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                event = stream.next() => match event {
                    Some(Ok(watcher::Event::InitApply(quota) | watcher::Event::Apply(quota))) => {
                        let name = quota.name_any();
                        let hard = quota.spec.quota.hard.clone().unwrap_or_default();
                        let unchanged = known_hard
                            .get(&name)
                            .is_some_and(|prev| quantity::semantic_eq(prev, &hard));
                        if unchanged {
                            continue;
                        }
                        known_hard.insert(name.clone(), hard);
                        match aggregate::classify(&quota, &self.registry) {
                            EnqueueTarget::Priority => self.priority.add(name),
                            EnqueueTarget::Primary => self.primary.add(name),
                        }
                    }
                    Some(Ok(watcher::Event::Delete(quota))) => {
                        known_hard.remove(&quota.name_any());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => eprintln!("account quota watch error: {e}"),
                    None => break,
                }
            }
        }
    }

    async fn route_namespaces(
        self: Arc<Self>,
        writer: Writer<Namespace>,
        stop: CancellationToken,
    ) {
        let api = Api::<Namespace>::all(self.client.clone());
        let mut stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .boxed();
        let mut membership: HashMap<String, String> = HashMap::new();
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                event = stream.next() => match event {
                    Some(Ok(watcher::Event::InitApply(ns) | watcher::Event::Apply(ns))) => {
                        let account = account_of(&ns).unwrap_or_default().to_string();
                        let affected = membership_changed(&mut membership, ns.name_any(), account);
                        self.enqueue_accounts(&affected);
                    }
                    Some(Ok(watcher::Event::Delete(ns))) => {
                        let affected = membership_removed(&mut membership, &ns.name_any());
                        self.enqueue_accounts(&affected);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => eprintln!("namespace watch error: {e}"),
                    None => break,
                }
            }
        }
    }

    fn enqueue_accounts(&self, accounts: &[String]) {
        if accounts.is_empty() {
            return;
        }
        for quota in self.quotas.state() {
            if accounts.contains(&quota.spec.account)
                && let Some(name) = quota.metadata.name.clone()
            {
                self.primary.add(name);
            }
        }
    }

    async fn worker(self: Arc<Self>, queue: WorkQueue<String>, queue_name: &'static str) {
        while let Some(key) = queue.get().await {
            let started = Instant::now();
            let outcome = {
                // Shared with the other workers; exclusive to the sync loop.
                let _shared = self.worker_lock.read().await;
                AssertUnwindSafe(self.sync_account_quota(&key))
                    .catch_unwind()
                    .await
            };

            #[cfg(feature = "metrics")]
            self.metrics
                .reconcile_counter
                .with_label_values(&[queue_name])
                .inc();

            match outcome {
                Ok(Ok(())) => {
                    queue.forget(&key);
                    #[cfg(feature = "metrics")]
                    self.metrics
                        .sync_histogram
                        .with_label_values(&["ok"])
                        .observe(started.elapsed().as_secs_f64());
                }
                Ok(Err(e)) => {
                    eprintln!(
                        "{}",
                        format!("Failed to sync account quota '{key}': {e}").red()
                    );
                    #[cfg(feature = "metrics")]
                    self.metrics
                        .sync_histogram
                        .with_label_values(&["error"])
                        .observe(started.elapsed().as_secs_f64());
                    queue.add_rate_limited(key.clone());
                }
                Err(_) => {
                    // A panicking key is dropped rather than retried; the
                    // next resync picks it up again.
                    eprintln!(
                        "{}",
                        format!("Recovered from panic while syncing account quota '{key}'").red()
                    );
                }
            }
            if started.elapsed() > util::SLOW_SYNC_THRESHOLD {
                println!(
                    "⏱️ {}{}{}{}{}",
                    queue_name.color(FG1),
                    "/".color(FG1),
                    key.color(FG2),
                    " synced in ".color(FG1),
                    format!("{:.2?}", started.elapsed()).color(FG2),
                );
            }
            queue.done(&key);

            #[cfg(feature = "metrics")]
            self.metrics
                .queue_depth
                .with_label_values(&[queue_name])
                .set(queue.len() as i64);
        }
    }

    /// The sync procedure for one account quota key.
    async fn sync_account_quota(&self, key: &str) -> Result<(), Error> {
        // A missing object is an observed deletion; nothing to do.
        let Some(quota) = self.quotas.get(&ObjectRef::new(key)) else {
            return Ok(());
        };
        let quota = (*quota).clone();

        let hard = quota.spec.quota.hard.clone().unwrap_or_default();
        let hard_resources: BTreeSet<String> = hard.keys().cloned().collect();
        let scopes = quota.spec.quota.scopes.clone().unwrap_or_default();
        let scope_selector = quota.spec.quota.scope_selector.clone();

        let mut members: Vec<String> = self
            .namespaces
            .state()
            .iter()
            .filter(|ns| account_of(ns) == Some(quota.spec.account.as_str()))
            .filter_map(|ns| ns.metadata.name.clone())
            .collect();
        members.sort();

        let mut errors = Vec::new();
        let mut usages = Vec::with_capacity(members.len());
        for namespace in members {
            let mut fresh = UsedMap::new();
            for evaluator in self.registry.list() {
                match evaluator.usage(
                    self.monitor.as_ref(),
                    &namespace,
                    &hard_resources,
                    &scopes,
                    scope_selector.as_ref(),
                ) {
                    Ok(usage) => {
                        if let Err(e) = quantity::add_into(&mut fresh, &usage) {
                            errors.push(e);
                        }
                    }
                    Err(e) => errors.push(e),
                }
            }
            usages.push(NamespaceUsage { namespace, fresh });
        }

        let aggregated = aggregate::aggregate_status(quota.status.as_ref(), &hard, &usages)?;
        if aggregated.dirty {
            let status = aggregated.status;
            patch::update_status(
                self.client.clone(),
                &quota,
                move |s: &mut AccountQuotaStatus| {
                    s.total = status.total;
                    s.namespaces = status.namespaces;
                },
            )
            .await?;
        }
        Error::aggregate(errors)
    }
}

fn account_of(ns: &Namespace) -> Option<&str> {
    ns.metadata
        .labels
        .as_ref()?
        .get(labels::ACCOUNT)
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
}

/// Records a namespace's account and returns the accounts whose quotas must
/// be recalculated: old and new on a move, nothing when unchanged.
fn membership_changed(
    membership: &mut HashMap<String, String>,
    namespace: String,
    account: String,
) -> Vec<String> {
    let previous = membership.insert(namespace, account.clone());
    if previous.as_deref() == Some(account.as_str()) {
        return Vec::new();
    }
    let mut affected: Vec<String> = Vec::new();
    for candidate in [Some(account), previous].into_iter().flatten() {
        if !candidate.is_empty() && !affected.contains(&candidate) {
            affected.push(candidate);
        }
    }
    affected
}

fn membership_removed(membership: &mut HashMap<String, String>, namespace: &str) -> Vec<String> {
    match membership.remove(namespace) {
        Some(account) if !account.is_empty() => vec![account],
        _ => Vec::new(),
    }
}

/// Maps an object-level change back onto the quotas it affects: quotas of
/// the namespace's account whose hard set the changed kind can score. A
/// namespace-less change fans out to every account.
fn replenish(
    quotas: &Store<AccountQuota>,
    namespaces: &Store<Namespace>,
    registry: &Registry,
    primary: &WorkQueue<String>,
    change: &ResourceChange,
) {
    let Some(evaluator) = registry.get(&change.group_resource) else {
        return;
    };
    let account = match &change.namespace {
        Some(ns_name) => {
            let Some(ns) = namespaces.get(&ObjectRef::new(ns_name)) else {
                return;
            };
            match account_of(&ns) {
                Some(account) => Some(account.to_string()),
                // Namespaces outside any account never feed a quota.
                None => return,
            }
        }
        None => None,
    };
    for quota in quotas.state() {
        if let Some(account) = &account
            && quota.spec.account != *account
        {
            continue;
        }
        let hard: BTreeSet<String> = quota
            .spec
            .quota
            .hard
            .as_ref()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        if evaluator.matching_resources(&hard).is_empty() {
            continue;
        }
        if let Some(name) = quota.metadata.name.clone() {
            primary.add(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::AccountQuotaSpec;
    use k8s_openapi::api::core::v1::ResourceQuotaSpec;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn namespace(name: &str, account: Option<&str>) -> Namespace {
        let mut ns = Namespace::default();
        ns.metadata.name = Some(name.to_string());
        if let Some(account) = account {
            ns.metadata.labels =
                Some([(labels::ACCOUNT.to_string(), account.to_string())].into());
        }
        ns
    }

    fn account_quota(name: &str, account: &str, hard: &[(&str, &str)]) -> AccountQuota {
        AccountQuota::new(
            name,
            AccountQuotaSpec {
                account: account.to_string(),
                quota: ResourceQuotaSpec {
                    hard: Some(
                        hard.iter()
                            .map(|(r, v)| (r.to_string(), Quantity(v.to_string())))
                            .collect(),
                    ),
                    ..Default::default()
                },
            },
        )
    }

    fn store_with_quotas(quotas: &[AccountQuota]) -> Store<AccountQuota> {
        let mut writer = Writer::<AccountQuota>::default();
        for quota in quotas {
            writer.apply_watcher_event(&watcher::Event::Apply(quota.clone()));
        }
        writer.as_reader()
    }

    fn store_with_namespaces(namespaces: &[Namespace]) -> Store<Namespace> {
        let mut writer = Writer::<Namespace>::default();
        for ns in namespaces {
            writer.apply_watcher_event(&watcher::Event::Apply(ns.clone()));
        }
        writer.as_reader()
    }

    #[test]
    fn account_label_must_be_non_empty() {
        assert_eq!(account_of(&namespace("n", Some("a"))), Some("a"));
        assert_eq!(account_of(&namespace("n", Some(""))), None);
        assert_eq!(account_of(&namespace("n", None)), None);
    }

    #[test]
    fn membership_move_affects_both_accounts() {
        let mut membership = HashMap::new();
        assert_eq!(
            membership_changed(&mut membership, "n".to_string(), "a".to_string()),
            vec!["a".to_string()]
        );
        // Unchanged account is filtered out entirely.
        assert!(membership_changed(&mut membership, "n".to_string(), "a".to_string()).is_empty());
        // Reassignment touches the new and the old account.
        let affected = membership_changed(&mut membership, "n".to_string(), "b".to_string());
        assert!(affected.contains(&"a".to_string()));
        assert!(affected.contains(&"b".to_string()));
    }

    #[test]
    fn membership_removal_affects_the_old_account() {
        let mut membership = HashMap::new();
        membership_changed(&mut membership, "n".to_string(), "a".to_string());
        assert_eq!(membership_removed(&mut membership, "n"), vec!["a".to_string()]);
        assert!(membership_removed(&mut membership, "n").is_empty());
    }

    #[test]
    fn losing_the_account_label_affects_only_the_old_account() {
        let mut membership = HashMap::new();
        membership_changed(&mut membership, "n".to_string(), "a".to_string());
        assert_eq!(
            membership_changed(&mut membership, "n".to_string(), String::new()),
            vec!["a".to_string()]
        );
    }

    #[tokio::test]
    async fn replenishment_enqueues_quotas_of_the_changed_namespace() {
        let quotas = store_with_quotas(&[
            account_quota("q-a", "a", &[("pods", "10")]),
            account_quota("q-b", "b", &[("pods", "5")]),
        ]);
        let namespaces = store_with_namespaces(&[namespace("n", Some("a"))]);
        let registry = Registry::core();
        let primary: WorkQueue<String> = WorkQueue::new();

        replenish(
            &quotas,
            &namespaces,
            &registry,
            &primary,
            &ResourceChange {
                group_resource: GroupResource::new("", "pods"),
                namespace: Some("n".to_string()),
            },
        );
        assert_eq!(primary.len(), 1);
        assert_eq!(primary.get().await.unwrap(), "q-a");
    }

    #[tokio::test]
    async fn replenishment_skips_quotas_that_do_not_score_the_kind() {
        let quotas = store_with_quotas(&[account_quota("q-a", "a", &[("pods", "10")])]);
        let namespaces = store_with_namespaces(&[namespace("n", Some("a"))]);
        let registry = Registry::core();
        let primary: WorkQueue<String> = WorkQueue::new();

        replenish(
            &quotas,
            &namespaces,
            &registry,
            &primary,
            &ResourceChange {
                group_resource: GroupResource::new("", "secrets"),
                namespace: Some("n".to_string()),
            },
        );
        assert_eq!(primary.len(), 0);
    }

    #[tokio::test]
    async fn namespace_wide_nudge_fans_out_to_every_account() {
        let quotas = store_with_quotas(&[
            account_quota("q-a", "a", &[("pods", "10")]),
            account_quota("q-b", "b", &[("pods", "5")]),
            account_quota("q-c", "c", &[("services", "5")]),
        ]);
        let namespaces = store_with_namespaces(&[]);
        let registry = Registry::core();
        let primary: WorkQueue<String> = WorkQueue::new();

        replenish(
            &quotas,
            &namespaces,
            &registry,
            &primary,
            &ResourceChange {
                group_resource: GroupResource::new("", "pods"),
                namespace: None,
            },
        );
        // Only the two pod-scoring quotas, regardless of account.
        assert_eq!(primary.len(), 2);
    }

    #[tokio::test]
    async fn replenishment_ignores_accountless_namespaces() {
        let quotas = store_with_quotas(&[account_quota("q-a", "a", &[("pods", "10")])]);
        let namespaces = store_with_namespaces(&[namespace("n", None)]);
        let registry = Registry::core();
        let primary: WorkQueue<String> = WorkQueue::new();

        replenish(
            &quotas,
            &namespaces,
            &registry,
            &primary,
            &ResourceChange {
                group_resource: GroupResource::new("", "pods"),
                namespace: Some("n".to_string()),
            },
        );
        assert_eq!(primary.len(), 0);
    }
}
