mod quotas;
mod util;

use std::collections::HashSet;
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use quotas::controller::{AccountQuotaController, ControllerConfig};
use quotas::discovery::{self, GroupResource};
use quotas::registry::Registry;
use util::Error;

const LEASE_NAME: &str = "arbor-quota-operator-lock";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug, Clone)]
#[command(name = "arbor-quota-operator")]
struct Args {
    /// Full recalculation cadence for every account quota (e.g. "5m")
    #[arg(long, env = "RESYNC_PERIOD", default_value = "5m")]
    resync_period: String,

    /// Per-monitor replenishment cadence (e.g. "12h")
    #[arg(long, env = "REPLENISHMENT_RESYNC_PERIOD", default_value = "12h")]
    replenishment_resync_period: String,

    /// Discovery re-probe cadence (e.g. "30s")
    #[arg(long, env = "DISCOVERY_SYNC_PERIOD", default_value = "30s")]
    discovery_sync_period: String,

    /// Worker count per work queue
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    workers: usize,

    /// Extra comma-separated resource[.group] names never monitored
    #[arg(long, env = "IGNORED_RESOURCES", default_value = "")]
    ignored_resources: String,

    /// Port for the metrics/health endpoint; disabled when unset
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    fn controller_config(&self) -> Result<ControllerConfig, Error> {
        let mut ignored: HashSet<GroupResource> = discovery::default_ignored();
        for name in self.ignored_resources.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let (resource, group) = name.split_once('.').unwrap_or((name, ""));
            ignored.insert(GroupResource::new(group, resource));
        }
        Ok(ControllerConfig {
            resync_period: parse_duration::parse(&self.resync_period)?,
            replenishment_resync_period: parse_duration::parse(&self.replenishment_resync_period)?,
            discovery_sync_period: parse_duration::parse(&self.discovery_sync_period)?,
            ignored_resources: ignored,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    arbor_common::init();
    let args = Args::parse();
    let config = args.controller_config()?;

    let client = Client::try_default().await?;

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        arbor_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });

    #[cfg(feature = "metrics")]
    if let Some(port) = args.metrics_port {
        tokio::spawn(util::metrics::serve(port, shutdown.clone()));
    }

    let leadership = lease_lock(client.clone());
    let registry = Arc::new(Registry::core());
    let probe = discovery::cluster_probe(client.clone());
    let workers = args.workers;

    arbor_common::signal_ready();
    println!("{}", "🌱 Starting account quota operator...".green());

    // Replicas cycle between standby and leading. The controller only ever
    // runs while this replica's Lease renewals keep succeeding; any loss of
    // the lock tears it down and sends us back to standby with fresh state.
    loop {
        if !acquire_leadership(&leadership, &shutdown).await {
            break;
        }
        println!(
            "{}",
            "👑 Won the leadership lease; starting controller".green()
        );

        let stop = shutdown.child_token();
        let controller = AccountQuotaController::new(
            client.clone(),
            registry.clone(),
            probe.clone(),
            config.clone(),
        );
        let handle = tokio::spawn({
            let stop = stop.clone();
            async move {
                if let Err(e) = controller.run(workers, stop).await {
                    eprintln!("{}", format!("controller exited with error: {e}").red());
                }
            }
        });

        hold_leadership(&leadership, &shutdown).await;
        stop.cancel();
        handle.await.ok();

        if shutdown.is_cancelled() {
            break;
        }
        println!(
            "{}",
            "🔒 Leadership lost; controller stopped, back to standby".yellow()
        );
    }
    Ok(())
}

fn lease_lock(client: Client) -> LeaseLock {
    // The Lease lives in our own namespace so its RBAC stays namespaced.
    let namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    // POD_NAME from the Downward API gives a stable per-replica identity;
    // hostname or a random id cover local runs.
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("arbor-quota-operator-{}", uuid::Uuid::new_v4()));
    LeaseLock::new(
        client,
        &namespace,
        LeaseLockParams {
            holder_id,
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: LEASE_TTL,
        },
    )
}

/// Standby phase: polls the Lease until this replica wins it. Returns false
/// when shutdown arrives first.
async fn acquire_leadership(leadership: &LeaseLock, shutdown: &CancellationToken) -> bool {
    loop {
        match leadership.try_acquire_or_renew().await {
            Ok(LeaseLockResult::Acquired(_)) => return true,
            Ok(_) => {}
            Err(e) => eprintln!("{}", format!("lease acquisition failed: {e}").yellow()),
        }
        tokio::select! {
            _ = shutdown.cancelled() => return false,
            _ = tokio::time::sleep(LEASE_POLL_INTERVAL) => {}
        }
    }
}

/// Leading phase: keeps renewing the held Lease. Returns when a renewal
/// fails, the lock turns up under another holder, or shutdown arrives. An
/// apiserver we cannot renew against means we must assume we are no longer
/// safe to lead.
async fn hold_leadership(leadership: &LeaseLock, shutdown: &CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(LEASE_POLL_INTERVAL) => {}
        }
        match leadership.try_acquire_or_renew().await {
            Ok(LeaseLockResult::Acquired(_)) => {}
            Ok(_) => {
                eprintln!("{}", "lease renewed under another holder".yellow());
                return;
            }
            Err(e) => {
                eprintln!("{}", format!("lease renewal failed: {e}").yellow());
                return;
            }
        }
    }
}
