use std::time::Duration;

#[cfg(feature = "metrics")]
pub mod metrics;
pub mod patch;

pub(crate) mod colors;

mod error;

pub use error::*;

/// Default cadence for re-enqueueing every account quota.
pub(crate) const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Default cadence for per-monitor replenishment nudges.
pub(crate) const DEFAULT_REPLENISHMENT_RESYNC_PERIOD: Duration = Duration::from_secs(12 * 60 * 60);

/// Default cadence for re-probing server discovery.
pub(crate) const DEFAULT_DISCOVERY_SYNC_PERIOD: Duration = Duration::from_secs(30);

/// A reconcile slower than this gets its timing logged.
pub(crate) const SLOW_SYNC_THRESHOLD: Duration = Duration::from_secs(1);

/// How long startup waits for the quota and namespace caches.
pub(crate) const CACHE_SYNC_TIMEOUT: Duration = Duration::from_secs(60);
