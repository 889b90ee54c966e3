//! Pure arithmetic of a quota reconcile.
//!
//! The controller gathers per-namespace evaluator output and hands it here;
//! this module owns seeding from the previous status, masking to the
//! declared hard set, totalling, and the dirty decision. Keeping it free of
//! I/O lets the reconcile semantics be tested exhaustively.

use arbor_types::{AccountQuota, AccountQuotaNamespaceStatus, AccountQuotaStatus};
use k8s_openapi::api::core::v1::ResourceQuotaStatus;
use std::collections::BTreeSet;

use super::quantity::{self, UsedMap};
use super::registry::Registry;
use crate::util::Error;

/// Fresh evaluator output for one namespace of the account.
pub struct NamespaceUsage {
    pub namespace: String,
    pub fresh: UsedMap,
}

pub struct Aggregated {
    pub status: AccountQuotaStatus,
    /// Whether the derived status differs from the server's and must be
    /// written back.
    pub dirty: bool,
}

/// Builds the new status from the previous one and fresh per-namespace
/// usage, in namespace list order.
///
/// Each namespace's used-map is seeded from its previous status entry so
/// resources the current evaluator set no longer scores survive, then
/// overlaid with fresh output and masked down to the declared hard set.
/// Resources never declared hard do not appear anywhere in the result.
pub fn aggregate_status(
    previous: Option<&AccountQuotaStatus>,
    hard: &UsedMap,
    usages: &[NamespaceUsage],
) -> Result<Aggregated, Error> {
    let hard_resources: BTreeSet<String> = hard.keys().cloned().collect();

    let mut total = quantity::zero_filled(&hard_resources);
    let mut namespaces = Vec::with_capacity(usages.len());
    for usage in usages {
        let mut used = previous
            .and_then(|s| {
                s.namespaces
                    .iter()
                    .find(|entry| entry.namespace == usage.namespace)
            })
            .map(|entry| entry.used.clone())
            .unwrap_or_default();
        for (resource, amount) in &usage.fresh {
            used.insert(resource.clone(), amount.clone());
        }
        let used = quantity::mask(&used, &hard_resources);
        quantity::add_into(&mut total, &used)?;
        namespaces.push(AccountQuotaNamespaceStatus {
            namespace: usage.namespace.clone(),
            used,
        });
    }

    let dirty = match previous {
        None => true,
        Some(prev) => {
            let prev_hard = prev.total.hard.clone().unwrap_or_default();
            let prev_used = prev.total.used.clone().unwrap_or_default();
            !quantity::semantic_eq(&prev_hard, hard) || !quantity::semantic_eq(&prev_used, &total)
        }
    };

    Ok(Aggregated {
        status: AccountQuotaStatus {
            total: ResourceQuotaStatus {
                hard: Some(hard.clone()),
                used: Some(total),
            },
            namespaces,
            last_updated: previous.and_then(|prev| prev.last_updated.clone()),
        },
        dirty,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueTarget {
    /// The missing-usage queue, front-loading quotas without a first status.
    Priority,
    Primary,
}

/// Which queue an observed `AccountQuota` belongs on.
pub fn classify(quota: &AccountQuota, registry: &Registry) -> EnqueueTarget {
    let hard = quota.spec.quota.hard.clone().unwrap_or_default();
    let Some(status) = quota.status.as_ref() else {
        return EnqueueTarget::Priority;
    };
    let status_hard = status.total.hard.clone().unwrap_or_default();
    if !quantity::semantic_eq(&hard, &status_hard) {
        return EnqueueTarget::Priority;
    }
    let used = status.total.used.clone().unwrap_or_default();
    for resource in hard.keys() {
        if !used.contains_key(resource) && registry.claims(resource) {
            return EnqueueTarget::Priority;
        }
    }
    EnqueueTarget::Primary
}
