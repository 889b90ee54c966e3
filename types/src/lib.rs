use k8s_openapi::api::core::v1::{ResourceQuotaSpec, ResourceQuotaStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster-scoped declaration of hard resource limits for the union of
/// namespaces belonging to one account.
///
/// The quota block reuses the upstream `ResourceQuotaSpec`, so `hard`,
/// `scopes` and `scopeSelector` carry the exact semantics of a namespaced
/// `ResourceQuota`, applied account-wide.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "tenancy.arbor.dev",
    version = "v1",
    kind = "AccountQuota",
    plural = "accountquotas",
    derive = "PartialEq",
    status = "AccountQuotaStatus"
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.account\", \"name\": \"ACCOUNT\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.lastUpdated\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct AccountQuotaSpec {
    /// Name of the account whose namespaces are aggregated.
    pub account: String,

    /// Hard limits and scope filters, shared with the core ResourceQuota type.
    #[serde(default)]
    pub quota: ResourceQuotaSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct AccountQuotaStatus {
    /// Aggregated hard limits and usage across all of the account's namespaces.
    #[serde(default)]
    pub total: ResourceQuotaStatus,

    /// Per-namespace usage, in namespace list order.
    #[serde(default)]
    pub namespaces: Vec<AccountQuotaNamespaceStatus>,

    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<Time>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct AccountQuotaNamespaceStatus {
    pub namespace: String,

    /// Usage inside this namespace, masked to the declared hard resources.
    #[serde(default)]
    pub used: std::collections::BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>,
}
