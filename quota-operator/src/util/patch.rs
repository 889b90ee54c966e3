use arbor_types::*;
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, jiff::Timestamp};
use kube::{
    Api, Client,
    api::{PostParams, Resource},
    core::ClusterResourceScope,
};
use serde::{Serialize, de::DeserializeOwned};
use std::{clone::Clone, fmt::Debug};

use super::Error;

pub trait Object<S: Status> {
    /// Returns a mutable reference to the status object, initializing
    /// it with the default value if it does not exist.
    fn mut_status(&mut self) -> &mut S;
}

pub trait Status {
    /// Sets the last updated timestamp to the given value.
    fn set_last_updated(&mut self, last_updated: Time);
}

impl Object<AccountQuotaStatus> for AccountQuota {
    fn mut_status(&mut self) -> &mut AccountQuotaStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl Status for AccountQuotaStatus {
    fn set_last_updated(&mut self, last_updated: Time) {
        self.last_updated = Some(last_updated);
    }
}

/// Replaces the resource's status subresource after applying the provided
/// function to it. The write carries the cached object's resourceVersion, so
/// a concurrent writer surfaces as a 409 and the caller re-enqueues.
pub async fn update_status<S: Status, T>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource
        + Object<S>
        + Serialize
        + DeserializeOwned
        + Debug
        + Resource<Scope = ClusterResourceScope>,
{
    let mut modified = instance.clone();
    let status = modified.mut_status();
    f(status);
    status.set_last_updated(Time::from(Timestamp::now()));
    let name = instance
        .meta()
        .name
        .as_deref()
        .ok_or_else(|| Error::UserInput("resource is missing metadata.name".to_string()))?;
    let api: Api<T> = Api::all(client);
    Ok(api
        .replace_status(name, &PostParams::default(), &modified)
        .await?)
}
