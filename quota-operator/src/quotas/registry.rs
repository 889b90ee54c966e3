//! Usage evaluators.
//!
//! An evaluator knows how to score one resource kind: which quota resource
//! names it can account for, and how much of each a namespace currently
//! uses. Evaluators read cached objects through the [`ObjectSource`] seam so
//! tests can feed them fixtures and production wires the quota monitor in.

use std::collections::BTreeSet;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Container, Pod, ScopeSelector, ScopedResourceSelectorRequirement};
use kube::api::DynamicObject;

use super::discovery::GroupResource;
use super::quantity::{self, Parsed, UsedMap};
use crate::util::Error;

/// Read access to the cached objects of a monitored kind. Returns `None`
/// when the kind has no live monitor.
pub trait ObjectSource: Send + Sync {
    fn namespaced_objects(
        &self,
        group_resource: &GroupResource,
        namespace: &str,
    ) -> Option<Vec<Arc<DynamicObject>>>;
}

pub trait Evaluator: Send + Sync {
    /// The kind this evaluator scores.
    fn group_resource(&self) -> GroupResource;

    /// Intersection of declared resource names and what this evaluator can
    /// account for.
    fn matching_resources(&self, names: &BTreeSet<String>) -> BTreeSet<String>;

    /// Usage within a namespace, restricted to the declared hard set and
    /// filtered by the quota's scopes.
    fn usage(
        &self,
        source: &dyn ObjectSource,
        namespace: &str,
        hard: &BTreeSet<String>,
        scopes: &[String],
        scope_selector: Option<&ScopeSelector>,
    ) -> Result<UsedMap, Error>;
}

/// Immutable evaluator registry, keyed by group/resource.
pub struct Registry {
    evaluators: Vec<Arc<dyn Evaluator>>,
}

impl Registry {
    /// The built-in evaluator set: pods with full compute accounting, plus
    /// object counts for the core collection kinds.
    pub fn core() -> Self {
        let mut evaluators: Vec<Arc<dyn Evaluator>> = vec![Arc::new(PodEvaluator)];
        for resource in [
            "services",
            "secrets",
            "configmaps",
            "persistentvolumeclaims",
            "replicationcontrollers",
            "resourcequotas",
        ] {
            evaluators.push(Arc::new(ObjectCountEvaluator::new(
                GroupResource::new("", resource),
                Some(resource),
            )));
        }
        Self { evaluators }
    }

    pub fn list(&self) -> &[Arc<dyn Evaluator>] {
        &self.evaluators
    }

    pub fn get(&self, group_resource: &GroupResource) -> Option<&Arc<dyn Evaluator>> {
        self.evaluators
            .iter()
            .find(|e| e.group_resource() == *group_resource)
    }

    /// Whether any evaluator can account for the given resource name.
    pub fn claims(&self, resource_name: &str) -> bool {
        let names: BTreeSet<String> = [resource_name.to_string()].into();
        self.evaluators
            .iter()
            .any(|e| !e.matching_resources(&names).is_empty())
    }
}

/// Scores `pods`, `count/pods` and the compute resources requested or
/// limited by non-terminal pods.
pub struct PodEvaluator;

const POD_RESOURCES: &[&str] = &[
    "pods",
    "count/pods",
    "requests.cpu",
    "requests.memory",
    "limits.cpu",
    "limits.memory",
];

impl Evaluator for PodEvaluator {
    fn group_resource(&self) -> GroupResource {
        GroupResource::new("", "pods")
    }

    fn matching_resources(&self, names: &BTreeSet<String>) -> BTreeSet<String> {
        names
            .iter()
            .filter(|n| POD_RESOURCES.contains(&n.as_str()))
            .cloned()
            .collect()
    }

    fn usage(
        &self,
        source: &dyn ObjectSource,
        namespace: &str,
        hard: &BTreeSet<String>,
        scopes: &[String],
        scope_selector: Option<&ScopeSelector>,
    ) -> Result<UsedMap, Error> {
        let matched = self.matching_resources(hard);
        if matched.is_empty() {
            return Ok(UsedMap::new());
        }
        let group_resource = self.group_resource();
        let objects = source
            .namespaced_objects(&group_resource, namespace)
            .ok_or(Error::UnwatchedResource(group_resource))?;

        let mut pod_count = Parsed::zero();
        let mut compute: Vec<(&str, Parsed)> = [
            "requests.cpu",
            "requests.memory",
            "limits.cpu",
            "limits.memory",
        ]
        .iter()
        .map(|r| (*r, Parsed::zero()))
        .collect();

        for object in objects {
            // A cached object that does not decode as a Pod is dropped, not
            // retried; retrying cannot fix it.
            let pod: Pod = match serde_json::to_value(&*object)
                .and_then(serde_json::from_value)
            {
                Ok(pod) => pod,
                Err(e) => {
                    eprintln!("dropping malformed cached pod in '{namespace}': {e}");
                    continue;
                }
            };
            if is_terminal(&pod) || !matches_scopes(&pod, scopes, scope_selector) {
                continue;
            }
            pod_count = pod_count.add(&Parsed::from_integer(1));
            for (resource, total) in compute.iter_mut() {
                *total = total.add(&effective_pod_amount(&pod, *resource)?);
            }
        }

        let mut used = UsedMap::new();
        for name in &matched {
            let amount = match name.as_str() {
                "pods" | "count/pods" => pod_count,
                other => compute
                    .iter()
                    .find(|(r, _)| *r == other)
                    .map(|(_, total)| *total)
                    .unwrap_or_else(Parsed::zero),
            };
            used.insert(name.clone(), amount.to_quantity());
        }
        Ok(used)
    }
}

/// A pod's effective request or limit for one compute resource: the maximum
/// of the regular containers' sum and the largest init container.
fn effective_pod_amount(pod: &Pod, resource: &str) -> Result<Parsed, Error> {
    let (kind, name) = resource.split_once('.').unwrap_or(("requests", resource));
    let Some(spec) = pod.spec.as_ref() else {
        return Ok(Parsed::zero());
    };

    let amount_of = |c: &Container| -> Result<Parsed, Error> {
        let requirements = c.resources.as_ref();
        let map = match kind {
            "requests" => requirements.and_then(|r| r.requests.as_ref()),
            _ => requirements.and_then(|r| r.limits.as_ref()),
        };
        match map.and_then(|m| m.get(name)) {
            Some(q) => quantity::parse(q),
            None => Ok(Parsed::zero()),
        }
    };

    let mut total = Parsed::zero();
    for container in &spec.containers {
        total = total.add(&amount_of(container)?);
    }
    for container in spec.init_containers.iter().flatten() {
        total = total.max(amount_of(container)?);
    }
    Ok(total)
}

fn is_terminal(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

fn is_best_effort(pod: &Pod) -> bool {
    let Some(spec) = pod.spec.as_ref() else {
        return true;
    };
    spec.containers
        .iter()
        .chain(spec.init_containers.iter().flatten())
        .all(|c| {
            c.resources.as_ref().is_none_or(|r| {
                r.requests.as_ref().is_none_or(|m| m.is_empty())
                    && r.limits.as_ref().is_none_or(|m| m.is_empty())
            })
        })
}

fn matches_scopes(pod: &Pod, scopes: &[String], selector: Option<&ScopeSelector>) -> bool {
    if !scopes.iter().all(|s| matches_scope(pod, s)) {
        return false;
    }
    let Some(selector) = selector else {
        return true;
    };
    selector
        .match_expressions
        .iter()
        .flatten()
        .all(|expr| matches_expression(pod, expr))
}

fn matches_scope(pod: &Pod, scope: &str) -> bool {
    let spec = pod.spec.as_ref();
    match scope {
        "Terminating" => spec.is_some_and(|s| s.active_deadline_seconds.is_some()),
        "NotTerminating" => spec.is_none_or(|s| s.active_deadline_seconds.is_none()),
        "BestEffort" => is_best_effort(pod),
        "NotBestEffort" => !is_best_effort(pod),
        "PriorityClass" => spec.is_some_and(|s| s.priority_class_name.is_some()),
        _ => false,
    }
}

fn matches_expression(pod: &Pod, expr: &ScopedResourceSelectorRequirement) -> bool {
    if expr.scope_name != "PriorityClass" {
        return matches_scope(pod, &expr.scope_name);
    }
    let priority_class = pod
        .spec
        .as_ref()
        .and_then(|s| s.priority_class_name.as_deref());
    let values = expr.values.as_deref().unwrap_or_default();
    match expr.operator.as_str() {
        "In" => priority_class.is_some_and(|pc| values.iter().any(|v| v == pc)),
        "NotIn" => priority_class.is_none_or(|pc| !values.iter().any(|v| v == pc)),
        "Exists" => priority_class.is_some(),
        "DoesNotExist" => priority_class.is_none(),
        _ => false,
    }
}

/// Counts cached objects of one kind: `count/<resource>[.<group>]` plus an
/// optional legacy core name such as `services`.
pub struct ObjectCountEvaluator {
    group_resource: GroupResource,
    names: Vec<String>,
}

impl ObjectCountEvaluator {
    pub fn new(group_resource: GroupResource, legacy_name: Option<&str>) -> Self {
        let mut names = vec![format!("count/{}", group_resource)];
        if let Some(legacy) = legacy_name {
            names.push(legacy.to_string());
        }
        Self {
            group_resource,
            names,
        }
    }
}

impl Evaluator for ObjectCountEvaluator {
    fn group_resource(&self) -> GroupResource {
        self.group_resource.clone()
    }

    fn matching_resources(&self, names: &BTreeSet<String>) -> BTreeSet<String> {
        names
            .iter()
            .filter(|n| self.names.iter().any(|mine| mine == *n))
            .cloned()
            .collect()
    }

    fn usage(
        &self,
        source: &dyn ObjectSource,
        namespace: &str,
        hard: &BTreeSet<String>,
        _scopes: &[String],
        _scope_selector: Option<&ScopeSelector>,
    ) -> Result<UsedMap, Error> {
        let matched = self.matching_resources(hard);
        if matched.is_empty() {
            return Ok(UsedMap::new());
        }
        let objects = source
            .namespaced_objects(&self.group_resource, namespace)
            .ok_or_else(|| Error::UnwatchedResource(self.group_resource.clone()))?;
        let count = k8s_openapi::apimachinery::pkg::api::resource::Quantity(
            objects.len().to_string(),
        );
        Ok(matched.into_iter().map(|name| (name, count.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::HashMap;

    struct FakeSource {
        objects: HashMap<(GroupResource, String), Vec<Arc<DynamicObject>>>,
    }

    impl ObjectSource for FakeSource {
        fn namespaced_objects(
            &self,
            group_resource: &GroupResource,
            namespace: &str,
        ) -> Option<Vec<Arc<DynamicObject>>> {
            self.objects
                .get(&(group_resource.clone(), namespace.to_string()))
                .cloned()
        }
    }

    fn dynamic_pod(name: &str, json: serde_json::Value) -> Arc<DynamicObject> {
        let mut value = json;
        value["apiVersion"] = "v1".into();
        value["kind"] = "Pod".into();
        value["metadata"] = serde_json::json!({"name": name, "namespace": "team-a"});
        Arc::new(serde_json::from_value(value).unwrap())
    }

    fn source_with_pods(pods: Vec<Arc<DynamicObject>>) -> FakeSource {
        FakeSource {
            objects: [((GroupResource::new("", "pods"), "team-a".to_string()), pods)].into(),
        }
    }

    fn hard(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn pod_evaluator_counts_non_terminal_pods() {
        let source = source_with_pods(vec![
            dynamic_pod("running", serde_json::json!({"status": {"phase": "Running"}})),
            dynamic_pod("pending", serde_json::json!({"status": {"phase": "Pending"}})),
            dynamic_pod("done", serde_json::json!({"status": {"phase": "Succeeded"}})),
        ]);
        let used = PodEvaluator
            .usage(&source, "team-a", &hard(&["pods"]), &[], None)
            .unwrap();
        assert_eq!(used.get("pods").unwrap().0, "2");
    }

    #[test]
    fn pod_evaluator_sums_compute_requests() {
        let pod = |name: &str, cpu: &str| {
            dynamic_pod(
                name,
                serde_json::json!({
                    "spec": {"containers": [
                        {"name": "main", "resources": {"requests": {"cpu": cpu, "memory": "128Mi"}}}
                    ]},
                    "status": {"phase": "Running"}
                }),
            )
        };
        let source = source_with_pods(vec![pod("a", "100m"), pod("b", "200m")]);
        let used = PodEvaluator
            .usage(
                &source,
                "team-a",
                &hard(&["requests.cpu", "requests.memory", "pods"]),
                &[],
                None,
            )
            .unwrap();
        assert_eq!(used.get("requests.cpu").unwrap().0, "300m");
        assert_eq!(used.get("requests.memory").unwrap().0, "256Mi");
        assert_eq!(used.get("pods").unwrap().0, "2");
    }

    #[test]
    fn init_containers_raise_the_effective_request() {
        let source = source_with_pods(vec![dynamic_pod(
            "a",
            serde_json::json!({
                "spec": {
                    "containers": [
                        {"name": "main", "resources": {"requests": {"cpu": "100m"}}}
                    ],
                    "initContainers": [
                        {"name": "init", "resources": {"requests": {"cpu": "1"}}}
                    ]
                },
                "status": {"phase": "Running"}
            }),
        )]);
        let used = PodEvaluator
            .usage(&source, "team-a", &hard(&["requests.cpu"]), &[], None)
            .unwrap();
        assert_eq!(used.get("requests.cpu").unwrap().0, "1");
    }

    #[test]
    fn usage_is_restricted_to_the_hard_set() {
        let source = source_with_pods(vec![dynamic_pod(
            "a",
            serde_json::json!({"status": {"phase": "Running"}}),
        )]);
        let used = PodEvaluator
            .usage(&source, "team-a", &hard(&["pods", "services"]), &[], None)
            .unwrap();
        assert_eq!(used.len(), 1);
        assert!(used.contains_key("pods"));
    }

    #[test]
    fn best_effort_scope_filters_pods_with_requests() {
        let best_effort = dynamic_pod("be", serde_json::json!({"status": {"phase": "Running"}}));
        let burstable = dynamic_pod(
            "bu",
            serde_json::json!({
                "spec": {"containers": [
                    {"name": "main", "resources": {"requests": {"cpu": "100m"}}}
                ]},
                "status": {"phase": "Running"}
            }),
        );
        let source = source_with_pods(vec![best_effort, burstable]);
        let scopes = vec!["BestEffort".to_string()];
        let used = PodEvaluator
            .usage(&source, "team-a", &hard(&["pods"]), &scopes, None)
            .unwrap();
        assert_eq!(used.get("pods").unwrap().0, "1");
    }

    #[test]
    fn priority_class_selector_matches_in_operator() {
        let high = dynamic_pod(
            "high",
            serde_json::json!({
                "spec": {"priorityClassName": "high", "containers": []},
                "status": {"phase": "Running"}
            }),
        );
        let low = dynamic_pod(
            "low",
            serde_json::json!({
                "spec": {"priorityClassName": "low", "containers": []},
                "status": {"phase": "Running"}
            }),
        );
        let source = source_with_pods(vec![high, low]);
        let selector = ScopeSelector {
            match_expressions: Some(vec![ScopedResourceSelectorRequirement {
                operator: "In".to_string(),
                scope_name: "PriorityClass".to_string(),
                values: Some(vec!["high".to_string()]),
            }]),
        };
        let used = PodEvaluator
            .usage(&source, "team-a", &hard(&["pods"]), &[], Some(&selector))
            .unwrap();
        assert_eq!(used.get("pods").unwrap().0, "1");
    }

    #[test]
    fn missing_monitor_is_an_error() {
        let source = FakeSource {
            objects: HashMap::new(),
        };
        let err = PodEvaluator
            .usage(&source, "team-a", &hard(&["pods"]), &[], None)
            .unwrap_err();
        assert!(matches!(err, Error::UnwatchedResource(_)));
    }

    #[test]
    fn object_count_evaluator_scores_legacy_and_count_names() {
        let gr = GroupResource::new("", "services");
        let evaluator = ObjectCountEvaluator::new(gr.clone(), Some("services"));
        let svc = Arc::new(
            serde_json::from_value::<DynamicObject>(serde_json::json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": {"name": "svc", "namespace": "team-a"}
            }))
            .unwrap(),
        );
        let source = FakeSource {
            objects: [((gr, "team-a".to_string()), vec![svc])].into(),
        };
        let used = evaluator
            .usage(
                &source,
                "team-a",
                &hard(&["services", "count/services", "pods"]),
                &[],
                None,
            )
            .unwrap();
        assert_eq!(used.get("services").unwrap().0, "1");
        assert_eq!(used.get("count/services").unwrap().0, "1");
        assert!(!used.contains_key("pods"));
    }

    #[test]
    fn registry_claims_known_resource_names() {
        let registry = Registry::core();
        assert!(registry.claims("pods"));
        assert!(registry.claims("requests.cpu"));
        assert!(registry.claims("count/secrets"));
        assert!(!registry.claims("count/widgets.example.com"));
        assert!(registry.get(&GroupResource::new("", "pods")).is_some());
        assert!(registry.get(&GroupResource::new("apps", "deployments")).is_none());
    }

    #[test]
    fn quantity_comparison_treats_equal_values_as_equal() {
        let a: UsedMap = [("requests.cpu".to_string(), Quantity("0.1".to_string()))].into();
        let b: UsedMap = [("requests.cpu".to_string(), Quantity("100m".to_string()))].into();
        assert!(quantity::semantic_eq(&a, &b));
    }
}
