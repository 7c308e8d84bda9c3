//! Content hash propagation between resources
//!
//! A resource annotated with
//!
//! ```yaml
//! metadata:
//!   annotations:
//!     kpt.seek.com/hash-dependency/config: ConfigMap/app-config
//! ```
//!
//! receives a `ConfigMap/app-config: <sha256>` annotation holding the digest of
//! the matching ConfigMap in the same namespace. Controllers (Deployment,
//! DaemonSet, ReplicaSet, StatefulSet) are also scanned at
//! `spec.template.metadata.annotations`, and the digest is written there so
//! that a config change rolls the pods.

use sha2::{Digest, Sha256};

use crate::annotations::is_hash_dependency;
use crate::error::{CoreError, Result};
use crate::node::{Mapping, Node};
use crate::resource::Resource;

/// Kinds whose pod template annotations are scanned
pub const CONTROLLER_KINDS: [&str; 4] = ["Deployment", "DaemonSet", "ReplicaSet", "StatefulSet"];

const POD_TEMPLATE_ANNOTATIONS: [&str; 4] = ["spec", "template", "metadata", "annotations"];

/// Parsed `<kind>/<name>` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTarget {
    pub kind: String,
    pub name: String,
}

impl HashTarget {
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split('/').collect();
        match parts.as_slice() {
            [kind, name] if !kind.is_empty() && !name.is_empty() => Ok(Self {
                kind: kind.to_string(),
                name: name.to_string(),
            }),
            _ => Err(CoreError::MalformedHashReference {
                value: value.to_string(),
            }),
        }
    }

    fn matches(&self, resource: &Resource, namespace: &str) -> bool {
        resource
            .kind()
            .is_some_and(|kind| kind.eq_ignore_ascii_case(&self.kind))
            && resource
                .name()
                .is_some_and(|name| name.eq_ignore_ascii_case(&self.name))
            && resource
                .namespace()
                .unwrap_or_default()
                .eq_ignore_ascii_case(namespace)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Metadata,
    PodTemplate,
}

#[derive(Debug)]
struct Dependency {
    location: Location,
    /// Annotation value, reused verbatim as the digest annotation key
    reference: String,
    target: usize,
}

/// Stamp the digest of every referenced resource onto its dependents.
///
/// References are resolved in stream order. Digests are then computed in
/// dependency order so a target's own digest annotations are final before it
/// is hashed, which makes repeated runs produce identical output.
pub fn propagate_hashes(resources: &mut [Resource]) -> Result<()> {
    let snapshot: &[Resource] = resources;
    let dependencies = snapshot
        .iter()
        .map(|resource| resolve_dependencies(resource, snapshot))
        .collect::<Result<Vec<_>>>()?;

    for index in dependency_order(resources, &dependencies)? {
        for dependency in &dependencies[index] {
            let hash = digest(&resources[dependency.target])?;
            tracing::debug!(
                resource = %resources[index].id(),
                target = %dependency.reference,
                "stamping dependency hash"
            );
            write_annotation(&mut resources[index], dependency, hash)?;
        }
    }

    Ok(())
}

fn resolve_dependencies(resource: &Resource, all: &[Resource]) -> Result<Vec<Dependency>> {
    let namespace = resource.namespace().unwrap_or_default();
    let mut dependencies = Vec::new();

    let mut scan = |annotations: Option<&Mapping>, location: Location| -> Result<()> {
        let Some(annotations) = annotations else {
            return Ok(());
        };
        for (key, value) in annotations.entries() {
            if !is_hash_dependency(key) {
                continue;
            }
            let reference = value.scalar_string().unwrap_or_default();
            let target = HashTarget::parse(&reference)?;
            let matches: Vec<usize> = all
                .iter()
                .enumerate()
                .filter(|(_, candidate)| target.matches(candidate, namespace))
                .map(|(i, _)| i)
                .collect();

            match matches.as_slice() {
                [single] => dependencies.push(Dependency {
                    location,
                    reference,
                    target: *single,
                }),
                [] => {
                    return Err(CoreError::MissingHashDependency {
                        reference,
                        namespace: namespace.to_string(),
                    });
                }
                many => {
                    return Err(CoreError::AmbiguousHashDependency {
                        reference,
                        namespace: namespace.to_string(),
                        count: many.len(),
                    });
                }
            }
        }
        Ok(())
    };

    scan(resource.annotations(), Location::Metadata)?;
    if is_controller(resource) {
        scan(pod_template_annotations(resource), Location::PodTemplate)?;
    }

    Ok(dependencies)
}

/// Order in which resources can be stamped; fails on cycles
fn dependency_order(resources: &[Resource], dependencies: &[Vec<Dependency>]) -> Result<Vec<usize>> {
    let mut done = vec![false; dependencies.len()];
    let mut order = Vec::with_capacity(dependencies.len());

    while order.len() < dependencies.len() {
        let ready = (0..dependencies.len()).find(|&i| {
            !done[i] && dependencies[i].iter().all(|d| d.target != i && done[d.target])
        });

        match ready {
            Some(i) => {
                done[i] = true;
                order.push(i);
            }
            None => {
                let blocked = (0..dependencies.len())
                    .filter(|&i| !done[i])
                    .map(|i| resources[i].id().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(CoreError::HashDependencyCycle { resources: blocked });
            }
        }
    }

    Ok(order)
}

fn digest(resource: &Resource) -> Result<String> {
    let serialized = resource.to_yaml_string()?;
    Ok(hex::encode(Sha256::digest(serialized.as_bytes())))
}

fn write_annotation(resource: &mut Resource, dependency: &Dependency, digest: String) -> Result<()> {
    match dependency.location {
        Location::Metadata => resource.set_annotation(&dependency.reference, digest),
        Location::PodTemplate => {
            let id = resource.id().to_string();
            let annotations = resource
                .body_mut()
                .ensure_mapping(&POD_TEMPLATE_ANNOTATIONS)
                .ok_or_else(|| CoreError::InvalidResource {
                    message: format!("{} has a non-mapping pod template", id),
                })?;
            annotations.insert(dependency.reference.clone(), Node::String(digest));
            Ok(())
        }
    }
}

fn is_controller(resource: &Resource) -> bool {
    resource
        .kind()
        .is_some_and(|kind| CONTROLLER_KINDS.iter().any(|c| c.eq_ignore_ascii_case(kind)))
}

fn pod_template_annotations(resource: &Resource) -> Option<&Mapping> {
    let (first, rest) = POD_TEMPLATE_ANNOTATIONS.split_first()?;
    resource.body().get(first)?.lookup(rest)?.as_mapping()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<Resource> {
        Node::from_yaml_documents(input)
            .unwrap()
            .into_iter()
            .map(|n| Resource::new(n).unwrap())
            .collect()
    }

    const STREAM: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: my-config-map
  namespace: example
data:
  key: value
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  namespace: example
  annotations:
    kpt.seek.com/hash-dependency: ConfigMap/my-config-map
spec:
  template:
    metadata:
      annotations:
        kpt.seek.com/hash-dependency/pod: configmap/MY-CONFIG-MAP
"#;

    #[test]
    fn test_propagate_into_metadata_and_pod_template() {
        let mut resources = parse(STREAM);
        let expected = digest(&resources[0]).unwrap();

        propagate_hashes(&mut resources).unwrap();

        let deployment = &resources[1];
        assert_eq!(deployment.annotation("ConfigMap/my-config-map"), Some(expected.clone()));

        let pod = pod_template_annotations(deployment).unwrap();
        assert_eq!(
            pod.get("configmap/MY-CONFIG-MAP").and_then(Node::as_str),
            Some(expected.as_str())
        );
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn test_idempotent_and_overwrites_stale_hash() {
        let mut resources = parse(STREAM);
        resources[1].set_annotation("ConfigMap/my-config-map", "stale").unwrap();

        propagate_hashes(&mut resources).unwrap();
        let first = resources[1].annotation("ConfigMap/my-config-map");
        propagate_hashes(&mut resources).unwrap();
        let second = resources[1].annotation("ConfigMap/my-config-map");

        assert_ne!(first.as_deref(), Some("stale"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_chained_dependencies_are_stable() {
        let input = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  annotations:
    kpt.seek.com/hash-dependency: Secret/creds
---
apiVersion: v1
kind: Secret
metadata:
  name: creds
  annotations:
    kpt.seek.com/hash-dependency: ConfigMap/base
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: base
data:
  a: b
"#;
        let mut once = parse(input);
        propagate_hashes(&mut once).unwrap();
        let mut twice = once.clone();
        propagate_hashes(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_target() {
        let mut resources = parse(
            "kind: Deployment\nmetadata:\n  name: app\n  annotations:\n    kpt.seek.com/hash-dependency: ConfigMap/absent\n",
        );
        let err = propagate_hashes(&mut resources).unwrap_err();
        assert!(matches!(err, CoreError::MissingHashDependency { .. }));
        assert!(err.to_string().ends_with("Expected 1, got 0"));
    }

    #[test]
    fn test_ambiguous_target() {
        let mut resources = parse(
            r#"
kind: ConfigMap
metadata:
  name: dup
---
kind: configmap
metadata:
  name: DUP
---
kind: Deployment
metadata:
  name: app
  annotations:
    kpt.seek.com/hash-dependency: ConfigMap/dup
"#,
        );
        let err = propagate_hashes(&mut resources).unwrap_err();
        assert!(matches!(err, CoreError::AmbiguousHashDependency { count: 2, .. }));
        assert!(err.to_string().ends_with("Expected 1, got 2"));
    }

    #[test]
    fn test_namespace_must_match() {
        let mut resources = parse(
            r#"
kind: ConfigMap
metadata:
  name: cm
  namespace: other
---
kind: Deployment
metadata:
  name: app
  namespace: example
  annotations:
    kpt.seek.com/hash-dependency: ConfigMap/cm
"#,
        );
        assert!(matches!(
            propagate_hashes(&mut resources),
            Err(CoreError::MissingHashDependency { .. })
        ));
    }

    #[test]
    fn test_malformed_reference() {
        for value in ["ConfigMap", "a/b/c", "/name"] {
            let mut resources = parse(&format!(
                "kind: Deployment\nmetadata:\n  name: app\n  annotations:\n    kpt.seek.com/hash-dependency: {}\n",
                value
            ));
            let err = propagate_hashes(&mut resources).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("failed to parse hash target. Expected <kind>/<name>, got {}", value)
            );
        }
    }

    #[test]
    fn test_cycle_detected() {
        let mut resources = parse(
            r#"
kind: ConfigMap
metadata:
  name: a
  annotations:
    kpt.seek.com/hash-dependency: ConfigMap/b
---
kind: ConfigMap
metadata:
  name: b
  annotations:
    kpt.seek.com/hash-dependency: ConfigMap/a
"#,
        );
        assert!(matches!(
            propagate_hashes(&mut resources),
            Err(CoreError::HashDependencyCycle { .. })
        ));
    }

    #[test]
    fn test_non_controller_pod_template_ignored() {
        let mut resources = parse(
            r#"
kind: Job
metadata:
  name: job
spec:
  template:
    metadata:
      annotations:
        kpt.seek.com/hash-dependency: ConfigMap/absent
"#,
        );
        propagate_hashes(&mut resources).unwrap();
    }
}
