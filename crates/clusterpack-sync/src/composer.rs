//! ClusterPackages expansion
//!
//! The descriptor in a resource stream is replaced by the resources of every
//! package it lists. Each package runs its own pipeline
//! (fetch, override, render, relabel) as a separate task; outputs are merged
//! in declaration order regardless of completion order.
//!
//! The first failure stops the remaining pipelines at their next stage and
//! [`Composer::compose`] returns only once every task has finished, so no
//! pipeline touches the cache after composition ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clusterpack_core::{ClusterPackages, LoadedPackage, Package, Resource, Variable, relabel};
use clusterpack_engine::{Renderer, TemplateContext, apply_variables};
use clusterpack_repo::SourceCache;
use tokio::task::JoinSet;
use tracing::{Instrument, Span};

use crate::error::{Result, Stage, SyncError, at};

/// Expands ClusterPackages descriptors into package resources
pub struct Composer {
    cache: Arc<SourceCache>,
    span: Span,
}

impl Composer {
    pub fn new(cache: Arc<SourceCache>) -> Self {
        Self {
            cache,
            span: Span::current(),
        }
    }

    /// Log under the given parent span instead of the caller's current span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Replace the descriptor in `items` with its expansion
    ///
    /// Resources other than the descriptor pass through unchanged and keep
    /// their position. A stream without a descriptor is returned as is.
    pub async fn expand(&self, items: Vec<Resource>) -> Result<Vec<Resource>> {
        let positions: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, r)| ClusterPackages::is_descriptor(r))
            .map(|(i, _)| i)
            .collect();

        let position = match positions.as_slice() {
            [] => {
                tracing::warn!(parent: &self.span, "no ClusterPackages resource in input");
                return Ok(items);
            }
            [position] => *position,
            _ => {
                return Err(SyncError::DescriptorCount {
                    count: positions.len(),
                });
            }
        };

        let descriptor =
            ClusterPackages::from_resource(&items[position]).map_err(SyncError::Descriptor)?;
        let expansion = self.compose(&descriptor).await?;

        let mut output = Vec::with_capacity(items.len() - 1 + expansion.len());
        let mut items = items.into_iter();
        output.extend(items.by_ref().take(position));
        items.next();
        output.extend(expansion);
        output.extend(items);
        Ok(output)
    }

    /// Run every package pipeline and concatenate the results in order
    pub async fn compose(&self, descriptor: &ClusterPackages) -> Result<Vec<Resource>> {
        let spec = &descriptor.spec;
        let cluster: Arc<[Variable]> = spec.variables.clone().into();
        let base_dir: Arc<str> = spec.base_dir.as_str().into();

        tracing::info!(
            parent: &self.span,
            packages = spec.packages.len(),
            base_dir = %spec.base_dir,
            "composing cluster packages"
        );

        let cancelled = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();
        for (index, package) in spec.packages.iter().enumerate() {
            let span = tracing::info_span!(parent: &self.span, "package", name = %package.name);
            let pipeline = Pipeline {
                cache: Arc::clone(&self.cache),
                cluster: Arc::clone(&cluster),
                base_dir: Arc::clone(&base_dir),
                package: package.clone(),
                cancelled: Arc::clone(&cancelled),
            };
            tasks.spawn(async move { (index, pipeline.run().await) }.instrument(span));
        }

        let mut outputs: Vec<Option<Vec<Resource>>> = vec![None; spec.packages.len()];
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((index, Ok(output))) => {
                    outputs[index] = output;
                    continue;
                }
                Ok((_, Err(err))) => err,
                Err(err) => SyncError::Join(err),
            };
            if failure.is_none() {
                tracing::debug!(parent: &self.span, error = %outcome, "stopping remaining packages");
                cancelled.store(true, Ordering::SeqCst);
                failure = Some(outcome);
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let resources: Vec<Resource> = outputs.into_iter().flatten().flatten().collect();
        tracing::info!(parent: &self.span, resources = resources.len(), "composed cluster packages");
        Ok(resources)
    }
}

/// One package's pipeline, owned by its task
struct Pipeline {
    cache: Arc<SourceCache>,
    cluster: Arc<[Variable]>,
    base_dir: Arc<str>,
    package: Package,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    /// Run every stage; `None` when another package failed first
    async fn run(self) -> Result<Option<Vec<Resource>>> {
        let name = self.package.name.as_str();

        let source = self.package.source().map_err(at(name, Stage::Descriptor))?;
        if self.stopped(Stage::Fetch) {
            return Ok(None);
        }
        tracing::info!(source = %source, "fetching package");
        let resources = self
            .cache
            .fetch(&source)
            .await
            .map_err(at(name, Stage::Fetch))?;
        let mut package = LoadedPackage::from_resources(resources).map_err(at(name, Stage::Fetch))?;

        if self.stopped(Stage::Override) {
            return Ok(None);
        }
        apply_variables(&mut package, &self.cluster, &self.package.variables)
            .map_err(at(name, Stage::Override))?;

        if self.stopped(Stage::Render) {
            return Ok(None);
        }
        let context = TemplateContext::from_kptfile(&package.kptfile).map_err(at(name, Stage::Render))?;
        Renderer::new(context)
            .render_all(&mut package.resources)
            .map_err(at(name, Stage::Render))?;

        let mut resources = package.into_resources();
        for resource in &mut resources {
            relabel(resource, &self.base_dir, name).map_err(at(name, Stage::Relabel))?;
        }

        tracing::debug!(resources = resources.len(), "package complete");
        Ok(Some(resources))
    }

    fn stopped(&self, next: Stage) -> bool {
        let stopped = self.cancelled.load(Ordering::SeqCst);
        if stopped {
            tracing::debug!(stage = %next, "skipping after another package failed");
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterpack_core::annotations::kio;
    use clusterpack_core::Node;
    use clusterpack_repo::{GitAuth, GitClient};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const KPTFILE: &str = r#"apiVersion: kpt.dev/v1alpha1
kind: Kptfile
metadata:
  name: pkg
openAPI:
  definitions:
    io.k8s.cli.setters.region:
      x-k8s-cli:
        setter:
          name: region
          value: us-east-1
    io.k8s.cli.setters.replicas:
      type: integer
      x-k8s-cli:
        setter:
          name: replicas
          value: "1"
"#;

    const CONFIGMAP: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  annotations:
    kpt.seek.com/render-template: "true"
data:
  region: '{{value "region"}}'
  literal: '[[value "region"]]'
"#;

    fn write_package(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("Kptfile"), KPTFILE).unwrap();
        fs::write(dir.join("settings.yaml"), CONFIGMAP).unwrap();
    }

    fn descriptor(body: &str) -> Resource {
        Resource::from_yaml_str(&format!(
            "apiVersion: kpt.seek.com/v1alpha1\nkind: ClusterPackages\nmetadata:\n  name: cluster\nspec:\n{}",
            body
        ))
        .unwrap()
    }

    fn composer(cache_dir: &Path) -> Composer {
        Composer::new(Arc::new(SourceCache::new(cache_dir, GitAuth::None)))
    }

    fn data(resource: &Resource, key: &str) -> String {
        resource
            .to_node()
            .lookup(&["data", key])
            .and_then(Node::as_str)
            .unwrap()
            .to_string()
    }

    fn find<'r>(resources: &'r [Resource], kind: &str) -> &'r Resource {
        resources.iter().find(|r| r.kind() == Some(kind)).unwrap()
    }

    #[tokio::test]
    async fn test_expand_local_package() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg1");
        write_package(&pkg);

        let items = vec![descriptor(&format!(
            "  baseDir: /out\n  variables:\n    - name: region\n      value: ap-southeast-1\n  packages:\n    - name: pkg1\n      local:\n        directory: {}\n",
            pkg.display()
        ))];

        let output = composer(&dir.path().join("cache")).expand(items).await.unwrap();

        assert_eq!(output.len(), 2);
        assert!(output.iter().all(|r| !ClusterPackages::is_descriptor(r)));

        let configmap = find(&output, "ConfigMap");
        assert_eq!(data(configmap, "region"), "ap-southeast-1");
        assert_eq!(data(configmap, "literal"), "[[value \"region\"]]");
        assert_eq!(
            configmap.annotation(kio::PATH).as_deref(),
            Some("/out/pkg1/settings.yaml")
        );
        assert_eq!(
            find(&output, "Kptfile").annotation(kio::PATH).as_deref(),
            Some("/out/pkg1/Kptfile")
        );
    }

    #[tokio::test]
    async fn test_package_variables_override_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        write_package(&pkg);

        let items = vec![descriptor(&format!(
            "  baseDir: out\n  variables:\n    - name: region\n      value: ap-southeast-1\n    - name: zone\n      value: a\n  packages:\n    - name: app\n      local:\n        directory: {}\n      variables:\n        - name: region\n          value: eu-west-1\n",
            pkg.display()
        ))];

        let output = composer(&dir.path().join("cache")).expand(items).await.unwrap();
        assert_eq!(data(find(&output, "ConfigMap"), "region"), "eu-west-1");
    }

    #[tokio::test]
    async fn test_passthrough_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        write_package(&first);
        write_package(&second);

        let other = Resource::from_yaml_str("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: apps\n").unwrap();
        let items = vec![
            other.clone(),
            descriptor(&format!(
                "  baseDir: out\n  packages:\n    - name: a\n      local:\n        directory: {}\n    - name: b\n      local:\n        directory: {}\n",
                first.display(),
                second.display()
            )),
        ];

        let output = composer(&dir.path().join("cache")).expand(items).await.unwrap();
        let paths: Vec<_> = output.iter().map(|r| r.annotation(kio::PATH)).collect();

        assert_eq!(output[0], other);
        assert_eq!(
            paths[1..],
            [
                Some("out/a/Kptfile".to_string()),
                Some("out/a/settings.yaml".to_string()),
                Some("out/b/Kptfile".to_string()),
                Some("out/b/settings.yaml".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_descriptor_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![Resource::from_yaml_str("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: apps\n").unwrap()];
        let output = composer(dir.path()).expand(items.clone()).await.unwrap();
        assert_eq!(output, items);
    }

    #[tokio::test]
    async fn test_missing_package_setter_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        write_package(&pkg);

        let items = vec![descriptor(&format!(
            "  baseDir: out\n  packages:\n    - name: app\n      local:\n        directory: {}\n      variables:\n        - name: zone\n          value: a\n",
            pkg.display()
        ))];

        let err = composer(&dir.path().join("cache")).expand(items).await.unwrap_err();
        assert_eq!(err.package(), Some("app"));
        assert_eq!(err.stage(), Some(Stage::Override));
    }

    #[tokio::test]
    async fn test_missing_directory_fails_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![descriptor(&format!(
            "  baseDir: out\n  packages:\n    - name: app\n      local:\n        directory: {}\n",
            dir.path().join("missing").display()
        ))];

        let err = composer(&dir.path().join("cache")).expand(items).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Fetch));
        assert!(err.to_string().starts_with("package app: fetch failed"));
    }

    /// Git client whose clone takes a while and counts finished operations
    #[derive(Default)]
    struct SlowClient {
        finished: AtomicUsize,
    }

    impl GitClient for SlowClient {
        fn clone_repo(
            &self,
            _repo: &str,
            dest: &Path,
            _auth: &GitAuth,
        ) -> clusterpack_repo::Result<()> {
            std::thread::sleep(Duration::from_millis(300));
            write_package(&dest.join("pkg"));
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn checkout(
            &self,
            _repo: &str,
            _path: &Path,
            _git_ref: &str,
            _auth: &GitAuth,
        ) -> clusterpack_repo::Result<()> {
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failure_waits_for_running_packages() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(SlowClient::default());
        let cache =
            SourceCache::with_client(dir.path().join("cache"), GitAuth::None, client.clone());

        let items = vec![descriptor(&format!(
            "  baseDir: out\n  packages:\n    - name: slow\n      git:\n        repo: https://example.com/org/packages.git\n        subdirectory: pkg\n    - name: broken\n      local:\n        directory: {}\n",
            dir.path().join("missing").display()
        ))];

        let err = Composer::new(Arc::new(cache)).expand(items).await.unwrap_err();
        assert_eq!(err.package(), Some("broken"));
        assert_eq!(err.stage(), Some(Stage::Fetch));

        // the slow clone and its checkout completed before expand returned
        assert_eq!(client.finished.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_two_descriptors_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![descriptor("  packages: []\n"), descriptor("  packages: []\n")];
        let err = composer(dir.path()).expand(items).await.unwrap_err();
        assert!(matches!(err, SyncError::DescriptorCount { count: 2 }));
    }
}
