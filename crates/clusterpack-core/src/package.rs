//! Package loading
//!
//! A package is a directory of resource files with exactly one Kptfile.

use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::annotations::kio;
use crate::error::{CoreError, Result};
use crate::kptfile::{KPTFILE_NAME, Kptfile, is_kptfile};
use crate::node::Node;
use crate::resource::Resource;

/// Read every resource file under `root`.
///
/// Matches `*.yaml`, `*.yml` and `Kptfile`, skipping hidden directories and
/// nested subpackages. Each resource gets `config.kubernetes.io/path`
/// (relative to `root`) and `config.kubernetes.io/index` annotations.
pub fn read_package(root: &Path) -> Result<Vec<Resource>> {
    if !root.is_dir() {
        return Err(CoreError::PackageNotFound {
            path: root.display().to_string(),
        });
    }

    let mut resources = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry) && !is_subpackage(entry));

    for entry in walker {
        let entry = entry.map_err(|e| CoreError::InvalidPackageFile {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;

        if !entry.file_type().is_file() || !is_resource_file(&entry) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        resources.extend(read_resource_file(entry.path(), &relative)?);
    }

    tracing::debug!(path = %root.display(), count = resources.len(), "read package");
    Ok(resources)
}

fn read_resource_file(path: &Path, relative: &str) -> Result<Vec<Resource>> {
    let invalid = |message: String| CoreError::InvalidPackageFile {
        path: path.display().to_string(),
        message,
    };

    let content = std::fs::read_to_string(path)?;
    let documents = Node::from_yaml_documents(&content).map_err(|e| invalid(e.to_string()))?;

    let mut resources = Vec::new();
    for (index, document) in documents.into_iter().enumerate() {
        if document.is_null() {
            continue;
        }
        let mut resource = Resource::new(document).map_err(|e| invalid(e.to_string()))?;
        resource.set_annotation(kio::PATH, relative)?;
        resource.set_annotation(kio::INDEX, index.to_string())?;
        resources.push(resource);
    }
    Ok(resources)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_subpackage(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.path().join(KPTFILE_NAME).is_file()
}

fn is_resource_file(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name == KPTFILE_NAME || name.ends_with(".yaml") || name.ends_with(".yml")
}

/// A package split into its manifest and the remaining resources
#[derive(Debug, Clone)]
pub struct LoadedPackage {
    pub kptfile: Kptfile,
    pub resources: Vec<Resource>,
    kptfile_position: usize,
}

impl LoadedPackage {
    /// Load a package directory
    pub fn load(root: &Path) -> Result<Self> {
        Self::from_resources(read_package(root)?)
    }

    /// Split resources; exactly one must be a Kptfile
    pub fn from_resources(resources: Vec<Resource>) -> Result<Self> {
        let count = resources.iter().filter(|r| is_kptfile(r)).count();
        if count != 1 {
            return Err(CoreError::ManifestCount { count });
        }

        let mut kptfile = None;
        let mut kptfile_position = 0;
        let mut others = Vec::with_capacity(resources.len() - 1);

        for (position, resource) in resources.into_iter().enumerate() {
            if is_kptfile(&resource) {
                kptfile = Some(Kptfile::from_resource(resource)?);
                kptfile_position = position;
            } else {
                others.push(resource);
            }
        }

        let kptfile = kptfile.ok_or(CoreError::ManifestCount { count: 0 })?;

        Ok(Self {
            kptfile,
            resources: others,
            kptfile_position,
        })
    }

    /// Reassemble in the original read order
    pub fn into_resources(self) -> Vec<Resource> {
        let mut resources = self.resources;
        let position = self.kptfile_position.min(resources.len());
        resources.insert(position, self.kptfile.into_resource());
        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const KPTFILE: &str = "apiVersion: kpt.dev/v1alpha1\nkind: Kptfile\nmetadata:\n  name: pkg\n";

    fn write(dir: &Path, path: &str, content: &str) {
        let path = dir.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_read_package_annotates_paths() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "Kptfile", KPTFILE);
        write(
            temp.path(),
            "deploy/app.yaml",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n",
        );
        write(temp.path(), "notes.txt", "not yaml");
        write(temp.path(), ".hidden/skip.yaml", "kind: Skipped\n");

        let resources = read_package(temp.path()).unwrap();
        assert_eq!(resources.len(), 3);

        let paths: Vec<_> = resources.iter().map(|r| r.path().unwrap()).collect();
        assert_eq!(paths, vec!["Kptfile", "deploy/app.yaml", "deploy/app.yaml"]);
        assert_eq!(resources[2].annotation(kio::INDEX).as_deref(), Some("1"));
        assert_eq!(resources[2].name(), Some("b"));
    }

    #[test]
    fn test_subpackages_skipped() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "Kptfile", KPTFILE);
        write(temp.path(), "nested/Kptfile", KPTFILE);
        write(temp.path(), "nested/cm.yaml", "apiVersion: v1\nkind: ConfigMap\n");

        let resources = read_package(temp.path()).unwrap();
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let err = read_package(&temp.path().join("missing")).unwrap_err();
        assert!(matches!(err, CoreError::PackageNotFound { .. }));
    }

    #[test]
    fn test_loaded_package_requires_one_kptfile() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "cm.yaml", "apiVersion: v1\nkind: ConfigMap\n");
        let err = LoadedPackage::load(temp.path()).unwrap_err();
        assert_eq!(err.to_string(), "expected a single Kptfile in package but got 0");

        write(temp.path(), "Kptfile", KPTFILE);
        write(temp.path(), "extra.yaml", KPTFILE);
        let err = LoadedPackage::load(temp.path()).unwrap_err();
        assert_eq!(err.to_string(), "expected a single Kptfile in package but got 2");
    }

    #[test]
    fn test_into_resources_restores_order() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n");
        write(temp.path(), "Kptfile", KPTFILE);
        write(temp.path(), "z.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: z\n");

        let package = LoadedPackage::load(temp.path()).unwrap();
        assert_eq!(package.resources.len(), 2);

        let kinds: Vec<_> = package
            .into_resources()
            .iter()
            .map(|r| r.kind().unwrap().to_string())
            .collect();
        // sort_by_file_name orders uppercase before lowercase
        assert_eq!(kinds, vec!["Kptfile", "ConfigMap", "ConfigMap"]);
    }
}
