//! Provenance path relabeling

use crate::annotations::kio;
use crate::error::{CoreError, Result};
use crate::resource::Resource;

/// Rewrite `config.kubernetes.io/path` to `{base_dir}/{package}/{original}`
pub fn relabel(resource: &mut Resource, base_dir: &str, package: &str) -> Result<()> {
    let original = resource
        .path()
        .ok_or_else(|| CoreError::MissingPathAnnotation {
            resource: resource.id().to_string(),
        })?;

    let relabeled = join_path(&[base_dir, package, &original]);
    resource.set_annotation(kio::PATH, relabeled)
}

/// Slash-join path segments, dropping empty ones and duplicate separators.
/// A leading `/` on the first segment is kept.
fn join_path(segments: &[&str]) -> String {
    let absolute = segments
        .iter()
        .find(|s| !s.is_empty())
        .is_some_and(|s| s.starts_with('/'));

    let joined = segments
        .iter()
        .flat_map(|s| s.split('/'))
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/");

    if absolute { format!("/{}", joined) } else { joined }
}
