use anyhow::{bail, Result};
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Copy, Debug, Default)]
pub struct PathPolicy {
    pub follow_symlinks: bool,
}

/// Derive an artifact file name from a collection name. Path separators and
/// NUL are replaced with `_` so the name stays a single path component.
pub fn artifact_file_name(collection: &str, suffix: &str) -> String {
    let stem: String = collection
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    format!("{stem}{suffix}")
}

/// Ensure `file_name` names exactly one entry directly under `dir`: not
/// absolute, no `..`, no nested components. Unless `follow_symlinks` is set an
/// existing symlink at the target is rejected.
pub fn resolve_in_dir(dir: &Path, file_name: &str, policy: PathPolicy) -> Result<PathBuf> {
    let rel = Path::new(file_name);
    if rel.is_absolute() {
        bail!("absolute paths are not allowed: {:?}", rel);
    }
    let mut comps = rel.components();
    match (comps.next(), comps.next()) {
        (Some(Component::Normal(_)), None) => {}
        (Some(Component::ParentDir), _) => bail!("parent traversal not allowed: {:?}", rel),
        _ => bail!("artifact name must be a single file name: {:?}", rel),
    }
    let candidate = dir.join(rel);
    if !policy.follow_symlinks {
        if let Ok(m) = std::fs::symlink_metadata(&candidate) {
            if m.file_type().is_symlink() {
                bail!("symlink encountered (not following): {:?}", candidate);
            }
        }
    }
    Ok(candidate)
}
