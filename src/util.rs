use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn default_db_path(workspace: &Path) -> PathBuf {
    workspace.join(".reftrace").join("reftrace.sqlite")
}

/// Key under which a workspace's rows are stored: the canonical absolute
/// path with forward slashes, or the absolute path when it does not exist.
pub fn workspace_key(workspace: &Path) -> String {
    let resolved = fs::canonicalize(workspace)
        .or_else(|_| std::path::absolute(workspace))
        .unwrap_or_else(|_| workspace.to_path_buf());
    let key = resolved.to_string_lossy().replace('\\', "/");
    match key.strip_prefix("//?/") {
        Some(stripped) => stripped.to_string(),
        None => key,
    }
}

pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_db_lives_inside_workspace() {
        assert_eq!(
            default_db_path(Path::new("/work/app")),
            PathBuf::from("/work/app/.reftrace/reftrace.sqlite")
        );
    }

    #[test]
    fn workspace_key_is_stable_for_existing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let direct = workspace_key(dir.path());
        let dotted = workspace_key(&dir.path().join("."));
        assert_eq!(direct, dotted);
        assert!(!direct.contains('\\'));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        assert_eq!(
            resolve_relative(Path::new("/ws"), Path::new("index.json")),
            PathBuf::from("/ws/index.json")
        );
        assert_eq!(
            resolve_relative(Path::new("/ws"), Path::new("/tmp/index.json")),
            PathBuf::from("/tmp/index.json")
        );
    }
}
