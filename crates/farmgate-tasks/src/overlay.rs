//! Overlay directory resolution

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use farmgate_core::error::DetectError;

/// Locate the overlay directory under the workspace root.
///
/// `<root>/<overlay>` wins when it exists. Otherwise the tree is searched
/// down to `search_depth` for directories named `overlay`; exactly one match
/// is required. Hidden directories (`.repo`, `.git`, `.venv`) are not searched.
pub fn resolve_overlay(root: &Path, overlay: &str, search_depth: usize) -> Result<PathBuf, DetectError> {
    let not_found = || DetectError::OverlayNotFound {
        overlay: overlay.to_string(),
        root: root.to_path_buf(),
    };

    if overlay.trim().is_empty() {
        return Err(not_found());
    }

    let direct = root.join(overlay);
    if direct.is_dir() {
        debug!(overlay, path = %direct.display(), "overlay resolved directly");
        return Ok(direct);
    }

    let mut candidates: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(search_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.file_name() == overlay)
        .map(|e| e.into_path())
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(not_found()),
        1 => {
            let path = candidates.remove(0);
            debug!(overlay, path = %path.display(), "overlay found by search");
            Ok(path)
        }
        _ => Err(DetectError::AmbiguousOverlay {
            overlay: overlay.to_string(),
            candidates,
        }),
    }
}

pub(crate) fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_direct_overlay() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("lab-a")).unwrap();
        assert_eq!(
            resolve_overlay(temp.path(), "lab-a", 3).unwrap(),
            temp.path().join("lab-a")
        );
    }

    #[test]
    fn test_nested_path_overlay() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("overlays/lab-a")).unwrap();
        assert_eq!(
            resolve_overlay(temp.path(), "overlays/lab-a", 3).unwrap(),
            temp.path().join("overlays/lab-a")
        );
    }

    #[test]
    fn test_search_overlay() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("vendor/overlays/lab-a/tests")).unwrap();
        assert_eq!(
            resolve_overlay(temp.path(), "lab-a", 3).unwrap(),
            temp.path().join("vendor/overlays/lab-a")
        );
        assert!(matches!(
            resolve_overlay(temp.path(), "lab-a", 2),
            Err(DetectError::OverlayNotFound { .. })
        ));
    }

    #[test]
    fn test_hidden_dirs_are_skipped() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".repo/lab-a")).unwrap();
        assert!(matches!(
            resolve_overlay(temp.path(), "lab-a", 3),
            Err(DetectError::OverlayNotFound { .. })
        ));
    }

    #[test]
    fn test_ambiguous_overlay() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("a/lab-a")).unwrap();
        std::fs::create_dir_all(temp.path().join("b/lab-a")).unwrap();
        match resolve_overlay(temp.path(), "lab-a", 3) {
            Err(DetectError::AmbiguousOverlay { candidates, .. }) => {
                assert_eq!(
                    candidates,
                    vec![temp.path().join("a/lab-a"), temp.path().join("b/lab-a")]
                );
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_overlay_name() {
        let temp = TempDir::new().unwrap();
        assert!(resolve_overlay(temp.path(), "", 3).is_err());
    }
}
