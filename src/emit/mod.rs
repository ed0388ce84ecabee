//! Writes classes under an output root, one file per class.

use std::path::{Path, PathBuf};

use crate::descriptor::to_internal_name;
use crate::error::{DesugarError, DesugarResult};
use crate::unit::ClassUnit;

/// `root/<internal/name>.class` for a dotted or internal class name.
pub fn output_path(output_root: &Path, qualified_name: &str) -> PathBuf {
    let mut path = output_root.to_path_buf();
    path.extend(to_internal_name(qualified_name).split('/'));
    path.set_extension("class");
    path
}

/// Write raw class bytes, creating parent directories as needed.
pub fn write_class_bytes(
    output_root: &Path,
    qualified_name: &str,
    bytes: &[u8],
) -> DesugarResult<PathBuf> {
    let path = output_path(output_root, qualified_name);
    let emit_error = |source| DesugarError::Emit {
        path: path.clone(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(emit_error)?;
    }
    std::fs::write(&path, bytes).map_err(emit_error)?;
    Ok(path)
}

/// Serialize a class, mutated or not, and write it out.
pub fn emit(unit: &ClassUnit, output_root: &Path) -> DesugarResult<PathBuf> {
    let bytes = unit.to_bytes()?;
    write_class_bytes(output_root, unit.name(), &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::testing::{empty_class, to_bytes};

    #[test]
    fn paths_follow_the_package() {
        let root = Path::new("/out");
        assert_eq!(
            output_path(root, "com.example.Sample$Inner"),
            Path::new("/out/com/example/Sample$Inner.class")
        );
        assert_eq!(output_path(root, "Top"), Path::new("/out/Top.class"));
    }

    #[test]
    fn emits_unmutated_classes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = to_bytes(&empty_class("a/b/C"));
        let unit = ClassUnit::from_bytes(bytes.clone()).unwrap();
        let path = emit(&unit, dir.path()).unwrap();
        assert_eq!(path, dir.path().join("a/b/C.class"));
        assert_eq!(std::fs::read(path).unwrap(), bytes);
    }

    #[test]
    fn unwritable_roots_are_emit_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = write_class_bytes(&blocker, "a.B", b"data").unwrap_err();
        assert!(matches!(err, DesugarError::Emit { .. }));
        assert!(!err.is_class_local());
    }
}
