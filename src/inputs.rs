//! Enumerates compiled classes under an input directory.

use std::path::Path;

use walkdir::WalkDir;

use crate::descriptor::internal_to_source_name;
use crate::error::{DesugarError, DesugarResult};

/// Dotted names of every `.class` file below `dir`, sorted.
pub fn discover_classes(dir: impl AsRef<Path>) -> DesugarResult<Vec<String>> {
    let dir = dir.as_ref();
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| DesugarError::PathUnavailable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|e| e.to_str()) != Some("class")
        {
            continue;
        }
        let Ok(relative) = entry.path().with_extension("").strip_prefix(dir).map(Path::to_path_buf)
        else {
            continue;
        };
        let internal: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        names.push(internal_to_source_name(&internal.join("/")));
    }
    names.sort();
    Ok(names)
}
