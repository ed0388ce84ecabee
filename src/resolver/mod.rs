//! Ordered registry of places class binaries can be found in.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::descriptor::to_internal_name;
use crate::error::{DesugarError, DesugarResult};
use crate::unit::ClassUnit;

// ---------------------------------------------------------------------------
// Search paths
// ---------------------------------------------------------------------------

enum SearchPath {
    Directory(PathBuf),
    /// A `.jar`/`.zip`; entries are read by name on demand.
    Archive {
        path: PathBuf,
        archive: Mutex<ZipArchive<BufReader<File>>>,
    },
}

impl SearchPath {
    fn open(path: &Path) -> DesugarResult<Self> {
        let unavailable = |reason: String| DesugarError::PathUnavailable {
            path: path.to_path_buf(),
            reason,
        };
        let metadata = std::fs::metadata(path).map_err(|e| unavailable(e.to_string()))?;
        if metadata.is_dir() {
            return Ok(SearchPath::Directory(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
        let archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| unavailable(e.to_string()))?;
        Ok(SearchPath::Archive {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
        })
    }

    fn path(&self) -> &Path {
        match self {
            SearchPath::Directory(path) | SearchPath::Archive { path, .. } => path,
        }
    }

    /// `Ok(None)` when this path simply does not hold the entry.
    fn read(&self, entry: &str) -> DesugarResult<Option<Vec<u8>>> {
        match self {
            SearchPath::Directory(root) => match std::fs::read(root.join(entry)) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
            SearchPath::Archive { archive, .. } => {
                let mut archive = archive.lock().unwrap_or_else(|p| p.into_inner());
                let mut file = match archive.by_name(entry) {
                    Ok(file) => file,
                    Err(ZipError::FileNotFound) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SymbolResolver
// ---------------------------------------------------------------------------

/// Looks classes up by name across registered directories and archives, in
/// registration order. Built before loading starts and only read afterwards.
#[derive(Default)]
pub struct SymbolResolver {
    paths: Vec<SearchPath>,
}

impl SymbolResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a search location, failing if it cannot be opened.
    pub fn try_append_path(&mut self, path: impl AsRef<Path>) -> DesugarResult<()> {
        let path = path.as_ref();
        let search_path = SearchPath::open(path)?;
        debug!("registered resolution path {}", path.display());
        self.paths.push(search_path);
        Ok(())
    }

    /// Register a search location. An unusable path is logged and skipped;
    /// returns whether the path was registered.
    pub fn append_path(&mut self, path: impl AsRef<Path>) -> bool {
        match self.try_append_path(path) {
            Ok(()) => true,
            Err(e) => {
                warn!("{e}");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Registered locations, in lookup order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(SearchPath::path)
    }

    /// Raw class binary for a dotted or internal class name. First match wins.
    pub fn find_bytes(&self, qualified_name: &str) -> DesugarResult<Vec<u8>> {
        let entry = format!("{}.class", to_internal_name(qualified_name));
        for search_path in &self.paths {
            match search_path.read(&entry) {
                Ok(Some(bytes)) => return Ok(bytes),
                Ok(None) => {}
                Err(e) => warn!(
                    "skipping {} while looking up {qualified_name}: {e}",
                    search_path.path().display()
                ),
            }
        }
        Err(DesugarError::ClassNotFound {
            name: qualified_name.to_string(),
        })
    }

    /// Locate and decode a class.
    pub fn resolve(&self, qualified_name: &str) -> DesugarResult<ClassUnit> {
        let bytes = self.find_bytes(qualified_name)?;
        ClassUnit::from_bytes(bytes).map_err(|e| match e {
            DesugarError::MalformedClass { reason, .. } => DesugarError::MalformedClass {
                name: qualified_name.to_string(),
                reason,
            },
            other => other,
        })
    }
}
