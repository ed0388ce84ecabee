use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum DesugarError {
    /// A resolution path does not exist or cannot be opened.
    PathUnavailable { path: PathBuf, reason: String },
    /// No registered resolution path contains the class.
    ClassNotFound { name: String },
    /// The class binary was found but could not be decoded.
    MalformedClass { name: String, reason: String },
    /// A replacement could not be spliced into a method body consistently.
    MalformedReplacement {
        class: String,
        method: String,
        reason: String,
    },
    /// A matched call site has a shape no template covers.
    UnsupportedCallSite { reason: String },
    /// The call site no longer points at the instruction it was scanned from.
    StaleCallSite { offset: u32 },
    /// Writing an output class failed.
    Emit {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Inputs were requested but no resolution path was registered.
    NoResolutionPaths,
    Io(std::io::Error),
    Zip(zip::result::ZipError),
    Codec(binrw::Error),
}

impl fmt::Display for DesugarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesugarError::PathUnavailable { path, reason } => {
                write!(f, "resolution path {} unavailable: {reason}", path.display())
            }
            DesugarError::ClassNotFound { name } => write!(f, "class not found: {name}"),
            DesugarError::MalformedClass { name, reason } => {
                write!(f, "malformed class {name}: {reason}")
            }
            DesugarError::MalformedReplacement {
                class,
                method,
                reason,
            } => write!(f, "malformed replacement in {class}.{method}: {reason}"),
            DesugarError::UnsupportedCallSite { reason } => {
                write!(f, "unsupported call site: {reason}")
            }
            DesugarError::StaleCallSite { offset } => {
                write!(f, "stale call site at offset {offset}")
            }
            DesugarError::Emit { path, source } => {
                write!(f, "failed to emit {}: {source}", path.display())
            }
            DesugarError::NoResolutionPaths => {
                write!(f, "no resolution paths registered for the input classes")
            }
            DesugarError::Io(e) => write!(f, "I/O error: {e}"),
            DesugarError::Zip(e) => write!(f, "ZIP error: {e}"),
            DesugarError::Codec(e) => write!(f, "class codec error: {e}"),
        }
    }
}

impl std::error::Error for DesugarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DesugarError::Emit { source, .. } => Some(source),
            DesugarError::Io(e) => Some(e),
            DesugarError::Zip(e) => Some(e),
            DesugarError::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DesugarError {
    fn from(e: std::io::Error) -> Self {
        DesugarError::Io(e)
    }
}

impl From<zip::result::ZipError> for DesugarError {
    fn from(e: zip::result::ZipError) -> Self {
        DesugarError::Zip(e)
    }
}

impl From<binrw::Error> for DesugarError {
    fn from(e: binrw::Error) -> Self {
        DesugarError::Codec(e)
    }
}

impl DesugarError {
    /// True for failures that only concern one class and leave the run intact.
    pub fn is_class_local(&self) -> bool {
        !matches!(
            self,
            DesugarError::Emit { .. } | DesugarError::NoResolutionPaths
        )
    }
}

pub type DesugarResult<T> = Result<T, DesugarError>;
