use std::path::{Path, PathBuf};

pub mod config;
mod envvar;
mod in_memory;
pub mod resolver;
pub mod search_path;

// Re-export commonly used types
pub use envvar::{expand_env_tokens, EnvProvider, MapEnv, SystemEnv};
pub use in_memory::InMemoryFileSystem;
pub use resolver::{split_alias, validate_filename, FilenameResolver};
pub use search_path::{PathKind, SearchPathEntry};

/// Name of the synthetic variable backing the project-directory alias.
pub const PROJECT_VAR: &str = "KIPRJMOD";

/// Legacy system model directory variable, tried as a fallback for
/// relative names and never read back from the configuration file.
pub const LEGACY_MODELS_VAR: &str = "KISYS3DMOD";

/// Fixed name of the persisted search path configuration file.
pub const CFG_FILENAME: &str = "3Dresolver.cfg";

/// Current configuration file format version.
pub const CFG_VERSION: u32 = 1;

/// Filesystem access used by the resolver. Implementations must be safe to
/// call from multiple threads.
pub trait FileSystem: Send + Sync {
    /// Check if a regular file exists at the given path
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a directory exists at the given path
    fn is_dir(&self, path: &Path) -> bool;

    /// Canonicalize a path (make it absolute, resolving `.` and `..`).
    /// Fails if the path does not exist.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, FileSystemError>;

    /// Platform directory separator
    fn separator(&self) -> char;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FileSystemError {
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Default implementation of FileSystem that uses the actual file system
#[derive(Debug, Clone, Default)]
pub struct DefaultFileSystem;

impl FileSystem for DefaultFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, FileSystemError> {
        std::fs::canonicalize(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileSystemError::NotFound(path.to_path_buf()),
            _ => FileSystemError::IoError(e.to_string()),
        })
    }

    fn separator(&self) -> char {
        std::path::MAIN_SEPARATOR
    }
}
