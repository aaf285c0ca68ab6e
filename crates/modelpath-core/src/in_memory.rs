use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{FileSystem, FileSystemError};

/// In-memory file system that stores known files and directories in sets.
/// Useful for testing and for hosts where real file system access is not
/// available.
#[derive(Clone, Debug)]
pub struct InMemoryFileSystem {
    files: Arc<Mutex<HashSet<PathBuf>>>,
    dirs: Arc<Mutex<HashSet<PathBuf>>>,
    cwd: PathBuf,
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFileSystem {
    /// Create an empty file system rooted at `/`.
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashSet::new())),
            dirs: Arc::new(Mutex::new(HashSet::new())),
            cwd: PathBuf::from("/"),
        }
    }

    /// Create an empty file system with the given working directory, used
    /// to anchor relative lookups.
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        let mut fs = Self::new();
        fs.cwd = cwd.into();
        fs.add_dir(fs.cwd.clone());
        fs
    }

    /// Register a file. All parent directories are registered as well.
    pub fn add_file(&self, path: impl Into<PathBuf>) {
        let path = self.absolute(&path.into());

        let mut current = path.parent();
        while let Some(dir) = current {
            self.dirs.lock().unwrap().insert(dir.to_path_buf());
            current = dir.parent();
        }

        self.files.lock().unwrap().insert(path);
    }

    /// Register a directory and its parents.
    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        let path = self.absolute(&path.into());

        let mut current = Some(path.as_path());
        while let Some(dir) = current {
            self.dirs.lock().unwrap().insert(dir.to_path_buf());
            current = dir.parent();
        }
    }

    /// Remove a file.
    pub fn remove_file(&self, path: impl Into<PathBuf>) {
        let path = self.absolute(&path.into());
        self.files.lock().unwrap().remove(&path);
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        };

        // Resolve `.` and `..` lexically.
        let mut result = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    result.pop();
                }
                other => result.push(other),
            }
        }
        result
    }
}

impl FileSystem for InMemoryFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains(&self.absolute(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().contains(&self.absolute(path))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, FileSystemError> {
        let full = self.absolute(path);

        if self.files.lock().unwrap().contains(&full) || self.dirs.lock().unwrap().contains(&full)
        {
            Ok(full)
        } else {
            Err(FileSystemError::NotFound(path.to_path_buf()))
        }
    }

    fn separator(&self) -> char {
        '/'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_file_registers_parents() {
        let fs = InMemoryFileSystem::new();
        fs.add_file("/opt/models/a/box.wrl");

        assert!(fs.is_file(Path::new("/opt/models/a/box.wrl")));
        assert!(fs.is_dir(Path::new("/opt/models/a")));
        assert!(fs.is_dir(Path::new("/opt/models")));
        assert!(!fs.is_file(Path::new("/opt/models/a")));
    }

    #[test]
    fn test_relative_paths_anchor_at_cwd() {
        let fs = InMemoryFileSystem::with_cwd("/work/project");
        fs.add_file("boards/top.wrl");

        assert!(fs.is_file(Path::new("/work/project/boards/top.wrl")));
        assert!(fs.is_file(Path::new("boards/top.wrl")));
    }

    #[test]
    fn test_canonicalize_resolves_dots() {
        let fs = InMemoryFileSystem::new();
        fs.add_file("/opt/models/box.wrl");

        assert_eq!(
            fs.canonicalize(Path::new("/opt/./extra/../models/box.wrl"))
                .unwrap(),
            PathBuf::from("/opt/models/box.wrl")
        );
    }

    #[test]
    fn test_canonicalize_missing_path_fails() {
        let fs = InMemoryFileSystem::new();
        assert!(fs.canonicalize(Path::new("/nope")).is_err());
    }
}
