//! Reading repository files by their manifest path.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

/// Resolves a repository-relative path to its current bytes.
pub trait FileSource: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable.
    fn read(&self, rel_path: &str) -> io::Result<Vec<u8>>;
}

/// Reads files beneath a repository root on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSource for FsSource {
    fn read(&self, rel_path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(rel_path))
    }
}

/// In-memory file set.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    #[must_use]
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_owned(), content.into());
        self
    }
}

impl FileSource for MemorySource {
    fn read(&self, rel_path: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(rel_path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, rel_path.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_source_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn f() {}").unwrap();

        let source = FsSource::new(dir.path());
        assert_eq!(source.read("src/lib.rs").unwrap(), b"pub fn f() {}");
        assert_eq!(
            source.read("missing.rs").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn memory_source_lookup() {
        let source = MemorySource::default().with_file("a.txt", "hello");
        assert_eq!(source.read("a.txt").unwrap(), b"hello");
        assert!(source.read("b.txt").is_err());
    }
}
