use std::io;
use std::path::{Path, PathBuf};

/// Filesystem-backed cache of downloaded geo files, one file per configured
/// source, named by its logical filename.
///
/// Sizes are never cached across cycles; the filesystem is the source of
/// truth every time a comparison is made.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open the store, creating the directory if it does not exist yet.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.path_for(filename).exists()
    }

    /// Size in bytes, or 0 when the file is absent.
    pub fn size_of(&self, filename: &str) -> u64 {
        file_size(&self.path_for(filename))
    }
}

/// Size of an arbitrary path in bytes, 0 when absent.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("cache").join("geo");
        let store = LocalStore::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(store.dir(), nested);
    }

    #[test]
    fn absent_file_has_size_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(!store.contains("geoip.dat"));
        assert_eq!(store.size_of("geoip.dat"), 0);
    }

    #[test]
    fn size_reflects_current_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        std::fs::write(store.path_for("geoip.dat"), b"12345").unwrap();
        assert!(store.contains("geoip.dat"));
        assert_eq!(store.size_of("geoip.dat"), 5);

        std::fs::write(store.path_for("geoip.dat"), b"123").unwrap();
        assert_eq!(store.size_of("geoip.dat"), 3);
    }
}
