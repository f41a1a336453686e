//! On-disk cache of compiled templates.
//!
//! Compiled files live under the cache root in two levels of bucket
//! directories named after the leading characters of the SHA-256 digest of
//! the source path:
//!
//! ```text
//! <root>/3f/a2/3fa2…91.compiled
//! ```
//!
//! A compiled file is stale when it is missing or older than its source.
//! Writes go through a temporary file in the target directory followed by a
//! rename, so a concurrent reader sees either the old file or the new one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::CacheError;

pub const COMPILED_EXTENSION: &str = "compiled";

/// Default age after which [`TemplateCache::prune`] removes entries.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct TemplateCache {
    root: PathBuf,
}

impl TemplateCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the compiled form of `source`.
    pub fn compiled_path(&self, source: &Path) -> PathBuf {
        let digest = hex::encode(Sha256::digest(source.to_string_lossy().as_bytes()));
        self.root
            .join(&digest[..2])
            .join(&digest[2..4])
            .join(format!("{digest}.{COMPILED_EXTENSION}"))
    }

    /// True when `compiled` is missing or older than `source`.
    ///
    /// An unreadable source also counts as stale; recompiling then reports
    /// the actual error.
    pub fn is_stale(&self, source: &Path, compiled: &Path) -> bool {
        let (Ok(source), Ok(compiled)) = (fs::metadata(source), fs::metadata(compiled)) else {
            return true;
        };
        match (source.modified(), compiled.modified()) {
            (Ok(source), Ok(compiled)) => source > compiled,
            _ => true,
        }
    }

    /// Atomically replaces `compiled` with `content`.
    pub fn write(&self, compiled: &Path, content: &str) -> Result<(), CacheError> {
        let dir = compiled.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|source| CacheError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let write_error = |source| CacheError::Write {
            path: compiled.to_path_buf(),
            source,
        };
        let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
        file.write_all(content.as_bytes()).map_err(write_error)?;
        file.flush().map_err(write_error)?;
        file.persist(compiled).map_err(|err| CacheError::Persist {
            path: compiled.to_path_buf(),
            source: err.error,
        })?;
        debug!(path = %compiled.display(), "wrote compiled template");
        Ok(())
    }

    /// Removes every cached file and bucket directory, keeping the root.
    /// Returns the number of files removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.files()? {
            remove_file(&path)?;
            removed += 1;
        }
        self.remove_empty_buckets()?;
        info!(removed, root = %self.root.display(), "cleared template cache");
        Ok(removed)
    }

    /// Removes cached files last modified more than `max_age` ago.
    /// Returns the number of files removed.
    pub fn prune(&self, max_age: Duration) -> Result<usize, CacheError> {
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return Ok(0);
        };
        let mut removed = 0;
        for path in self.files()? {
            let expired = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| modified < cutoff);
            if expired {
                remove_file(&path)?;
                removed += 1;
            }
        }
        self.remove_empty_buckets()?;
        info!(removed, max_age_secs = max_age.as_secs(), "pruned template cache");
        Ok(removed)
    }

    fn files(&self) -> Result<Vec<PathBuf>, CacheError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|err| self.walk_error(err))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn remove_empty_buckets(&self) -> Result<(), CacheError> {
        if !self.root.is_dir() {
            return Ok(());
        }
        for entry in WalkDir::new(&self.root).min_depth(1).contents_first(true) {
            let entry = entry.map_err(|err| self.walk_error(err))?;
            if entry.file_type().is_dir() {
                // Non-empty buckets fail to remove and are kept.
                let _ = fs::remove_dir(entry.path());
            }
        }
        Ok(())
    }

    fn walk_error(&self, err: walkdir::Error) -> CacheError {
        let path = err.path().unwrap_or(&self.root).to_path_buf();
        CacheError::Walk {
            path,
            source: err.into(),
        }
    }
}

fn remove_file(path: &Path) -> Result<(), CacheError> {
    fs::remove_file(path).map_err(|source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn cache() -> (TempDir, TemplateCache) {
        let dir = TempDir::new().unwrap();
        let cache = TemplateCache::new(dir.path().join("cache"));
        (dir, cache)
    }

    #[test]
    fn test_compiled_path_layout() {
        let cache = TemplateCache::new("/tmp/c");
        let path = cache.compiled_path(Path::new("/views/home.quire"));
        let relative = path.strip_prefix("/tmp/c").unwrap();
        let parts: Vec<_> = relative.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 2);
        assert!(parts[2].starts_with(&format!("{}{}", parts[0], parts[1])));
        assert!(parts[2].ends_with(".compiled"));
        assert_eq!(path, cache.compiled_path(Path::new("/views/home.quire")));
        assert_ne!(path, cache.compiled_path(Path::new("/views/about.quire")));
    }

    #[test]
    fn test_write_creates_buckets() {
        let (_dir, cache) = cache();
        let compiled = cache.compiled_path(Path::new("a"));
        cache.write(&compiled, "hello").unwrap();
        assert_eq!(fs::read_to_string(&compiled).unwrap(), "hello");
        cache.write(&compiled, "again").unwrap();
        assert_eq!(fs::read_to_string(&compiled).unwrap(), "again");
    }

    #[test]
    fn test_staleness() {
        let (dir, cache) = cache();
        let source = dir.path().join("page.quire");
        fs::write(&source, "x").unwrap();
        let compiled = cache.compiled_path(&source);
        assert!(cache.is_stale(&source, &compiled));

        cache.write(&compiled, "x").unwrap();
        let old = SystemTime::now() - Duration::from_secs(60);
        File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(old)
            .unwrap();
        assert!(!cache.is_stale(&source, &compiled));

        File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        assert!(cache.is_stale(&source, &compiled));
    }

    #[test]
    fn test_missing_source_is_stale() {
        let (dir, cache) = cache();
        let compiled = cache.compiled_path(Path::new("gone"));
        cache.write(&compiled, "x").unwrap();
        assert!(cache.is_stale(&dir.path().join("gone"), &compiled));
    }

    #[test]
    fn test_clear_keeps_root() {
        let (_dir, cache) = cache();
        for name in ["a", "b", "c"] {
            cache.write(&cache.compiled_path(Path::new(name)), name).unwrap();
        }
        assert_eq!(cache.clear().unwrap(), 3);
        assert!(cache.root().is_dir());
        assert_eq!(fs::read_dir(cache.root()).unwrap().count(), 0);
        assert_eq!(cache.clear().unwrap(), 0);
    }

    #[test]
    fn test_prune_removes_old_entries() {
        let (_dir, cache) = cache();
        let old = cache.compiled_path(Path::new("old"));
        let fresh = cache.compiled_path(Path::new("fresh"));
        cache.write(&old, "old").unwrap();
        cache.write(&fresh, "fresh").unwrap();
        File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        assert_eq!(cache.prune(Duration::from_secs(60)).unwrap(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_missing_root_is_empty() {
        let (_dir, cache) = cache();
        assert_eq!(cache.clear().unwrap(), 0);
        assert_eq!(cache.prune(DEFAULT_MAX_AGE).unwrap(), 0);
    }
}
