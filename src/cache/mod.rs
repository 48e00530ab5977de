//! Local file cache for downloaded source documents.
//!
//! Fetched guide and playlist content is written here under a logical
//! name so the parse stage can stream from disk instead of holding the
//! whole document in memory, and so an unforced startup can fall back to
//! the last download when the remote source is unreachable.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::errors::AppResult;

/// Logical cache name for the XMLTV guide document.
pub const XMLTV_CACHE_FILE: &str = "xmltv.xml";
/// Logical cache name for the M3U playlist.
pub const PLAYLIST_CACHE_FILE: &str = "playlist.m3u";

#[derive(Clone)]
pub struct FileCache {
    base_path: PathBuf,
}

impl FileCache {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        // Logical names are flat; strip any path components handed in.
        let file_name = Path::new(name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(name));
        self.base_path.join(file_name)
    }

    /// Read a cached file by logical name. Returns `None` when the file
    /// is absent or unreadable.
    pub async fn cached_file(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.path_for(name);
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!("Cache hit for '{}' ({} bytes)", name, bytes.len());
                Some(bytes)
            }
            Err(_) => None,
        }
    }

    /// Path of a cached file by logical name, `None` when not cached.
    pub async fn cached_file_path(&self, name: &str) -> Option<PathBuf> {
        let path = self.path_for(name);
        fs::metadata(&path).await.ok().map(|_| path)
    }

    /// Write content under a logical name, creating the cache directory
    /// on first use.
    pub async fn write(&self, name: &str, content: &[u8]) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.base_path).await?;
        let path = self.path_for(name);
        fs::write(&path, content).await?;
        debug!("Cached '{}' ({} bytes)", name, content.len());
        Ok(path)
    }

    /// Remove every cached file. Unremovable entries are logged and
    /// skipped; the purge is housekeeping, not a correctness gate.
    pub async fn clear(&self) {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(_) => return,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(file_type) = entry.file_type().await {
                if file_type.is_file() {
                    if let Err(e) = fs::remove_file(entry.path()).await {
                        warn!("Failed to remove cached file {:?}: {}", entry.path(), e);
                    }
                }
            }
        }
        debug!("File cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_clear_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        assert!(cache.cached_file(XMLTV_CACHE_FILE).await.is_none());
        assert!(cache.cached_file_path(XMLTV_CACHE_FILE).await.is_none());

        cache.write(XMLTV_CACHE_FILE, b"<tv/>").await.unwrap();
        assert_eq!(
            cache.cached_file(XMLTV_CACHE_FILE).await.unwrap(),
            b"<tv/>"
        );
        assert!(cache.cached_file_path(XMLTV_CACHE_FILE).await.is_some());

        cache.clear().await;
        assert!(cache.cached_file(XMLTV_CACHE_FILE).await.is_none());
    }

    #[tokio::test]
    async fn test_logical_names_cannot_escape_base_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        let path = cache.write("../escape.txt", b"x").await.unwrap();
        assert!(path.starts_with(dir.path()));
    }
}
