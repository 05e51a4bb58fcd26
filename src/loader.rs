use std::path::Path;

use crate::cache::FileCache;
use crate::error::BuildError;
use crate::helpers;

/// Strategy for loading file content by path. Which one a build uses depends
/// on the request: only persistent-worker requests carry a digest map, and
/// only those may consult the shared cache.
pub trait FileLoader {
    fn load(&mut self, path: &Path) -> Result<String, BuildError>;
}

/// Consults the file cache first and writes fresh reads back into it.
/// Staleness is handled before any load: `FileCache::update` has already
/// dropped entries whose digest no longer matches the current request.
pub struct CachedFileLoader<'c> {
    cache: &'c mut FileCache,
}

impl<'c> CachedFileLoader<'c> {
    pub fn new(cache: &'c mut FileCache) -> Self {
        Self { cache }
    }
}

impl FileLoader for CachedFileLoader<'_> {
    fn load(&mut self, path: &Path) -> Result<String, BuildError> {
        if let Some(content) = self.cache.get(path) {
            return Ok(content);
        }
        let content = helpers::read_file(path).map_err(|source| BuildError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let digest = helpers::compute_digest(&content);
        self.cache.put(path.to_path_buf(), digest, content.clone());
        Ok(content)
    }
}

/// Always performs a fresh read and never touches the cache. Used for
/// one-shot invocations, where no digest map exists to validate entries.
pub struct UncachedFileLoader;

impl FileLoader for UncachedFileLoader {
    fn load(&mut self, path: &Path) -> Result<String, BuildError> {
        helpers::read_file(path).map_err(|source| BuildError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }
}
