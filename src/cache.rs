use std::path::{Path, PathBuf};

use ahash::AHashMap;

use crate::helpers;
use crate::request::InputDigest;

#[derive(Debug)]
struct CacheEntry {
    digest: String,
    content: String,
    bytes: u64,
    /// Monotonic use counter. Doubles as insertion order, so LRU ties
    /// cannot occur.
    last_used: u64,
}

/// Process-wide file cache keyed by resolved path and validated by content
/// digest. Constructed once at process start and handed into every build;
/// builds run strictly one at a time, so no locking is needed.
///
/// Entries survive across builds. An entry is only served when its digest
/// matches the digest the current build request supplied for that path; a
/// mismatch evicts the entry so the loader performs a fresh read.
#[derive(Debug)]
pub struct FileCache {
    entries: AHashMap<PathBuf, CacheEntry>,
    clock: u64,
    total_bytes: u64,
    max_bytes: Option<u64>,
    hits: u64,
    misses: u64,
}

impl FileCache {
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
            clock: 0,
            total_bytes: 0,
            max_bytes: None,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up cached content, bumping the entry's use marker. Counts a hit
    /// or a miss against the current build's baseline.
    pub fn get(&mut self, path: &Path) -> Option<String> {
        self.clock += 1;
        match self.entries.get_mut(path) {
            Some(entry) => {
                entry.last_used = self.clock;
                self.hits += 1;
                Some(entry.content.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// The digest of the cached entry for a path, if any. Lets callers detect
    /// staleness without copying content.
    pub fn last_digest(&self, path: &Path) -> Option<&str> {
        self.entries.get(path).map(|e| e.digest.as_str())
    }

    /// Apply the digest map of a build request: entries whose digest still
    /// matches are kept, stale entries are dropped, and inline content pushed
    /// by the orchestrator is inserted. Evicts down to the byte budget
    /// afterwards.
    pub fn update(&mut self, inputs: &[InputDigest]) {
        for input in inputs {
            let path = helpers::get_abs_path(&input.path);
            let stale = match self.entries.get(&path) {
                Some(entry) => entry.digest != input.digest,
                None => false,
            };
            if stale {
                self.remove(&path);
            }
            if !self.entries.contains_key(&path) {
                if let Some(content) = &input.content {
                    self.insert(path, input.digest.clone(), content.clone());
                }
            }
        }
        self.evict_to_budget();
    }

    /// Insert or replace a single entry, then evict down to the byte budget.
    /// Used by the cached loader to write back fresh reads.
    pub fn put(&mut self, path: PathBuf, digest: String, content: String) {
        self.remove(&path);
        self.insert(path, digest, content);
        self.evict_to_budget();
    }

    pub fn set_max_size(&mut self, bytes: u64) {
        self.max_bytes = Some(bytes);
        self.evict_to_budget();
    }

    /// Restore the default budget: unbounded, but the total is still tracked.
    pub fn reset_max_size(&mut self) {
        self.max_bytes = None;
    }

    /// Record a fresh baseline for hit/miss accounting. Called at the start
    /// of every build; does not touch the entry set.
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Emit a human-readable snapshot to the log sink. No behavioral effect.
    pub fn trace_stats(&self) {
        let lookups = self.hits + self.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64 * 100.0
        };
        log::debug!(
            "cache stats: {} hits, {} misses ({:.1}% hit rate), {} entries, {} bytes",
            self.hits,
            self.misses,
            hit_rate,
            self.entries.len(),
            self.total_bytes
        );
    }

    fn insert(&mut self, path: PathBuf, digest: String, content: String) {
        self.clock += 1;
        let bytes = content.len() as u64;
        self.total_bytes += bytes;
        self.entries.insert(
            path,
            CacheEntry {
                digest,
                content,
                bytes,
                last_used: self.clock,
            },
        );
    }

    fn remove(&mut self, path: &Path) {
        if let Some(entry) = self.entries.remove(path) {
            self.total_bytes -= entry.bytes;
        }
    }

    /// Evict least-recently-used entries until the total fits the budget.
    /// A single entry larger than the whole budget is kept (there is no
    /// per-entry cap); it evicts everything else and the cache stays over
    /// budget until the entry itself ages out.
    fn evict_to_budget(&mut self) {
        let Some(max) = self.max_bytes else {
            return;
        };
        while self.total_bytes > max && self.entries.len() > 1 {
            let lru = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(path, _)| path.clone());
            match lru {
                Some(path) => {
                    log::debug!("cache evicting {}", path.display());
                    self.remove(&path);
                }
                None => break,
            }
        }
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::compute_digest;

    fn input(path: &str, content: &str) -> InputDigest {
        InputDigest {
            path: PathBuf::from(path),
            digest: compute_digest(content),
            content: Some(content.to_string()),
        }
    }

    #[test]
    fn serves_entry_with_matching_digest() {
        let mut cache = FileCache::new();
        cache.update(&[input("/a.ts", "let a = 1;")]);
        let path = helpers::get_abs_path(Path::new("/a.ts"));

        assert_eq!(cache.get(&path).as_deref(), Some("let a = 1;"));
        assert_eq!(cache.stats(), (1, 0));
    }

    #[test]
    fn digest_mismatch_drops_stale_entry() {
        let mut cache = FileCache::new();
        cache.update(&[input("/a.ts", "old")]);
        let path = helpers::get_abs_path(Path::new("/a.ts"));

        // Same path, new digest, no inline content: the stale entry must go.
        cache.update(&[InputDigest {
            path: PathBuf::from("/a.ts"),
            digest: compute_digest("new"),
            content: None,
        }]);

        assert_eq!(cache.get(&path), None);
        assert_eq!(cache.stats(), (0, 1));
    }

    #[test]
    fn unchanged_digest_survives_update() {
        let mut cache = FileCache::new();
        cache.update(&[input("/a.ts", "same")]);
        cache.update(&[InputDigest {
            path: PathBuf::from("/a.ts"),
            digest: compute_digest("same"),
            content: None,
        }]);
        let path = helpers::get_abs_path(Path::new("/a.ts"));

        assert_eq!(cache.get(&path).as_deref(), Some("same"));
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let mut cache = FileCache::new();
        cache.update(&[input("/a.ts", "aaaa"), input("/b.ts", "bbbb"), input("/c.ts", "cccc")]);

        // Touch /a.ts so /b.ts becomes the least recently used.
        let a = helpers::get_abs_path(Path::new("/a.ts"));
        let b = helpers::get_abs_path(Path::new("/b.ts"));
        let c = helpers::get_abs_path(Path::new("/c.ts"));
        cache.get(&a);

        cache.set_max_size(8);
        assert!(cache.total_bytes() <= 8);
        assert_eq!(cache.last_digest(&b), None);
        assert!(cache.last_digest(&a).is_some());
        assert!(cache.last_digest(&c).is_some());
    }

    #[test]
    fn total_stays_within_budget_after_update() {
        let mut cache = FileCache::new();
        cache.set_max_size(10);
        cache.update(&[
            input("/a.ts", "12345"),
            input("/b.ts", "12345"),
            input("/c.ts", "12345"),
        ]);
        assert!(cache.total_bytes() <= 10);
    }

    #[test]
    fn oversized_entry_is_kept_and_evicts_the_rest() {
        let mut cache = FileCache::new();
        cache.set_max_size(8);
        cache.update(&[input("/small.ts", "tiny")]);
        cache.put(
            helpers::get_abs_path(Path::new("/huge.ts")),
            compute_digest("x"),
            "0123456789abcdef".to_string(),
        );

        // The oversized entry stays; everything else is gone; the cache is
        // over budget with a single entry, which is the documented worst case.
        assert_eq!(cache.entry_count(), 1);
        assert!(cache.last_digest(&helpers::get_abs_path(Path::new("/huge.ts"))).is_some());
        assert!(cache.total_bytes() > 8);
    }

    #[test]
    fn reset_stats_keeps_entries() {
        let mut cache = FileCache::new();
        cache.update(&[input("/a.ts", "keep me")]);
        let path = helpers::get_abs_path(Path::new("/a.ts"));
        cache.get(&path);
        assert_eq!(cache.stats(), (1, 0));

        cache.reset_stats();
        assert_eq!(cache.stats(), (0, 0));
        assert_eq!(cache.get(&path).as_deref(), Some("keep me"));
    }
}
