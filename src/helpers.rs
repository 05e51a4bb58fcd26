use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Normalize a path to an absolute form without touching the filesystem.
/// Relative paths are resolved against the current working directory, which
/// the orchestrator guarantees is the build's execution root.
pub fn get_abs_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

pub fn read_file(path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
}

/// Content digest used for cache validation. Hex-encoded so it can travel
/// through the worker request envelope unchanged.
pub fn compute_digest(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

pub fn compute_file_digest(path: &Path) -> Option<String> {
    fs::read(path).ok().map(|bytes| blake3::hash(&bytes).to_hex().to_string())
}

/// Map a source-file path to a module identifier for import generation:
/// relative to the root directory when possible, extension dropped,
/// separators normalized to `/`.
pub fn module_name_for(root_dir: Option<&Path>, file: &Path) -> String {
    let relative = match root_dir {
        Some(root) => file.strip_prefix(root).unwrap_or(file),
        None => file,
    };
    let without_ext = relative.with_extension("");
    without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Run a closure and trace its wall time at debug level. Used to instrument
/// the build phases; has no behavioral effect.
pub fn timed<T>(name: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    log::debug!("{} took {:.3}ms", name, start.elapsed().as_secs_f64() * 1000.0);
    result
}
