use std::path::{Path, PathBuf};

use ahash::AHashSet;

use crate::error::BuildError;
use crate::helpers;
use crate::loader::FileLoader;

/// Bridges a file loader and the build's input allowlist into the interface
/// the compiler engine consumes. Every read goes through here, which is what
/// makes builds hermetic: a build may only observe files its request
/// declared.
pub struct CompilerHost<'c> {
    loader: Box<dyn FileLoader + 'c>,
    inputs: Vec<PathBuf>,
    allowlist: AHashSet<PathBuf>,
    root_dir: Option<PathBuf>,
}

impl<'c> CompilerHost<'c> {
    pub fn new(
        loader: Box<dyn FileLoader + 'c>,
        inputs: &[PathBuf],
        root_dir: Option<PathBuf>,
    ) -> Self {
        let inputs: Vec<PathBuf> = inputs.iter().map(|p| helpers::get_abs_path(p)).collect();
        let allowlist = inputs.iter().cloned().collect();
        Self {
            loader,
            inputs,
            allowlist,
            root_dir,
        }
    }

    /// All files reachable during this build, in request order.
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Read a declared input. The allowlist check runs before the loader is
    /// consulted, so an undeclared path never touches the cache.
    pub fn read_file(&mut self, path: &Path) -> Result<String, BuildError> {
        let resolved = helpers::get_abs_path(path);
        if !self.allowlist.contains(&resolved) {
            return Err(BuildError::UndeclaredInput(resolved));
        }
        self.loader.load(&resolved)
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        self.allowlist.contains(&helpers::get_abs_path(path))
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    /// Helper handed to transformers that generate import statements.
    pub fn module_name_for(&self, path: &Path) -> String {
        helpers::module_name_for(self.root_dir.as_deref(), path)
    }
}
