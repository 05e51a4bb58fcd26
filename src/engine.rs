pub mod process;

#[cfg(test)]
pub mod mock;

use std::path::{Path, PathBuf};

use crate::diagnostics::Diagnostic;
use crate::error::BuildError;
use crate::host::CompilerHost;
use crate::request::CompilerOptions;

/// A source-text rewriting function. With an opaque engine the worker cannot
/// reach into the compiler's AST, so transformers operate on text: staged
/// sources before the compiler runs, emitted outputs after.
pub type Transform = Box<dyn Fn(&Path, &str) -> String>;

/// Transformer lists accumulated across the plugin chain, concatenated in
/// registration order.
#[derive(Default)]
pub struct CustomTransformers {
    /// Applied to sources before the compiler sees them.
    pub before: Vec<Transform>,
    /// Applied to emitted outputs.
    pub after: Vec<Transform>,
    /// Applied to emitted declaration outputs.
    pub after_declarations: Vec<Transform>,
}

impl CustomTransformers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, other: CustomTransformers) {
        self.before.extend(other.before);
        self.after.extend(other.after);
        self.after_declarations.extend(other.after_declarations);
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.after_declarations.is_empty()
    }
}

/// Result of emitting one compilation target.
#[derive(Debug, Default)]
pub struct EmitResult {
    pub diagnostics: Vec<Diagnostic>,
    pub outputs: Vec<PathBuf>,
}

/// The opaque handle produced by the compiler engine for one build. Plugin
/// chain steps wrap values of this trait; every wrapper must forward the
/// diagnostics of the program it wraps.
///
/// There is deliberately no declaration-diagnostics accessor: requesting
/// declaration diagnostics as a side channel before emit is known to corrupt
/// the emitted output, so the only way to observe emit diagnostics is the
/// `EmitResult` of `emit` itself.
pub trait Program {
    /// All source files of the program, in a stable order.
    fn source_files(&self) -> Vec<PathBuf>;

    fn source_text(&self, file: &Path) -> Option<String>;

    /// Diagnostics about the compiler options themselves.
    fn options_diagnostics(&self) -> Vec<Diagnostic>;

    /// Diagnostics not attached to any single file.
    fn global_diagnostics(&self) -> Vec<Diagnostic>;

    fn syntactic_diagnostics(&self, file: &Path) -> Vec<Diagnostic>;

    fn semantic_diagnostics(&self, file: &Path) -> Vec<Diagnostic>;

    /// Emit one compilation target, applying the accumulated transformers.
    fn emit(&self, file: &Path, transforms: &CustomTransformers) -> Result<EmitResult, BuildError>;
}

/// The compiler engine seam. The host is moved in: every file the engine
/// observes passes through the host's allowlist and loader exactly once, at
/// program-construction time.
pub trait CompilerEngine {
    fn create_program(
        &self,
        targets: &[PathBuf],
        options: &CompilerOptions,
        host: CompilerHost<'_>,
    ) -> Result<Box<dyn Program>, BuildError>;
}

/// Alternate emit path (decorator downleveling). Optional: a build that
/// requests it while none is registered fails with a typed error.
pub trait EmitBackend {
    fn emit(
        &self,
        program: &dyn Program,
        file: &Path,
        transforms: &CustomTransformers,
    ) -> Result<EmitResult, BuildError>;
}
