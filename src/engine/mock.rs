//! Scripted engine for tests. Diagnostics are driven by markers in the
//! source text (`SYNTAX_ERROR`, `SEMANTIC_ERROR`, `EMIT_ERROR`), and every
//! emit call is recorded so tests can assert on emit gating.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ahash::AHashMap;

use crate::diagnostics::{Diagnostic, DiagnosticOrigin};
use crate::engine::{CompilerEngine, CustomTransformers, EmitResult, Program};
use crate::error::BuildError;
use crate::host::CompilerHost;
use crate::request::CompilerOptions;

#[derive(Default)]
pub struct MockEngine {
    pub emitted: Rc<RefCell<Vec<PathBuf>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_count(&self) -> usize {
        self.emitted.borrow().len()
    }
}

impl CompilerEngine for MockEngine {
    fn create_program(
        &self,
        targets: &[PathBuf],
        _options: &CompilerOptions,
        mut host: CompilerHost<'_>,
    ) -> Result<Box<dyn Program>, BuildError> {
        // Load targets first, then the remaining inputs, all through the
        // host, so tests exercise the allowlist and the cache exactly like a
        // real engine would.
        let mut sources = AHashMap::new();
        for path in targets.iter().cloned().chain(host.inputs().to_vec()) {
            if sources.contains_key(&path) {
                continue;
            }
            let text = host.read_file(&path)?;
            sources.insert(path, text);
        }
        Ok(Box::new(MockProgram {
            sources,
            emitted: Rc::clone(&self.emitted),
        }))
    }
}

pub struct MockProgram {
    sources: AHashMap<PathBuf, String>,
    emitted: Rc<RefCell<Vec<PathBuf>>>,
}

impl MockProgram {
    fn marker_diagnostic(&self, file: &Path, marker: &str) -> Vec<Diagnostic> {
        match self.sources.get(file) {
            Some(text) if text.contains(marker) => {
                vec![
                    Diagnostic::error(format!("{marker} found"), DiagnosticOrigin::Engine)
                        .with_file(file.to_path_buf())
                        .with_position(1, 1),
                ]
            }
            _ => Vec::new(),
        }
    }
}

impl Program for MockProgram {
    fn source_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.sources.keys().cloned().collect();
        files.sort();
        files
    }

    fn source_text(&self, file: &Path) -> Option<String> {
        self.sources.get(file).cloned()
    }

    fn options_diagnostics(&self) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn global_diagnostics(&self) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn syntactic_diagnostics(&self, file: &Path) -> Vec<Diagnostic> {
        self.marker_diagnostic(file, "SYNTAX_ERROR")
    }

    fn semantic_diagnostics(&self, file: &Path) -> Vec<Diagnostic> {
        self.marker_diagnostic(file, "SEMANTIC_ERROR")
    }

    fn emit(&self, file: &Path, transforms: &CustomTransformers) -> Result<EmitResult, BuildError> {
        self.emitted.borrow_mut().push(file.to_path_buf());
        let mut diagnostics = self.marker_diagnostic(file, "EMIT_ERROR");
        for d in &mut diagnostics {
            d.origin = DiagnosticOrigin::Emit;
        }
        // Run the before-transformers so tests can observe chain wiring.
        if let Some(text) = self.sources.get(file) {
            let _ = transforms
                .before
                .iter()
                .fold(text.clone(), |acc, t| t(file, &acc));
        }
        Ok(EmitResult {
            diagnostics,
            outputs: Vec::new(),
        })
    }
}
