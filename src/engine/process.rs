use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use ahash::AHashMap;
use tempfile::TempDir;

use crate::diagnostics::{Diagnostic, DiagnosticOrigin};
use crate::engine::{CompilerEngine, CustomTransformers, EmitResult, Program};
use crate::error::BuildError;
use crate::host::CompilerHost;
use crate::request::CompilerOptions;

/// Engine that drives an external compiler executable. Every declared input
/// is staged through the host into a scratch directory at program creation,
/// so the allowlist and the file cache stay on the only path to content; the
/// compiler then runs against the staged copies, one invocation per phase
/// and file. Non-zero exits and stderr output become diagnostics.
pub struct ProcessEngine;

impl CompilerEngine for ProcessEngine {
    fn create_program(
        &self,
        _targets: &[PathBuf],
        options: &CompilerOptions,
        mut host: CompilerHost<'_>,
    ) -> Result<Box<dyn Program>, BuildError> {
        let staging = TempDir::new()
            .map_err(|e| BuildError::Engine(format!("cannot create staging directory: {e}")))?;

        let root = host.root_dir().map(Path::to_path_buf);
        let mut sources = AHashMap::new();
        let mut staged = AHashMap::new();
        for path in host.inputs().to_vec() {
            let text = host.read_file(&path)?;
            let staged_path = staging.path().join(stage_relative(root.as_deref(), &path));
            if let Some(parent) = staged_path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    BuildError::Engine(format!("cannot stage {}: {e}", path.display()))
                })?;
            }
            fs::write(&staged_path, &text)
                .map_err(|e| BuildError::Engine(format!("cannot stage {}: {e}", path.display())))?;
            sources.insert(path.clone(), text);
            staged.insert(path, staged_path);
        }

        Ok(Box::new(ProcessProgram {
            staging,
            sources,
            staged,
            options: options.clone(),
        }))
    }
}

/// Where an input lands inside the staging directory: relative to the root
/// directory when it is under it, otherwise flattened under `_external`.
fn stage_relative(root: Option<&Path>, path: &Path) -> PathBuf {
    if let Some(root) = root {
        if let Ok(relative) = path.strip_prefix(root) {
            return relative.to_path_buf();
        }
    }
    let flat: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    PathBuf::from("_external").join(flat.join("_"))
}

struct ProcessProgram {
    staging: TempDir,
    sources: AHashMap<PathBuf, String>,
    staged: AHashMap<PathBuf, PathBuf>,
    options: CompilerOptions,
}

impl ProcessProgram {
    /// Run one compiler invocation for a file and convert the outcome into
    /// diagnostics. Spawn failures are diagnostics too: the build must fail,
    /// not the process.
    fn run_phase(&self, phase_args: &[String], file: &Path) -> Vec<Diagnostic> {
        let Some(staged) = self.staged.get(file) else {
            return vec![
                Diagnostic::error("file is not part of this program", DiagnosticOrigin::Engine)
                    .with_file(file.to_path_buf()),
            ];
        };

        let output = Command::new(&self.options.program)
            .args(&self.options.args)
            .args(phase_args)
            .arg(staged)
            .current_dir(self.staging.path())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return vec![Diagnostic::error(
                    format!("failed to run {}: {e}", self.options.program.display()),
                    DiagnosticOrigin::Engine,
                )];
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let mut diags = Vec::new();
        if output.status.success() {
            if !stderr.is_empty() {
                diags.push(
                    Diagnostic::warning(stderr.to_string(), DiagnosticOrigin::Engine)
                        .with_file(file.to_path_buf()),
                );
            }
        } else if stderr.is_empty() {
            diags.push(
                Diagnostic::error(
                    format!("compiler exited with {}", output.status),
                    DiagnosticOrigin::Engine,
                )
                .with_file(file.to_path_buf()),
            );
        } else {
            diags.push(
                Diagnostic::error(stderr.to_string(), DiagnosticOrigin::Engine)
                    .with_file(file.to_path_buf()),
            );
        }
        diags
    }

    /// Expected output path for a target, when the options describe one:
    /// the staged file's path relative to the staging root, moved under the
    /// output directory, with the suffix replacing the source extension.
    /// Compiler outputs mirror the staged source layout.
    fn output_path(&self, file: &Path, suffix: &str) -> Option<PathBuf> {
        let out_dir = self.options.out_dir.as_ref()?;
        let staged = self.staged.get(file)?;
        let relative = staged.strip_prefix(self.staging.path()).ok()?;
        let stem = relative.file_stem()?.to_string_lossy().into_owned();
        let parent = relative.parent().unwrap_or(Path::new(""));
        Some(
            self.staging
                .path()
                .join(out_dir)
                .join(parent)
                .join(format!("{stem}{suffix}")),
        )
    }

    fn apply_output_transforms(
        &self,
        file: &Path,
        suffix: Option<&str>,
        transforms: &[super::Transform],
        outputs: &mut Vec<PathBuf>,
    ) -> Result<(), BuildError> {
        let Some(suffix) = suffix else {
            return Ok(());
        };
        let Some(path) = self.output_path(file, suffix) else {
            return Ok(());
        };
        if !path.exists() {
            return Err(BuildError::Engine(format!(
                "expected output {} was not produced for {}",
                path.display(),
                file.display()
            )));
        }
        let text = fs::read_to_string(&path).map_err(|e| {
            BuildError::Engine(format!("cannot read output {}: {e}", path.display()))
        })?;
        let rewritten = transforms.iter().fold(text, |acc, t| t(file, &acc));
        fs::write(&path, rewritten).map_err(|e| {
            BuildError::Engine(format!("cannot write output {}: {e}", path.display()))
        })?;
        outputs.push(path);
        Ok(())
    }
}

impl Program for ProcessProgram {
    fn source_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.sources.keys().cloned().collect();
        files.sort();
        files
    }

    fn source_text(&self, file: &Path) -> Option<String> {
        self.sources.get(file).cloned()
    }

    fn options_diagnostics(&self) -> Vec<Diagnostic> {
        if self.options.program.as_os_str().is_empty() {
            return vec![Diagnostic::error(
                "no compiler executable configured (compiler.program)",
                DiagnosticOrigin::Engine,
            )];
        }
        Vec::new()
    }

    fn global_diagnostics(&self) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn syntactic_diagnostics(&self, file: &Path) -> Vec<Diagnostic> {
        if self.options.parse_args.is_empty() {
            return Vec::new();
        }
        self.run_phase(&self.options.parse_args, file)
    }

    fn semantic_diagnostics(&self, file: &Path) -> Vec<Diagnostic> {
        if self.options.check_args.is_empty() {
            return Vec::new();
        }
        self.run_phase(&self.options.check_args, file)
    }

    fn emit(&self, file: &Path, transforms: &CustomTransformers) -> Result<EmitResult, BuildError> {
        // Pre-compiler transformers rewrite the staged copy in place.
        if !transforms.before.is_empty() {
            if let (Some(staged), Some(text)) = (self.staged.get(file), self.sources.get(file)) {
                let rewritten = transforms
                    .before
                    .iter()
                    .fold(text.clone(), |acc, t| t(file, &acc));
                fs::write(staged, rewritten).map_err(|e| {
                    BuildError::Engine(format!("cannot rewrite staged {}: {e}", file.display()))
                })?;
            }
        }

        let diagnostics = self.run_phase(&self.options.emit_args, file);
        let has_errors = diagnostics
            .iter()
            .any(|d| d.severity == crate::diagnostics::Severity::Error);

        let mut outputs = Vec::new();
        if !has_errors {
            self.apply_output_transforms(
                file,
                self.options.emit_suffix.as_deref(),
                &transforms.after,
                &mut outputs,
            )?;
            self.apply_output_transforms(
                file,
                self.options.declaration_suffix.as_deref(),
                &transforms.after_declarations,
                &mut outputs,
            )?;
        }

        Ok(EmitResult {
            diagnostics,
            outputs,
        })
    }
}
