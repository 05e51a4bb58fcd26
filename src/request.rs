use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::helpers;

/// Options for the wrapped compiler executable. The compiler itself is
/// opaque: the worker only knows how to invoke it per phase and where its
/// outputs land.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerOptions {
    /// Path (or PATH-resolvable name) of the compiler executable.
    pub program: PathBuf,
    /// Arguments passed on every invocation, before the phase arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Arguments for a parse-only invocation (syntactic diagnostics). A phase
    /// with no configured arguments is skipped.
    #[serde(default)]
    pub parse_args: Vec<String>,
    /// Arguments for a check-only invocation (semantic diagnostics).
    #[serde(default)]
    pub check_args: Vec<String>,
    /// Extra arguments for the emit invocation. Unlike `parse_args` and
    /// `check_args`, an empty list does not skip the invocation: emit always
    /// runs the compiler.
    #[serde(default)]
    pub emit_args: Vec<String>,
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    /// Directory the compiler writes outputs into, relative to the staging
    /// directory. Needed for post-emit transformers to find outputs.
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    /// Extension of emitted outputs, e.g. ".js".
    #[serde(default)]
    pub emit_suffix: Option<String>,
    /// Extension of emitted declaration outputs, e.g. ".d.ts".
    #[serde(default)]
    pub declaration_suffix: Option<String>,
}

/// One entry in the request's expected-diagnostics list. All provided fields
/// must match for a diagnostic to be suppressed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedDiagnostic {
    /// Suffix match against the diagnostic's file path.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub message_contains: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Worker-specific options, separate from the compiler's own flags.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerOptions {
    /// Label used in diagnostic headers; falls back to the first target.
    #[serde(default)]
    pub target_label: Option<String>,
    #[serde(default)]
    pub max_cache_size_mb: Option<u64>,
    /// Names of externally configured plugins, applied in this order after
    /// the built-in checkers. Each is constructed fresh per build.
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub disable_strict_deps: bool,
    /// When set, syntactic/semantic checks cover all reachable files instead
    /// of only the compilation targets.
    #[serde(default)]
    pub type_check_dependencies: bool,
    #[serde(default)]
    pub disabled_rules: Vec<String>,
    #[serde(default)]
    pub expected_diagnostics: Vec<ExpectedDiagnostic>,
    /// Path prefixes the strictness checker accepts imports from.
    #[serde(default)]
    pub allowed_deps: Vec<PathBuf>,
    /// Path prefixes whose sources are ignorable for strictness (vendored
    /// code). The package-manager directory is always added on top.
    #[serde(default)]
    pub ignored_prefixes: Vec<PathBuf>,
    /// Route emit through the alternate decorator-downleveling backend.
    #[serde(default)]
    pub lowered_emit: bool,
}

/// Inline file metadata pushed by the orchestrator in worker mode: always a
/// digest, optionally the content itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputDigest {
    pub path: PathBuf,
    pub digest: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Everything describing one unit of compilation work. Immutable once
/// parsed; one instance per build.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BuildRequest {
    /// The files to compile and emit, in order.
    pub targets: Vec<PathBuf>,
    /// Superset of all files reachable during compilation. Doubles as the
    /// hermeticity allowlist.
    pub inputs: Vec<PathBuf>,
    #[serde(default)]
    pub compiler: CompilerOptions,
    #[serde(default)]
    pub worker: WorkerOptions,
}

impl BuildRequest {
    pub fn is_compilation_target(&self, path: &Path) -> bool {
        self.targets.iter().any(|t| t == path)
    }

    pub fn target_label(&self) -> String {
        match &self.worker.target_label {
            Some(label) => label.clone(),
            None => self
                .targets
                .first()
                .map(|t| t.display().to_string())
                .unwrap_or_else(|| "<no targets>".to_string()),
        }
    }

    fn normalize(&mut self) {
        self.targets = self.targets.iter().map(|p| helpers::get_abs_path(p)).collect();
        self.inputs = self.inputs.iter().map(|p| helpers::get_abs_path(p)).collect();
        if let Some(root) = &self.compiler.root_dir {
            self.compiler.root_dir = Some(helpers::get_abs_path(root));
        }
    }
}

/// Parse the arguments of one build into a request. Exactly one argument is
/// accepted: the path to a JSON build request file. Leading at-signs are
/// stripped, since the orchestrator passes params files as `@path`.
pub fn parse_build_file(args: &[String]) -> Result<BuildRequest, BuildError> {
    if args.len() != 1 {
        return Err(BuildError::Configuration(format!(
            "expected one argument (path to the build request file), got {}",
            args.len()
        )));
    }
    let path = args[0].trim_start_matches('@');
    let content = helpers::read_file(Path::new(path)).map_err(|e| {
        BuildError::Configuration(format!("cannot read build request file {path}: {e}"))
    })?;
    parse_request_json(&content)
}

pub fn parse_request_json(content: &str) -> Result<BuildRequest, BuildError> {
    let mut request: BuildRequest = serde_json::from_str(content)
        .map_err(|e| BuildError::Configuration(format!("malformed build request: {e}")))?;
    request.normalize();
    Ok(request)
}
