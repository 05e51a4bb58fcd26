use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::diagnostics::{Diagnostic, DiagnosticOrigin};
use crate::engine::Program;
use crate::helpers;
use crate::plugins::{DiagnosticPlugin, PluginContext, ProgramOverlay};
use crate::request::BuildRequest;

/// Package-manager directory convention. Anything resolved under it is
/// vendored third-party code and exempt from strictness checks.
const PACKAGE_DIR: &str = "node_modules";

/// Checks that every import in a compilation target points at the target's
/// own files or at a declared direct dependency. A file being a build input
/// is not permission to import it: inputs include transitive dependencies,
/// and importing those directly is exactly what this checker rejects.
pub struct StrictDepsPlugin {
    allowed: Vec<PathBuf>,
    ignored: Vec<PathBuf>,
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^[ \t]*(?:import|export)\b[^\n"']*["']([^"'\n]+)["']|\brequire\(\s*["']([^"'\n]+)["']\s*\)"#,
        )
        .expect("import pattern is valid")
    })
}

impl StrictDepsPlugin {
    pub fn from_request(request: &BuildRequest) -> Self {
        let allowed = request
            .worker
            .allowed_deps
            .iter()
            .map(|p| helpers::get_abs_path(p))
            .collect();

        let mut ignored: Vec<PathBuf> = request
            .worker
            .ignored_prefixes
            .iter()
            .map(|p| helpers::get_abs_path(p))
            .collect();
        ignored.push(helpers::get_abs_path(Path::new(PACKAGE_DIR)));
        if let Some(root) = &request.compiler.root_dir {
            ignored.push(root.join(PACKAGE_DIR));
        }

        Self { allowed, ignored }
    }

    fn check_file(&self, file: &Path, text: &str, ctx: &PluginContext) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for captures in import_re().captures_iter(text) {
            let (spec, offset) = match captures.get(1).or_else(|| captures.get(2)) {
                Some(m) => (m.as_str(), m.start()),
                None => continue,
            };
            // Bare specifiers resolve into the package-manager directory,
            // which is always ignorable.
            if !spec.starts_with('.') {
                continue;
            }
            let resolved = resolve_relative(file, spec);
            if self.ignored.iter().any(|p| resolved.starts_with(p)) {
                continue;
            }
            if self.is_allowed(&resolved, ctx) {
                continue;
            }
            let line = line_of(text, offset);
            diags.push(
                Diagnostic::error(
                    format!(
                        "dependency on {spec} is not allowed by this build request; \
                         declare the dependency that owns it"
                    ),
                    DiagnosticOrigin::StrictDeps,
                )
                .with_file(file.to_path_buf())
                .with_position(line, 1)
                .with_code("strict-deps"),
            );
        }
        diags
    }

    fn is_allowed(&self, resolved: &Path, ctx: &PluginContext) -> bool {
        if self.allowed.iter().any(|p| resolved.starts_with(p)) {
            return true;
        }
        // Imports within the target's own source set are always fine. The
        // specifier usually omits the extension, so probe with the targets'
        // extensions as well.
        ctx.targets.iter().any(|t| {
            t == resolved
                || t.extension()
                    .is_some_and(|ext| resolved.with_extension(ext) == *t)
        })
    }
}

fn line_of(text: &str, offset: usize) -> u32 {
    text[..offset.min(text.len())].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}

/// Lexically resolve a relative specifier against the importing file's
/// directory, folding `.` and `..` components.
fn resolve_relative(file: &Path, spec: &str) -> PathBuf {
    let base = file.parent().unwrap_or(Path::new("/"));
    let mut resolved = base.to_path_buf();
    for component in Path::new(spec).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => resolved.push(part),
            Component::RootDir | Component::Prefix(_) => resolved = PathBuf::from(component.as_os_str()),
        }
    }
    resolved
}

impl DiagnosticPlugin for StrictDepsPlugin {
    fn name(&self) -> &str {
        "strict-deps"
    }

    fn wrap(&self, program: Box<dyn Program>, ctx: &PluginContext) -> Box<dyn Program> {
        let mut overlay = ProgramOverlay::new(program);
        for target in &ctx.targets {
            if let Some(text) = overlay.source_text(target) {
                for diag in self.check_file(target, &text, ctx) {
                    overlay.add_semantic(target.clone(), diag);
                }
            }
        }
        Box::new(overlay)
    }
}
