pub mod rules;
pub mod strict_deps;

use std::path::{Path, PathBuf};

use ahash::{AHashMap, AHashSet};

use crate::diagnostics::Diagnostic;
use crate::engine::{CustomTransformers, EmitBackend, EmitResult, Program};
use crate::error::BuildError;
use crate::helpers;
use crate::request::BuildRequest;

use self::rules::RuleCheckerPlugin;
use self::strict_deps::StrictDepsPlugin;

/// What a plugin gets to see of the build, plus the module-name helper it
/// can use when generating import statements.
pub struct PluginContext {
    pub targets: Vec<PathBuf>,
    pub inputs: AHashSet<PathBuf>,
    pub root_dir: Option<PathBuf>,
}

impl PluginContext {
    pub fn from_request(request: &BuildRequest) -> Self {
        Self {
            targets: request.targets.clone(),
            inputs: request.inputs.iter().cloned().collect(),
            root_dir: request.compiler.root_dir.clone(),
        }
    }

    pub fn module_name(&self, path: &Path) -> String {
        helpers::module_name_for(self.root_dir.as_deref(), path)
    }
}

/// One step of the diagnostic chain. `wrap` must return a program whose
/// diagnostics are a superset of the input program's; using
/// [`ProgramOverlay`] gives that guarantee by construction.
pub trait DiagnosticPlugin {
    fn name(&self) -> &str;

    fn wrap(&self, program: Box<dyn Program>, ctx: &PluginContext) -> Box<dyn Program>;

    fn transformers(&self, _ctx: &PluginContext) -> Option<CustomTransformers> {
        None
    }
}

/// Decorator over a program that forwards every accessor to the wrapped
/// value and appends the step's own diagnostics. A step built on this
/// wrapper cannot drop inner diagnostics.
pub struct ProgramOverlay {
    inner: Box<dyn Program>,
    extra_global: Vec<Diagnostic>,
    extra_syntactic: AHashMap<PathBuf, Vec<Diagnostic>>,
    extra_semantic: AHashMap<PathBuf, Vec<Diagnostic>>,
}

impl ProgramOverlay {
    pub fn new(inner: Box<dyn Program>) -> Self {
        Self {
            inner,
            extra_global: Vec::new(),
            extra_syntactic: AHashMap::new(),
            extra_semantic: AHashMap::new(),
        }
    }

    pub fn add_global(&mut self, diag: Diagnostic) {
        self.extra_global.push(diag);
    }

    pub fn add_syntactic(&mut self, file: PathBuf, diag: Diagnostic) {
        self.extra_syntactic.entry(file).or_default().push(diag);
    }

    pub fn add_semantic(&mut self, file: PathBuf, diag: Diagnostic) {
        self.extra_semantic.entry(file).or_default().push(diag);
    }
}

impl Program for ProgramOverlay {
    fn source_files(&self) -> Vec<PathBuf> {
        self.inner.source_files()
    }

    fn source_text(&self, file: &Path) -> Option<String> {
        self.inner.source_text(file)
    }

    fn options_diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.options_diagnostics()
    }

    fn global_diagnostics(&self) -> Vec<Diagnostic> {
        let mut diags = self.inner.global_diagnostics();
        diags.extend(self.extra_global.iter().cloned());
        diags
    }

    fn syntactic_diagnostics(&self, file: &Path) -> Vec<Diagnostic> {
        let mut diags = self.inner.syntactic_diagnostics(file);
        if let Some(extra) = self.extra_syntactic.get(file) {
            diags.extend(extra.iter().cloned());
        }
        diags
    }

    fn semantic_diagnostics(&self, file: &Path) -> Vec<Diagnostic> {
        let mut diags = self.inner.semantic_diagnostics(file);
        if let Some(extra) = self.extra_semantic.get(file) {
            diags.extend(extra.iter().cloned());
        }
        diags
    }

    fn emit(&self, file: &Path, transforms: &CustomTransformers) -> Result<EmitResult, BuildError> {
        self.inner.emit(file, transforms)
    }
}

type PluginFactory = Box<dyn Fn() -> Box<dyn DiagnosticPlugin>>;

/// Named plugin factories. Each build constructs fresh instances from the
/// factory, so no plugin state survives across builds.
#[derive(Default)]
pub struct PluginRegistry {
    factories: Vec<(String, PluginFactory)>,
    emit_backend: Option<Box<dyn EmitBackend>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn DiagnosticPlugin> + 'static,
    ) {
        self.factories.push((name.into(), Box::new(factory)));
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn DiagnosticPlugin>, BuildError> {
        match self.factories.iter().find(|(n, _)| n == name) {
            Some((_, factory)) => Ok(factory()),
            None => Err(BuildError::PluginLoad {
                name: name.to_string(),
                reason: "no such plugin is registered".to_string(),
            }),
        }
    }

    pub fn set_emit_backend(&mut self, backend: Box<dyn EmitBackend>) {
        self.emit_backend = Some(backend);
    }

    pub fn emit_backend(&self) -> Option<&dyn EmitBackend> {
        self.emit_backend.as_deref()
    }
}

/// Apply the diagnostic chain in its fixed order: the dependency-strictness
/// checker (unless disabled), the lint-rule checker, then the externally
/// configured plugins in request order. Returns the final wrapped program
/// and the transformer lists concatenated across all steps.
pub fn run_chain(
    program: Box<dyn Program>,
    request: &BuildRequest,
    registry: &PluginRegistry,
    ctx: &PluginContext,
) -> Result<(Box<dyn Program>, CustomTransformers), BuildError> {
    let mut steps: Vec<Box<dyn DiagnosticPlugin>> = Vec::new();
    if !request.worker.disable_strict_deps {
        steps.push(Box::new(StrictDepsPlugin::from_request(request)));
    }
    steps.push(Box::new(RuleCheckerPlugin::new(&request.worker.disabled_rules)));
    for name in &request.worker.plugins {
        steps.push(registry.create(name)?);
    }

    let mut program = program;
    let mut transforms = CustomTransformers::new();
    for step in steps {
        log::debug!("applying diagnostic plugin {}", step.name());
        program = step.wrap(program, ctx);
        if let Some(contributed) = step.transformers(ctx) {
            transforms.extend(contributed);
        }
    }
    Ok((program, transforms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticOrigin;

    /// Base program with one fixed semantic diagnostic per file.
    struct BaseProgram {
        files: Vec<PathBuf>,
    }

    impl Program for BaseProgram {
        fn source_files(&self) -> Vec<PathBuf> {
            self.files.clone()
        }
        fn source_text(&self, _file: &Path) -> Option<String> {
            Some(String::new())
        }
        fn options_diagnostics(&self) -> Vec<Diagnostic> {
            Vec::new()
        }
        fn global_diagnostics(&self) -> Vec<Diagnostic> {
            vec![Diagnostic::error("base global", DiagnosticOrigin::Engine)]
        }
        fn syntactic_diagnostics(&self, _file: &Path) -> Vec<Diagnostic> {
            Vec::new()
        }
        fn semantic_diagnostics(&self, file: &Path) -> Vec<Diagnostic> {
            vec![Diagnostic::error("base semantic", DiagnosticOrigin::Engine)
                .with_file(file.to_path_buf())]
        }
        fn emit(
            &self,
            _file: &Path,
            _transforms: &CustomTransformers,
        ) -> Result<EmitResult, BuildError> {
            Ok(EmitResult::default())
        }
    }

    struct AppendingPlugin {
        tag: String,
    }

    impl DiagnosticPlugin for AppendingPlugin {
        fn name(&self) -> &str {
            &self.tag
        }
        fn wrap(&self, program: Box<dyn Program>, _ctx: &PluginContext) -> Box<dyn Program> {
            let mut overlay = ProgramOverlay::new(program);
            overlay.add_global(Diagnostic::error(
                format!("from {}", self.tag),
                DiagnosticOrigin::Plugin(self.tag.clone()),
            ));
            Box::new(overlay)
        }
    }

    fn ctx() -> PluginContext {
        PluginContext {
            targets: vec![PathBuf::from("/src/a.ts")],
            inputs: [PathBuf::from("/src/a.ts")].into_iter().collect(),
            root_dir: None,
        }
    }

    #[test]
    fn overlay_forwards_inner_diagnostics() {
        let base = Box::new(BaseProgram {
            files: vec![PathBuf::from("/src/a.ts")],
        });
        let mut overlay = ProgramOverlay::new(base);
        overlay.add_semantic(
            PathBuf::from("/src/a.ts"),
            Diagnostic::error("extra", DiagnosticOrigin::Plugin("x".to_string())),
        );

        let diags = overlay.semantic_diagnostics(Path::new("/src/a.ts"));
        let messages: Vec<&str> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["base semantic", "extra"]);
        assert_eq!(overlay.global_diagnostics()[0].message, "base global");
    }

    #[test]
    fn chain_accumulates_monotonically() {
        // Every prefix of the chain must produce a subset of the full chain's
        // diagnostics.
        let ctx = ctx();
        let tags = ["p1", "p2", "p3"];
        let mut seen_counts = Vec::new();
        for prefix_len in 0..=tags.len() {
            let mut program: Box<dyn Program> = Box::new(BaseProgram {
                files: vec![PathBuf::from("/src/a.ts")],
            });
            for tag in &tags[..prefix_len] {
                let plugin = AppendingPlugin {
                    tag: tag.to_string(),
                };
                program = plugin.wrap(program, &ctx);
            }
            let globals = program.global_diagnostics();
            // Shorter chains' diagnostics all appear in longer chains.
            for shorter in 0..prefix_len {
                assert!(globals.iter().any(|d| d.message == format!("from {}", tags[shorter])));
            }
            assert!(globals.iter().any(|d| d.message == "base global"));
            seen_counts.push(globals.len());
        }
        assert!(seen_counts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn registry_constructs_fresh_instances_per_build() {
        use std::cell::Cell;
        use std::rc::Rc;

        let constructed = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&constructed);
        let mut registry = PluginRegistry::new();
        registry.register("counting", move || {
            counter.set(counter.get() + 1);
            Box::new(AppendingPlugin {
                tag: "counting".to_string(),
            })
        });

        registry.create("counting").unwrap();
        registry.create("counting").unwrap();
        assert_eq!(constructed.get(), 2);
    }

    #[test]
    fn unknown_plugin_name_is_a_load_error() {
        let registry = PluginRegistry::new();
        match registry.create("nope") {
            Err(BuildError::PluginLoad { name, .. }) => assert_eq!(name, "nope"),
            Err(other) => panic!("expected PluginLoad, got {other:?}"),
            Ok(_) => panic!("expected PluginLoad, got a plugin"),
        }
    }

    #[test]
    fn chain_collects_transformers_in_registration_order() {
        struct TransformingPlugin {
            tag: &'static str,
        }
        impl DiagnosticPlugin for TransformingPlugin {
            fn name(&self) -> &str {
                self.tag
            }
            fn wrap(&self, program: Box<dyn Program>, _ctx: &PluginContext) -> Box<dyn Program> {
                Box::new(ProgramOverlay::new(program))
            }
            fn transformers(&self, _ctx: &PluginContext) -> Option<CustomTransformers> {
                let tag = self.tag;
                let mut t = CustomTransformers::new();
                t.before
                    .push(Box::new(move |_: &Path, text: &str| format!("{text}{tag};")));
                Some(t)
            }
        }

        let mut registry = PluginRegistry::new();
        registry.register("t1", || Box::new(TransformingPlugin { tag: "t1" }));
        registry.register("t2", || Box::new(TransformingPlugin { tag: "t2" }));

        let request = crate::request::parse_request_json(
            r#"{
                "targets": [],
                "inputs": [],
                "worker": {"plugins": ["t1", "t2"], "disable_strict_deps": true}
            }"#,
        )
        .unwrap();
        let ctx = PluginContext::from_request(&request);
        let program: Box<dyn Program> = Box::new(BaseProgram { files: vec![] });
        let (_, transforms) = run_chain(program, &request, &registry, &ctx).unwrap();

        assert_eq!(transforms.before.len(), 2);
        let result = transforms
            .before
            .iter()
            .fold(String::new(), |acc, t| t(Path::new("/x"), &acc));
        assert_eq!(result, "t1;t2;");
    }
}
