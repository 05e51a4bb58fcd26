use std::io::Write;
use std::path::PathBuf;

use crate::cache::FileCache;
use crate::diagnostics::{self, Diagnostic};
use crate::engine::CompilerEngine;
use crate::error::BuildError;
use crate::helpers;
use crate::host::CompilerHost;
use crate::loader::{CachedFileLoader, FileLoader, UncachedFileLoader};
use crate::plugins::{self, PluginContext, PluginRegistry};
use crate::request::{self, BuildRequest, InputDigest};

/// Run a single build, returning false on failure. Called once per request
/// when running as a persistent worker. Every fatal error is converted into
/// formatted text on `err` here; nothing escapes to take down the process,
/// since that would lose the cache for all future builds.
pub fn run_one_build(
    engine: &dyn CompilerEngine,
    registry: &PluginRegistry,
    cache: &mut FileCache,
    args: &[String],
    inputs: Option<&[InputDigest]>,
    err: &mut dyn Write,
) -> bool {
    let request = match request::parse_build_file(args) {
        Ok(request) => request,
        Err(e) => {
            let _ = writeln!(err, "{e}");
            return false;
        }
    };
    match execute(engine, registry, cache, &request, inputs, err) {
        Ok(success) => success,
        Err(e) => {
            let _ = writeln!(err, "{e}");
            false
        }
    }
}

fn execute(
    engine: &dyn CompilerEngine,
    registry: &PluginRegistry,
    cache: &mut FileCache,
    request: &BuildRequest,
    inputs: Option<&[InputDigest]>,
    err: &mut dyn Write,
) -> Result<bool, BuildError> {
    cache.reset_stats();
    match request.worker.max_cache_size_mb {
        Some(mb) => cache.set_max_size(mb << 20),
        None => cache.reset_max_size(),
    }
    cache.trace_stats();

    // Only persistent-worker requests carry a digest map, and only those may
    // share the cache; one-shot builds always read fresh.
    let loader: Box<dyn FileLoader + '_> = match inputs {
        Some(digests) => {
            cache.update(digests);
            Box::new(CachedFileLoader::new(cache))
        }
        None => Box::new(UncachedFileLoader),
    };
    let host = CompilerHost::new(loader, &request.inputs, request.compiler.root_dir.clone());

    let program = helpers::timed("create program", || {
        engine.create_program(&request.targets, &request.compiler, host)
    })?;
    cache.trace_stats();

    let ctx = PluginContext::from_request(request);
    let (program, transforms) = plugins::run_chain(program, request, registry, &ctx)?;

    // These checks mirror the engine's pre-emit diagnostics, with one
    // deliberate omission: declaration diagnostics are never requested
    // before emit, as doing so corrupts the emitted output.
    let mut diags: Vec<Diagnostic> = Vec::new();
    helpers::timed("global diagnostics", || {
        diags.extend(program.options_diagnostics());
        diags.extend(program.global_diagnostics());
    });

    let files_to_check: Vec<PathBuf> = if request.worker.type_check_dependencies {
        program.source_files()
    } else {
        request.targets.clone()
    };
    for file in &files_to_check {
        helpers::timed(&format!("check {}", file.display()), || {
            diags.extend(program.syntactic_diagnostics(file));
            diags.extend(program.semantic_diagnostics(file));
        });
    }

    // If any diagnostics remain after filtering, abort now so the messages
    // refer to the original source; emit must never run over a type-invalid
    // program.
    let diags = diagnostics::filter_expected(&request.worker.expected_diagnostics, diags);
    if !diags.is_empty() {
        let _ = err.write_all(diagnostics::format(&request.target_label(), &diags).as_bytes());
        return Ok(false);
    }

    let mut emit_diags: Vec<Diagnostic> = Vec::new();
    for target in &request.targets {
        let result = helpers::timed(&format!("emit {}", target.display()), || {
            if request.worker.lowered_emit {
                let backend = registry
                    .emit_backend()
                    .ok_or(BuildError::EmitBackendUnavailable)?;
                backend.emit(program.as_ref(), target, &transforms)
            } else {
                program.emit(target, &transforms)
            }
        })?;
        emit_diags.extend(result.diagnostics);
    }

    let emit_diags = diagnostics::filter_expected(&request.worker.expected_diagnostics, emit_diags);
    if !emit_diags.is_empty() {
        let _ = err.write_all(diagnostics::format(&request.target_label(), &emit_diags).as_bytes());
        return Ok(false);
    }
    Ok(true)
}
