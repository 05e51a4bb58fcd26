use std::path::Path;

use ahash::AHashSet;

use crate::diagnostics::{Diagnostic, DiagnosticOrigin};
use crate::engine::Program;
use crate::plugins::{DiagnosticPlugin, PluginContext, ProgramOverlay};

/// A built-in lint rule, applied to the text of every compilation target.
pub struct Rule {
    pub name: &'static str,
    pub check: fn(&Path, &str) -> Vec<Diagnostic>,
}

pub const BUILTIN_RULES: &[Rule] = &[
    Rule {
        name: "no-merge-markers",
        check: no_merge_markers,
    },
    Rule {
        name: "no-byte-order-mark",
        check: no_byte_order_mark,
    },
];

fn rule_diag(rule: &'static str, file: &Path, line: u32, message: String) -> Diagnostic {
    Diagnostic::error(message, DiagnosticOrigin::Rule(rule.to_string()))
        .with_file(file.to_path_buf())
        .with_position(line, 1)
        .with_code(rule)
}

fn no_merge_markers(file: &Path, text: &str) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.starts_with("<<<<<<<") || line.starts_with(">>>>>>>") || line == "=======" {
            diags.push(rule_diag(
                "no-merge-markers",
                file,
                idx as u32 + 1,
                "unresolved version-control conflict marker".to_string(),
            ));
        }
    }
    diags
}

fn no_byte_order_mark(file: &Path, text: &str) -> Vec<Diagnostic> {
    if text.starts_with('\u{feff}') {
        vec![rule_diag(
            "no-byte-order-mark",
            file,
            1,
            "file starts with a UTF-8 byte order mark".to_string(),
        )]
    } else {
        Vec::new()
    }
}

/// Runs the built-in rules over every compilation target, skipping the ones
/// the request disabled by name.
pub struct RuleCheckerPlugin {
    disabled: AHashSet<String>,
}

impl RuleCheckerPlugin {
    pub fn new(disabled_rules: &[String]) -> Self {
        Self {
            disabled: disabled_rules.iter().cloned().collect(),
        }
    }
}

impl DiagnosticPlugin for RuleCheckerPlugin {
    fn name(&self) -> &str {
        "rule-checker"
    }

    fn wrap(&self, program: Box<dyn Program>, ctx: &PluginContext) -> Box<dyn Program> {
        let mut overlay = ProgramOverlay::new(program);
        for target in &ctx.targets {
            let Some(text) = overlay.source_text(target) else {
                continue;
            };
            for rule in BUILTIN_RULES {
                if self.disabled.contains(rule.name) {
                    continue;
                }
                for diag in (rule.check)(target, &text) {
                    overlay.add_semantic(target.clone(), diag);
                }
            }
        }
        Box::new(overlay)
    }
}
