use std::fmt;
use std::path::PathBuf;

use crate::request::ExpectedDiagnostic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Which phase or plugin produced a diagnostic. Carried so that failures can
/// be traced back to their contributor when several checkers layer over one
/// compilation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticOrigin {
    Engine,
    StrictDeps,
    Rule(String),
    Plugin(String),
    Emit,
}

impl fmt::Display for DiagnosticOrigin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiagnosticOrigin::Engine => write!(f, "compiler"),
            DiagnosticOrigin::StrictDeps => write!(f, "strict-deps"),
            DiagnosticOrigin::Rule(name) => write!(f, "rule/{name}"),
            DiagnosticOrigin::Plugin(name) => write!(f, "plugin/{name}"),
            DiagnosticOrigin::Emit => write!(f, "emit"),
        }
    }
}

/// One error/warning/info message tied to an optional source location.
/// Diagnostics accumulate in order for the lifetime of one build and are
/// never shared across builds.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: Option<PathBuf>,
    /// 1-based, present only together with `file`.
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub code: Option<String>,
    pub message: String,
    pub origin: DiagnosticOrigin,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, origin: DiagnosticOrigin) -> Self {
        Self {
            severity: Severity::Error,
            file: None,
            line: None,
            column: None,
            code: None,
            message: message.into(),
            origin,
        }
    }

    pub fn warning(message: impl Into<String>, origin: DiagnosticOrigin) -> Self {
        let mut diag = Self::error(message, origin);
        diag.severity = Severity::Warning;
        diag
    }

    pub fn with_file(mut self, file: PathBuf) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_position(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}", file.display())?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, ":{line}:{column}")?;
            }
            write!(f, " - ")?;
        }
        write!(f, "{}", self.severity)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        write!(f, ": {} ({})", self.message, self.origin)
    }
}

/// Remove diagnostics that the build request declared as expected. This lets
/// tests assert that specific diagnostics were produced without failing the
/// build; only unmatched diagnostics count toward the pass/fail decision.
pub fn filter_expected(expected: &[ExpectedDiagnostic], diags: Vec<Diagnostic>) -> Vec<Diagnostic> {
    if expected.is_empty() {
        return diags;
    }
    diags
        .into_iter()
        .filter(|d| !expected.iter().any(|e| matches_expected(e, d)))
        .collect()
}

fn matches_expected(expected: &ExpectedDiagnostic, diag: &Diagnostic) -> bool {
    if let Some(path) = &expected.path {
        let matches_file = diag
            .file
            .as_ref()
            .is_some_and(|f| f.to_string_lossy().ends_with(path.as_str()));
        if !matches_file {
            return false;
        }
    }
    if let Some(substring) = &expected.message_contains {
        if !diag.message.contains(substring.as_str()) {
            return false;
        }
    }
    if let Some(code) = &expected.code {
        if diag.code.as_deref() != Some(code.as_str()) {
            return false;
        }
    }
    // An entry with no matcher at all would suppress everything; treat it as
    // matching nothing.
    expected.path.is_some() || expected.message_contains.is_some() || expected.code.is_some()
}

/// Render diagnostics for the error stream. Pure formatting, no side effects.
pub fn format(target: &str, diags: &[Diagnostic]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} diagnostic(s) while compiling {}:\n",
        diags.len(),
        target
    ));
    for diag in diags {
        out.push_str(&format!("{diag}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn semantic_error(file: &str, message: &str) -> Diagnostic {
        Diagnostic::error(message, DiagnosticOrigin::Engine).with_file(PathBuf::from(file))
    }

    #[test]
    fn display_includes_location_and_code() {
        let diag = semantic_error("/src/a.ts", "name not found")
            .with_position(3, 7)
            .with_code("E1001");
        assert_eq!(
            diag.to_string(),
            "/src/a.ts:3:7 - error [E1001]: name not found (compiler)"
        );
    }

    #[test]
    fn expected_entry_removes_matching_diagnostic() {
        let expected = vec![ExpectedDiagnostic {
            path: Some("a.ts".to_string()),
            message_contains: Some("not found".to_string()),
            code: None,
        }];
        let diags = vec![
            semantic_error("/src/a.ts", "name not found"),
            semantic_error("/src/a.ts", "type mismatch"),
        ];
        let remaining = filter_expected(&expected, diags);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "type mismatch");
    }

    #[test]
    fn expected_entry_matches_by_code() {
        let expected = vec![ExpectedDiagnostic {
            path: None,
            message_contains: None,
            code: Some("E7".to_string()),
        }];
        let diags = vec![
            semantic_error("/src/a.ts", "one").with_code("E7"),
            semantic_error("/src/a.ts", "two").with_code("E8"),
        ];
        let remaining = filter_expected(&expected, diags);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].code.as_deref(), Some("E8"));
    }

    #[test]
    fn empty_expected_entry_suppresses_nothing() {
        let expected = vec![ExpectedDiagnostic {
            path: None,
            message_contains: None,
            code: None,
        }];
        let diags = vec![semantic_error("/src/a.ts", "kept")];
        assert_eq!(filter_expected(&expected, diags).len(), 1);
    }

    #[test]
    fn format_renders_every_diagnostic() {
        let diags = vec![
            semantic_error("/src/a.ts", "first"),
            Diagnostic::error("global problem", DiagnosticOrigin::Engine),
        ];
        let text = format("//lib:a", &diags);
        assert!(text.contains("//lib:a"));
        assert!(text.contains(Path::new("/src/a.ts").display().to_string().as_str()));
        assert!(text.contains("global problem"));
    }
}
