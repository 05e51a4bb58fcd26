use std::fmt;
use std::io;
use std::path::PathBuf;

/// Fatal errors for a single build. All of these are caught at the build
/// executor boundary and turned into a failure result; in worker mode the
/// process keeps serving subsequent requests.
#[derive(Debug)]
pub enum BuildError {
    /// The build request is missing, malformed, or the argument count is wrong.
    Configuration(String),
    /// A declared input could not be read from disk.
    FileRead { path: PathBuf, source: io::Error },
    /// A read was attempted for a path the build request did not declare.
    UndeclaredInput(PathBuf),
    /// A plugin named in the build request is not registered or failed to construct.
    PluginLoad { name: String, reason: String },
    /// The request asked for the lowering emit backend but none is registered.
    EmitBackendUnavailable,
    /// The compiler engine failed outside of normal diagnostics (e.g. could not
    /// stage inputs or spawn the compiler).
    Engine(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BuildError::Configuration(msg) => {
                write!(f, "invalid build request: {msg}")
            }
            BuildError::FileRead { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            BuildError::UndeclaredInput(path) => {
                write!(
                    f,
                    "{} was read but is not declared as an input of this build",
                    path.display()
                )
            }
            BuildError::PluginLoad { name, reason } => {
                write!(f, "failed to load plugin \"{name}\": {reason}")
            }
            BuildError::EmitBackendUnavailable => {
                write!(
                    f,
                    "lowered emit was requested but no lowering emit backend is registered"
                )
            }
            BuildError::Engine(msg) => write!(f, "compiler engine error: {msg}"),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::FileRead { source, .. } => Some(source),
            _ => None,
        }
    }
}
