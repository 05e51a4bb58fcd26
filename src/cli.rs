use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Persistent compile worker for hermetic, incremental builds.
///
/// In worker mode the orchestrator streams build requests over stdin and
/// reads responses from stdout. Without `--persistent_worker` the single
/// positional argument names a build request file and exactly one build runs.
#[derive(Debug, Parser)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Serve builds over stdin/stdout until the channel closes.
    #[arg(long = "persistent_worker", conflicts_with = "build_file")]
    pub persistent_worker: bool,

    /// Path to a build request file, optionally prefixed with '@'.
    /// Required unless running as a persistent worker.
    pub build_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args)
    }

    #[test]
    fn parses_worker_mode() {
        let cli = parse(&["wrapc", "--persistent_worker"]).unwrap();
        assert!(cli.persistent_worker);
        assert!(cli.build_file.is_none());
    }

    #[test]
    fn parses_single_build_file() {
        let cli = parse(&["wrapc", "@/tmp/request.json"]).unwrap();
        assert!(!cli.persistent_worker);
        assert_eq!(cli.build_file.as_deref(), Some("@/tmp/request.json"));
    }

    #[test]
    fn worker_mode_rejects_a_build_file() {
        let err = parse(&["wrapc", "--persistent_worker", "@/tmp/request.json"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn verbosity_flags_stack() {
        let cli = parse(&["wrapc", "-vv", "--persistent_worker"]).unwrap();
        assert_eq!(cli.verbose.log_level_filter(), log::LevelFilter::Trace);
    }
}
