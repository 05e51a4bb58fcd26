use anyhow::Result;
use clap::Parser;
use std::io::{self, Write};

use wrapc::cache::FileCache;
use wrapc::cli::Cli;
use wrapc::engine::process::ProcessEngine;
use wrapc::executor;
use wrapc::plugins::PluginRegistry;
use wrapc::worker;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Stdout carries the worker protocol, so logging goes to stderr.
    env_logger::Builder::new()
        .format(|buf, record| writeln!(buf, "{}:\n{}", record.level(), record.args()))
        .filter_level(cli.verbose.log_level_filter())
        .target(env_logger::fmt::Target::Stderr)
        .init();

    let engine = ProcessEngine;
    let registry = PluginRegistry::new();
    let mut cache = FileCache::new();

    if cli.persistent_worker {
        log::info!("Starting persistent compile worker...");
        let stdin = io::stdin();
        let stdout = io::stdout();
        return worker::run_worker_loop(
            &engine,
            &registry,
            &mut cache,
            &mut stdin.lock(),
            &mut stdout.lock(),
        );
    }

    let Some(build_file) = cli.build_file else {
        eprintln!("a build request file is required unless running with --persistent_worker");
        std::process::exit(1);
    };

    let args = vec![build_file];
    let success = executor::run_one_build(
        &engine,
        &registry,
        &mut cache,
        &args,
        None,
        &mut io::stderr(),
    );
    std::process::exit(if success { 0 } else { 1 });
}
