use std::io::{BufRead, Write};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::cache::FileCache;
use crate::engine::CompilerEngine;
use crate::executor;
use crate::plugins::PluginRegistry;
use crate::request::InputDigest;

/// One build request from the orchestrator: the argument vector plus the
/// digest map of the files this build may observe, with content optionally
/// pushed inline.
#[derive(Debug, Deserialize)]
pub struct WorkRequest {
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<InputDigest>,
}

#[derive(Debug, Serialize)]
pub struct WorkResponse {
    pub exit_code: i32,
    pub output: String,
}

/// Serve build requests one at a time until the channel closes. Requests and
/// responses are newline-delimited JSON over the given handles (stdio in
/// production; buffers in tests). A failed build produces a non-zero
/// response and the loop keeps serving; only a corrupt request line
/// terminates the loop, since nothing sane can be answered to it.
pub fn run_worker_loop(
    engine: &dyn CompilerEngine,
    registry: &PluginRegistry,
    cache: &mut FileCache,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .context("failed to read work request")?;
        if read == 0 {
            log::debug!("work channel closed, exiting worker loop");
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkRequest = serde_json::from_str(&line)
            .map_err(|e| anyhow!("corrupt work request on control channel: {e}"))?;

        let mut output = Vec::new();
        let success = executor::run_one_build(
            engine,
            registry,
            cache,
            &request.arguments,
            Some(&request.inputs),
            &mut output,
        );
        log::debug!("build finished, success = {success}");

        let response = WorkResponse {
            exit_code: if success { 0 } else { 1 },
            output: String::from_utf8_lossy(&output).into_owned(),
        };
        serde_json::to_writer(&mut *writer, &response).context("failed to write work response")?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
}
