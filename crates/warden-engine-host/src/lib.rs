//! Engine worker subprocess.
//!
//! The host spawns this binary once per project. It reads newline-delimited
//! [`WorkerRequest`]s from stdin and writes one [`WorkerResponse`] per
//! request to stdout until stdin closes or a `shutdown` request arrives.
//! Logs go to stderr.
//!
//! Each request resolves the engine package (explicit path, then a local
//! installation, then the package manager's global directory), loads it
//! once per resolved entry point, and reports its results in the
//! transport-safe shape from `warden-protocol`.

pub mod command;
pub mod engine;
mod error;
pub mod host;
pub mod resolver;

#[cfg(test)]
mod tests;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use warden_protocol::{WireError, WorkerRequest, WorkerResponse};

pub use self::engine::{
    CommandEngine, CommandEngineLoader, Engine, EngineLoader, EngineReport, RuleDirectory,
    RuleMetadataSource,
};
pub use self::error::EngineError;
pub use self::host::{EngineHost, Flow};
pub use self::resolver::{
    EngineResolver, NodeToolchain, PnpScripts, ResolveRequest, ResolvedEngine, Toolchain,
};

/// Tracing target for worker-side events.
pub(crate) const HOST_TARGET: &str = "warden_engine_host";

/// Errors that end the request loop.
#[derive(Debug, Error)]
pub enum HostError {
    /// Reading a request from stdin failed.
    #[error("failed to read request: {source}")]
    Read {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Writing a response to stdout failed.
    #[error("failed to write response: {source}")]
    Write {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Serialising a response failed.
    #[error("failed to serialise response: {source}")]
    Serialize {
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },
}

/// Startup options of the worker subprocess.
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Engine package name.
    pub engine_package: String,
    /// Worker root; the subprocess's working directory.
    pub cwd: PathBuf,
    /// `node` executable.
    pub node: PathBuf,
    /// Plug'n'Play scripts, when the project uses them.
    pub pnp: Option<PnpScripts>,
    /// Limit for a single engine run.
    pub engine_timeout: Duration,
}

/// Serves requests from `stdin` until EOF or `shutdown`.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or a response cannot be written.
pub fn run_with_host<T: Toolchain, L: EngineLoader>(
    stdin: &mut impl BufRead,
    stdout: &mut impl Write,
    host: &mut EngineHost<T, L>,
) -> Result<(), HostError> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = stdin
            .read_line(&mut line)
            .map_err(|source| HostError::Read { source })?;
        if read == 0 {
            return Ok(());
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let (response, flow) = match serde_json::from_str::<WorkerRequest>(text) {
            Ok(request) => host.handle(request),
            Err(error) => match request_id(text) {
                Some(id) => (
                    WorkerResponse::failure(
                        id,
                        WireError::new(format!("invalid request: {error}"))
                            .with_name("InvalidRequestError"),
                    ),
                    Flow::Continue,
                ),
                None => {
                    warn!(target: HOST_TARGET, error = %error, "skipping unreadable request line");
                    continue;
                }
            },
        };
        write_response(stdout, &response)?;
        if flow == Flow::Stop {
            return Ok(());
        }
    }
}

/// Serves requests with the `node`-backed engine.
///
/// # Errors
///
/// See [`run_with_host`].
pub fn run(
    stdin: &mut impl BufRead,
    stdout: &mut impl Write,
    options: HostOptions,
) -> Result<(), HostError> {
    let toolchain = NodeToolchain::new(&options.node, &options.cwd, options.engine_timeout);
    let resolver = EngineResolver::new(options.engine_package, &options.cwd, toolchain)
        .with_pnp(options.pnp.clone());
    let loader = CommandEngineLoader::new(
        options.node,
        options.cwd,
        options.pnp,
        options.engine_timeout,
    );
    let mut host = EngineHost::new(resolver, loader);
    run_with_host(stdin, stdout, &mut host)
}

fn request_id(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("id")?.as_str().map(str::to_owned)
}

fn write_response(stdout: &mut impl Write, response: &WorkerResponse) -> Result<(), HostError> {
    let payload =
        serde_json::to_string(response).map_err(|source| HostError::Serialize { source })?;
    stdout
        .write_all(payload.as_bytes())
        .map_err(|source| HostError::Write { source })?;
    stdout
        .write_all(b"\n")
        .map_err(|source| HostError::Write { source })?;
    stdout.flush().map_err(|source| HostError::Write { source })
}
