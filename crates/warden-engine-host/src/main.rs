//! Binary entrypoint for the engine worker subprocess.

use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use warden_engine_host::{HostOptions, PnpScripts, run};

/// Environment variable holding the worker's log filter.
const LOG_FILTER_ENV: &str = "WARDEN_LOG_FILTER";

#[derive(Debug, Parser)]
#[command(name = "warden-engine-host", about = "Engine worker spoken to over stdin/stdout")]
struct Args {
    /// Engine package to resolve.
    #[arg(long, default_value = "stylelint")]
    engine_package: String,
    /// Plug'n'Play register script.
    #[arg(long)]
    pnp_register: Option<PathBuf>,
    /// Plug'n'Play ESM loader.
    #[arg(long, requires = "pnp_register")]
    pnp_loader: Option<PathBuf>,
    /// Limit for a single engine run, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    engine_timeout_ms: u64,
    /// `node` executable.
    #[arg(long, default_value = "node")]
    node: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .compact()
        .try_init();

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(error) => {
            writeln!(io::stderr().lock(), "failed to read working directory: {error}").ok();
            return ExitCode::FAILURE;
        }
    };
    let options = HostOptions {
        engine_package: args.engine_package,
        cwd,
        node: args.node,
        pnp: args.pnp_register.map(|register| PnpScripts {
            register,
            loader: args.pnp_loader,
        }),
        engine_timeout: Duration::from_millis(args.engine_timeout_ms),
    };

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    if let Err(error) = run(&mut reader, &mut writer, options) {
        writeln!(io::stderr().lock(), "{error}").ok();
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
