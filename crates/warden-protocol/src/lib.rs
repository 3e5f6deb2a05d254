//! Wire types shared by the host and the engine worker subprocess.
//!
//! The host writes one [`WorkerRequest`] per line to the worker's stdin and
//! the worker answers with one [`WorkerResponse`] per line on stdout. Several
//! requests may be outstanding at once; responses are correlated by `id`
//! alone and may arrive in any order. Stderr carries worker logs and is not
//! part of the protocol.
//!
//! The engine result model in [`report`] is deliberately a minimal,
//! transport-safe subset of what the engine produces: only the fields the
//! host needs to build diagnostics and apply fixes.

pub mod options;
pub mod report;
pub mod request;
pub mod response;


pub use self::options::{LintOptions, PackageManager, PackageManagerParseError, RunnerOptions};
pub use self::report::{
    EngineWarning, FileReport, InvalidOptionWarning, LintResult, ResolutionSource, ResolveResult,
    RuleMeta, SYNTAX_ERROR_RULE, WarningSeverity,
};
pub use self::request::{LintPayload, RequestKind, ResolvePayload, WorkerRequest};
pub use self::response::{NOT_FOUND_CODE, WireError, WorkerResponse};
