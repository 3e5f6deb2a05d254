//! Dispatches worker requests to the resolved engine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use tracing::{debug, info};
use warden_protocol::{
    LintPayload, LintResult, RequestKind, ResolvePayload, ResolveResult, RuleMeta, RunnerOptions,
    WorkerRequest, WorkerResponse,
};

use crate::HOST_TARGET;
use crate::engine::{Engine, EngineLoader, EngineReport};
use crate::error::EngineError;
use crate::resolver::{EngineResolver, ResolveRequest, Toolchain};

/// Whether the request loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next request.
    Continue,
    /// Stop after writing this response.
    Stop,
}

struct LoadedEngine {
    entry: PathBuf,
    engine: Box<dyn Engine>,
    rules: BTreeMap<String, RuleMeta>,
}

/// Request handler living for the whole worker subprocess.
///
/// The loaded engine is reused while requests keep resolving to the same
/// entry point.
pub struct EngineHost<T: Toolchain, L: EngineLoader> {
    resolver: EngineResolver<T>,
    loader: L,
    loaded: Option<LoadedEngine>,
}

impl<T: Toolchain, L: EngineLoader> EngineHost<T, L> {
    /// Creates a host with nothing loaded.
    #[must_use]
    pub const fn new(resolver: EngineResolver<T>, loader: L) -> Self {
        Self {
            resolver,
            loader,
            loaded: None,
        }
    }

    /// Answers one request.
    pub fn handle(&mut self, request: WorkerRequest) -> (WorkerResponse, Flow) {
        let WorkerRequest { id, kind, payload } = request;
        debug!(target: HOST_TARGET, id, request = %kind, "handling request");
        let outcome = match kind {
            RequestKind::Lint => decode::<LintPayload>(payload)
                .and_then(|payload| self.lint(&payload))
                .and_then(|result| encode(&result)),
            RequestKind::Resolve => decode::<ResolvePayload>(payload)
                .and_then(|payload| self.resolve(&payload))
                .and_then(|result| encode(&result)),
            RequestKind::Shutdown => {
                info!(target: HOST_TARGET, "shutdown requested");
                return (WorkerResponse::success(id, None), Flow::Stop);
            }
        };
        let response = match outcome {
            Ok(result) => WorkerResponse::success(id, Some(result)),
            Err(error) => {
                debug!(target: HOST_TARGET, id, error = %error, "request failed");
                WorkerResponse::failure(id, error.to_wire())
            }
        };
        (response, Flow::Continue)
    }

    /// Lints with the engine resolved for the payload.
    ///
    /// # Errors
    ///
    /// Returns resolution, load, or engine failures.
    pub fn lint(&mut self, payload: &LintPayload) -> Result<LintResult, EngineError> {
        let request = ResolveRequest {
            engine_path: payload.engine_path.clone(),
            document_path: payload.options.code_filename.clone(),
            package_manager: package_manager(payload.runner_options.as_ref()),
        };
        let loaded = self.engine_for(&request)?;
        let report = loaded.engine.lint(&payload.options)?;
        Ok(attach_metadata(report, &loaded.rules))
    }

    /// Locates the engine without loading it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when no installation is found.
    pub fn resolve(&mut self, payload: &ResolvePayload) -> Result<ResolveResult, EngineError> {
        let request = ResolveRequest {
            engine_path: payload.engine_path.clone(),
            document_path: payload.document_path.clone(),
            package_manager: package_manager(payload.runner_options.as_ref()),
        };
        let resolved = self.resolver.resolve(&request)?;
        Ok(ResolveResult {
            engine_path: resolved.entry,
            version: resolved.version,
            resolved_from: resolved.source,
        })
    }

    fn engine_for(&mut self, request: &ResolveRequest) -> Result<&LoadedEngine, EngineError> {
        let resolved = self.resolver.resolve(request)?;
        let reusable = self
            .loaded
            .as_ref()
            .is_some_and(|loaded| loaded.entry == resolved.entry);
        if !reusable {
            let engine = self.loader.load(&resolved)?;
            let rules = engine.rule_metadata();
            info!(
                target: HOST_TARGET,
                entry = %resolved.entry.display(),
                version = resolved.version.as_deref().unwrap_or("unknown"),
                source = %resolved.source,
                rules = rules.len(),
                "engine loaded"
            );
            self.loaded = Some(LoadedEngine {
                entry: resolved.entry,
                engine,
                rules,
            });
        }
        self.loaded.as_ref().ok_or_else(|| EngineError::Unusable {
            path: PathBuf::new(),
            reason: String::from("engine failed to load"),
        })
    }
}

fn package_manager(options: Option<&RunnerOptions>) -> Option<warden_protocol::PackageManager> {
    options.and_then(|options| options.package_manager)
}

fn decode<P: DeserializeOwned>(payload: Option<serde_json::Value>) -> Result<P, EngineError> {
    let value = payload.ok_or_else(|| EngineError::InvalidRequest {
        message: String::from("missing payload"),
    })?;
    serde_json::from_value(value).map_err(|error| EngineError::InvalidRequest {
        message: error.to_string(),
    })
}

fn encode<R: serde::Serialize>(result: &R) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(result).map_err(|error| EngineError::InvalidOutput {
        message: error.to_string(),
    })
}

/// Keeps only metadata for rules that appear in the report.
fn attach_metadata(report: EngineReport, rules: &BTreeMap<String, RuleMeta>) -> LintResult {
    let mut result = LintResult {
        results: report.results,
        output: report.output,
        rule_metadata: BTreeMap::new(),
    };
    let reported: Vec<String> = result.warnings().map(|warning| warning.rule.clone()).collect();
    for rule in reported {
        if let Some(meta) = rules.get(&rule) {
            result.rule_metadata.insert(rule, meta.clone());
        }
    }
    result
}
