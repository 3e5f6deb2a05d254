//! Shared fixtures for the service tests.


use camino::Utf8Path;
use mockall::mock;
use warden_protocol::{
    EngineWarning, FileReport, LintPayload, LintResult, ResolvePayload, ResolveResult,
    SYNTAX_ERROR_RULE, WarningSeverity,
};
use warden_worker::WorkerError;

use crate::error::ServiceError;
use crate::runner::{Document, LintDispatch};

mock! {
    pub(crate) Dispatch {}
    impl LintDispatch for Dispatch {
        fn lint(
            &self,
            workspace_root: &Utf8Path,
            document: &Utf8Path,
            payload: &LintPayload,
        ) -> Result<Option<LintResult>, ServiceError>;
        fn resolve(
            &self,
            workspace_root: &Utf8Path,
            document: &Utf8Path,
            payload: &ResolvePayload,
        ) -> Result<Option<ResolveResult>, ServiceError>;
    }
}

pub(crate) const WORKSPACE: &str = "/ws";
pub(crate) const DOCUMENT: &str = "/ws/styles/site.css";

pub(crate) fn document() -> Document {
    Document::new(DOCUMENT, "a { color: red; }").in_workspace(WORKSPACE)
}

pub(crate) fn warning(rule: &str, line: u32, column: u32) -> EngineWarning {
    EngineWarning {
        line,
        column,
        end_line: None,
        end_column: None,
        rule: rule.to_owned(),
        severity: WarningSeverity::Error,
        text: format!("Unexpected problem ({rule})"),
    }
}

pub(crate) fn syntax_error() -> EngineWarning {
    EngineWarning {
        text: "Unclosed block (CssSyntaxError)".to_owned(),
        ..warning(SYNTAX_ERROR_RULE, 1, 1)
    }
}

pub(crate) fn result_with(warnings: Vec<EngineWarning>) -> LintResult {
    LintResult {
        results: vec![FileReport {
            source: Some(DOCUMENT.into()),
            warnings,
            ..FileReport::default()
        }],
        ..LintResult::default()
    }
}

pub(crate) fn engine_error(message: &str) -> ServiceError {
    ServiceError::Worker(WorkerError::Remote {
        name: Some("ConfigurationError".to_owned()),
        message: message.to_owned(),
        stack: None,
        code: None,
    })
}
