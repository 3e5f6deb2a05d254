//! Conversion of engine warnings into LSP diagnostics.

use std::str::FromStr;

use lsp_types::{
    CodeDescription, Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range, Uri,
};
use warden_protocol::{EngineWarning, LintResult, WarningSeverity};

/// `source` attached to every diagnostic the runner produces.
pub const DIAGNOSTIC_SOURCE: &str = "stylelint";

/// Converts every warning and invalid-option report in `result`.
#[must_use]
pub fn to_diagnostics(result: &LintResult) -> Vec<Diagnostic> {
    let warnings = result
        .warnings()
        .map(|warning| warning_diagnostic(warning, result.rule_url(&warning.rule)));
    let invalid_options = result
        .results
        .iter()
        .flat_map(|report| &report.invalid_option_warnings)
        .map(|invalid| configuration_diagnostic(&invalid.text));
    invalid_options.chain(warnings).collect()
}

/// A document-level problem pinned to the first character.
pub(crate) fn configuration_diagnostic(message: &str) -> Diagnostic {
    Diagnostic {
        range: Range::new(Position::new(0, 0), Position::new(0, 0)),
        severity: Some(DiagnosticSeverity::ERROR),
        source: Some(DIAGNOSTIC_SOURCE.to_owned()),
        message: message.to_owned(),
        ..Diagnostic::default()
    }
}

fn warning_diagnostic(warning: &EngineWarning, rule_url: Option<&str>) -> Diagnostic {
    let start = position(warning.line, warning.column);
    let end = match (warning.end_line, warning.end_column) {
        (Some(line), Some(column)) => position(line, column),
        _ => start,
    };
    let severity = match warning.severity {
        WarningSeverity::Error => DiagnosticSeverity::ERROR,
        WarningSeverity::Warning => DiagnosticSeverity::WARNING,
    };
    Diagnostic {
        range: Range::new(start, end),
        severity: Some(severity),
        code: Some(NumberOrString::String(warning.rule.clone())),
        code_description: rule_url.and_then(code_description),
        source: Some(DIAGNOSTIC_SOURCE.to_owned()),
        message: message_text(warning).to_owned(),
        ..Diagnostic::default()
    }
}

/// Engine positions are 1-based; LSP positions are 0-based.
const fn position(line: u32, column: u32) -> Position {
    Position {
        line: line.saturating_sub(1),
        character: column.saturating_sub(1),
    }
}

fn code_description(url: &str) -> Option<CodeDescription> {
    Uri::from_str(url).ok().map(|href| CodeDescription { href })
}

/// Drops the ` (rule-name)` suffix the engine appends; the rule is already
/// carried in `code`.
fn message_text(warning: &EngineWarning) -> &str {
    warning
        .text
        .strip_suffix(')')
        .and_then(|text| text.strip_suffix(warning.rule.as_str()))
        .and_then(|text| text.strip_suffix(" ("))
        .unwrap_or(&warning.text)
}
