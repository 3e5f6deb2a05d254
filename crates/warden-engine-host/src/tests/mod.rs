//! Request loop tests with mocked engines.


use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use mockall::mock;
use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;
use warden_protocol::{
    EngineWarning, FileReport, LintResult, NOT_FOUND_CODE, RuleMeta, WorkerResponse,
};

use crate::engine::{Engine, EngineLoader, EngineReport};
use crate::error::EngineError;
use crate::host::EngineHost;
use crate::resolver::{EngineResolver, ResolvedEngine, Toolchain};
use crate::run_with_host;

mock! {
    pub(crate) Engine {}
    impl Engine for Engine {
        fn lint(&self, options: &warden_protocol::LintOptions) -> Result<EngineReport, EngineError>;
        fn rule_metadata(&self) -> BTreeMap<String, RuleMeta>;
    }
}

mock! {
    pub(crate) EngineLoader {}
    impl EngineLoader for EngineLoader {
        fn load(&self, resolved: &ResolvedEngine) -> Result<Box<dyn Engine>, EngineError>;
    }
}

mock! {
    pub(crate) Toolchain {}
    impl Toolchain for Toolchain {
        fn global_modules(&self, manager: warden_protocol::PackageManager) -> Option<PathBuf>;
        fn pnp_resolve(&self, register: &Path, request: &str, from: &Path) -> Option<PathBuf>;
    }
}

/// A project directory, optionally with a local engine installation.
pub(crate) struct Project {
    dir: TempDir,
}

impl Project {
    pub(crate) fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    pub(crate) fn with_engine() -> Self {
        let project = Self::empty();
        let package = project.root().join("node_modules/stylelint");
        fs::create_dir_all(package.join("bin")).expect("package dir");
        fs::write(
            package.join("package.json"),
            r#"{"name":"stylelint","version":"16.1.0","bin":{"stylelint":"bin/stylelint.mjs"}}"#,
        )
        .expect("manifest");
        fs::write(package.join("bin/stylelint.mjs"), "").expect("entry");
        project
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn document(&self) -> PathBuf {
        self.root().join("src/site.css")
    }
}

#[fixture]
fn project() -> Project {
    Project::with_engine()
}

pub(crate) fn warning(rule: &str) -> EngineWarning {
    EngineWarning {
        line: 2,
        column: 3,
        end_line: Some(2),
        end_column: Some(8),
        rule: rule.to_owned(),
        text: format!("Unexpected thing ({rule})"),
        ..EngineWarning::default()
    }
}

pub(crate) fn report(rules: &[&str]) -> EngineReport {
    EngineReport {
        results: vec![FileReport {
            warnings: rules.iter().map(|rule| warning(rule)).collect(),
            ..FileReport::default()
        }],
        output: None,
    }
}

pub(crate) fn rule_metadata() -> BTreeMap<String, RuleMeta> {
    ["block-no-empty", "color-no-invalid-hex", "unit-no-unknown"]
        .into_iter()
        .map(|rule| {
            (
                rule.to_owned(),
                RuleMeta {
                    url: Some(format!("https://example.test/rules/{rule}")),
                    deprecated: false,
                },
            )
        })
        .collect()
}

fn boxed(engine: MockEngine) -> Box<dyn Engine> {
    Box::new(engine)
}

/// Loader whose engines report warnings for `rules`.
pub(crate) fn reporting_loader(rules: &[&str], loads: usize) -> MockEngineLoader {
    let rules: Vec<String> = rules.iter().map(|rule| (*rule).to_owned()).collect();
    let mut loader = MockEngineLoader::new();
    loader.expect_load().times(loads).returning(move |_| {
        let rules = rules.clone();
        let mut engine = MockEngine::new();
        engine.expect_lint().returning(move |_| {
            let names: Vec<&str> = rules.iter().map(String::as_str).collect();
            Ok(report(&names))
        });
        engine.expect_rule_metadata().returning(rule_metadata);
        Ok(boxed(engine))
    });
    loader
}

pub(crate) fn quiet_toolchain() -> MockToolchain {
    let mut toolchain = MockToolchain::new();
    toolchain.expect_global_modules().return_const(None::<PathBuf>);
    toolchain.expect_pnp_resolve().never();
    toolchain
}

pub(crate) fn lint_line(id: &str, document: &Path) -> String {
    json!({
        "id": id,
        "type": "lint",
        "payload": { "options": { "code": "a {}", "codeFilename": document } }
    })
    .to_string()
}

pub(crate) fn resolve_line(id: &str, document: &Path) -> String {
    json!({ "id": id, "type": "resolve", "payload": { "documentPath": document } }).to_string()
}

/// Feeds `lines` through a host rooted at `project`.
pub(crate) fn serve(
    project: &Project,
    loader: MockEngineLoader,
    lines: &[String],
) -> Vec<WorkerResponse> {
    let resolver = EngineResolver::new("stylelint", project.root(), quiet_toolchain());
    let mut host = EngineHost::new(resolver, loader);
    let mut input = Cursor::new(lines.join("\n").into_bytes());
    let mut output = Vec::new();
    run_with_host(&mut input, &mut output, &mut host).expect("loop completes");
    String::from_utf8(output)
        .expect("utf-8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("response line"))
        .collect()
}

#[rstest]
fn lint_reports_warnings_with_metadata_for_reported_rules(project: Project) {
    let responses = serve(
        &project,
        reporting_loader(&["color-no-invalid-hex"], 1),
        &[lint_line("1", &project.document())],
    );

    let [response] = responses.as_slice() else {
        panic!("expected one response, got {responses:?}");
    };
    assert_eq!(response.id, "1");
    let result: LintResult =
        serde_json::from_value(response.result.clone().expect("result")).expect("lint result");
    assert_eq!(result.warnings().count(), 1);
    assert_eq!(
        result.rule_url("color-no-invalid-hex"),
        Some("https://example.test/rules/color-no-invalid-hex")
    );
    assert_eq!(result.rule_metadata.len(), 1);
}

#[rstest]
fn engine_is_loaded_once_while_resolution_is_stable(project: Project) {
    let document = project.document();
    let responses = serve(
        &project,
        reporting_loader(&["block-no-empty"], 1),
        &[lint_line("1", &document), lint_line("2", &document)],
    );

    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|response| response.success));
}

#[rstest]
fn resolve_reports_the_local_installation(project: Project) {
    let responses = serve(
        &project,
        MockEngineLoader::new(),
        &[resolve_line("9", &project.document())],
    );

    let result = responses
        .first()
        .and_then(|response| response.result.clone())
        .expect("resolve result");
    assert_eq!(result["resolvedFrom"], "local");
    assert_eq!(result["version"], "16.1.0");
}

#[rstest]
fn missing_engine_is_reported_with_the_not_found_code() {
    let project = Project::empty();
    let responses = serve(
        &project,
        MockEngineLoader::new(),
        &[resolve_line("3", &project.document())],
    );

    let error = responses
        .first()
        .and_then(|response| response.error.clone())
        .expect("failure");
    assert_eq!(error.code.as_deref(), Some(NOT_FOUND_CODE));
}

#[rstest]
fn engine_failures_are_serialised_with_name_and_stack(project: Project) {
    let mut loader = MockEngineLoader::new();
    loader.expect_load().returning(|_| {
        let mut engine = MockEngine::new();
        engine.expect_lint().returning(|_| {
            Err(EngineError::Failed {
                code: Some(78),
                message: String::from("No rules found within configuration"),
                stderr: String::from("Error: No rules found within configuration\n    at x"),
            })
        });
        engine.expect_rule_metadata().returning(BTreeMap::new);
        Ok(boxed(engine))
    });

    let responses = serve(&project, loader, &[lint_line("4", &project.document())]);

    let error = responses
        .first()
        .and_then(|response| response.error.clone())
        .expect("failure");
    assert_eq!(error.name.as_deref(), Some("EngineError"));
    assert_eq!(error.message, "No rules found within configuration");
    assert!(error.stack.is_some_and(|stack| stack.contains("at x")));
}

#[rstest]
fn shutdown_ends_the_loop(project: Project) {
    let responses = serve(
        &project,
        MockEngineLoader::new(),
        &[
            json!({ "id": "5", "type": "shutdown" }).to_string(),
            lint_line("6", &project.document()),
        ],
    );

    assert_eq!(responses.len(), 1);
    assert!(responses.first().is_some_and(|response| response.id == "5"));
}

#[rstest]
fn unreadable_lines_are_answered_when_an_id_is_present(project: Project) {
    let responses = serve(
        &project,
        MockEngineLoader::new(),
        &[
            String::from("not json at all"),
            json!({ "id": "7", "type": "explode" }).to_string(),
            json!({ "id": "8", "type": "lint" }).to_string(),
        ],
    );

    let ids: Vec<&str> = responses.iter().map(|response| response.id.as_str()).collect();
    assert_eq!(ids, ["7", "8"]);
    assert!(responses.iter().all(|response| !response.success));
}
