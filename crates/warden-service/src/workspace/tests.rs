//! Routing, cache invalidation and failure classification tests.

use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use tempfile::TempDir;
use warden_protocol::{LintOptions, LintPayload, ResolvePayload};
use warden_worker::{RegistrySettings, WorkerError, WorkerRegistry, WorkerSettings};

use super::{FileChange, FileChangeKind, WorkspaceService};
use crate::error::ServiceError;

struct Project {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Project {
    fn write(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    fn document(&self, relative: &str) -> Utf8PathBuf {
        self.write(relative, "a { color: red; }")
    }
}

#[fixture]
fn project() -> Project {
    let dir = TempDir::new().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    Project { _dir: dir, root }
}

fn idle_service() -> WorkspaceService {
    WorkspaceService::new(WorkerRegistry::new(
        RegistrySettings::default(),
        WorkerSettings::new("/nonexistent/warden-engine-host"),
    ))
}

fn lint_payload(document: &Utf8Path) -> LintPayload {
    LintPayload::new(LintOptions::new("a { color: red; }", document.as_std_path()))
}

#[rstest]
fn worker_root_is_the_nearest_manifest(project: Project) {
    project.write("package.json", "{}");
    project.write("packages/web/package.json", "{}");
    let document = project.document("packages/web/src/site.css");
    let service = idle_service();

    let context = service.context_for(&project.root, &document, None);

    assert_eq!(
        context.identity.worker_root(),
        project.root.join("packages/web")
    );
    assert_eq!(context.identity.workspace_root(), project.root);
}

#[rstest]
fn worker_root_falls_back_to_the_workspace(project: Project) {
    let document = project.document("site.css");
    let service = idle_service();

    let context = service.context_for(&project.root, &document, None);

    assert_eq!(context.identity.worker_root(), project.root);
}

#[rstest]
fn explicit_engine_package_owns_the_worker(project: Project) {
    project.write("package.json", "{}");
    project.write("tools/engine/package.json", "{}");
    let engine = project.write("tools/engine/bin/engine.js", "");
    let document = project.document("src/site.css");
    let service = idle_service();

    let context = service.context_for(&project.root, &document, Some(&engine));

    assert_eq!(
        context.identity.worker_root(),
        project.root.join("tools/engine")
    );
}

#[rstest]
fn plug_n_play_projects_carry_their_register_script(project: Project) {
    project.write("package.json", "{}");
    project.write(".pnp.cjs", "");
    let document = project.document("src/site.css");
    let service = idle_service();

    let context = service.context_for(&project.root, &document, None);

    let pnp = context.identity.pnp().expect("pnp detected");
    assert_eq!(pnp.register(), project.root.join(".pnp.cjs"));
}

#[rstest]
fn lockfile_changes_alter_the_environment_key(project: Project) {
    project.write("package.json", "{}");
    let document = project.document("site.css");
    let service = idle_service();
    let before = service.context_for(&project.root, &document, None);

    project.write("package-lock.json", "{}");
    let after = service.context_for(&project.root, &document, None);

    assert_eq!(before.identity.key(), after.identity.key());
    assert_ne!(before.environment_key, after.environment_key);
}

#[rstest]
fn new_manifest_moves_the_worker_root_after_notification(project: Project) {
    project.write("package.json", "{}");
    let document = project.document("packages/web/site.css");
    let service = idle_service();
    let initial = service.context_for(&project.root, &document, None);
    assert_eq!(initial.identity.worker_root(), project.root);

    let manifest = project.write("packages/web/package.json", "{}");
    let cached = service.context_for(&project.root, &document, None);
    assert_eq!(cached.identity.worker_root(), project.root);

    service.handle_watched_files_changed(&[FileChange::new(manifest, FileChangeKind::Created)]);
    let refreshed = service.context_for(&project.root, &document, None);

    assert_eq!(
        refreshed.identity.worker_root(),
        project.root.join("packages/web")
    );
}

#[rstest]
fn crashes_are_reported_then_cooldown_is_reported_once(project: Project) {
    let document = project.document("site.css");
    let service = WorkspaceService::new(WorkerRegistry::new(
        RegistrySettings {
            crash_threshold: 1,
            cooldown: Duration::from_secs(300),
            ..RegistrySettings::default()
        },
        WorkerSettings::new("/nonexistent/warden-engine-host"),
    ));
    let payload = lint_payload(&document);

    let crashed = service.lint(&project.root, &document, &payload);
    assert!(matches!(
        crashed,
        Err(ServiceError::Worker(WorkerError::Crashed { .. }))
    ));

    let first_pause = service.lint(&project.root, &document, &payload);
    assert!(matches!(
        first_pause,
        Err(ServiceError::Worker(WorkerError::Unavailable {
            notify_user: true,
            ..
        }))
    ));

    let quiet_pause = service
        .lint(&project.root, &document, &payload)
        .expect("repeat cooldown is silent");
    assert_eq!(quiet_pause, None);
}

#[rstest]
fn opening_a_document_releases_its_paused_project(project: Project) {
    let document = project.document("site.css");
    let service = WorkspaceService::new(WorkerRegistry::new(
        RegistrySettings {
            crash_threshold: 1,
            ..RegistrySettings::default()
        },
        WorkerSettings::new("/nonexistent/warden-engine-host"),
    ));
    let payload = lint_payload(&document);
    let context = service.context_for(&project.root, &document, None);
    assert!(service.lint(&project.root, &document, &payload).is_err());
    assert!(
        service
            .registry()
            .health(&context.identity)
            .is_some_and(|health| !health.is_healthy())
    );

    service.handle_document_opened(&document);

    assert!(
        service
            .registry()
            .health(&context.identity)
            .is_some_and(|health| health.is_healthy())
    );
}

#[rstest]
fn disposing_a_workspace_drops_its_workers(project: Project) {
    let document = project.document("site.css");
    let service = idle_service();
    assert!(
        service
            .lint(&project.root, &document, &lint_payload(&document))
            .is_err()
    );
    assert_eq!(service.registry().len(), 1);

    let disposed = service.dispose_workspace(&project.root);

    assert_eq!(disposed, 1);
    assert!(service.registry().is_empty());
}

#[cfg(unix)]
mod subprocess {
    use super::*;
    use crate::runner::{Document, LintSettings, NO_RULES_MESSAGE, RunnerService};

    /// Answers resolve with "not found"; answers lint with a configuration
    /// refusal unless the request carries an empty rule set.
    const ENGINE_SCRIPT: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  case "$line" in
    *'"type":"shutdown"'*) exit 0 ;;
    *'"type":"resolve"'*) printf '{"id":"%s","success":false,"error":{"name":"NotFoundError","message":"stylelint not found","code":"ENGINE_NOT_FOUND"}}\n' "$id" ;;
    *'"rules":{}'*) printf '{"id":"%s","success":true,"result":{"results":[{"warnings":[{"line":1,"column":3,"rule":"CssSyntaxError","severity":"error","text":"Unclosed block (CssSyntaxError)"}]}]}}\n' "$id" ;;
    *) printf '{"id":"%s","success":false,"error":{"name":"ConfigurationError","message":"No rules found within configuration. Have you provided a \\"rules\\" property?"}}\n' "$id" ;;
  esac
done
"#;

    fn engine_service() -> WorkspaceService {
        WorkspaceService::new(WorkerRegistry::new(
            RegistrySettings::default(),
            WorkerSettings::new("/bin/sh")
                .arg("-c")
                .arg(ENGINE_SCRIPT)
                .arg("warden-test-engine"),
        ))
    }

    #[rstest]
    fn missing_engine_resolves_to_nothing(project: Project) {
        let document = project.document("site.css");
        let service = engine_service();

        let resolved = service
            .resolve(&project.root, &document, &ResolvePayload::default())
            .expect("not-found is swallowed");

        assert_eq!(resolved, None);
        service.shutdown();
        assert!(service.registry().is_empty());
    }

    #[rstest]
    fn empty_configuration_still_reports_syntax_errors(project: Project) {
        let document = project.document("site.css");
        let runner = RunnerService::new(engine_service());

        let outcome = runner
            .lint_document(
                &Document::new(document, "a {").in_workspace(project.root.clone()),
                &LintSettings::default(),
            )
            .expect("fallback lint succeeds");

        let messages: Vec<_> = outcome
            .diagnostics
            .iter()
            .map(|diagnostic| diagnostic.message.as_str())
            .collect();
        assert_eq!(messages, ["Unclosed block", NO_RULES_MESSAGE]);
        let syntax = outcome.diagnostics.first().expect("syntax diagnostic");
        assert_eq!(syntax.range.start.line, 0);
        assert_eq!(syntax.range.start.character, 2);
        let notice = outcome.diagnostics.last().expect("no-rules notice");
        assert_eq!(
            notice.range,
            lsp_types::Range::new(
                lsp_types::Position::new(0, 0),
                lsp_types::Position::new(0, 0)
            )
        );
    }
}
