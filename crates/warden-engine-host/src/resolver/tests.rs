//! Resolution order tests over temporary package layouts.

use std::fs;
use std::path::{Path, PathBuf};

use mockall::predicate::eq;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use warden_protocol::{PackageManager, ResolutionSource};

use super::{EngineResolver, PnpScripts, ResolveRequest};
use crate::tests::MockToolchain;
use crate::error::EngineError;

struct Layout {
    dir: TempDir,
}

impl Layout {
    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn install(&self, at: &Path, version: &str) -> PathBuf {
        let package = at.join("stylelint");
        fs::create_dir_all(package.join("bin")).expect("create package");
        fs::write(
            package.join("package.json"),
            format!(
                r#"{{"name":"stylelint","version":"{version}","bin":{{"stylelint":"bin/stylelint.mjs"}}}}"#
            ),
        )
        .expect("write manifest");
        fs::write(package.join("bin/stylelint.mjs"), "").expect("write bin");
        package
    }
}

#[fixture]
fn layout() -> Layout {
    Layout {
        dir: TempDir::new().expect("temp dir"),
    }
}

fn no_toolchain() -> MockToolchain {
    let mut toolchain = MockToolchain::new();
    toolchain.expect_global_modules().never();
    toolchain.expect_pnp_resolve().never();
    toolchain
}

#[rstest]
fn explicit_package_directory_wins(layout: Layout) {
    let local = layout.install(&layout.root().join("node_modules"), "16.0.0");
    let vendored = layout.install(&layout.root().join("vendor"), "15.1.0");
    let mut resolver = EngineResolver::new("stylelint", layout.root(), no_toolchain());

    let resolved = resolver
        .resolve(&ResolveRequest {
            engine_path: Some(PathBuf::from("vendor/stylelint")),
            ..ResolveRequest::default()
        })
        .expect("resolved");

    assert_eq!(resolved.source, ResolutionSource::Explicit);
    assert_eq!(resolved.package_dir, vendored);
    assert_ne!(resolved.package_dir, local);
    assert_eq!(resolved.version.as_deref(), Some("15.1.0"));
    assert_eq!(resolved.entry, vendored.join("bin/stylelint.mjs"));
}

#[rstest]
fn explicit_script_file_is_used_directly(layout: Layout) {
    let package = layout.install(&layout.root().join("vendor"), "15.1.0");
    let script = package.join("bin/stylelint.mjs");
    let mut resolver = EngineResolver::new("stylelint", layout.root(), no_toolchain());

    let resolved = resolver
        .resolve(&ResolveRequest {
            engine_path: Some(script.clone()),
            ..ResolveRequest::default()
        })
        .expect("resolved");

    assert_eq!(resolved.entry, script);
    assert_eq!(resolved.package_dir, package);
    assert_eq!(resolved.version.as_deref(), Some("15.1.0"));
}

#[rstest]
fn missing_explicit_path_is_not_found(layout: Layout) {
    layout.install(&layout.root().join("node_modules"), "16.0.0");
    let mut resolver = EngineResolver::new("stylelint", layout.root(), no_toolchain());

    let error = resolver
        .resolve(&ResolveRequest {
            engine_path: Some(PathBuf::from("missing/stylelint")),
            ..ResolveRequest::default()
        })
        .expect_err("missing path");

    assert!(matches!(error, EngineError::NotFound { .. }));
}

#[rstest]
fn local_installation_is_found_above_the_document(layout: Layout) {
    let project = layout.root().join("packages/web");
    let package = layout.install(&project.join("node_modules"), "16.2.0");
    let document = project.join("src/styles/site.css");
    let mut resolver = EngineResolver::new("stylelint", layout.root(), no_toolchain());

    let resolved = resolver
        .resolve(&ResolveRequest {
            document_path: Some(document),
            ..ResolveRequest::default()
        })
        .expect("resolved");

    assert_eq!(resolved.source, ResolutionSource::Local);
    assert_eq!(resolved.package_dir, package);
}

#[rstest]
fn worker_directory_is_searched_after_the_document(layout: Layout) {
    let package = layout.install(&layout.root().join("node_modules"), "16.2.0");
    let elsewhere = TempDir::new().expect("temp dir");
    let mut resolver = EngineResolver::new("stylelint", layout.root(), no_toolchain());

    let resolved = resolver
        .resolve(&ResolveRequest {
            document_path: Some(elsewhere.path().join("a.css")),
            ..ResolveRequest::default()
        })
        .expect("resolved");

    assert_eq!(resolved.package_dir, package);
}

#[rstest]
fn global_directory_is_consulted_once_per_manager(layout: Layout) {
    let global = layout.root().join("global/lib/node_modules");
    let package = layout.install(&global, "16.3.0");
    let project = layout.root().join("project");
    fs::create_dir_all(&project).expect("project dir");

    let mut toolchain = MockToolchain::new();
    toolchain
        .expect_global_modules()
        .with(eq(PackageManager::Pnpm))
        .times(1)
        .return_const(Some(global.clone()));
    toolchain.expect_pnp_resolve().never();
    let mut resolver = EngineResolver::new("stylelint", &project, toolchain);
    let request = ResolveRequest {
        package_manager: Some(PackageManager::Pnpm),
        ..ResolveRequest::default()
    };

    let first = resolver.resolve(&request).expect("resolved");
    let second = resolver.resolve(&request).expect("resolved again");

    assert_eq!(first.source, ResolutionSource::Global);
    assert_eq!(first.package_dir, package);
    assert_eq!(first, second);
}

#[rstest]
fn nothing_found_reports_not_found(layout: Layout) {
    let mut toolchain = MockToolchain::new();
    toolchain.expect_global_modules().return_const(None::<PathBuf>);
    let mut resolver = EngineResolver::new("stylelint", layout.root(), toolchain);

    let error = resolver
        .resolve(&ResolveRequest::default())
        .expect_err("not found");

    assert!(matches!(error, EngineError::NotFound { .. }));
    assert!(error.to_wire().is_not_found());
}

#[rstest]
fn pnp_projects_resolve_through_the_register_script(layout: Layout) {
    let cache = layout.root().join(".yarn/unplugged");
    let package = layout.install(&cache, "16.4.0");
    let register = layout.root().join(".pnp.cjs");

    let mut toolchain = MockToolchain::new();
    let manifest = package.join("package.json");
    toolchain
        .expect_pnp_resolve()
        .withf(|_, request, _| request == "stylelint/package.json")
        .times(1)
        .return_const(Some(manifest));
    toolchain.expect_global_modules().never();
    let mut resolver = EngineResolver::new("stylelint", layout.root(), toolchain).with_pnp(Some(
        PnpScripts {
            register,
            loader: None,
        },
    ));

    let resolved = resolver
        .resolve(&ResolveRequest::default())
        .expect("resolved");

    assert_eq!(resolved.source, ResolutionSource::Pnp);
    assert_eq!(resolved.package_dir, package);
}

#[rstest]
fn packages_without_an_entry_point_are_unusable(layout: Layout) {
    let package = layout.root().join("node_modules/stylelint");
    fs::create_dir_all(&package).expect("package dir");
    fs::write(package.join("package.json"), r#"{"name":"stylelint"}"#).expect("manifest");
    let mut resolver = EngineResolver::new("stylelint", layout.root(), no_toolchain());

    let error = resolver
        .resolve(&ResolveRequest::default())
        .expect_err("unusable");

    assert!(matches!(error, EngineError::Unusable { .. }));
    assert!(error.to_wire().is_not_found());
}
