//! Integration tests for the `warden` binary entry point.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn missing_subcommand_exits_with_failure() {
    let mut command = cargo_bin_cmd!("warden");
    command.assert().failure().stderr(contains("Usage"));
}

#[test]
fn invalid_configuration_values_are_reported() {
    let mut command = cargo_bin_cmd!("warden");
    command.args(["--package-manager", "bower", "resolve", "site.css"]);
    command
        .assert()
        .failure()
        .stderr(contains("failed to load configuration"));
}

#[cfg(unix)]
mod with_stub_engine {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::str::contains;
    use tempfile::TempDir;

    /// Stand-in engine host: no engine is ever found.
    const STUB_HOST: &str = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  case "$line" in
    *'"type":"shutdown"'*) exit 0 ;;
    *) printf '{"id":"%s","success":false,"error":{"name":"NotFoundError","message":"stylelint not found","code":"ENGINE_NOT_FOUND"}}\n' "$id" ;;
  esac
done
"#;

    fn stub_host(dir: &Path) -> PathBuf {
        let path = dir.join("stub-host.sh");
        fs::write(&path, STUB_HOST).expect("write stub host");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("make stub executable");
        path
    }

    #[test]
    fn resolve_without_an_engine_prints_null() {
        let dir = TempDir::new().expect("create temp dir");
        let host = stub_host(dir.path());
        let document = dir.path().join("site.css");
        fs::write(&document, "a { color: red; }").expect("write stylesheet");

        let mut command = cargo_bin_cmd!("warden");
        command
            .arg("--engine-host")
            .arg(&host)
            .args(["--log-filter", "off", "resolve"])
            .arg(&document);
        command.assert().success().stdout(contains("null"));
    }

    #[test]
    fn lint_without_an_engine_prints_no_diagnostics() {
        let dir = TempDir::new().expect("create temp dir");
        let host = stub_host(dir.path());
        let document = dir.path().join("site.css");
        fs::write(&document, "a { color: red; }").expect("write stylesheet");

        let mut command = cargo_bin_cmd!("warden");
        command
            .arg("--engine-host")
            .arg(&host)
            .args(["--log-filter", "off", "lint"])
            .arg(&document);
        command
            .assert()
            .success()
            .stdout(contains("\"diagnostics\": []"));
    }
}
