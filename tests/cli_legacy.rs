//! End-to-end tests running the `curlshim` binary against a fake curl.
//!
//! The fake program answers `--version` like curl and otherwise echoes its
//! arguments one per line, exiting with `FAKE_CURL_STATUS`.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::process::Command as StdCommand;

use assert_cmd::Command;
use camino::Utf8PathBuf;
use predicates::prelude::*;
use rstest::{fixture, rstest};
use tempfile::TempDir;

const FAKE_CURL: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "curl 8.5.0 (fake)"
  echo "Protocols: http https scp sftp"
  exit 0
fi
printf '%s\n' "$@"
exit "${FAKE_CURL_STATUS:-0}"
"#;

struct Sandbox {
    _tmp: TempDir,
    root: Utf8PathBuf,
    curl: Utf8PathBuf,
}

#[fixture]
fn sandbox() -> Sandbox {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 tempdir");
    let curl = root.join("fake-curl");
    fs::write(&curl, FAKE_CURL).expect("write fake curl");
    fs::set_permissions(&curl, fs::Permissions::from_mode(0o755)).expect("chmod fake curl");
    Sandbox {
        _tmp: tmp,
        root,
        curl,
    }
}

fn shim(sandbox: &Sandbox, arg0: &str) -> Command {
    let mut std_cmd = StdCommand::new(env!("CARGO_BIN_EXE_curlshim"));
    std_cmd
        .arg0(arg0)
        .current_dir(&sandbox.root)
        .env("CURLSHIM_CURL_BIN", &sandbox.curl)
        .env_remove("CURLSHIM_ERROR_LOG")
        .env_remove("CURL_MEMDEBUG")
        .env_remove("CURL_MEMLIMIT");
    Command::from_std(std_cmd)
}

#[rstest]
fn native_invocation_passes_arguments_through(sandbox: Sandbox) {
    shim(&sandbox, "curl")
        .args(["-s", "https://example.com/index.html"])
        .assert()
        .success()
        .stdout("-s\nhttps://example.com/index.html\n");
}

#[rstest]
fn engine_exit_status_becomes_process_status(sandbox: Sandbox) {
    shim(&sandbox, "curl")
        .env("FAKE_CURL_STATUS", "6")
        .arg("https://unresolvable.invalid/")
        .assert()
        .code(6);
}

#[rstest]
fn scp_download_is_translated(sandbox: Sandbox) {
    shim(&sandbox, "scp")
        .args(["-q", "user@host:/a/b/file.txt", "."])
        .assert()
        .success()
        .stdout("-s\nscp://user@host//a/b/file.txt\n-O\n");
}

#[rstest]
fn sftp_download_into_directory_uses_remote_name(sandbox: Sandbox) {
    let downloads = sandbox.root.join("downloads");
    fs::create_dir(&downloads).expect("create downloads dir");

    shim(&sandbox, "sftp")
        .args(["user@host:/srv/report.pdf", "downloads"])
        .assert()
        .success()
        .stdout("sftp://user@host//srv/report.pdf\n-o\ndownloads/report.pdf\n");
}

#[rstest]
fn scp_upload_is_translated(sandbox: Sandbox) {
    shim(&sandbox, "scp")
        .args(["notes.txt", "user@host:~/inbox/"])
        .assert()
        .success()
        .stdout("-T\nnotes.txt\nscp://user@host/~/inbox/\n");
}

#[rstest]
#[case::scp("scp")]
#[case::sftp("sftp")]
fn incomplete_legacy_invocation_exits_with_usage(sandbox: Sandbox, #[case] alias: &str) {
    shim(&sandbox, alias)
        .arg("user@host:/only/remote")
        .assert()
        .code(255)
        .stdout("")
        .stderr(predicate::str::contains(format!(
            "Usage:\t{alias} [-q] [user@]host:distantFile localFile"
        )));
}

#[rstest]
fn missing_transfer_program_fails_initialisation(sandbox: Sandbox) {
    shim(&sandbox, "curl")
        .env("CURLSHIM_CURL_BIN", sandbox.root.join("no-such-curl"))
        .arg("https://example.com/")
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "curl: error retrieving transfer library information",
        ));
}
