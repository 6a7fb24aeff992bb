//! Unit tests for the lifecycle sequencer.

use std::num::NonZeroU64;

use rstest::{fixture, rstest};

use super::*;
use crate::test_support::{
    Call, CallLog, DropProbe, RecordingHook, RecordingPlatform, ScriptedEngine, ScriptedLibrary,
    SharedBuffer,
};

struct Harness {
    log: CallLog,
    library: ScriptedLibrary,
    engine: ScriptedEngine,
    output: SharedBuffer,
}

impl Harness {
    fn lifecycle(&self) -> Lifecycle<ScriptedLibrary, ScriptedEngine, RecordingPlatform> {
        Lifecycle::with_platform(
            self.library.clone(),
            self.engine.clone(),
            RecordingPlatform::new(self.log.clone()),
        )
        .with_error_output(self.output.clone())
        .with_env_lookup(|_| None)
    }
}

#[fixture]
fn harness() -> Harness {
    let log = CallLog::new();
    Harness {
        library: ScriptedLibrary::new(log.clone()),
        engine: ScriptedEngine::new(log.clone(), 0),
        output: SharedBuffer::new(),
        log,
    }
}

fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_owned()).collect()
}

#[rstest]
fn successful_run_follows_bootstrap_and_teardown_order(harness: Harness) {
    let args = argv(&["curl", "https://example.com"]);
    let status = harness.lifecycle().run(&args);

    assert_eq!(status, 0);
    assert_eq!(
        harness.log.calls(),
        vec![
            Call::EnsureStandardStreams,
            Call::IgnoreBrokenPipe,
            Call::GlobalInit,
            Call::VersionInfo,
            Call::NewSession,
            Call::Operate(args),
            Call::CloseSession(1),
            Call::GlobalCleanup,
        ]
    );
    assert!(harness.output.contents().is_empty());
}

#[rstest]
fn engine_sees_fully_bootstrapped_record(harness: Harness) {
    harness.lifecycle().run(&argv(&["curl", "-V"]));

    let seen = harness.engine.observation().expect("engine should run");
    assert!(seen.had_session);
    assert!(seen.had_version);
    assert_eq!(seen.operations, 1);
    assert!(seen.first_bound);
}

#[rstest]
#[case::success(0)]
#[case::couldnt_resolve(6)]
#[case::operation_timeout(28)]
fn engine_status_is_returned_after_teardown(#[case] status: i32) {
    let log = CallLog::new();
    let engine = ScriptedEngine::new(log.clone(), status);
    let mut lifecycle = Lifecycle::with_platform(
        ScriptedLibrary::new(log.clone()),
        engine,
        RecordingPlatform::new(log.clone()),
    )
    .with_env_lookup(|_| None);

    assert_eq!(lifecycle.run(&argv(&["curl", "x"])), status);
    assert_eq!(log.count(&Call::GlobalCleanup), 1);
    assert_eq!(log.count(&Call::CloseSession(1)), 1);
}

#[rstest]
fn library_init_failure_skips_remaining_steps(harness: Harness) {
    harness.library.fail_init();
    let status = harness.lifecycle().run(&argv(&["curl", "x"]));

    assert_eq!(status, FAILED_INIT);
    assert_eq!(harness.log.count(&Call::VersionInfo), 0);
    assert_eq!(harness.log.count(&Call::NewSession), 0);
    assert_eq!(harness.log.count(&Call::GlobalCleanup), 0);
    assert!(harness.engine.observation().is_none(), "engine must not run");
    assert_eq!(
        harness.output.contents(),
        "curl: error initializing transfer library: scripted init failure\n"
    );
}

#[rstest]
fn bootstrap_reports_library_init_step(harness: Harness) {
    harness.library.fail_init();
    let mut lifecycle = harness.lifecycle();

    let err = lifecycle.bootstrap().expect_err("init should fail");
    assert!(matches!(err, BootstrapError::LibraryInit(_)));
}

#[rstest]
fn version_failure_shuts_library_down(harness: Harness) {
    harness.library.fail_version();
    let status = harness.lifecycle().run(&argv(&["curl", "x"]));

    assert_eq!(status, FAILED_INIT);
    assert_eq!(harness.log.count(&Call::NewSession), 0);
    assert_eq!(harness.log.count(&Call::GlobalCleanup), 1);
    assert!(harness.engine.observation().is_none());
    assert!(
        harness
            .output
            .contents()
            .starts_with("curl: error retrieving transfer library information")
    );
}

#[rstest]
fn session_failure_shuts_library_down(harness: Harness) {
    harness.library.fail_session();
    let status = harness.lifecycle().run(&argv(&["curl", "x"]));

    assert_eq!(status, FAILED_INIT);
    assert_eq!(harness.log.count(&Call::GlobalCleanup), 1);
    assert!(harness.engine.observation().is_none());
    assert!(
        harness
            .output
            .contents()
            .starts_with("curl: error initializing transfer session handle")
    );
}

#[rstest]
fn hooks_run_in_order_after_library_cleanup(harness: Harness) {
    let mut lifecycle = harness
        .lifecycle()
        .with_cleanup_hook(RecordingHook::new("tls", harness.log.clone()).failing())
        .with_cleanup_hook(RecordingHook::new("ssh", harness.log.clone()));

    assert_eq!(lifecycle.run(&argv(&["curl", "x"])), 0);

    let cleanup = harness.log.position(&Call::GlobalCleanup).expect("cleanup");
    let tls = harness
        .log
        .position(&Call::Hook(String::from("tls")))
        .expect("tls hook should run");
    let ssh = harness
        .log
        .position(&Call::Hook(String::from("ssh")))
        .expect("a failing hook must not stop later hooks");
    assert!(cleanup < tls && tls < ssh);
}

#[rstest]
#[case::inactive(false, 0)]
#[case::active(true, 1)]
fn security_backend_is_released_only_when_active(
    harness: Harness,
    #[case] active: bool,
    #[case] expected: usize,
) {
    if active {
        harness.library.activate_security_backend();
    }
    harness.lifecycle().run(&argv(&["curl", "x"]));

    assert_eq!(harness.log.count(&Call::ReleaseSecurityBackend), expected);
}

#[rstest]
fn legacy_invocation_runs_translated_arguments(harness: Harness) {
    let status = harness
        .lifecycle()
        .run(&argv(&["scp", "-q", "user@host:/srv/data.csv", "copy.csv"]));

    assert_eq!(status, 0);
    assert_eq!(
        harness.log.count(&Call::Operate(argv(&[
            "curl",
            "-s",
            "scp://user@host//srv/data.csv",
            "-o",
            "copy.csv",
        ]))),
        1
    );
}

#[rstest]
#[case::scp("scp")]
#[case::sftp("sftp")]
fn incomplete_legacy_invocation_prints_usage(harness: Harness, #[case] alias: &str) {
    let status = harness.lifecycle().run(&argv(&[alias, "only-local"]));

    assert_eq!(status, USAGE_ERROR);
    assert!(harness.log.calls().is_empty(), "nothing may be initialised");
    let usage = harness.output.contents();
    assert!(usage.starts_with(&format!("Usage:\t{alias} [-q] [user@]host:distantFile localFile\n")));
    assert!(usage.contains(&format!("\t{alias} [-q] localFile [user@]host:distantFile ")));
}

#[rstest]
fn memory_tracking_is_enabled_before_library_init(harness: Harness) {
    let mut lifecycle = harness.lifecycle().with_env_lookup(|key| match key {
        MEMDEBUG_ENV => Some(String::from("memdump")),
        MEMLIMIT_ENV => Some(String::from("40")),
        _ => None,
    });
    lifecycle.run(&argv(&["curl", "x"]));

    let tracking = harness.library.tracking().expect("tracking applied");
    assert_eq!(tracking.log_file.as_deref(), Some("memdump"));
    assert_eq!(tracking.fail_after.map(NonZeroU64::get), Some(40));

    let enabled = harness
        .log
        .position(&Call::EnableMemoryTracking)
        .expect("tracking call");
    let init = harness.log.position(&Call::GlobalInit).expect("init call");
    assert!(enabled < init);
}

#[rstest]
fn memory_tracking_is_skipped_without_variables(harness: Harness) {
    harness.lifecycle().run(&argv(&["curl", "x"]));

    assert!(harness.library.tracking().is_none());
    assert_eq!(harness.log.count(&Call::EnableMemoryTracking), 0);
}

#[rstest]
fn descriptor_guard_failure_is_not_fatal(harness: Harness) {
    let mut lifecycle = Lifecycle::with_platform(
        harness.library.clone(),
        harness.engine.clone(),
        RecordingPlatform::new(harness.log.clone()).failing_streams(),
    )
    .with_env_lookup(|_| None);

    assert_eq!(lifecycle.run(&argv(&["curl", "x"])), 0);
    assert_eq!(harness.log.count(&Call::GlobalInit), 1);
}

#[rstest]
fn teardown_releases_everything_the_engine_acquired(harness: Harness) {
    let errors = DropProbe::new();
    let trace = DropProbe::new();
    harness.engine.open_error_stream(&errors);
    harness.engine.open_trace_stream(&trace);
    harness.engine.add_operations(2);

    let mut lifecycle = harness.lifecycle();
    let mut record = lifecycle.bootstrap().expect("bootstrap should succeed");
    let status = TransferEngine::operate(&mut harness.engine.clone(), &mut record, &[]);
    assert_eq!(status, 0);
    assert_eq!(record.operations().len(), 3);

    lifecycle.teardown(&mut record);

    assert!(errors.is_dropped(), "owned error stream should be closed");
    assert!(trace.is_dropped(), "owned trace stream should be closed");
    assert!(!record.has_session());
    assert!(record.version().is_none());
    assert!(record.operations().first().is_none());
    assert!(record.operations().last().is_none());
}

#[rstest]
fn bootstrap_reports_session_step(harness: Harness) {
    harness.library.fail_session();
    let mut lifecycle = harness.lifecycle();

    let err = lifecycle.bootstrap().expect_err("session should fail");
    assert!(matches!(err, BootstrapError::Session(_)));
    assert_eq!(harness.log.count(&Call::GlobalCleanup), 1);
}

#[rstest]
#[case::version(false)]
#[case::session(true)]
fn failed_bootstrap_shuts_library_down_before_releasing_record(
    harness: Harness,
    #[case] fail_session: bool,
) {
    if fail_session {
        harness.library.fail_session();
    } else {
        harness.library.fail_version();
    }
    let mut lifecycle = harness.lifecycle();

    assert!(lifecycle.bootstrap().is_err());
    assert_eq!(
        harness.log.calls().last(),
        Some(&Call::GlobalCleanup),
        "library shutdown must be the last collaborator call"
    );
    assert_eq!(harness.log.count(&Call::GlobalCleanup), 1);
}
