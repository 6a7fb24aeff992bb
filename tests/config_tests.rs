//! Tests for loading configuration from the environment.

use curlshim::ShimConfig;
use curlshim::test_support::EnvGuard;

#[test]
fn environment_overrides_transfer_program() {
    let _guard = EnvGuard::set_vars(&[
        ("CURLSHIM_CURL_BIN", "/opt/curl/bin/curl"),
        ("CURLSHIM_ERROR_LOG", "/tmp/curlshim-errors.log"),
    ]);

    let cfg = ShimConfig::load_without_cli_args().expect("configuration should load");

    assert_eq!(cfg.curl_bin, "/opt/curl/bin/curl");
    assert_eq!(cfg.error_log.as_deref(), Some("/tmp/curlshim-errors.log"));
    assert!(cfg.validate().is_ok());
}

#[test]
fn transfer_program_defaults_to_curl() {
    let _guard = EnvGuard::remove_vars(&["CURLSHIM_CURL_BIN", "CURLSHIM_ERROR_LOG"]);

    let cfg = ShimConfig::load_without_cli_args().expect("configuration should load");

    assert_eq!(cfg.curl_bin, "curl");
}
