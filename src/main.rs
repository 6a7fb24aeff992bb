//! Binary entry point for curlshim.
//!
//! Runs as `curl` under its own name and translates the legacy syntax when
//! installed as `scp` or `sftp`.

use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::process;

use thiserror::Error;

use curlshim::{
    FAILED_INIT, Lifecycle, ProcessCommandRunner, ProcessEngine, ProcessLibrary, ShimConfig,
    logging,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid argument: {0} is not valid UTF-8")]
    InvalidArgument(String),
}

fn main() {
    logging::init();
    let exit_code = match run(env::args_os()) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            FAILED_INIT
        }
    };

    process::exit(exit_code);
}

fn run(args: impl IntoIterator<Item = OsString>) -> Result<i32, CliError> {
    let args = collect_args(args)?;

    let config =
        ShimConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let library = ProcessLibrary::new(config.curl_bin.clone(), ProcessCommandRunner);
    let engine = ProcessEngine::new(ProcessCommandRunner).with_error_log(config.error_log_path());

    Ok(Lifecycle::new(library, engine).run(&args))
}

fn collect_args(args: impl IntoIterator<Item = OsString>) -> Result<Vec<String>, CliError> {
    args.into_iter()
        .map(|arg| {
            arg.into_string()
                .map_err(|raw| CliError::InvalidArgument(raw.to_string_lossy().into_owned()))
        })
        .collect()
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "curlshim: {err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_args_keeps_utf8_arguments_in_order() {
        let args = collect_args([
            OsString::from("scp"),
            OsString::from("host:file"),
            OsString::from("."),
        ])
        .expect("utf8 arguments");

        assert_eq!(args, vec!["scp", "host:file", "."]);
    }

    #[cfg(unix)]
    #[test]
    fn collect_args_rejects_invalid_utf8() {
        use std::os::unix::ffi::OsStringExt;

        let err = collect_args([OsString::from("curl"), OsString::from_vec(vec![0x66, 0xff])])
            .expect_err("invalid utf8 should be rejected");

        assert!(
            matches!(err, CliError::InvalidArgument(ref lossy) if lossy.starts_with('f')),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn write_error_prefixes_program_name() {
        let mut buf = Vec::new();
        write_error(&mut buf, &CliError::Config(String::from("missing transfer program")));
        let rendered = String::from_utf8(buf).expect("utf8");

        assert_eq!(
            rendered,
            "curlshim: configuration error: missing transfer program\n"
        );
    }
}
