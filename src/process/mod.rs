//! Transfer library and engine backed by an external `curl` executable.
//!
//! The binary has no in-process transfer library, so the lifecycle's
//! collaborators are realised by shelling out: the "library" checks the
//! configured program and reads its version report, and the "engine" runs
//! the program with the native argument vector and inherited stdio.

use std::io::Write;
use std::process::Command;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::lifecycle::{
    FAILED_INIT, MEMDEBUG_ENV, MEMLIMIT_ENV, MemoryTracking, TransferEngine, TransferLibrary,
};
use crate::record::{GlobalConfig, LogStream, OperationConfig, ShowErrors, VersionInfo};
use crate::translate::NATIVE_PROGRAM;

const VERSION_FLAG: &str = "--version";
const SILENT_FLAGS: [&str; 2] = ["-s", "--silent"];
const SHOW_ERROR_FLAGS: [&str; 2] = ["-S", "--show-error"];
const URL_MARKER: &str = "://";

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Errors raised by the process-backed collaborators.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProcessError {
    /// The program could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Reason reported by the operating system.
        message: String,
    },
    /// The program ran but reported failure.
    #[error("{program} exited with status {status}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Exit status, or `unknown` when terminated by a signal.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
    /// `global_init` was called twice without a cleanup in between.
    #[error("transfer library already initialised")]
    AlreadyInitialised,
    /// A library call was made before `global_init`.
    #[error("transfer library not initialised")]
    NotInitialised,
    /// A required setting was blank.
    #[error("missing configuration value: {field}")]
    InvalidConfig {
        /// Name of the blank setting.
        field: String,
    },
    /// `--version` produced no output.
    #[error("{program} printed no version information")]
    EmptyVersion {
        /// Program that was queried.
        program: String,
    },
}

/// Environment changes applied to a streamed child process.
///
/// `None` removes the variable from the inherited environment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChildEnv {
    vars: Vec<(String, Option<String>)>,
}

impl ChildEnv {
    /// Builds the overrides that hand memory-tracking settings to the child.
    ///
    /// Settings that were absent or rejected remove the variable, so the
    /// child only ever sees validated values.
    #[must_use]
    pub fn from_tracking(tracking: &MemoryTracking) -> Self {
        let mut env = Self::default();
        env.assign(MEMDEBUG_ENV, tracking.log_file.clone());
        env.assign(
            MEMLIMIT_ENV,
            tracking.fail_after.map(|limit| limit.get().to_string()),
        );
        env
    }

    /// Sets `key` to `value`, or removes it when `value` is `None`.
    pub fn assign(&mut self, key: &str, value: Option<String>) {
        self.vars.retain(|(existing, _)| existing != key);
        self.vars.push((key.to_owned(), value));
    }

    /// The override for `key`: `Some(None)` means removed.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.vars
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_deref())
    }

    /// Returns `true` when no variable is touched.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn apply(&self, command: &mut Command) {
        for (key, value) in &self.vars {
            match value {
                Some(value) => command.env(key, value),
                None => command.env_remove(key),
            };
        }
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Spawn`] if the command cannot be started.
    fn capture(&self, program: &str, args: &[String]) -> Result<CommandOutput, ProcessError>;

    /// Runs `program` with inherited stdio and `env` applied, returning its
    /// exit code.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Spawn`] if the command cannot be started.
    fn stream(
        &self,
        program: &str,
        args: &[String],
        env: &ChildEnv,
    ) -> Result<Option<i32>, ProcessError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn capture(&self, program: &str, args: &[String]) -> Result<CommandOutput, ProcessError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| spawn_error(program, &err))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn stream(
        &self,
        program: &str,
        args: &[String],
        env: &ChildEnv,
    ) -> Result<Option<i32>, ProcessError> {
        let mut command = Command::new(program);
        command.args(args);
        env.apply(&mut command);
        let status = command
            .status()
            .map_err(|err| spawn_error(program, &err))?;
        Ok(status.code())
    }
}

fn spawn_error(program: &str, err: &std::io::Error) -> ProcessError {
    ProcessError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    }
}

/// Session handle naming the program that performs transfers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessSession {
    /// Program run for each transfer.
    pub program: String,
    /// Environment overrides applied to each transfer.
    pub env: ChildEnv,
}

/// Transfer library realised by an external program.
#[derive(Clone, Debug)]
pub struct ProcessLibrary<R> {
    program: String,
    runner: R,
    initialised: bool,
    tracking: MemoryTracking,
}

impl<R: CommandRunner> ProcessLibrary<R> {
    /// Creates a library that runs `program` through `runner`.
    #[must_use]
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
            initialised: false,
            tracking: MemoryTracking::default(),
        }
    }

    /// Program the library delegates to.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Memory-tracking settings forwarded to each transfer.
    #[must_use]
    pub const fn tracking(&self) -> &MemoryTracking {
        &self.tracking
    }

    /// Returns `true` between `global_init` and `global_cleanup`.
    #[must_use]
    pub const fn is_initialised(&self) -> bool {
        self.initialised
    }

    fn ensure_initialised(&self) -> Result<(), ProcessError> {
        if self.initialised {
            Ok(())
        } else {
            Err(ProcessError::NotInitialised)
        }
    }
}

impl<R: CommandRunner> TransferLibrary for ProcessLibrary<R> {
    type Session = ProcessSession;
    type Error = ProcessError;

    fn enable_memory_tracking(&mut self, settings: &MemoryTracking) {
        self.tracking = settings.clone();
    }

    fn global_init(&mut self) -> Result<(), Self::Error> {
        if self.initialised {
            return Err(ProcessError::AlreadyInitialised);
        }
        if self.program.trim().is_empty() {
            return Err(ProcessError::InvalidConfig {
                field: String::from("curl_bin"),
            });
        }
        self.initialised = true;
        Ok(())
    }

    fn version_info(&mut self) -> Result<VersionInfo, Self::Error> {
        self.ensure_initialised()?;
        let output = self
            .runner
            .capture(&self.program, &[VERSION_FLAG.to_owned()])?;
        if !output.is_success() {
            return Err(ProcessError::CommandFailure {
                program: self.program.clone(),
                status: output
                    .code
                    .map_or_else(|| String::from("unknown"), |code| code.to_string()),
                stderr: output.stderr.trim().to_owned(),
            });
        }
        parse_version_report(&output.stdout).ok_or_else(|| ProcessError::EmptyVersion {
            program: self.program.clone(),
        })
    }

    fn new_session(&mut self) -> Result<Self::Session, Self::Error> {
        self.ensure_initialised()?;
        Ok(ProcessSession {
            program: self.program.clone(),
            env: ChildEnv::from_tracking(&self.tracking),
        })
    }

    fn close_session(&mut self, session: Self::Session) {
        debug!(program = %session.program, "session released");
    }

    fn global_cleanup(&mut self) {
        self.initialised = false;
    }
}

/// Parses `curl --version` style output.
///
/// The first line is the banner and its second word the version. Lines
/// starting with `Protocols:` and `Features:` list capabilities. Returns
/// `None` when the report is blank.
#[must_use]
pub fn parse_version_report(report: &str) -> Option<VersionInfo> {
    let mut lines = report.lines();
    let banner = lines.next()?.trim();
    if banner.is_empty() {
        return None;
    }

    let mut info = VersionInfo {
        banner: banner.to_owned(),
        version: banner
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
            .to_owned(),
        ..VersionInfo::default()
    };

    for line in lines {
        if let Some(list) = line.strip_prefix("Protocols:") {
            info.protocols = split_words(list);
        } else if let Some(list) = line.strip_prefix("Features:") {
            info.features = split_words(list);
        }
    }

    Some(info)
}

fn split_words(list: &str) -> Vec<String> {
    list.split_whitespace().map(str::to_owned).collect()
}

/// Transfer engine that runs the session's program with the native
/// arguments.
#[derive(Clone, Debug)]
pub struct ProcessEngine<R> {
    runner: R,
    error_log: Option<Utf8PathBuf>,
}

impl<R: CommandRunner> ProcessEngine<R> {
    /// Creates an engine that runs transfers through `runner`.
    #[must_use]
    pub const fn new(runner: R) -> Self {
        Self {
            runner,
            error_log: None,
        }
    }

    /// Sends error messages to `path` instead of stderr.
    #[must_use]
    pub fn with_error_log(mut self, path: Option<Utf8PathBuf>) -> Self {
        self.error_log = path;
        self
    }

    fn attach_error_log(&self, config: &mut GlobalConfig<ProcessSession>) {
        let Some(path) = &self.error_log else {
            return;
        };
        match LogStream::open(path) {
            Ok(stream) => config.set_errors(stream),
            Err(err) => warn!(path = %path, error = %err, "could not open error log"),
        }
    }
}

impl<R: CommandRunner> TransferEngine<ProcessSession> for ProcessEngine<R> {
    fn operate(&mut self, config: &mut GlobalConfig<ProcessSession>, args: &[String]) -> i32 {
        self.attach_error_log(config);
        apply_error_display(config, args);
        record_urls(config, args);

        let Some(ProcessSession { program, env }) = config.session_mut().cloned() else {
            report(config, "no transfer session available");
            return FAILED_INIT;
        };

        let operands = args.get(1..).unwrap_or_default();
        debug!(program = %program, count = operands.len(), "starting transfer");
        match self.runner.stream(&program, operands, &env) {
            Ok(Some(code)) => code,
            Ok(None) => {
                report(config, &format!("{program} terminated by a signal"));
                1
            }
            Err(err) => {
                report(config, &err.to_string());
                FAILED_INIT
            }
        }
    }
}

fn apply_error_display<S>(config: &mut GlobalConfig<S>, args: &[String]) {
    let has = |flags: &[&str]| args.iter().any(|arg| flags.contains(&arg.as_str()));
    if has(&SHOW_ERROR_FLAGS) {
        config.show_errors = ShowErrors::Force;
    } else if has(&SILENT_FLAGS) {
        config.show_errors = ShowErrors::Hide;
    }
}

fn record_urls<S>(config: &mut GlobalConfig<S>, args: &[String]) {
    let Some(id) = config.operations().first().map(OperationConfig::id) else {
        return;
    };
    if let Some(op) = config.operations_mut().get_mut(id) {
        op.urls.extend(
            args.iter()
                .skip(1)
                .filter(|arg| arg.contains(URL_MARKER))
                .cloned(),
        );
    }
}

fn report<S>(config: &mut GlobalConfig<S>, message: &str) {
    if config.show_errors == ShowErrors::Hide {
        return;
    }
    if let Some(errors) = config.errors_mut() {
        writeln!(errors, "{NATIVE_PROGRAM}: {message}").ok();
    }
}
