//! Test support utilities shared across unit and integration tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::lifecycle::{CleanupError, CleanupHook, MemoryTracking, TransferEngine, TransferLibrary};
use crate::platform::Platform;
use crate::process::{ChildEnv, CommandOutput, CommandRunner, ProcessError};
use crate::record::{GlobalConfig, LogStream, VersionInfo};

/// One observable collaborator call, in the order it happened.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    /// Standard descriptor guard ran.
    EnsureStandardStreams,
    /// Broken pipe policy was installed.
    IgnoreBrokenPipe,
    /// Memory tracking was enabled.
    EnableMemoryTracking,
    /// Library initialisation.
    GlobalInit,
    /// Library version query.
    VersionInfo,
    /// Session creation.
    NewSession,
    /// Session release with the session number.
    CloseSession(u32),
    /// Library shutdown.
    GlobalCleanup,
    /// Security backend release.
    ReleaseSecurityBackend,
    /// Engine ran with these arguments.
    Operate(Vec<String>),
    /// Named cleanup hook ran.
    Hook(String),
}

/// Shared, ordered log of collaborator calls.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    calls: Rc<RefCell<Vec<Call>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call.
    pub fn push(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    /// Returns a snapshot of the calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Counts calls equal to `call`.
    #[must_use]
    pub fn count(&self, call: &Call) -> usize {
        self.calls.borrow().iter().filter(|seen| *seen == call).count()
    }

    /// Position of the first call equal to `call`.
    #[must_use]
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls.borrow().iter().position(|seen| seen == call)
    }
}

/// Error produced by [`ScriptedLibrary`] steps set to fail.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted {step} failure")]
pub struct ScriptedLibraryError {
    /// Step that failed.
    pub step: String,
}

/// Session handle handed out by [`ScriptedLibrary`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScriptedSession(pub u32);

#[derive(Debug, Default)]
struct LibraryScript {
    fail_init: bool,
    fail_version: bool,
    fail_session: bool,
    security_backend: bool,
    sessions_created: u32,
    tracking: Option<MemoryTracking>,
}

/// Transfer library double whose steps can be scripted to fail.
#[derive(Clone, Debug)]
pub struct ScriptedLibrary {
    log: CallLog,
    script: Rc<RefCell<LibraryScript>>,
}

impl ScriptedLibrary {
    /// Creates a library that succeeds at every step.
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            script: Rc::new(RefCell::new(LibraryScript::default())),
        }
    }

    /// Makes `global_init` fail.
    pub fn fail_init(&self) {
        self.script.borrow_mut().fail_init = true;
    }

    /// Makes `version_info` fail.
    pub fn fail_version(&self) {
        self.script.borrow_mut().fail_version = true;
    }

    /// Makes `new_session` fail.
    pub fn fail_session(&self) {
        self.script.borrow_mut().fail_session = true;
    }

    /// Reports an active security backend at teardown.
    pub fn activate_security_backend(&self) {
        self.script.borrow_mut().security_backend = true;
    }

    /// Memory-tracking settings received, if any.
    #[must_use]
    pub fn tracking(&self) -> Option<MemoryTracking> {
        self.script.borrow().tracking.clone()
    }

    fn failure(step: &str) -> ScriptedLibraryError {
        ScriptedLibraryError {
            step: step.to_owned(),
        }
    }
}

impl TransferLibrary for ScriptedLibrary {
    type Session = ScriptedSession;
    type Error = ScriptedLibraryError;

    fn enable_memory_tracking(&mut self, settings: &MemoryTracking) {
        self.log.push(Call::EnableMemoryTracking);
        self.script.borrow_mut().tracking = Some(settings.clone());
    }

    fn global_init(&mut self) -> Result<(), Self::Error> {
        self.log.push(Call::GlobalInit);
        if self.script.borrow().fail_init {
            return Err(Self::failure("init"));
        }
        Ok(())
    }

    fn version_info(&mut self) -> Result<VersionInfo, Self::Error> {
        self.log.push(Call::VersionInfo);
        if self.script.borrow().fail_version {
            return Err(Self::failure("version"));
        }
        Ok(VersionInfo {
            banner: String::from("curl 8.5.0 (scripted)"),
            version: String::from("8.5.0"),
            protocols: vec![String::from("scp"), String::from("sftp")],
            features: Vec::new(),
        })
    }

    fn new_session(&mut self) -> Result<Self::Session, Self::Error> {
        self.log.push(Call::NewSession);
        let mut script = self.script.borrow_mut();
        if script.fail_session {
            return Err(Self::failure("session"));
        }
        script.sessions_created += 1;
        Ok(ScriptedSession(script.sessions_created))
    }

    fn close_session(&mut self, session: Self::Session) {
        self.log.push(Call::CloseSession(session.0));
    }

    fn global_cleanup(&mut self) {
        self.log.push(Call::GlobalCleanup);
    }

    fn security_backend_active(&self) -> bool {
        self.script.borrow().security_backend
    }

    fn release_security_backend(&mut self) {
        self.log.push(Call::ReleaseSecurityBackend);
    }
}

/// What the engine saw in the record while it ran.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EngineObservation {
    /// A session was attached.
    pub had_session: bool,
    /// Version details were captured.
    pub had_version: bool,
    /// Number of operations in the list.
    pub operations: usize,
    /// The default operation was bound to the session.
    pub first_bound: bool,
}

#[derive(Debug, Default)]
struct EngineScript {
    status: i32,
    owned_errors: Option<DropProbe>,
    owned_trace: Option<DropProbe>,
    extra_operations: usize,
    observation: Option<EngineObservation>,
}

/// Transfer engine double returning a scripted status.
#[derive(Clone, Debug)]
pub struct ScriptedEngine {
    log: CallLog,
    script: Rc<RefCell<EngineScript>>,
}

impl ScriptedEngine {
    /// Creates an engine that returns `status`.
    #[must_use]
    pub fn new(log: CallLog, status: i32) -> Self {
        Self {
            log,
            script: Rc::new(RefCell::new(EngineScript {
                status,
                ..EngineScript::default()
            })),
        }
    }

    /// Opens an owned error stream tracked by `probe` while operating.
    pub fn open_error_stream(&self, probe: &DropProbe) {
        self.script.borrow_mut().owned_errors = Some(probe.clone());
    }

    /// Opens an owned trace stream tracked by `probe` while operating.
    pub fn open_trace_stream(&self, probe: &DropProbe) {
        self.script.borrow_mut().owned_trace = Some(probe.clone());
    }

    /// Appends `count` operations to the record while operating.
    pub fn add_operations(&self, count: usize) {
        self.script.borrow_mut().extra_operations = count;
    }

    /// The record state seen during the last run.
    #[must_use]
    pub fn observation(&self) -> Option<EngineObservation> {
        self.script.borrow().observation.clone()
    }
}

impl<S> TransferEngine<S> for ScriptedEngine {
    fn operate(&mut self, config: &mut GlobalConfig<S>, args: &[String]) -> i32 {
        self.log.push(Call::Operate(args.to_vec()));
        let mut script = self.script.borrow_mut();

        script.observation = Some(EngineObservation {
            had_session: config.has_session(),
            had_version: config.version().is_some(),
            operations: config.operations().len(),
            first_bound: config
                .operations()
                .first()
                .is_some_and(|op| op.is_session_bound()),
        });

        if let Some(probe) = &script.owned_errors {
            config.set_errors(LogStream::from_writer(Box::new(probe.writer()), true));
        }
        if let Some(probe) = &script.owned_trace {
            config.set_trace_stream(LogStream::from_writer(Box::new(probe.writer()), true));
        }
        for _ in 0..script.extra_operations {
            config.operations_mut().push();
        }

        script.status
    }
}

/// Platform double that records calls.
#[derive(Clone, Debug)]
pub struct RecordingPlatform {
    log: CallLog,
    fail_streams: bool,
}

impl RecordingPlatform {
    /// Creates a platform whose hooks succeed.
    #[must_use]
    pub const fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_streams: false,
        }
    }

    /// Makes the descriptor guard report an error.
    #[must_use]
    pub const fn failing_streams(mut self) -> Self {
        self.fail_streams = true;
        self
    }
}

impl Platform for RecordingPlatform {
    fn ensure_standard_streams(&self) -> io::Result<()> {
        self.log.push(Call::EnsureStandardStreams);
        if self.fail_streams {
            return Err(io::Error::other("out of descriptors"));
        }
        Ok(())
    }

    fn ignore_broken_pipe(&self) -> bool {
        self.log.push(Call::IgnoreBrokenPipe);
        true
    }
}

/// Cleanup hook double that records its run.
#[derive(Clone, Debug)]
pub struct RecordingHook {
    name: String,
    log: CallLog,
    fail: bool,
}

impl RecordingHook {
    /// Creates a hook that succeeds.
    #[must_use]
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_owned(),
            log,
            fail: false,
        }
    }

    /// Makes the hook report a failure after recording its run.
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl CleanupHook for RecordingHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn cleanup(&mut self) -> Result<(), CleanupError> {
        self.log.push(Call::Hook(self.name.clone()));
        if self.fail {
            return Err(CleanupError::new(format!("{} refused to clean up", self.name)));
        }
        Ok(())
    }
}

/// Writer whose contents stay readable through clones.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Observes whether a writer handed out by [`DropProbe::writer`] was closed.
#[derive(Clone, Debug, Default)]
pub struct DropProbe {
    dropped: Rc<Cell<bool>>,
}

impl DropProbe {
    /// Creates a probe whose writer is still open.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A discarding writer that flags the probe when dropped.
    #[must_use]
    pub fn writer(&self) -> ProbeWriter {
        ProbeWriter {
            dropped: Rc::clone(&self.dropped),
        }
    }

    /// Returns `true` once the writer has been dropped.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.dropped.get()
    }
}

/// Writer created by [`DropProbe::writer`].
#[derive(Debug)]
pub struct ProbeWriter {
    dropped: Rc<Cell<bool>>,
}

impl Write for ProbeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ProbeWriter {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Whether the child was meant to inherit stdio.
    pub streamed: bool,
    /// Environment overrides passed with a streamed run.
    pub env: ChildEnv,
}

/// Scripted command runner that returns pre-seeded outcomes in FIFO order.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<Result<CommandOutput, ProcessError>>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a specific exit code with no output.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(Ok(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }));
    }

    /// Pushes a failure to start the program.
    pub fn push_spawn_failure(&self, message: &str) {
        self.responses
            .borrow_mut()
            .push_back(Err(ProcessError::Spawn {
                program: String::from("scripted"),
                message: message.to_owned(),
            }));
    }

    fn next(
        &self,
        program: &str,
        args: &[String],
        env: Option<&ChildEnv>,
    ) -> Result<CommandOutput, ProcessError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            streamed: env.is_some(),
            env: env.cloned().unwrap_or_default(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProcessError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })
            })
    }
}

impl CommandRunner for ScriptedRunner {
    fn capture(&self, program: &str, args: &[String]) -> Result<CommandOutput, ProcessError> {
        self.next(program, args, None)
    }

    fn stream(
        &self,
        program: &str,
        args: &[String],
        env: &ChildEnv,
    ) -> Result<Option<i32>, ProcessError> {
        self.next(program, args, Some(env)).map(|output| output.code)
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    #[must_use]
    pub fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Removes variables while holding the global mutex.
    #[must_use]
    pub fn remove_vars(keys: &[&str]) -> Self {
        let guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut previous = Vec::with_capacity(keys.len());
        for key in keys {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
