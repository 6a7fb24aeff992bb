//! Process bootstrap, delegation to the transfer engine, and teardown.
//!
//! The [`Lifecycle`] sequencer owns every piece of process-wide transfer
//! state. A run translates legacy `scp`/`sftp` invocations first, prepares
//! the process (standard descriptors, `SIGPIPE`, optional memory tracking),
//! builds the [`GlobalConfig`] record and initialises the transfer library.
//! It then lends the record to the engine and finally tears everything down
//! in reverse order. Any bootstrap step that fails unwinds the steps before
//! it and skips the transfer entirely.

use std::collections::TryReserveError;
use std::io::{self, Write};

use thiserror::Error;
use tracing::{debug, warn};

use crate::platform::{HostPlatform, Platform};
use crate::record::{GlobalConfig, VersionInfo};
use crate::translate::{FsProbe, NATIVE_PROGRAM, translate_invocation};

mod diagnostics;

pub use diagnostics::{LOG_FILE_NAME_MAX, MEMDEBUG_ENV, MEMLIMIT_ENV, MemoryTracking};

/// Exit status for any failure before the engine runs.
pub const FAILED_INIT: i32 = 2;

/// Exit status for a legacy invocation missing an endpoint.
pub const USAGE_ERROR: i32 = 255;

/// Process-wide transfer library primitives.
pub trait TransferLibrary {
    /// Session handle shared by transfers.
    type Session;
    /// Failure reported by the library.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Applies memory-tracking settings before initialisation.
    fn enable_memory_tracking(&mut self, _settings: &MemoryTracking) {}

    /// Initialises the library for the whole process.
    ///
    /// # Errors
    ///
    /// Returns the library's error when initialisation fails.
    fn global_init(&mut self) -> Result<(), Self::Error>;

    /// Reports the library's version and capabilities.
    ///
    /// # Errors
    ///
    /// Returns the library's error when the details cannot be retrieved.
    fn version_info(&mut self) -> Result<VersionInfo, Self::Error>;

    /// Creates the session handle used by the default operation.
    ///
    /// # Errors
    ///
    /// Returns the library's error when no handle can be created.
    fn new_session(&mut self) -> Result<Self::Session, Self::Error>;

    /// Releases a session handle.
    fn close_session(&mut self, session: Self::Session);

    /// Shuts the library down for the whole process.
    fn global_cleanup(&mut self);

    /// Returns `true` when an optional security backend holds process-wide
    /// resources that need an explicit release.
    fn security_backend_active(&self) -> bool {
        false
    }

    /// Releases the security backend's process-wide resources.
    fn release_security_backend(&mut self) {}
}

/// The transfer engine that runs configured transfers.
pub trait TransferEngine<S> {
    /// Runs the transfers described by `args` and returns the exit status.
    fn operate(&mut self, config: &mut GlobalConfig<S>, args: &[String]) -> i32;
}

/// Failure reported by a [`CleanupHook`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct CleanupError {
    message: String,
}

impl CleanupError {
    /// Wraps a human-readable failure description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Subsystem cleanup run after the library has shut down.
pub trait CleanupHook {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Releases the subsystem's process-wide state.
    ///
    /// # Errors
    ///
    /// Returns [`CleanupError`]; teardown logs it and carries on.
    fn cleanup(&mut self) -> Result<(), CleanupError>;
}

/// Errors raised while bootstrapping process-wide state.
#[derive(Debug, Error)]
pub enum BootstrapError<LibraryError>
where
    LibraryError: std::error::Error + 'static,
{
    /// The default operation could not be allocated.
    #[error("error initializing transfer configuration: {0}")]
    Allocation(#[source] TryReserveError),
    /// Library initialisation failed.
    #[error("error initializing transfer library: {0}")]
    LibraryInit(#[source] LibraryError),
    /// Library version details could not be retrieved.
    #[error("error retrieving transfer library information: {0}")]
    LibraryInfo(#[source] LibraryError),
    /// No session handle could be created.
    #[error("error initializing transfer session handle: {0}")]
    Session(#[source] LibraryError),
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Sequences bootstrap, delegation, and teardown for one process.
pub struct Lifecycle<L, E, P = HostPlatform> {
    library: L,
    engine: E,
    platform: P,
    hooks: Vec<Box<dyn CleanupHook>>,
    error_output: Box<dyn Write>,
    env_lookup: EnvLookup,
}

impl<L, E> Lifecycle<L, E, HostPlatform>
where
    L: TransferLibrary,
    E: TransferEngine<L::Session>,
{
    /// Creates a sequencer for the host platform, reporting to stderr.
    #[must_use]
    pub fn new(library: L, engine: E) -> Self {
        Self::with_platform(library, engine, HostPlatform)
    }
}

impl<L, E, P> Lifecycle<L, E, P>
where
    L: TransferLibrary,
    E: TransferEngine<L::Session>,
    P: Platform,
{
    /// Creates a sequencer with an explicit platform implementation.
    #[must_use]
    pub fn with_platform(library: L, engine: E, platform: P) -> Self {
        Self {
            library,
            engine,
            platform,
            hooks: Vec::new(),
            error_output: Box::new(io::stderr()),
            env_lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Registers a subsystem cleanup, run in registration order.
    #[must_use]
    pub fn with_cleanup_hook(mut self, hook: impl CleanupHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Redirects usage and bootstrap messages.
    #[must_use]
    pub fn with_error_output(mut self, output: impl Write + 'static) -> Self {
        self.error_output = Box::new(output);
        self
    }

    /// Replaces the environment lookup used for memory-tracking settings.
    #[must_use]
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.env_lookup = Box::new(lookup);
        self
    }

    /// The transfer library.
    #[must_use]
    pub const fn library(&self) -> &L {
        &self.library
    }

    /// The transfer engine.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Runs one invocation and returns the process exit status.
    ///
    /// Legacy invocations are translated and re-run in native form. Usage
    /// errors return [`USAGE_ERROR`] without touching the library; bootstrap
    /// failures return [`FAILED_INIT`]. Otherwise the engine's status is
    /// returned unchanged, after a full teardown.
    pub fn run(&mut self, args: &[String]) -> i32 {
        match translate_invocation(args, &FsProbe) {
            Ok(Some(native)) => {
                debug!(command = %native.command_line(), "translated legacy invocation");
                return self.run(native.as_slice());
            }
            Ok(None) => {}
            Err(err) => {
                writeln!(self.error_output, "{err}").ok();
                return USAGE_ERROR;
            }
        }

        self.prepare_process();

        let mut record = match self.bootstrap() {
            Ok(record) => record,
            Err(err) => {
                writeln!(self.error_output, "{NATIVE_PROGRAM}: {err}").ok();
                return FAILED_INIT;
            }
        };

        let status = self.engine.operate(&mut record, args);
        debug!(status, "transfer engine finished");

        self.teardown(&mut record);
        status
    }

    /// Builds the configuration record and initialises the library.
    ///
    /// On failure every completed step is undone: the default operation is
    /// freed and, once the library is initialised, it is shut down again.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] naming the step that failed.
    pub fn bootstrap(&mut self) -> Result<GlobalConfig<L::Session>, BootstrapError<L::Error>> {
        let mut record = GlobalConfig::new().map_err(BootstrapError::Allocation)?;

        if let Err(err) = self.library.global_init() {
            record.release_operations();
            return Err(BootstrapError::LibraryInit(err));
        }

        let version = match self.library.version_info() {
            Ok(version) => version,
            Err(err) => {
                self.unwind_initialised(&mut record);
                return Err(BootstrapError::LibraryInfo(err));
            }
        };
        debug!(version = %version.version, "transfer library initialised");
        record.set_version(version);

        let session = match self.library.new_session() {
            Ok(session) => session,
            Err(err) => {
                self.unwind_initialised(&mut record);
                return Err(BootstrapError::Session(err));
            }
        };
        record.attach_session(session);

        Ok(record)
    }

    /// Releases everything [`Lifecycle::bootstrap`] and the engine acquired.
    ///
    /// The session goes first, then the library, then subsystem hooks and
    /// the security backend, then the record's own fields and operations.
    pub fn teardown(&mut self, record: &mut GlobalConfig<L::Session>) {
        if let Some(session) = record.take_session() {
            self.library.close_session(session);
        }

        self.library.global_cleanup();

        for hook in &mut self.hooks {
            if let Err(err) = hook.cleanup() {
                warn!(hook = hook.name(), error = %err, "cleanup hook failed");
            }
        }

        if self.library.security_backend_active() {
            self.library.release_security_backend();
        }

        record.free_fields();
        record.release_operations();
    }

    fn prepare_process(&mut self) {
        if let Err(err) = self.platform.ensure_standard_streams() {
            warn!(error = %err, "could not reserve standard descriptors");
        }

        if !self.platform.ignore_broken_pipe() {
            debug!("broken pipe signal left at its default disposition");
        }

        let tracking = MemoryTracking::from_lookup(&self.env_lookup);
        if tracking.is_enabled() {
            debug!(?tracking, "enabling memory tracking");
            self.library.enable_memory_tracking(&tracking);
        }
    }

    fn unwind_initialised(&mut self, record: &mut GlobalConfig<L::Session>) {
        self.library.global_cleanup();
        record.free_fields();
        record.release_operations();
    }
}

#[cfg(test)]
mod tests;
