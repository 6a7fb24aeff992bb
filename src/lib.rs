//! Core library for the curlshim transfer front end.
//!
//! The crate translates legacy `scp`/`sftp` invocations into native curl
//! syntax and sequences the process lifecycle around a transfer engine
//! (bootstrap → delegate → teardown), with process-backed collaborators
//! that drive an external `curl` executable.

pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod platform;
pub mod process;
pub mod record;
pub mod test_support;
pub mod translate;

pub use config::{ConfigError, ShimConfig};
pub use lifecycle::{
    BootstrapError, CleanupError, CleanupHook, FAILED_INIT, Lifecycle, MemoryTracking,
    TransferEngine, TransferLibrary, USAGE_ERROR,
};
pub use platform::{HostPlatform, Platform};
pub use process::{
    CommandOutput, CommandRunner, ProcessCommandRunner, ProcessEngine, ProcessError,
    ProcessLibrary, ProcessSession,
};
pub use record::{GlobalConfig, LogStream, OperationConfig, OperationId, VersionInfo};
pub use translate::{
    DirectoryProbe, FsProbe, LegacyAlias, NATIVE_PROGRAM, NativeArgs, TranslateError,
    translate_invocation,
};
