//! Translation of legacy `scp`/`sftp` invocations into native curl syntax.
//!
//! When the tool is started under a legacy name the argument vector uses
//! `scp`'s positional `[user@]host:path` endpoints. This module rewrites such a
//! vector into the equivalent URL-based curl command line before any transfer
//! logic runs. Translation is a pure function of the argument vector, apart
//! from probing whether a download destination is an existing directory.

use std::fmt;

use camino::Utf8Path;
use shell_escape::unix::escape;
use thiserror::Error;

mod endpoint;

pub use endpoint::RemoteEndpoint;

/// Program name placed at the front of every translated vector.
pub const NATIVE_PROGRAM: &str = "curl";

const LEGACY_QUIET_FLAG: &str = "-q";
const NATIVE_SILENT_FLAG: &str = "-s";
const UPLOAD_FLAG: &str = "-T";
const OUTPUT_FLAG: &str = "-o";
const REMOTE_NAME_FLAG: &str = "-O";
const CURRENT_DIRECTORY: &str = ".";

/// Program names that trigger legacy argument translation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LegacyAlias {
    /// Invoked as `scp`.
    Scp,
    /// Invoked as `sftp`.
    Sftp,
}

impl LegacyAlias {
    /// Recognises a legacy alias by exact, case-sensitive comparison.
    #[must_use]
    pub fn from_program_name(name: &str) -> Option<Self> {
        match name {
            "scp" => Some(Self::Scp),
            "sftp" => Some(Self::Sftp),
            _ => None,
        }
    }

    /// The alias as typed by the user.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scp => "scp",
            Self::Sftp => "sftp",
        }
    }

    /// URL scheme used for remote endpoints; identical to the alias name.
    #[must_use]
    pub const fn protocol(self) -> &'static str {
        self.name()
    }
}

impl fmt::Display for LegacyAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while translating a legacy invocation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TranslateError {
    /// The invocation lacks a remote endpoint, a local endpoint, or both.
    #[error(
        "Usage:\t{alias} [-q] [user@]host:distantFile localFile\n\t{alias} [-q] localFile [user@]host:distantFile "
    )]
    Usage {
        /// Alias the tool was invoked as.
        alias: LegacyAlias,
    },
}

/// Answers whether a local path names an existing directory.
pub trait DirectoryProbe {
    /// Returns `true` when `path` exists and is a directory.
    fn is_dir(&self, path: &str) -> bool;
}

/// Probe backed by filesystem metadata (symlinks are followed).
#[derive(Clone, Copy, Debug, Default)]
pub struct FsProbe;

impl DirectoryProbe for FsProbe {
    fn is_dir(&self, path: &str) -> bool {
        Utf8Path::new(path).is_dir()
    }
}

/// Argument vector in native syntax, always led by [`NATIVE_PROGRAM`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NativeArgs {
    args: Vec<String>,
}

impl NativeArgs {
    /// All arguments including the program name.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    /// Number of arguments including the program name.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.args.len()
    }

    /// Always `false`; the program name is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Consumes the wrapper and returns the owned vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.args
    }

    /// Renders the vector as a shell-escaped command line.
    #[must_use]
    pub fn command_line(&self) -> String {
        render_command_line(&self.args)
    }
}

/// Joins `args` with spaces, shell-escaping each one.
#[must_use]
pub fn render_command_line(args: &[String]) -> String {
    let mut result = String::new();
    let mut first = true;

    for arg in args {
        if first {
            first = false;
        } else {
            result.push(' ');
        }

        let escaped = escape(arg.as_str().into());
        result.push_str(escaped.as_ref());
    }

    result
}

/// Translates `args` when `args[0]` is a legacy alias.
///
/// Returns `Ok(None)` for native invocations, which callers run unchanged.
///
/// # Errors
///
/// Returns [`TranslateError::Usage`] when a legacy invocation lacks either a
/// remote or a local endpoint.
pub fn translate_invocation<P: DirectoryProbe>(
    args: &[String],
    probe: &P,
) -> Result<Option<NativeArgs>, TranslateError> {
    let Some(alias) = args
        .first()
        .and_then(|program| LegacyAlias::from_program_name(program))
    else {
        return Ok(None);
    };
    translate(alias, args.get(1..).unwrap_or_default(), probe).map(Some)
}

/// Rewrites the legacy operands `operands` (everything after the program
/// name) into a native argument vector.
///
/// # Errors
///
/// Returns [`TranslateError::Usage`] unless both a remote and a local
/// endpoint were found.
pub fn translate<P: DirectoryProbe>(
    alias: LegacyAlias,
    operands: &[String],
    probe: &P,
) -> Result<NativeArgs, TranslateError> {
    let mut scan = Scan::new(alias, operands.len());
    for token in operands {
        scan.push(token, probe);
    }
    scan.finish()
}

struct Scan<'a> {
    alias: LegacyAlias,
    args: Vec<String>,
    remote_basename: Option<&'a str>,
    saw_local: bool,
}

impl<'a> Scan<'a> {
    fn new(alias: LegacyAlias, operand_count: usize) -> Self {
        // Program name, every operand, and one inserted flag.
        let mut args = Vec::with_capacity(operand_count + 2);
        args.push(NATIVE_PROGRAM.to_owned());
        Self {
            alias,
            args,
            remote_basename: None,
            saw_local: false,
        }
    }

    const fn endpoints_complete(&self) -> bool {
        self.remote_basename.is_some() && self.saw_local
    }

    fn push<P: DirectoryProbe>(&mut self, token: &'a str, probe: &P) {
        if token.starts_with('-') || self.endpoints_complete() {
            self.push_verbatim(token);
        } else if let Some(remote) = RemoteEndpoint::parse(token) {
            self.args.push(remote.to_url(self.alias.protocol()));
            self.remote_basename = Some(remote.basename());
        } else {
            self.push_local(token, probe);
        }
    }

    fn push_verbatim(&mut self, token: &str) {
        if token == LEGACY_QUIET_FLAG {
            self.args.push(NATIVE_SILENT_FLAG.to_owned());
        } else {
            self.args.push(token.to_owned());
        }
    }

    fn push_local<P: DirectoryProbe>(&mut self, token: &str, probe: &P) {
        self.saw_local = true;
        let Some(basename) = self.remote_basename else {
            self.args.push(UPLOAD_FLAG.to_owned());
            self.args.push(token.to_owned());
            return;
        };

        if token == CURRENT_DIRECTORY {
            self.args.push(REMOTE_NAME_FLAG.to_owned());
            return;
        }

        self.args.push(OUTPUT_FLAG.to_owned());
        self.args.push(download_target(token, basename, probe));
    }

    fn finish(self) -> Result<NativeArgs, TranslateError> {
        if !self.endpoints_complete() {
            return Err(TranslateError::Usage { alias: self.alias });
        }
        Ok(NativeArgs { args: self.args })
    }
}

fn download_target<P: DirectoryProbe>(local: &str, basename: &str, probe: &P) -> String {
    if local.ends_with('/') {
        format!("{local}{basename}")
    } else if probe.is_dir(local) {
        format!("{local}/{basename}")
    } else {
        local.to_owned()
    }
}
