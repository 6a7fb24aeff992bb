//! Command-line interface definitions for the `curlshim-translate` binary.
//!
//! This module centralises the clap parser structures so both the binary and
//! the build script can reuse them when generating the manual page.

use clap::{Parser, ValueEnum};

/// Top-level CLI for the `curlshim-translate` binary.
#[derive(Debug, Parser)]
#[command(
    name = "curlshim-translate",
    about = "Show the curl command a legacy scp or sftp invocation runs",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Legacy program name to translate the operands as.
    #[arg(long = "as", value_enum, value_name = "NAME", default_value_t = LegacyName::Scp)]
    pub(crate) alias: LegacyName,
    /// Print one argument per line instead of a shell-escaped command line.
    #[arg(long)]
    pub(crate) lines: bool,
    /// Legacy operands, for example `user@host:report.pdf .` (use -- before
    /// flags such as -q).
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub(crate) operands: Vec<String>,
}

/// Legacy program names accepted by `--as`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum LegacyName {
    /// Secure copy.
    Scp,
    /// SSH file transfer.
    Sftp,
}
