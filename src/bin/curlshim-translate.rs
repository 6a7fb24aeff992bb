//! Dry-run tool printing the curl command a legacy invocation maps to.
//!
//! No transfer runs and no library state is touched; only the download
//! destination is probed to decide whether it names a directory.

use std::io::{self, Write};
use std::process;

use clap::Parser;

use curlshim::translate::{self, FsProbe, LegacyAlias};
use curlshim::USAGE_ERROR;

#[path = "../cli/mod.rs"]
mod cli;

use cli::{Cli, LegacyName};

fn main() {
    let cli = Cli::parse();
    let code = execute(&cli, &mut io::stdout(), &mut io::stderr());
    process::exit(code);
}

const fn alias_for(name: LegacyName) -> LegacyAlias {
    match name {
        LegacyName::Scp => LegacyAlias::Scp,
        LegacyName::Sftp => LegacyAlias::Sftp,
    }
}

fn execute(cli: &Cli, out: &mut impl Write, err: &mut impl Write) -> i32 {
    let alias = alias_for(cli.alias);
    match translate::translate(alias, &cli.operands, &FsProbe) {
        Ok(native) => {
            let written = if cli.lines {
                native
                    .as_slice()
                    .iter()
                    .try_for_each(|arg| writeln!(out, "{arg}"))
            } else {
                writeln!(out, "{}", native.command_line())
            };
            if written.is_err() {
                return 1;
            }
            0
        }
        Err(usage) => {
            writeln!(err, "{usage}").ok();
            USAGE_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("curlshim-translate").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    fn run(args: &[&str]) -> (i32, String, String) {
        let cli = parse(args);
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = execute(&cli, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).expect("utf8 stdout"),
            String::from_utf8(err).expect("utf8 stderr"),
        )
    }

    #[test]
    fn prints_escaped_command_line() {
        let (code, out, err) = run(&["--", "-q", "user@host:/a/b/file.txt", "."]);

        assert_eq!(code, 0);
        assert!(out.starts_with("curl -s "), "stdout: {out}");
        assert!(out.contains("scp://user@host//a/b/file.txt"), "stdout: {out}");
        assert!(out.ends_with(" -O\n"), "stdout: {out}");
        assert!(err.is_empty());
    }

    #[test]
    fn prints_one_argument_per_line() {
        let (code, out, _) = run(&["--as", "sftp", "--lines", "user@host:/path/file", "out.bin"]);

        assert_eq!(code, 0);
        assert_eq!(out, "curl\nsftp://user@host//path/file\n-o\nout.bin\n");
    }

    #[test]
    fn usage_error_names_the_alias() {
        let (code, out, err) = run(&["--as", "sftp", "local-only.txt"]);

        assert_eq!(code, USAGE_ERROR);
        assert!(out.is_empty());
        assert!(err.starts_with("Usage:\tsftp [-q]"), "stderr: {err}");
    }

    #[test]
    fn missing_operands_are_rejected_by_parser() {
        assert!(Cli::try_parse_from(["curlshim-translate"]).is_err());
    }
}
