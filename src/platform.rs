//! Process-level setup that has to happen before any socket is opened.

use std::io;

/// Platform hooks run at the start of every native invocation.
pub trait Platform {
    /// Makes sure descriptors 0, 1, and 2 are open so later sockets cannot
    /// land on them.
    ///
    /// # Errors
    ///
    /// Returns the I/O error that stopped the guard; callers treat it as
    /// non-fatal.
    fn ensure_standard_streams(&self) -> io::Result<()>;

    /// Ignores `SIGPIPE` where the platform has it.
    ///
    /// Returns `false` when the policy could not be installed.
    fn ignore_broken_pipe(&self) -> bool;
}

/// The real operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    #[cfg(unix)]
    fn ensure_standard_streams(&self) -> io::Result<()> {
        use std::fs::OpenOptions;
        use std::os::fd::{AsRawFd, IntoRawFd};

        // Opening returns the lowest free descriptor, so any gap in 0..=2 is
        // filled with /dev/null until a descriptor above 2 comes back.
        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open("/dev/null")?;
            if file.as_raw_fd() > 2 {
                return Ok(());
            }
            let _reserved = file.into_raw_fd();
        }
    }

    #[cfg(not(unix))]
    fn ensure_standard_streams(&self) -> io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn ignore_broken_pipe(&self) -> bool {
        // SAFETY: installing SIG_IGN touches no Rust state and is
        // async-signal-safe.
        let previous = unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };
        previous != libc::SIG_ERR
    }

    #[cfg(not(unix))]
    fn ignore_broken_pipe(&self) -> bool {
        false
    }
}
