//! Optional memory-tracking bootstrap driven by environment variables.

use std::num::NonZeroU64;

/// Names a file that receives the library's allocation trace.
pub const MEMDEBUG_ENV: &str = "CURL_MEMDEBUG";

/// Makes the library fail its Nth allocation, for fault injection.
pub const MEMLIMIT_ENV: &str = "CURL_MEMLIMIT";

/// Longest log file name handed to the library, in bytes.
pub const LOG_FILE_NAME_MAX: usize = 511;

/// Memory-tracking settings requested through the environment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryTracking {
    /// Allocation trace log file.
    pub log_file: Option<String>,
    /// Allocation number at which to inject a failure.
    pub fail_after: Option<NonZeroU64>,
}

impl MemoryTracking {
    /// Reads settings through `lookup`.
    ///
    /// An empty log file name is ignored and long names are truncated to
    /// [`LOG_FILE_NAME_MAX`] bytes. The failure threshold must be a positive
    /// base-10 integer, optionally preceded by whitespace; anything else is
    /// ignored.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_file = lookup(MEMDEBUG_ENV)
            .filter(|name| !name.is_empty())
            .map(|name| truncate_to_boundary(name, LOG_FILE_NAME_MAX));
        let fail_after = lookup(MEMLIMIT_ENV)
            .and_then(|value| value.trim_start().parse::<NonZeroU64>().ok());
        Self {
            log_file,
            fail_after,
        }
    }

    /// Returns `true` when either setting is present.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.log_file.is_some() || self.fail_after.is_some()
    }
}

fn truncate_to_boundary(mut value: String, max: usize) -> String {
    if value.len() <= max {
        return value;
    }
    let mut cut = max;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    value.truncate(cut);
    value
}
