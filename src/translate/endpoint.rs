//! Parsing of legacy `[user@]host:path` tokens.

/// A remote endpoint written in legacy `[user@]host:path` form.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RemoteEndpoint<'a> {
    host_spec: &'a str,
    path: &'a str,
}

impl<'a> RemoteEndpoint<'a> {
    /// Splits `token` at its first `:`.
    ///
    /// Returns `None` when the token has no `:`. Later colons stay in the
    /// remote path untouched.
    #[must_use]
    pub fn parse(token: &'a str) -> Option<Self> {
        let (host_spec, path) = token.split_once(':')?;
        Some(Self { host_spec, path })
    }

    /// Text before the first `:`, usually `user@host`.
    #[must_use]
    pub const fn host_spec(&self) -> &'a str {
        self.host_spec
    }

    /// Remote path exactly as written after the first `:`.
    #[must_use]
    pub const fn path(&self) -> &'a str {
        self.path
    }

    /// Final path component, used to name downloaded files.
    ///
    /// Empty when the remote path ends with `/`.
    #[must_use]
    pub fn basename(&self) -> &'a str {
        self.path
            .rsplit_once('/')
            .map_or(self.path, |(_, name)| name)
    }

    /// Renders the endpoint as a native URL for `protocol`.
    ///
    /// The remote path is appended after a `/`, so absolute remote paths
    /// produce a double slash (`scp://host//abs/path`).
    #[must_use]
    pub fn to_url(&self, protocol: &str) -> String {
        format!("{protocol}://{}/{}", self.host_spec, self.path)
    }
}
