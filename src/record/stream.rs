//! Output streams held by the configuration record.

use std::fmt;
use std::io::{self, Write};

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};

/// A writable stream plus a note of whether the record opened it.
///
/// Streams the record opened itself (log files) are closed at teardown.
/// Borrowed streams such as the process stderr are only detached.
pub struct LogStream {
    sink: Box<dyn Write>,
    owned: bool,
}

impl LogStream {
    /// Borrows the process standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            sink: Box::new(io::stderr()),
            owned: false,
        }
    }

    /// Creates (or truncates) `path` and takes ownership of the handle.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the parent directory cannot be
    /// opened or the file cannot be created.
    pub fn open(path: &Utf8Path) -> io::Result<Self> {
        let (dir_path, file_name) = split_parent(path)?;
        let dir = Dir::open_ambient_dir(dir_path, ambient_authority())?;
        let file = dir.create(file_name)?;
        Ok(Self {
            sink: Box::new(file.into_std()),
            owned: true,
        })
    }

    /// Wraps an arbitrary writer, recording whether the record owns it.
    #[must_use]
    pub const fn from_writer(sink: Box<dyn Write>, owned: bool) -> Self {
        Self { sink, owned }
    }

    /// Returns `true` when the record opened this stream.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        self.owned
    }

    /// Flushes and releases the stream.
    ///
    /// Owned handles are dropped, which closes them. Flush failures are
    /// ignored because the stream is going away regardless.
    pub fn close(mut self) {
        self.sink.flush().ok();
        drop(self.sink);
    }
}

impl Write for LogStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl fmt::Debug for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStream")
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

fn split_parent(path: &Utf8Path) -> io::Result<(&Utf8Path, &str)> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {path}"),
        )
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    Ok((parent, file_name))
}
