//! The process-wide configuration record handed to the transfer engine.
//!
//! A [`GlobalConfig`] is built once per process by the lifecycle sequencer,
//! lent mutably to the engine for the duration of the transfer, and torn down
//! field by field afterwards. It owns an append-only list of operation
//! configurations (one per transfer job) whose first entry is created during
//! bootstrap and bound to the shared library session.

use std::collections::TryReserveError;

use camino::Utf8PathBuf;

mod stream;

pub use stream::LogStream;

/// Whether error messages are shown.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ShowErrors {
    /// Not set on the command line; errors are shown unless silenced.
    #[default]
    Default,
    /// Errors suppressed.
    Hide,
    /// Errors shown even in silent mode.
    Force,
}

/// Kind of protocol trace requested by the engine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TraceMode {
    /// No tracing.
    #[default]
    Off,
    /// Hex dump of all traffic.
    Binary,
    /// Text dump of all traffic.
    Ascii,
}

/// Version and capability details reported by the transfer library.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VersionInfo {
    /// First line of the library's version report.
    pub banner: String,
    /// Version string, for example `8.5.0`.
    pub version: String,
    /// Protocols the library supports.
    pub protocols: Vec<String>,
    /// Optional features compiled into the library.
    pub features: Vec<String>,
}

impl VersionInfo {
    /// Returns `true` when `protocol` appears in the supported list.
    #[must_use]
    pub fn supports_protocol(&self, protocol: &str) -> bool {
        self.protocols.iter().any(|known| known == protocol)
    }
}

/// Stable index of an operation configuration within its list.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OperationId(usize);

impl OperationId {
    /// Position of the operation in the list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Settings for one transfer job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationConfig {
    id: OperationId,
    session_bound: bool,
    /// URLs the engine assigned to this job.
    pub urls: Vec<String>,
}

impl OperationConfig {
    const fn new(id: OperationId) -> Self {
        Self {
            id,
            session_bound: false,
            urls: Vec::new(),
        }
    }

    /// Identifier of this operation within the record.
    #[must_use]
    pub const fn id(&self) -> OperationId {
        self.id
    }

    /// Returns `true` when the operation uses the record's shared session.
    #[must_use]
    pub const fn is_session_bound(&self) -> bool {
        self.session_bound
    }
}

/// Append-only, index-stable list of operation configurations.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OperationList {
    items: Vec<OperationConfig>,
}

impl OperationList {
    /// Builds a list holding the single default operation.
    ///
    /// # Errors
    ///
    /// Returns [`TryReserveError`] when the allocation for the first entry
    /// fails.
    pub fn with_default() -> Result<Self, TryReserveError> {
        let mut items = Vec::new();
        items.try_reserve_exact(1)?;
        items.push(OperationConfig::new(OperationId(0)));
        Ok(Self { items })
    }

    /// Appends a fresh operation and returns its identifier.
    pub fn push(&mut self) -> OperationId {
        let id = OperationId(self.items.len());
        self.items.push(OperationConfig::new(id));
        id
    }

    /// The first operation, if the list is populated.
    #[must_use]
    pub fn first(&self) -> Option<&OperationConfig> {
        self.items.first()
    }

    /// The most recently appended operation.
    #[must_use]
    pub fn last(&self) -> Option<&OperationConfig> {
        self.items.last()
    }

    /// Looks up an operation by identifier.
    #[must_use]
    pub fn get(&self, id: OperationId) -> Option<&OperationConfig> {
        self.items.get(id.0)
    }

    /// Mutable access to an operation by identifier.
    pub fn get_mut(&mut self, id: OperationId) -> Option<&mut OperationConfig> {
        self.items.get_mut(id.0)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &OperationConfig> {
        self.items.iter()
    }

    /// Number of operations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` once the list has been released.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Frees every operation, leaving both anchors empty.
    pub fn release(&mut self) {
        self.items = Vec::new();
    }

    fn bind_first_to_session(&mut self) {
        if let Some(first) = self.items.first_mut() {
            first.session_bound = true;
        }
    }
}

/// Process-wide state shared with the transfer engine.
///
/// `S` is the library's session handle type.
#[derive(Debug)]
pub struct GlobalConfig<S> {
    errors: Option<LogStream>,
    /// Error display preference.
    pub show_errors: ShowErrors,
    /// Requested protocol trace.
    pub trace: TraceMode,
    trace_stream: Option<LogStream>,
    trace_dump: Option<Utf8PathBuf>,
    version: Option<VersionInfo>,
    session: Option<S>,
    operations: OperationList,
}

impl<S> GlobalConfig<S> {
    /// Creates a record with default settings and one default operation.
    ///
    /// Errors go to stderr and error display is left at its default.
    ///
    /// # Errors
    ///
    /// Returns [`TryReserveError`] when the first operation cannot be
    /// allocated; no record is produced in that case.
    pub fn new() -> Result<Self, TryReserveError> {
        let operations = OperationList::with_default()?;
        Ok(Self {
            errors: Some(LogStream::stderr()),
            show_errors: ShowErrors::Default,
            trace: TraceMode::Off,
            trace_stream: None,
            trace_dump: None,
            version: None,
            session: None,
            operations,
        })
    }

    /// Stream used for error reporting, if still attached.
    pub fn errors_mut(&mut self) -> Option<&mut LogStream> {
        self.errors.as_mut()
    }

    /// Replaces the error stream, closing the previous one.
    pub fn set_errors(&mut self, stream: LogStream) {
        if let Some(previous) = self.errors.replace(stream) {
            previous.close();
        }
    }

    /// Returns `true` when the error stream was opened by the record.
    #[must_use]
    pub fn errors_owned(&self) -> bool {
        self.errors.as_ref().is_some_and(LogStream::is_owned)
    }

    /// Stream receiving protocol traces, if any.
    pub fn trace_stream_mut(&mut self) -> Option<&mut LogStream> {
        self.trace_stream.as_mut()
    }

    /// Attaches a trace stream, closing any previous one.
    pub fn set_trace_stream(&mut self, stream: LogStream) {
        if let Some(previous) = self.trace_stream.replace(stream) {
            previous.close();
        }
    }

    /// Path the trace is dumped to.
    #[must_use]
    pub const fn trace_dump(&self) -> Option<&Utf8PathBuf> {
        self.trace_dump.as_ref()
    }

    /// Records the trace dump target.
    pub fn set_trace_dump(&mut self, path: Utf8PathBuf) {
        self.trace_dump = Some(path);
    }

    /// Library version details captured at bootstrap.
    #[must_use]
    pub const fn version(&self) -> Option<&VersionInfo> {
        self.version.as_ref()
    }

    /// Stores the library version details.
    pub fn set_version(&mut self, version: VersionInfo) {
        self.version = Some(version);
    }

    /// Shared library session, present between bootstrap and teardown.
    pub fn session_mut(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }

    /// Returns `true` while a session is attached.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Attaches the shared session and binds the default operation to it.
    pub fn attach_session(&mut self, session: S) {
        self.session = Some(session);
        self.operations.bind_first_to_session();
    }

    /// Detaches the shared session so the library can release it.
    pub fn take_session(&mut self) -> Option<S> {
        self.session.take()
    }

    /// The operation list.
    #[must_use]
    pub const fn operations(&self) -> &OperationList {
        &self.operations
    }

    /// Mutable access to the operation list.
    pub fn operations_mut(&mut self) -> &mut OperationList {
        &mut self.operations
    }

    /// Releases scalar fields, closing only the streams the record opened.
    pub fn free_fields(&mut self) {
        self.trace_dump = None;

        if let Some(errors) = self.errors.take() {
            errors.close();
        }

        if let Some(trace_stream) = self.trace_stream.take() {
            trace_stream.close();
        }

        self.version = None;
    }

    /// Frees every operation configuration.
    pub fn release_operations(&mut self) {
        self.operations.release();
    }
}
