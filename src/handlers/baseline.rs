//! Baseline sink: the durable local writer
//!
//! Every record that passes a handler's level filter ends up here, either
//! because the baseline is the active handler or because a remote handler
//! writes through its embedded baseline first. Lines are written whole under
//! a lock, so concurrent emits never interleave.

use super::rotating_file::{RotatingFile, RotationPolicy};
use crate::core::{
    Attribute, CloseError, EmitError, FieldValue, Handler, HandlerScope, LineFormat, LogLevel,
    LogRecord, OutputFormat, SetupError, SharedHandler,
};
use parking_lot::Mutex;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

enum SinkTarget {
    Stdout,
    File(RotatingFile),
    /// A file and a console stream; the file is written first
    Tee {
        file: RotatingFile,
        console: Box<dyn Write + Send>,
    },
    Writer(Box<dyn Write + Send>),
    Closed,
}

struct SinkWriter {
    target: SinkTarget,
    label: String,
}

impl SinkWriter {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        match &mut self.target {
            SinkTarget::Stdout => write_stdout(line),
            SinkTarget::File(file) => {
                file.write_line(line)?;
                file.flush()
            }
            SinkTarget::Tee { file, console } => {
                // Both legs are attempted so a broken console never starves the file
                let stored = file.write_line(line).and_then(|()| file.flush());
                let shown = console.write_all(line).and_then(|()| console.flush());
                stored.and(shown)
            }
            SinkTarget::Writer(w) => {
                w.write_all(line)?;
                w.flush()
            }
            SinkTarget::Closed => Err(io::Error::new(io::ErrorKind::NotConnected, "sink closed")),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        let result = match &mut self.target {
            SinkTarget::Stdout => io::stdout().flush(),
            SinkTarget::File(file) => file.flush(),
            SinkTarget::Tee { file, console } => file.flush().and(console.flush()),
            SinkTarget::Writer(w) => w.flush(),
            SinkTarget::Closed => Ok(()),
        };
        // Stdout is never released; everything else drops its descriptor
        if !matches!(self.target, SinkTarget::Stdout) {
            self.target = SinkTarget::Closed;
        }
        result
    }
}

fn write_stdout(line: &[u8]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(line)?;
    out.flush()
}

/// Console and/or file sink, also embedded in every remote handler
///
/// # Examples
///
/// ```
/// use log_fabric::handlers::{BaselineSink, SharedBuffer};
/// use log_fabric::{attr, Handler, LogLevel, LogRecord};
///
/// let buffer = SharedBuffer::new();
/// let sink = BaselineSink::from_writer("memory", buffer.clone(), LogLevel::Info);
/// let scoped = sink.with_attributes(&[attr("service", "orders")]);
///
/// scoped.emit(&LogRecord::new(LogLevel::Info, "started")).unwrap();
/// assert!(buffer.contents().contains("service=orders"));
/// ```
#[derive(Clone)]
pub struct BaselineSink {
    writer: Arc<Mutex<SinkWriter>>,
    level: LogLevel,
    format: LineFormat,
    scope: HandlerScope,
    colored: bool,
}

impl BaselineSink {
    fn with_target(label: impl Into<String>, target: SinkTarget, level: LogLevel) -> Self {
        Self {
            writer: Arc::new(Mutex::new(SinkWriter {
                target,
                label: label.into(),
            })),
            level,
            format: LineFormat::default(),
            scope: HandlerScope::new(),
            colored: false,
        }
    }

    /// Sink writing to standard output
    pub fn stdout(level: LogLevel) -> Self {
        let mut sink = Self::with_target("stdout", SinkTarget::Stdout, level);
        sink.colored = io::stdout().is_terminal();
        sink
    }

    /// Sink appending to a rotating file
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Io`] if the file or its directory cannot be created.
    pub fn file(path: impl AsRef<Path>, policy: RotationPolicy, level: LogLevel) -> Result<Self, SetupError> {
        let file = RotatingFile::open(path.as_ref(), policy)?;
        Ok(Self::with_target(
            path.as_ref().display().to_string(),
            SinkTarget::File(file),
            level,
        ))
    }

    /// Sink writing each line to stdout and to a rotating file
    pub fn file_and_stdout(
        path: impl AsRef<Path>,
        policy: RotationPolicy,
        level: LogLevel,
    ) -> Result<Self, SetupError> {
        Self::file_and_writer(path, policy, io::stdout(), level)
    }

    /// Sink writing each line to a rotating file and to `console`
    pub fn file_and_writer<W>(
        path: impl AsRef<Path>,
        policy: RotationPolicy,
        console: W,
        level: LogLevel,
    ) -> Result<Self, SetupError>
    where
        W: Write + Send + 'static,
    {
        let file = RotatingFile::open(path.as_ref(), policy)?;
        Ok(Self::with_target(
            path.as_ref().display().to_string(),
            SinkTarget::Tee {
                file,
                console: Box::new(console),
            },
            level,
        ))
    }

    /// Sink over an arbitrary byte stream
    pub fn from_writer<W>(label: impl Into<String>, writer: W, level: LogLevel) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::with_target(label, SinkTarget::Writer(Box::new(writer)), level)
    }

    #[must_use]
    pub fn with_format(mut self, format: LineFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output_format(mut self, output: OutputFormat) -> Self {
        self.format.output = output;
        self
    }

    /// Disable terminal colors even when stdout is a terminal
    #[must_use]
    pub fn without_colors(mut self) -> Self {
        self.colored = false;
        self
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn format(&self) -> LineFormat {
        self.format
    }

    pub fn scope(&self) -> &HandlerScope {
        &self.scope
    }

    /// Attributes of `record` as seen through this sink's scope
    pub fn resolve(&self, record: &LogRecord) -> Vec<(String, FieldValue)> {
        self.scope.resolve(record)
    }

    /// Encode `record` into this sink's line format, without trailing newline
    pub fn encode(&self, record: &LogRecord) -> String {
        self.format.encode(record, &self.resolve(record))
    }

    /// Write one pre-encoded line
    pub fn write_line(&self, line: &str) -> Result<(), EmitError> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        let mut writer = self.writer.lock();
        writer
            .write_line(&bytes)
            .map_err(|e| EmitError::write(writer.label.clone(), e))
    }

    /// Derived sink sharing this sink's writer
    pub fn derive_attributes(&self, extra: &[Attribute]) -> Self {
        let mut derived = self.clone();
        derived.scope = self.scope.with_attributes(extra);
        derived
    }

    /// Derived sink sharing this sink's writer
    pub fn derive_group(&self, name: &str) -> Self {
        let mut derived = self.clone();
        derived.scope = self.scope.with_group(name);
        derived
    }
}

impl Handler for BaselineSink {
    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level
    }

    fn emit(&self, record: &LogRecord) -> crate::core::Result<()> {
        let attrs = self.resolve(record);
        let line = if self.colored {
            self.format.encode_colored(record, &attrs)
        } else {
            self.format.encode(record, &attrs)
        };
        self.write_line(&line)
    }

    fn with_attributes(&self, extra: &[Attribute]) -> SharedHandler {
        Arc::new(self.derive_attributes(extra))
    }

    fn with_group(&self, name: &str) -> SharedHandler {
        Arc::new(self.derive_group(name))
    }

    fn close(&self) -> Result<(), CloseError> {
        let mut writer = self.writer.lock();
        let label = writer.label.clone();
        writer.close().map_err(|e| CloseError::flush(label, e))
    }

    fn name(&self) -> &str {
        "baseline"
    }
}

/// In-memory writer shared between clones
///
/// Useful for tests and for capturing output of a sink in-process.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(String::from).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
