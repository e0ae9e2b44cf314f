//! Named log sinks sharing one append-only log file.
//!
//! Every line is `<name>: <LEVEL>: <message>`, written to stderr and appended
//! to the shared file. The first failed append process-wide trips a one-shot
//! latch and invokes the fatal hook; later failures are only retried, never
//! escalated again.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::LogLevel;

type FatalHook = Box<dyn Fn(&io::Error) + Send + Sync>;

struct Shared {
    path: RwLock<PathBuf>,
    fatal: AtomicBool,
    on_fatal: Option<FatalHook>,
}

/// Handle to the shared log file. Cheap to clone; all clones see the same
/// path and the same fatal latch.
#[derive(Clone)]
pub struct LogFile {
    shared: Arc<Shared>,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::build(path.into(), None)
    }

    /// Like [`LogFile::new`], with `hook` run once on the first failed append.
    pub fn with_fatal_hook(
        path: impl Into<PathBuf>,
        hook: impl Fn(&io::Error) + Send + Sync + 'static,
    ) -> Self {
        Self::build(path.into(), Some(Box::new(hook)))
    }

    fn build(path: PathBuf, on_fatal: Option<FatalHook>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: RwLock::new(path),
                fatal: AtomicBool::new(false),
                on_fatal,
            }),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.shared
            .path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point every sink at a new file (used when a reload changes `general.log`).
    pub fn set_path(&self, path: impl Into<PathBuf>) {
        *self
            .shared
            .path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = path.into();
    }

    /// Whether a write failure has already been escalated.
    pub fn is_fatal(&self) -> bool {
        self.shared.fatal.load(Ordering::SeqCst)
    }

    /// A sink that prefixes every line with `name`.
    pub fn sink(&self, name: impl fmt::Display) -> LogSink {
        LogSink {
            name: Arc::from(name.to_string()),
            file: self.clone(),
        }
    }

    fn write_line(&self, line: &str) {
        eprintln!("{line}");
        if let Err(err) = append_line(&self.path(), line) {
            self.escalate(err);
        }
    }

    fn escalate(&self, err: io::Error) {
        if self.shared.fatal.swap(true, Ordering::SeqCst) {
            return;
        }
        eprintln!("FATAL: Failed to write to log file!!");
        eprintln!("{err}");
        if let Some(hook) = &self.shared.on_fatal {
            hook(&err);
        }
    }
}

impl fmt::Debug for LogFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogFile")
            .field("path", &self.path())
            .field("fatal", &self.is_fatal())
            .finish()
    }
}

/// A log writer bound to one subsystem name.
#[derive(Clone, Debug)]
pub struct LogSink {
    name: Arc<str>,
    file: LogFile,
}

impl LogSink {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        self.file.write_line(&format_line(&self.name, level, message));
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, message);
    }
}

/// `<name>: <LEVEL>: <message>`
pub fn format_line(name: &str, level: LogLevel, message: impl fmt::Display) -> String {
    format!("{name}: {level}: {message}")
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[test]
    fn lines_are_appended_in_order_with_level_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.log");
        let log = LogFile::new(&path);
        let sink = log.sink("x");

        sink.info("a");
        sink.error("b");

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "x: INFO: a\nx: ERROR: b\n");
    }

    #[test]
    fn warning_label_is_spelled_out() {
        assert_eq!(
            format_line("dedaemon", LogLevel::Warning, "careful"),
            "dedaemon: WARNING: careful"
        );
    }

    #[test]
    fn sinks_follow_path_changes() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.log");
        let second = dir.path().join("second.log");
        let log = LogFile::new(&first);
        let sink = log.sink("display");

        sink.info("one");
        log.set_path(&second);
        sink.info("two");

        assert_eq!(fs::read_to_string(&first).unwrap(), "display: INFO: one\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "display: INFO: two\n");
    }

    #[test]
    fn first_write_failure_fires_hook_exactly_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("t.log");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let log = LogFile::with_fatal_hook(&path, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let a = log.sink("a");
        let b = log.sink("b");
        a.info("first");
        b.error("second");
        a.warn("third");

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(log.is_fatal());
    }
}
