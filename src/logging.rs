//! Logger handle passed into every component at construction.
//!
//! Components log through a [`Logger`] they were given instead of the global `log` macros, so a
//! test can hand a client its own sink and inspect what was written without touching process
//! state. The default sink forwards to whatever `log` implementation the binary installed
//! (`env_logger` in `qc_local_server`).
use std::fmt;
use std::sync::{Arc, Mutex};

use log::{Level, Log, Metadata, Record};

#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Log>,
    target: &'static str,
}

impl Logger {
    pub fn new(sink: Arc<dyn Log>) -> Self {
        Self {
            sink,
            target: "qcapi",
        }
    }

    /// Same sink, different target. Each component tags its records with its own module path.
    pub fn with_target(&self, target: &'static str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            target,
        }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(self.target).build();
        if self.sink.enabled(&metadata) {
            self.sink.log(
                &Record::builder()
                    .metadata(metadata)
                    .args(args)
                    .module_path_static(Some(self.target))
                    .build(),
            );
        }
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args)
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args)
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Arc::new(GlobalLog))
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("target", &self.target).finish()
    }
}

/// Forwards to the process-wide `log` implementation.
pub struct GlobalLog;

impl Log for GlobalLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record)
    }

    fn flush(&self) {
        log::logger().flush()
    }
}

/// Keeps every record in memory as `"LEVEL target: message"`.
#[derive(Default)]
pub struct CaptureLog {
    lines: Mutex<Vec<String>>,
}

impl CaptureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Log for CaptureLog {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let line = format!("{} {}: {}", record.level(), record.target(), record.args());
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }

    fn flush(&self) {}
}
