//! User-facing progress messages.

use std::io::Write;

use tracing::{error, info};

/// Sink for progress and error messages meant for the person running a build.
pub trait Ui {
    fn say(&self, message: &str);
    fn error(&self, message: &str);
}

/// Prints `==> message` lines: progress to stdout, errors to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleUi;

impl Ui for ConsoleUi {
    fn say(&self, message: &str) {
        info!("{message}");
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "==> {message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "==> {message}");
    }
}
