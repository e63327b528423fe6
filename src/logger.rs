//! Simple logger that can write to stderr or a file.
//!
//! Installed as the `log` backend, so the protocol and image crates log
//! through it as well.

use crate::parse_args::Verbosity;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Mutex;

/// Output destination for logger
enum Output {
    Stderr,
    File(BufWriter<File>),
    #[cfg(test)]
    Memory(Vec<String>),
}

/// Thread-safe logger
pub struct Logger {
    output: Mutex<Output>,
    level: LevelFilter,
}

impl Logger {
    /// Create a new logger writing to stderr
    pub fn stderr(verbosity: Verbosity) -> Self {
        Logger {
            output: Mutex::new(Output::Stderr),
            level: level_for(verbosity),
        }
    }

    /// Create a new logger writing to a file
    pub fn file(path: &str, verbosity: Verbosity) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Logger {
            output: Mutex::new(Output::File(BufWriter::new(file))),
            level: level_for(verbosity),
        })
    }

    /// Make this the process-wide logger
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    fn write_line(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            match &mut *output {
                Output::Stderr => {
                    eprintln!("{}", line);
                }
                Output::File(f) => {
                    let _ = writeln!(f, "{}", line);
                    let _ = f.flush();
                }
                #[cfg(test)]
                Output::Memory(lines) => lines.push(line.to_string()),
            }
        }
    }
}

fn level_for(verbosity: Verbosity) -> LevelFilter {
    match verbosity {
        Verbosity::Quiet => LevelFilter::Warn,
        Verbosity::Verbose => LevelFilter::Info,
        Verbosity::Trace => LevelFilter::Debug,
        Verbosity::TraceBytes => LevelFilter::Trace,
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Module path without the crate prefix, e.g. [connection]
        let target = record.target();
        let module = target.rsplit("::").next().unwrap_or(target);
        self.write_line(&format!(
            "[{}] {:<5} {}",
            module.to_ascii_uppercase(),
            record.level(),
            record.args()
        ));
    }

    fn flush(&self) {
        if let Ok(mut output) = self.output.lock() {
            if let Output::File(f) = &mut *output {
                let _ = f.flush();
            }
        }
    }
}
