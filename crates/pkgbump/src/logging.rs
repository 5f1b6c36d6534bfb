use simplelog::{CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{Level, Log, Metadata, Record};

const TARGET_PREFIX: &str = "pkgbump";

/// Writes every record to stdout prefixed with the workflow command CI
/// runners recognize (`::debug::`, `::warning::`, `::error::`).
struct WorkflowLogger {
    level: LevelFilter,
}

impl WorkflowLogger {
    fn new(level: LevelFilter) -> Box<Self> {
        Box::new(Self { level })
    }
}

impl Log for WorkflowLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level && metadata.target().starts_with(TARGET_PREFIX)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = workflow_line(record.level(), &record.args().to_string());
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

impl SharedLogger for WorkflowLogger {
    fn level(&self) -> LevelFilter {
        self.level
    }

    fn config(&self) -> Option<&Config> {
        None
    }

    fn as_log(self: Box<Self>) -> Box<dyn Log> {
        Box::new(*self)
    }
}

/// Every line of a multi-line message carries the marker, so runners do not
/// show continuation lines as plain output.
fn workflow_line(level: Level, message: &str) -> String {
    let marker = match level {
        Level::Error => "::error::",
        Level::Warn => "::warning::",
        Level::Info => "",
        Level::Debug | Level::Trace => "::debug::",
    };

    message
        .split('\n')
        .map(|line| format!("{marker}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

struct ResilientFileWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ResilientFileWriter {
    fn new(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    fn ensure_file(&self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !self.path.exists() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *guard = Some(file);
        }

        Ok(())
    }
}

impl Write for ResilientFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_file()?;
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(ref mut file) = *guard {
            file.write(buf)
        } else {
            Err(io::Error::other("log file not available"))
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(ref mut file) = *guard {
            file.flush()
        } else {
            Ok(())
        }
    }
}

fn trim_log_file_if_oversized(log_path: &Path, max_log_size: u64) {
    if let Ok(metadata) = std::fs::metadata(log_path)
        && metadata.len() > max_log_size
        && let Ok(contents) = std::fs::read(log_path)
    {
        let half = contents.len() / 2;
        let keep_from = contents[half..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(half, |pos| half + pos + 1);
        let _ = std::fs::write(log_path, &contents[keep_from..]);
    }
}

/// Install the stdout workflow logger and, when `log_file` is given, a
/// timestamped file logger next to it.
pub fn init_logging(debug_enabled: bool, log_file: Option<&Path>, max_log_size: u64) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![WorkflowLogger::new(LevelFilter::Debug)];

    if let Some(log_path) = log_file {
        trim_log_file_if_oversized(log_path, max_log_size);

        let config = ConfigBuilder::new()
            .set_time_format_rfc3339()
            .add_filter_allow_str(TARGET_PREFIX)
            .build();

        match ResilientFileWriter::new(log_path.to_path_buf()) {
            Ok(writer) => loggers.push(WriteLogger::new(LevelFilter::Debug, config, writer)),
            Err(error) => eprintln!(
                "::warning::Cannot open log file {}: {error}",
                log_path.display()
            ),
        }
    }

    let _ = CombinedLogger::init(loggers);
    set_logging_enabled(debug_enabled);

    if debug_enabled && let Some(log_path) = log_file {
        log::debug!("Debug logging initialized, log file: {}", log_path.display());
    }
}

/// Debug output is opt-in; info and above are always shown.
pub fn set_logging_enabled(debug_enabled: bool) {
    if debug_enabled {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }
}
