use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

utils::configurable_constants! {

    /// The log destination. By default, logs go to the console.
    ///
    /// If this path is a directory or ends with a /, logs are written to `nerd.log` inside it.
    /// If given but empty, logs go to the console.
    ref LOG_DEST : Option<String> = None;

    /// The format the logs are printed in. If "json", then logs are dumped as json blobs; otherwise
    /// they are treated as text. By default file logs are json and console logs are text.
    ref LOG_FORMAT : Option<String> = None;

}

/// Default log level. Override using the `RUST_LOG` env variable.
const DEFAULT_LOG_LEVEL_FILE: &str = "info";
const DEFAULT_LOG_LEVEL_CONSOLE: &str = "warn";

const DEFAULT_LOG_FILE_NAME: &str = "nerd.log";

#[derive(Clone, Debug, PartialEq)]
pub enum LoggingMode {
    File(PathBuf),
    Console,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub logging_mode: LoggingMode,
    pub use_json: bool,
    pub version: String,
}

impl LoggingConfig {
    pub fn new(version: impl Into<String>) -> LoggingConfig {
        Self::from_values(LOG_DEST.as_deref(), LOG_FORMAT.as_deref(), version.into())
    }

    fn from_values(log_dest: Option<&str>, log_format: Option<&str>, version: String) -> LoggingConfig {
        let logging_mode = match log_dest {
            None | Some("") => LoggingMode::Console,
            Some(dest) => {
                let path = PathBuf::from(dest);
                if dest.ends_with('/') || dest.ends_with('\\') || path.is_dir() {
                    LoggingMode::File(path.join(DEFAULT_LOG_FILE_NAME))
                } else {
                    LoggingMode::File(path)
                }
            },
        };

        let use_json = match log_format {
            Some(format) => format.trim().eq_ignore_ascii_case("json"),
            None => logging_mode != LoggingMode::Console,
        };

        Self {
            logging_mode,
            use_json,
            version,
        }
    }
}

/// Sets up the global subscriber. Should only be called once.
pub fn init_logging(cfg: LoggingConfig) {
    match &cfg.logging_mode {
        LoggingMode::File(log_file) => {
            // Fall back to the console if the file cannot be written.
            if let Err(e) = init_logging_to_file(log_file, cfg.use_json) {
                init_logging_to_console(&cfg);
                error!("Error logging to file {log_file:?} ({e}); falling back to console logging.");
            }
        },
        LoggingMode::Console => init_logging_to_console(&cfg),
    }

    info!("nerd {}", cfg.version);
}

fn init_logging_to_console(cfg: &LoggingConfig) {
    let registry = tracing_subscriber::registry();

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_line_number(true)
        .with_file(true)
        .with_target(false);
    let fmt_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL_CONSOLE))
        .unwrap_or_default();

    if cfg.use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).init();
    } else {
        registry.with(fmt_layer_base.pretty().with_filter(fmt_filter)).init();
    }
}

fn init_logging_to_file(path: &Path, use_json: bool) -> Result<(), std::io::Error> {
    use tracing_appender::{non_blocking, rolling};

    let file_name = path
        .file_name()
        .ok_or_else(|| std::io::Error::other(format!("{path:?} does not name a file")))?;

    let log_directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            parent
        },
        _ => Path::new("."),
    };

    // Error early if the location is not writeable.
    std::fs::OpenOptions::new().create(true).append(true).open(path)?;

    let (writer, guard) = non_blocking(rolling::never(log_directory, file_name));

    // The guard flushes the background writer when dropped, so it lives as long as the process.
    static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
    let _ = FILE_GUARD.set(guard);

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);
    let fmt_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL_FILE))
        .unwrap_or_default();

    let registry = tracing_subscriber::registry();
    if use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).init();
    } else {
        registry.with(fmt_layer_base.pretty().with_filter(fmt_filter)).init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_console_by_default() {
        let cfg = LoggingConfig::from_values(None, None, "v".to_owned());
        assert_eq!(cfg.logging_mode, LoggingMode::Console);
        assert!(!cfg.use_json);

        let cfg = LoggingConfig::from_values(Some(""), Some("JSON "), "v".to_owned());
        assert_eq!(cfg.logging_mode, LoggingMode::Console);
        assert!(cfg.use_json);
    }

    #[test]
    fn test_file_destination() {
        let cfg = LoggingConfig::from_values(Some("/var/log/nerd/upload.log"), None, "v".to_owned());
        assert_eq!(cfg.logging_mode, LoggingMode::File(PathBuf::from("/var/log/nerd/upload.log")));
        assert!(cfg.use_json);

        let cfg = LoggingConfig::from_values(Some("/var/log/nerd/upload.log"), Some("text"), "v".to_owned());
        assert!(!cfg.use_json);
    }

    #[test]
    fn test_directory_destination() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().to_str().unwrap();
        let cfg = LoggingConfig::from_values(Some(dest), None, "v".to_owned());
        assert_eq!(cfg.logging_mode, LoggingMode::File(dir.path().join(DEFAULT_LOG_FILE_NAME)));

        let cfg = LoggingConfig::from_values(Some("logs/"), None, "v".to_owned());
        assert_eq!(cfg.logging_mode, LoggingMode::File(PathBuf::from("logs/").join(DEFAULT_LOG_FILE_NAME)));
    }
}
