//! Logging infrastructure for the devplat chat client.
//!
//! Provides structured file logging with daily rotation to platform-standard directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

const LOG_FILE_PREFIX: &str = "devplat";
const RETENTION_DAYS: u64 = 7;

/// Result of initializing the logging system.
pub struct LoggingContext {
    /// Guard that must be held for the application lifetime to ensure logs are flushed.
    pub _guard: WorkerGuard,
    pub session_id: String,
    pub log_directory: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to determine log directory")]
    NoLogDirectory,
    #[error("Failed to create log directory: {0}")]
    CreateDirectory(#[source] std::io::Error),
}

/// Generates a 6-character random hex session ID.
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 3] = rng.random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Platform log directory.
///
/// macOS: ~/Library/Logs/devplat-chat/
/// Linux: ~/.local/state/devplat-chat/
/// Windows: %LocalAppData%\devplat-chat\
fn log_directory() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        return dirs::home_dir().map(|home| home.join("Library").join("Logs").join("devplat-chat"));
    }
    let project_dirs = ProjectDirs::from("dev", "devplat", "devplat-chat")?;
    project_dirs
        .state_dir()
        .map(PathBuf::from)
        .or_else(|| Some(project_dirs.data_local_dir().to_path_buf()))
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over `default_level`. The returned `WorkerGuard` must be held
/// for the application lifetime.
pub fn init(default_level: &str) -> Result<LoggingContext, LoggingError> {
    let session_id = generate_session_id();

    let log_dir = log_directory().ok_or(LoggingError::NoLogDirectory)?;
    fs::create_dir_all(&log_dir).map_err(LoggingError::CreateDirectory)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    info!(session_id = %session_id, "session_start");

    Ok(LoggingContext {
        _guard: guard,
        session_id,
        log_directory: log_dir,
    })
}

fn is_rotated_log(file_name: &str) -> bool {
    file_name
        .strip_prefix(LOG_FILE_PREFIX)
        .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1)
}

/// Rotated log files last modified more than `retention` before `now`.
fn expired_logs(log_dir: &Path, now: SystemTime, retention: Duration) -> io::Result<Vec<PathBuf>> {
    let expired = fs::read_dir(log_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_rotated_log)
        })
        .filter(|path| {
            fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > retention)
        })
        .collect();
    Ok(expired)
}

/// Deletes `devplat.*` log files older than the retention period.
///
/// Failures are logged and never stop startup. Returns how many files went.
pub fn cleanup_old_logs(log_dir: &Path) -> usize {
    let retention = Duration::from_secs(RETENTION_DAYS * 24 * 60 * 60);
    remove_expired_logs(log_dir, SystemTime::now(), retention)
}

fn remove_expired_logs(log_dir: &Path, now: SystemTime, retention: Duration) -> usize {
    let expired = match expired_logs(log_dir, now, retention) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(dir = ?log_dir, error = %e, "log_cleanup_skipped");
            return 0;
        }
    };

    let removed = expired
        .iter()
        .filter(|path| match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!(file = ?path, error = %e, "log_delete_failed");
                false
            }
        })
        .count();
    if removed > 0 {
        debug!(count = removed, "old_logs_removed");
    }
    removed
}
