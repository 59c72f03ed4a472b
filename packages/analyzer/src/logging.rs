use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "bkt-analyzer.log";
const DEFAULT_LOG_DIR: &str = "./logs";

/// Keeps the non-blocking file writer alive; flushes on drop
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Directory for the daily log file, if `ENABLE_FILE_LOGS` is set
pub fn file_log_dir<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let enabled = lookup("ENABLE_FILE_LOGS")
        .map(|v| matches!(v.trim(), "true" | "1"))
        .unwrap_or(false);
    enabled.then(|| {
        lookup("LOG_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
    })
}

/// Install the global subscriber
///
/// Events go to stderr: stdout is reserved for the analysis summary and the
/// report paths, so `analyze > summary.txt` captures only those. With
/// `ENABLE_FILE_LOGS` a daily rolling file under `LOG_DIR` gets a copy.
pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    if let Some(log_dir) = file_log_dir(|key| std::env::var(key).ok()) {
        match std::fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
                let (file_writer, guard) = tracing_appender::non_blocking(appender);
                let file_layer = fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_target(true);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(stderr_layer)
                    .with(file_layer)
                    .init();

                return Some(FileLogGuard { _guard: guard });
            }
            // The subscriber is not up yet, so this cannot go through tracing.
            Err(err) => eprintln!("failed to create log directory {}: {err}", log_dir.display()),
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_file_logs_off_by_default() {
        assert_eq!(file_log_dir(vars(&[])), None);
        assert_eq!(file_log_dir(vars(&[("ENABLE_FILE_LOGS", "yes"), ("LOG_DIR", "/tmp/x")])), None);
    }

    #[test]
    fn test_file_log_dir_resolution() {
        assert_eq!(
            file_log_dir(vars(&[("ENABLE_FILE_LOGS", "1")])),
            Some(PathBuf::from(DEFAULT_LOG_DIR))
        );
        assert_eq!(
            file_log_dir(vars(&[("ENABLE_FILE_LOGS", "true"), ("LOG_DIR", "/var/log/bkt")])),
            Some(PathBuf::from("/var/log/bkt"))
        );
        assert_eq!(
            file_log_dir(vars(&[("ENABLE_FILE_LOGS", "true"), ("LOG_DIR", " ")])),
            Some(PathBuf::from(DEFAULT_LOG_DIR))
        );
    }
}
