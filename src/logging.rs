use anyhow::{Context, Result};
use std::path::Path;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_BASENAME: &str = "moodcast.log";
const LOG_DIR_ENV: &str = "MOODCAST_LOG_PATH";
const LOG_RETENTION_DAYS: u64 = 7;

/// Used when `RUST_LOG` is unset: our own modules at info, chatty HTTP internals quieter
const DEFAULT_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn";

/// Subsystem for macOS unified logging (os_log).
#[cfg(target_os = "macos")]
const OSLOG_SUBSYSTEM: &str = "dev.moodcast.client";

/// Set up file logging. The returned guard must live until shutdown or
/// buffered lines are lost.
pub fn init_logging() -> Result<WorkerGuard> {
    let log_dir = resolve_log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    prune_old_logs(
        &log_dir,
        Duration::from_secs(60 * 60 * 24 * LOG_RETENTION_DAYS),
    );

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_BASENAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    #[cfg(target_os = "macos")]
    {
        // Logs also show up in Console.app under the subsystem
        let oslog_layer = tracing_oslog::OsLogger::new(OSLOG_SUBSYSTEM, "pipeline");

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(oslog_layer)
            .init();
    }

    #[cfg(not(target_os = "macos"))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Logging to {:?}", log_dir);
    Ok(guard)
}

/// Get the log directory path: `MOODCAST_LOG_PATH` if set, else the platform log location
pub fn resolve_log_dir() -> Result<PathBuf> {
    Ok(pick_log_dir(std::env::var(LOG_DIR_ENV).ok(), platform_log_dir()?))
}

/// A blank override is treated as unset
fn pick_log_dir(override_path: Option<String>, platform_dir: PathBuf) -> PathBuf {
    match override_path {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
        _ => platform_dir,
    }
}

#[cfg(target_os = "macos")]
fn platform_log_dir() -> Result<PathBuf> {
    // Where Console.app looks for per-user logs
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .context("Failed to determine home directory for log path")?;
    Ok(home.join("Library").join("Logs").join("moodcast"))
}

#[cfg(not(target_os = "macos"))]
fn platform_log_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("dev", "moodcast", "client")
        .context("Failed to determine project directories for log path")?;
    let base = proj_dirs
        .state_dir()
        .unwrap_or_else(|| proj_dirs.data_local_dir());
    Ok(base.join("logs"))
}

fn prune_old_logs(log_dir: &Path, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        if !file_name.starts_with(LOG_FILE_BASENAME) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };

        if modified < cutoff {
            let _ = std::fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_override_falls_back_to_platform_dir() {
        let platform = PathBuf::from("/var/state/moodcast/logs");
        assert_eq!(pick_log_dir(None, platform.clone()), platform);
        assert_eq!(pick_log_dir(Some("  ".to_string()), platform.clone()), platform);
        assert_eq!(
            pick_log_dir(Some("/tmp/mc-logs ".to_string()), platform),
            PathBuf::from("/tmp/mc-logs")
        );
    }

    #[test]
    fn test_prune_keeps_fresh_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join(format!("{}.2026-10-18", LOG_FILE_BASENAME));
        let foreign = dir.path().join("notes.txt");
        std::fs::write(&fresh, "line").unwrap();
        std::fs::write(&foreign, "keep").unwrap();

        prune_old_logs(dir.path(), Duration::from_secs(60));

        assert!(fresh.exists());
        assert!(foreign.exists());
    }

    #[test]
    fn test_prune_removes_expired_logs() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join(format!("{}.2026-01-01", LOG_FILE_BASENAME));
        std::fs::write(&old, "line").unwrap();

        // Zero max age puts the cutoff at "now", so anything already written is expired
        std::thread::sleep(Duration::from_millis(20));
        prune_old_logs(dir.path(), Duration::ZERO);

        assert!(!old.exists());
    }
}
