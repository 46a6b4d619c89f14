//! File-based logging for embedding shells.
//!
//! A mobile or terminal shell owns the screen, so diagnostics go to a
//! daily-rolling file under the platform data directory instead of
//! stdout. Call [`init`] once at startup and hold the returned guard
//! for the life of the process; dropping it flushes buffered lines.

use std::path::{Path, PathBuf};

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directory for log files: `<data_dir>/khet/logs`.
pub fn default_log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir().ok_or_else(|| eyre!("Could not determine data directory"))?;
  Ok(data_dir.join("khet").join("logs"))
}

/// Initialize logging to a rolling file in the default directory.
///
/// Honors `RUST_LOG` for filtering; defaults to `khet_core=info`.
pub fn init() -> Result<WorkerGuard> {
  let dir = default_log_dir()?;
  init_at(&dir)
}

/// Initialize logging into an explicit directory.
pub fn init_at(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, "khet.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "khet_core=info".into());

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writes_to_rolling_file_in_target_dir() {
    let dir = tempfile::tempdir().unwrap();

    let guard = init_at(dir.path()).unwrap();
    tracing::info!("logging smoke test");
    drop(guard);

    let entries: Vec<_> = std::fs::read_dir(dir.path())
      .unwrap()
      .filter_map(|e| e.ok())
      .collect();
    assert!(!entries.is_empty(), "expected a log file to be created");
  }
}
