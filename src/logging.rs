use anyhow::Result;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use std::path::PathBuf;

/// Initialize logging for one of the binaries.
///
/// Logs go to `<data-local>/KiotaUiClient/logs/<basename>.log` and `Info` and
/// above are duplicated to stderr. If the log directory is unusable the
/// logger falls back to stderr only, so the updater can still run.
pub fn init_logging(basename: &str) -> Result<LoggerHandle> {
    let log_dir: PathBuf = crate::config::app_data_dir().join("logs");

    match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let handle = Logger::try_with_env_or_str("info")?
                .log_to_file(
                    FileSpec::default()
                        .directory(&log_dir)
                        .basename(basename)
                        .suffix("log"),
                )
                .rotate(
                    Criterion::Size(5_000_000),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(10),
                )
                .duplicate_to_stderr(Duplicate::Info)
                .start()?;
            Ok(handle)
        }
        Err(e) => {
            eprintln!(
                "cannot create log directory {}: {e}; logging to stderr only",
                log_dir.display()
            );
            let handle = Logger::try_with_env_or_str("info")?
                .log_to_stderr()
                .start()?;
            Ok(handle)
        }
    }
}
