//! Startup log rotation.
//!
//! Each fresh daemon start moves `<log>` to `<log>.old` (replacing any
//! previous `.old`) and begins with an empty `<log>`. Reloads never rotate.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{io_err, DaemonError};
use crate::paths::rotated_log_path;

/// Rotate `log_path` and create it empty. A failed rename is ignored; a
/// failure to create the fresh file is returned.
pub fn rotate_on_startup(log_path: &Path) -> Result<(), DaemonError> {
    let rotated = rotated_log_path(log_path);
    match fs::rename(log_path, &rotated) {
        Ok(()) => tracing::debug!(from = %log_path.display(), to = %rotated.display(), "log rotated"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            tracing::debug!(path = %log_path.display(), error = %err, "log rotation skipped")
        }
    }

    fs::File::create(log_path).map_err(|e| io_err(log_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn existing_log_moves_to_old_and_fresh_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("dedaemon.log");
        fs::write(&log, "previous run\n").unwrap();

        rotate_on_startup(&log).unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap(), "");
        assert_eq!(
            fs::read_to_string(rotated_log_path(&log)).unwrap(),
            "previous run\n"
        );
    }

    #[test]
    fn missing_log_is_created() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("new.log");
        rotate_on_startup(&log).unwrap();
        assert!(log.exists());
        assert!(!rotated_log_path(&log).exists());
    }

    #[test]
    fn older_backup_is_replaced() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("dedaemon.log");
        fs::write(rotated_log_path(&log), "ancient\n").unwrap();
        fs::write(&log, "recent\n").unwrap();

        rotate_on_startup(&log).unwrap();

        assert_eq!(fs::read_to_string(rotated_log_path(&log)).unwrap(), "recent\n");
    }

    #[test]
    fn failed_rename_still_truncates() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("dedaemon.log");
        fs::write(&log, "stale\n").unwrap();
        // A non-empty directory in the way makes the rename fail.
        let blocker = rotated_log_path(&log);
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        rotate_on_startup(&log).unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap(), "");
    }

    #[test]
    fn unwritable_location_is_an_error() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("no-such-dir").join("dedaemon.log");
        let err = rotate_on_startup(&log).unwrap_err();
        assert!(matches!(err, DaemonError::Io { .. }));
    }
}
