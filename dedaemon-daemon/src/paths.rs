use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Executable name used to recognise other instances.
pub const DAEMON_NAME: &str = "dedaemon";

/// Logger name for lines written by the daemon itself.
pub const DAEMON_LOGGER: &str = "dedaemon";

/// Suffix appended to the previous log file at startup.
pub const ROTATED_SUFFIX: &str = ".old";

/// Invocations that control a running instance rather than being one.
pub const CONTROL_COMMANDS: [&str; 2] = ["stop", "reload"];

/// Delay between liveness probes while `stop` waits for instances to exit.
pub const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// `<log>.old`
pub fn rotated_log_path(log: &Path) -> PathBuf {
    let mut name = OsString::from(log.as_os_str());
    name.push(ROTATED_SUFFIX);
    PathBuf::from(name)
}

/// File name of the running executable, falling back to [`DAEMON_NAME`].
pub fn executable_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| DAEMON_NAME.to_string())
}
