pub mod control;
pub mod list;
pub mod run;

use dedaemon_daemon::paths::DAEMON_NAME;

pub fn print_usage() {
    eprintln!("Usage: {DAEMON_NAME} <config file>");
    eprintln!("       {DAEMON_NAME} list   -- List display and input devices");
    eprintln!("       {DAEMON_NAME} reload -- Reload the running dedaemon instance");
    eprintln!("       {DAEMON_NAME} stop   -- Stop all running dedaemon instances");
}
