//! Discovering and signalling other running instances.
//!
//! `dedaemon reload` and `dedaemon stop` are short-lived processes that find
//! the resident daemon in the process table and signal it. Processes that
//! are themselves `reload` / `stop` invocations never count as instances.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysinfo::{ProcessRefreshKind, System, UpdateKind};

use crate::error::InstanceError;
use crate::paths::{executable_name, CONFIRM_POLL_INTERVAL, CONTROL_COMMANDS};

/// Signals understood by a running daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// `SIGUSR1`: re-read the configuration and restart modules.
    Reload,
    /// `SIGTERM`: stop all modules and exit.
    Stop,
}

impl ControlSignal {
    pub fn signal(self) -> Signal {
        match self {
            ControlSignal::Reload => Signal::SIGUSR1,
            ControlSignal::Stop => Signal::SIGTERM,
        }
    }

    /// Name without the `SIG` prefix (`USR1`, `TERM`).
    pub fn short_name(self) -> &'static str {
        match self {
            ControlSignal::Reload => "USR1",
            ControlSignal::Stop => "TERM",
        }
    }
}

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub parent: Option<u32>,
    pub name: String,
    pub cmd: Vec<String>,
}

pub trait ProcessTable {
    fn processes(&mut self) -> Vec<ProcessInfo>;
}

/// Process table backed by `sysinfo`. Thread rows are left out and
/// command lines are always loaded.
pub struct SystemProcessTable {
    system: System,
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl ProcessTable for SystemProcessTable {
    fn processes(&mut self) -> Vec<ProcessInfo> {
        self.system
            .refresh_processes_specifics(ProcessRefreshKind::new().with_cmd(UpdateKind::Always));
        self.system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                parent: process.parent().map(|parent| parent.as_u32()),
                name: process.name().to_string(),
                cmd: process.cmd().to_vec(),
            })
            .collect()
    }
}

/// Signal delivery and liveness probing.
pub trait Signaller {
    fn send(&self, pid: u32, signal: ControlSignal) -> Result<(), Errno>;

    fn is_alive(&self, pid: u32) -> bool;

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Real signals via `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignaller;

impl Signaller for NixSignaller {
    fn send(&self, pid: u32, signal: ControlSignal) -> Result<(), Errno> {
        let pid = i32::try_from(pid).map_err(|_| Errno::ESRCH)?;
        kill(Pid::from_raw(pid), signal.signal())
    }

    fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        // Null signal: existence probe only. EPERM still means "exists".
        match kill(Pid::from_raw(pid), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

/// Whether `info` is a resident instance of `daemon_name` other than the
/// caller `self_pid` or one of its threads.
pub fn is_daemon_instance(info: &ProcessInfo, daemon_name: &str, self_pid: u32) -> bool {
    if info.pid == self_pid || info.parent == Some(self_pid) {
        return false;
    }
    let argv0_matches = info
        .cmd
        .first()
        .and_then(|arg| Path::new(arg).file_name())
        .is_some_and(|name| name == daemon_name);
    if info.name != daemon_name && !argv0_matches {
        return false;
    }
    !info
        .cmd
        .iter()
        .skip(1)
        .any(|arg| CONTROL_COMMANDS.contains(&arg.as_str()))
}

pub struct InstanceController<T, S> {
    table: T,
    signaller: S,
    daemon_name: String,
    self_pid: u32,
    poll_interval: Duration,
}

impl InstanceController<SystemProcessTable, NixSignaller> {
    /// Controller over the live process table, matching this executable's name.
    pub fn system() -> Self {
        Self::new(
            SystemProcessTable::default(),
            NixSignaller,
            executable_name(),
            std::process::id(),
        )
    }
}

impl<T: ProcessTable, S: Signaller> InstanceController<T, S> {
    pub fn new(table: T, signaller: S, daemon_name: impl Into<String>, self_pid: u32) -> Self {
        Self {
            table,
            signaller,
            daemon_name: daemon_name.into(),
            self_pid,
            poll_interval: CONFIRM_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Pids of resident instances, sorted. Threads listed under an instance
    /// (rows whose parent is itself an instance) are folded into it.
    pub fn running_instances(&mut self) -> Vec<u32> {
        let processes = self.table.processes();
        let matching: Vec<&ProcessInfo> = processes
            .iter()
            .filter(|p| is_daemon_instance(p, &self.daemon_name, self.self_pid))
            .collect();
        let pids: HashSet<u32> = matching.iter().map(|p| p.pid).collect();

        let mut instances: Vec<u32> = matching
            .iter()
            .filter(|p| !p.parent.is_some_and(|parent| pids.contains(&parent)))
            .map(|p| p.pid)
            .collect();
        instances.sort_unstable();
        instances
    }

    /// Send `signal` to running instances and return the pids it reached.
    ///
    /// With `once`, exactly one instance must be running. With
    /// `wait_for_confirmation`, blocks until every signalled pid is gone.
    pub fn kill_running_daemon(
        &mut self,
        signal: ControlSignal,
        once: bool,
        wait_for_confirmation: bool,
    ) -> Result<Vec<u32>, InstanceError> {
        let pids = self.running_instances();
        if once && pids.len() > 1 {
            return Err(InstanceError::Multiple { pids });
        }
        if pids.is_empty() {
            return Err(InstanceError::NoneRunning);
        }

        let mut delivered = Vec::with_capacity(pids.len());
        for pid in pids {
            match self.signaller.send(pid, signal) {
                Ok(()) => {
                    eprintln!("Sent SIG{} to process {pid}", signal.short_name());
                    delivered.push(pid);
                }
                // Exited since enumeration.
                Err(Errno::ESRCH) => tracing::debug!(pid, "process gone before signal"),
                Err(errno) => {
                    eprintln!("Failed to send SIG{} to process {pid}: {errno}", signal.short_name())
                }
            }
        }

        if wait_for_confirmation {
            self.wait_until_gone(&delivered);
        }
        Ok(delivered)
    }

    fn wait_until_gone(&self, pids: &[u32]) {
        let mut remaining = pids.to_vec();
        loop {
            remaining.retain(|pid| self.signaller.is_alive(*pid));
            if remaining.is_empty() {
                return;
            }
            tracing::debug!(?remaining, "waiting for instances to exit");
            self.signaller.sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    const SELF_PID: u32 = 500;

    fn proc(pid: u32, parent: Option<u32>, cmd: &[&str]) -> ProcessInfo {
        ProcessInfo {
            pid,
            parent,
            name: Path::new(cmd[0])
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
        }
    }

    struct FakeTable(Vec<ProcessInfo>);

    impl ProcessTable for FakeTable {
        fn processes(&mut self) -> Vec<ProcessInfo> {
            self.0.clone()
        }
    }

    /// Each pid stays alive for a set number of probes.
    #[derive(Default)]
    struct FakeSignaller {
        sent: RefCell<Vec<(u32, ControlSignal)>>,
        lifetimes: RefCell<HashMap<u32, usize>>,
        probes: RefCell<usize>,
        sleeps: RefCell<usize>,
        vanished: HashSet<u32>,
    }

    impl Signaller for FakeSignaller {
        fn send(&self, pid: u32, signal: ControlSignal) -> Result<(), Errno> {
            if self.vanished.contains(&pid) {
                return Err(Errno::ESRCH);
            }
            self.sent.borrow_mut().push((pid, signal));
            Ok(())
        }

        fn is_alive(&self, pid: u32) -> bool {
            *self.probes.borrow_mut() += 1;
            let mut lifetimes = self.lifetimes.borrow_mut();
            match lifetimes.get_mut(&pid) {
                Some(0) | None => false,
                Some(left) => {
                    *left -= 1;
                    true
                }
            }
        }

        fn sleep(&self, _duration: Duration) {
            *self.sleeps.borrow_mut() += 1;
        }
    }

    fn controller(
        processes: Vec<ProcessInfo>,
        signaller: FakeSignaller,
    ) -> InstanceController<FakeTable, FakeSignaller> {
        InstanceController::new(FakeTable(processes), signaller, "dedaemon", SELF_PID)
    }

    fn table() -> Vec<ProcessInfo> {
        vec![
            proc(100, Some(1), &["/usr/bin/dedaemon", "/home/u/.config/dedaemon.yaml"]),
            proc(101, Some(100), &["/usr/bin/dedaemon", "/home/u/.config/dedaemon.yaml"]),
            proc(200, Some(1), &["dedaemon", "stop"]),
            proc(300, Some(1), &["/usr/bin/dedaemon", "reload"]),
            proc(400, Some(1), &["vim", "dedaemon.yaml"]),
            proc(SELF_PID, Some(1), &["/usr/bin/dedaemon", "list"]),
        ]
    }

    #[test]
    fn discovery_excludes_controllers_threads_and_self() {
        let mut controller = controller(table(), FakeSignaller::default());
        assert_eq!(controller.running_instances(), vec![100]);
    }

    #[test]
    fn callers_own_thread_rows_are_never_instances() {
        let thread = |pid| ProcessInfo {
            pid,
            parent: Some(SELF_PID),
            name: "dedaemon".to_string(),
            cmd: Vec::new(),
        };
        let processes = vec![
            proc(SELF_PID, Some(1), &["/usr/bin/dedaemon", "stop"]),
            thread(SELF_PID + 1),
            thread(SELF_PID + 2),
        ];
        let mut controller = controller(processes, FakeSignaller::default());

        assert!(controller.running_instances().is_empty());
        let err = controller
            .kill_running_daemon(ControlSignal::Stop, false, true)
            .unwrap_err();
        assert_eq!(err, InstanceError::NoneRunning);
        assert!(controller.signaller.sent.borrow().is_empty());
    }

    #[test]
    fn config_path_containing_stop_is_still_an_instance() {
        let processes = vec![proc(10, Some(1), &["dedaemon", "/etc/stop/dedaemon.yaml"])];
        let mut controller = controller(processes, FakeSignaller::default());
        assert_eq!(controller.running_instances(), vec![10]);
    }

    #[test]
    fn no_instance_reports_absence_and_sends_nothing() {
        let processes = vec![proc(200, Some(1), &["dedaemon", "stop"])];
        let mut controller = controller(processes, FakeSignaller::default());
        let err = controller
            .kill_running_daemon(ControlSignal::Stop, false, true)
            .unwrap_err();
        assert_eq!(err, InstanceError::NoneRunning);
        assert!(controller.signaller.sent.borrow().is_empty());
    }

    #[test]
    fn once_with_multiple_instances_is_ambiguous_and_sends_nothing() {
        let mut processes = table();
        processes.push(proc(150, Some(1), &["dedaemon", "/tmp/other.yaml"]));
        let mut controller = controller(processes, FakeSignaller::default());

        let err = controller
            .kill_running_daemon(ControlSignal::Reload, true, false)
            .unwrap_err();
        assert_eq!(err, InstanceError::Multiple { pids: vec![100, 150] });
        assert!(controller.signaller.sent.borrow().is_empty());
    }

    #[test]
    fn reload_signals_the_single_instance_with_usr1() {
        let mut controller = controller(table(), FakeSignaller::default());
        let delivered = controller
            .kill_running_daemon(ControlSignal::Reload, true, false)
            .unwrap();
        assert_eq!(delivered, vec![100]);
        assert_eq!(
            *controller.signaller.sent.borrow(),
            vec![(100, ControlSignal::Reload)]
        );
        assert_eq!(*controller.signaller.probes.borrow(), 0);
    }

    #[test]
    fn stop_waits_until_every_target_fails_the_probe() {
        let mut processes = table();
        processes.push(proc(150, Some(1), &["dedaemon", "/tmp/other.yaml"]));
        let signaller = FakeSignaller::default();
        signaller.lifetimes.borrow_mut().extend([(100, 2), (150, 4)]);
        let mut controller = controller(processes, signaller);

        let delivered = controller
            .kill_running_daemon(ControlSignal::Stop, false, true)
            .unwrap();

        assert_eq!(delivered, vec![100, 150]);
        let signaller = &controller.signaller;
        assert!(signaller.lifetimes.borrow().values().all(|left| *left == 0));
        assert_eq!(*signaller.sleeps.borrow(), 4);
    }

    #[test]
    fn vanished_process_is_tolerated() {
        let mut processes = table();
        processes.push(proc(150, Some(1), &["dedaemon", "/tmp/other.yaml"]));
        let signaller = FakeSignaller {
            vanished: HashSet::from([150]),
            ..FakeSignaller::default()
        };
        let mut controller = controller(processes, signaller);

        let delivered = controller
            .kill_running_daemon(ControlSignal::Stop, false, true)
            .unwrap();
        assert_eq!(delivered, vec![100]);
    }

    #[test]
    fn signal_names() {
        assert_eq!(ControlSignal::Reload.signal(), Signal::SIGUSR1);
        assert_eq!(ControlSignal::Stop.signal(), Signal::SIGTERM);
        assert_eq!(ControlSignal::Stop.short_name(), "TERM");
    }

    #[test]
    fn own_process_is_alive_to_the_real_probe() {
        assert!(NixSignaller.is_alive(std::process::id()));
        assert!(!NixSignaller.is_alive(u32::MAX));
    }
}
