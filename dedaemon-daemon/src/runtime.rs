use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use dedaemon_core::{join, Config, LogFile, LogSink, ModuleError, ModuleName, ModuleRegistry};
use dedaemon_modules::{builtin_registry, syscheck, DeviceEvents};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::rotate_on_startup;
use crate::paths::DAEMON_LOGGER;

/// Everything that can wake the daemon's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// `SIGUSR1`.
    Reload,
    /// `SIGTERM` / `SIGINT`.
    Stop,
    /// The first failed log append.
    FatalLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Init,
    Running,
    Reloading,
    Stopping,
    Stopped,
}

/// Owns the active configuration, the module registry, and every module's
/// `running` flag. Control events are handled one at a time.
pub struct Daemon {
    config_path: PathBuf,
    config: Arc<Config>,
    registry: ModuleRegistry,
    log: LogFile,
    logger: LogSink,
    devices: DeviceEvents,
    state: DaemonState,
}

impl Daemon {
    /// `control` receives [`ControlEvent::FatalLog`] when the log file
    /// first becomes unwritable.
    pub fn new(
        config: Config,
        registry: ModuleRegistry,
        devices: DeviceEvents,
        control: mpsc::UnboundedSender<ControlEvent>,
    ) -> Self {
        let log = LogFile::with_fatal_hook(config.general.log.clone(), move |_| {
            let _ = control.send(ControlEvent::FatalLog);
        });
        let logger = log.sink(DAEMON_LOGGER);
        Self {
            config_path: config.path().to_path_buf(),
            config: Arc::new(config),
            registry,
            log,
            logger,
            devices,
            state: DaemonState::Init,
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn log(&self) -> &LogFile {
        &self.log
    }

    /// Rotate the log and start every enabled module.
    pub fn startup(&mut self) -> Result<(), DaemonError> {
        rotate_on_startup(&self.config.general.log)?;
        self.start_all();
        self.state = DaemonState::Running;
        Ok(())
    }

    /// Start each module the active configuration enables, in registry order.
    pub fn start_all(&self) {
        let view = self.registry.view();
        for module in self.registry.modules() {
            let name = module.name();
            let section = match self.config.section(name) {
                Some(section) if self.config.is_enabled(name) => section,
                _ => {
                    tracing::debug!(module = %name, "module disabled");
                    continue;
                }
            };
            self.registry.set_running(name, true);
            module.start(section, self.log.sink(name), view.clone());
            tracing::debug!(module = %name, "module started");
        }
    }

    /// Stop every running module and wait until all of them are done.
    ///
    /// All stops are spawned before any is awaited. Modules that are not
    /// running count towards the barrier immediately.
    pub async fn stop_all(&self) {
        let (done, all_stopped) = join(self.registry.len());
        for module in self.registry.modules() {
            let name = module.name();
            if !self.registry.is_running(name) {
                done.signal();
                continue;
            }
            self.registry.set_running(name, false);
            let module = Arc::clone(module);
            let done = done.clone();
            tokio::spawn(async move {
                module.stop().await;
                tracing::debug!(module = %name, "module stopped");
                done.signal();
            });
        }
        all_stopped.wait().await;
    }

    /// Re-read the configuration file and restart every module under it.
    /// A configuration that fails to load leaves everything untouched.
    pub async fn reload(&mut self) -> bool {
        self.state = DaemonState::Reloading;
        let config = match load_config(&self.config_path, &self.registry) {
            Ok(config) => config,
            Err(err) => {
                self.logger.error(format!(
                    "Tried to reload, but parsing the config file failed: {err}"
                ));
                self.state = DaemonState::Running;
                return false;
            }
        };

        self.logger.info("Reloading.");
        for binary in syscheck::missing_binaries(&config) {
            self.logger.warn(format!("Missing binary: {binary}"));
        }
        self.stop_all().await;

        self.log.set_path(config.general.log.clone());
        self.config = Arc::new(config);
        self.start_all();
        self.state = DaemonState::Running;
        true
    }

    /// Stop all modules and release the device watcher.
    pub async fn shutdown(&mut self) {
        self.state = DaemonState::Stopping;
        self.logger.info("Exiting...");
        self.stop_all().await;
        self.devices.exit();
        self.logger.info("All modules stopped.");
        self.state = DaemonState::Stopped;
    }

    /// Handle one control event. Returns the exit code once the daemon is done.
    pub async fn handle(&mut self, event: ControlEvent) -> Option<i32> {
        if matches!(self.state, DaemonState::Stopping | DaemonState::Stopped) {
            tracing::debug!(?event, "already stopping; ignoring control event");
            return None;
        }
        match event {
            ControlEvent::Reload => {
                self.reload().await;
                None
            }
            ControlEvent::Stop => {
                self.shutdown().await;
                Some(0)
            }
            ControlEvent::FatalLog => {
                self.shutdown().await;
                Some(1)
            }
        }
    }

    /// Process control events until one of them ends the daemon.
    pub async fn serve(mut self, mut events: mpsc::UnboundedReceiver<ControlEvent>) -> i32 {
        while let Some(event) = events.recv().await {
            tracing::debug!(?event, state = ?self.state, "control event");
            if let Some(code) = self.handle(event).await {
                return code;
            }
        }
        self.shutdown().await;
        0
    }
}

/// Translate process signals into control events.
pub fn forward_signals(
    events: mpsc::UnboundedSender<ControlEvent>,
) -> Result<JoinHandle<()>, DaemonError> {
    let mut terminate = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM", e))?;
    let mut interrupt = signal(SignalKind::interrupt()).map_err(|e| io_err("SIGINT", e))?;
    let mut user1 = signal(SignalKind::user_defined1()).map_err(|e| io_err("SIGUSR1", e))?;

    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(()) = terminate.recv() => ControlEvent::Stop,
                Some(()) = interrupt.recv() => ControlEvent::Stop,
                Some(()) = user1.recv() => ControlEvent::Reload,
                else => break,
            };
            if events.send(event).is_err() {
                break;
            }
        }
    }))
}

/// Parse the file at `path` and let every module validate its section.
pub fn load_config(path: &Path, registry: &ModuleRegistry) -> Result<Config, DaemonError> {
    let config = Config::load(path)?;
    registry.validate(&config)?;
    Ok(config)
}

/// Run the daemon for the configuration at `config_path` until it is
/// stopped. Returns the process exit code.
pub async fn run(config_path: PathBuf) -> Result<i32, DaemonError> {
    let devices = DeviceEvents::new();
    devices.init()?;
    let registry = builtin_registry(&devices);

    let config = match load_config(&config_path, &registry) {
        Ok(config) => config,
        Err(err) => {
            devices.exit();
            return Err(err);
        }
    };

    let missing = syscheck::missing_binaries(&config);
    if !missing.is_empty() {
        for binary in &missing {
            eprintln!("Missing binary: {binary}");
        }
        devices.exit();
        return Err(DaemonError::MissingBinaries(
            missing.into_iter().map(str::to_string).collect(),
        ));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let signals = forward_signals(tx.clone())?;
    let mut daemon = Daemon::new(config, registry, devices, tx);
    tracing::info!(config = %config_path.display(), "starting modules");
    daemon.startup()?;

    let code = daemon.serve(rx).await;
    signals.abort();
    Ok(code)
}

/// Start the daemon on a current-thread runtime and block until it exits.
pub fn start_blocking(config_path: &Path) -> Result<i32, DaemonError> {
    runtime()?.block_on(run(config_path.to_path_buf()))
}

/// Print the display and input listings to stderr.
pub fn list_blocking() -> Result<(), DaemonError> {
    runtime()?.block_on(async {
        let devices = DeviceEvents::new();
        devices.init()?;
        let registry = builtin_registry(&devices);

        for name in [ModuleName::Display, ModuleName::Input] {
            let Some(module) = registry.get(name) else {
                continue;
            };
            let listing = module.list().await;
            write_listing(&mut io::stderr(), name, listing).map_err(|e| io_err("stderr", e))?;
        }

        devices.exit();
        Ok::<(), DaemonError>(())
    })
}

/// `<name>:` followed by one indented line per entry, or the listing error.
pub fn write_listing(
    out: &mut impl Write,
    name: ModuleName,
    listing: Result<Vec<String>, ModuleError>,
) -> io::Result<()> {
    writeln!(out, "{name}:")?;
    match listing {
        Ok(entries) => {
            for entry in entries {
                writeln!(out, "  {entry}")?;
            }
        }
        Err(err) => writeln!(out, "  {err}")?,
    }
    Ok(())
}

/// Install the diagnostics subscriber. Filter comes from `DEDAEMON_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("DEDAEMON_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
}
