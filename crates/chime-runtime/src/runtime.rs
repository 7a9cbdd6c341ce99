//! Runtime orchestration.
//!
//! [`ChimeRuntime`] ties the pieces together: it loads the configuration,
//! installs logging, builds the [`ListenerManager`], registers bots from
//! verification records and keeps running until a shutdown signal arrives.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chime_runtime::ChimeRuntime;
//!
//! let runtime = ChimeRuntime::builder()
//!     .config_file("config/chime.toml")
//!     .manager(ManagerConfiguration::new().listeners(listeners))
//!     .build()?;
//!
//! runtime.register_registrar(MyPlatform::new()).await;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chime_framework::{ListenerManager, ManagerConfiguration};
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bot::{BotRegistrar, RegisterError, RegisteredBot};
use crate::config::{ChimeConfig, ConfigLoader};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::verify::{BotVerifyInfo, VerifyInfoDecoder, VerifyInfoLoader};

/// The Chime runtime.
pub struct ChimeRuntime {
    config: ChimeConfig,
    manager: Arc<ListenerManager>,
    loader: VerifyInfoLoader,
    registrars: RwLock<Vec<Arc<dyn BotRegistrar>>>,
    bots: RwLock<Vec<RegisteredBot>>,
    running: RwLock<bool>,
}

impl ChimeRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Initializes logging and builds the listener manager from `manager`
    /// with the configured dispatch settings.
    pub fn from_config(config: ChimeConfig, manager: ManagerConfiguration) -> RuntimeResult<Self> {
        Self::with_loader(config, manager, VerifyInfoLoader::standard())
    }

    fn with_loader(
        config: ChimeConfig,
        manager: ManagerConfiguration,
        loader: VerifyInfoLoader,
    ) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        let manager = manager.settings(config.dispatch.clone()).build()?;
        info!(
            log_level = %config.logging.level,
            listeners = manager.listener_count(),
            interceptors = manager.interceptor_count(),
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            manager: Arc::new(manager),
            loader,
            registrars: RwLock::new(Vec::new()),
            bots: RwLock::new(Vec::new()),
            running: RwLock::new(false),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ChimeConfig {
        &self.config
    }

    /// Returns the listener manager. Connectors dispatch events through it.
    pub fn manager(&self) -> &Arc<ListenerManager> {
        &self.manager
    }

    /// Adds a bot registrar. Registrars are tried in the order they were added.
    pub async fn register_registrar<R: BotRegistrar + 'static>(&self, registrar: R) {
        info!(registrar = registrar.name(), "Registered bot registrar");
        self.registrars.write().await.push(Arc::new(registrar));
    }

    /// Returns the bots registered so far.
    pub async fn bots(&self) -> Vec<RegisteredBot> {
        self.bots.read().await.clone()
    }

    /// Returns whether the runtime is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    // =========================================================================
    // Bots
    // =========================================================================

    /// Loads the records in every configured directory and registers them.
    pub async fn load_bots(&self) -> RuntimeResult<Vec<RegisteredBot>> {
        let mut registered = Vec::new();
        for dir in &self.config.bots.directories {
            registered.extend(self.load_bots_from(dir).await?);
        }
        Ok(registered)
    }

    /// Loads the records in `dir` and registers them.
    pub async fn load_bots_from(&self, dir: &Path) -> RuntimeResult<Vec<RegisteredBot>> {
        let records = self.loader.load_dir(dir)?;
        debug!(dir = %dir.display(), records = records.len(), "Loaded bot records");

        let mut registered = Vec::new();
        for info in &records {
            if let Some(bot) = self.register_bot(info).await? {
                registered.push(bot);
            }
        }
        Ok(registered)
    }

    /// Offers `info` to the registrars until one accepts it.
    ///
    /// Returns `Ok(None)` if every registrar reported a component mismatch.
    pub async fn register_bot(&self, info: &BotVerifyInfo) -> RuntimeResult<Option<RegisteredBot>> {
        info!(record = %info, "Registering bot");
        let registrars = self.registrars.read().await.clone();

        for registrar in registrars {
            match registrar.register(info).await {
                Ok(id) => {
                    let bot = RegisteredBot {
                        id,
                        component: info.component().to_string(),
                        record: info.name().to_string(),
                        registrar: registrar.name().to_string(),
                    };
                    info!(record = %info, bot = %bot, "Bot registered");
                    self.bots.write().await.push(bot.clone());
                    return Ok(Some(bot));
                }
                Err(RegisterError::ComponentMismatch { .. }) => {
                    debug!(
                        record = %info,
                        registrar = registrar.name(),
                        "Record not matched by registrar, trying next"
                    );
                }
                Err(source) => {
                    return Err(RuntimeError::Register {
                        registrar: registrar.name().to_string(),
                        record: info.name().to_string(),
                        source,
                    });
                }
            }
        }

        warn!(record = %info, "Record not matched by any registrar, skipping");
        Ok(None)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the runtime, loading bots if `bots.auto_load` is set.
    pub async fn start(&self) -> RuntimeResult<()> {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Runtime is already running");
                return Ok(());
            }
            *running = true;
        }

        info!("Starting Chime runtime");
        if self.config.bots.auto_load {
            let bots = self.load_bots().await?;
            info!(bots = bots.len(), "Bots loaded");
        }
        info!("Runtime started");
        Ok(())
    }

    /// Stops the runtime and waits for in-flight async listeners.
    pub async fn stop(&self) -> RuntimeResult<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                warn!("Runtime is not running");
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping Chime runtime");
        self.manager.shutdown().await;
        info!("Runtime stopped");
        Ok(())
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Chime runtime is now running. Press Ctrl+C to stop.");

        let waited = wait_for_shutdown().await;
        self.stop().await?;
        waited
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`ChimeRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    manager: ManagerConfiguration,
    loader: VerifyInfoLoader,
}

impl RuntimeBuilder {
    /// Creates a builder searching the current directory for configuration.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            manager: ManagerConfiguration::new(),
            loader: VerifyInfoLoader::standard(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: ChimeConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Sets the listeners, interceptors and exception handler of the manager.
    ///
    /// Its dispatch settings are replaced by the configured ones.
    pub fn manager(mut self, manager: ManagerConfiguration) -> Self {
        self.manager = manager;
        self
    }

    /// Adds a bot record decoder.
    pub fn decoder<D: VerifyInfoDecoder + 'static>(mut self, decoder: D) -> Self {
        self.loader = self.loader.with_decoder(decoder);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<ChimeRuntime> {
        let config = self.config_loader.load()?;
        ChimeRuntime::with_loader(config, self.manager, self.loader)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chime_core::{BoxedEvent, Event, EventKey, Id};
    use chime_framework::listener;
    use serde_json::json;
    use std::any::Any;
    use std::path::PathBuf;
    use tempfile::TempDir;

    static PING: EventKey = EventKey::root("ping");

    struct Ping;

    impl Event for Ping {
        fn key(&self) -> &'static EventKey {
            &PING
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct ComponentRegistrar {
        component: &'static str,
        broken: bool,
    }

    #[async_trait]
    impl BotRegistrar for ComponentRegistrar {
        fn name(&self) -> &str {
            self.component
        }

        async fn register(&self, info: &BotVerifyInfo) -> Result<Id, RegisterError> {
            if info.component() != self.component {
                return Err(RegisterError::mismatch(self.component, info.component()));
            }
            if self.broken {
                return Err(RegisterError::failed("account locked"));
            }
            let code = info.data()["code"].as_i64().unwrap_or_default();
            Ok(Id::from(code))
        }
    }

    fn bot_dir() -> TempDir {
        let temp = TempDir::new().unwrap();
        for (file, component, code) in [
            ("a.bot.json", "alpha", 1),
            ("b.bot.json", "beta", 2),
            ("c.bot.json", "gamma", 3),
        ] {
            let doc = json!({ "component": component, "code": code });
            std::fs::write(temp.path().join(file), doc.to_string()).unwrap();
        }
        temp
    }

    fn config_for(dir: &Path) -> ChimeConfig {
        let mut config = ChimeConfig::default();
        config.bots.directories = vec![PathBuf::from(dir)];
        config
    }

    #[tokio::test]
    async fn test_start_registers_bots_from_records() {
        let dir = bot_dir();
        let runtime =
            ChimeRuntime::from_config(config_for(dir.path()), ManagerConfiguration::new()).unwrap();
        runtime
            .register_registrar(ComponentRegistrar {
                component: "alpha",
                broken: false,
            })
            .await;
        runtime
            .register_registrar(ComponentRegistrar {
                component: "beta",
                broken: false,
            })
            .await;

        runtime.run_until(async {}).await.unwrap();

        let bots = runtime.bots().await;
        assert_eq!(bots.len(), 2);
        assert_eq!(bots[0].id, Id::from(1_i64));
        assert_eq!(bots[0].registrar, "alpha");
        assert_eq!(bots[1].component, "beta");
        assert_eq!(bots[1].record, "b.bot.json");
        assert!(!runtime.is_running().await);
    }

    #[tokio::test]
    async fn test_registrar_failure_aborts_start() {
        let dir = bot_dir();
        let runtime =
            ChimeRuntime::from_config(config_for(dir.path()), ManagerConfiguration::new()).unwrap();
        runtime
            .register_registrar(ComponentRegistrar {
                component: "beta",
                broken: true,
            })
            .await;

        let err = runtime.start().await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Register { ref record, .. } if record == "b.bot.json"
        ));
    }

    #[tokio::test]
    async fn test_auto_load_disabled() {
        let dir = bot_dir();
        let mut config = config_for(dir.path());
        config.bots.auto_load = false;
        let runtime = ChimeRuntime::from_config(config, ManagerConfiguration::new()).unwrap();
        runtime
            .register_registrar(ComponentRegistrar {
                component: "alpha",
                broken: false,
            })
            .await;

        runtime.start().await.unwrap();
        assert!(runtime.is_running().await);
        assert!(runtime.bots().await.is_empty());

        let loaded = runtime.load_bots_from(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_builder_applies_dispatch_settings() {
        let temp = TempDir::new().unwrap();
        let mut config = config_for(temp.path());
        config.dispatch.catch_panics = false;

        let runtime = ChimeRuntime::builder()
            .search_path(temp.path())
            .without_env()
            .merge(config)
            .manager(ManagerConfiguration::new().add_listener(listener(&PING, || async { "pong" })))
            .build()
            .unwrap();

        assert!(!runtime.manager().settings().catch_panics);
        let result = runtime
            .manager()
            .dispatch(BoxedEvent::new(Ping))
            .await
            .unwrap();
        assert_eq!(result.contents(), vec![&json!("pong")]);
    }
}
