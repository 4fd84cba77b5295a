//! Application bootstrap shared by the web and CLI entrypoints.
//!
//! Loads `.env`, builds the container, loads the configuration into it and
//! registers the event listeners. It never builds a request or touches the router.
//!
//! ``` rust,no_run
//! let app = handlr::bootstrap::app()?;
//! let config = app.config();
//! println!("{} (debug: {})", config.app.env, config.app.debug);
//! # Ok::<(), handlr::bootstrap::BootstrapError>(())
//! ```

use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::{
    app::events::EventServiceProvider,
    auth::AuthContext,
    core::{
        configuration::{ConfigError, Configuration, Loader},
        container::{Container, ContainerError},
        events::EventManager,
        log::{FileLogger, Logger},
    },
    database::{Db, DbInterface},
    environment::{Environment, EnvironmentError},
};

/// Environment variable naming the application root.
pub const APP_ROOT_VAR: &str = "HANDLR_APP_ROOT";
/// Configuration file, relative to the application root.
pub const CONFIG_FILE: &str = "app/config.yaml";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("cannot determine the application root: {0}")]
    Root(#[source] std::io::Error),
}

/// The application root directory, registered in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRoot(PathBuf);

impl AppRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Resolves `path` against the root unless it is already absolute.
    pub fn join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.0.join(path)
    }
}

type EnvironmentLoader = Box<dyn FnOnce(&Path) -> Result<Environment, EnvironmentError> + Send>;

/// Inputs of a bootstrap run.
pub struct BootstrapOptions {
    root: PathBuf,
    config_path: Option<PathBuf>,
    environment: EnvironmentLoader,
}

impl BootstrapOptions {
    /// Reads `.env` under `root` and the process environment.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_path: None,
            environment: Box::new(Environment::load),
        }
    }

    /// Root from `HANDLR_APP_ROOT`, falling back to the working directory.
    pub fn from_process() -> Result<Self, BootstrapError> {
        let root = match env::var_os(APP_ROOT_VAR) {
            Some(root) => PathBuf::from(root),
            None => env::current_dir().map_err(BootstrapError::Root)?,
        };
        Ok(Self::new(root))
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Replaces how the environment is obtained.
    pub fn environment<F>(mut self, loader: F) -> Self
    where
        F: FnOnce(&Path) -> Result<Environment, EnvironmentError> + Send + 'static,
    {
        self.environment = Box::new(loader);
        self
    }

    fn resolved_config_path(&self) -> PathBuf {
        match &self.config_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.root.join(path),
            None => self.root.join(CONFIG_FILE),
        }
    }
}

/// The bootstrapped application: container, configuration and environment.
#[derive(Debug)]
pub struct App {
    container: Arc<Container>,
    config: Arc<Configuration>,
    environment: Arc<Environment>,
    root: AppRoot,
}

impl App {
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn root(&self) -> &AppRoot {
        &self.root
    }
}

/// Runs every bootstrap step. Use [`app`] or an [`AppCell`] to memoize it.
pub fn boot(options: BootstrapOptions) -> Result<App, BootstrapError> {
    let config_path = options.resolved_config_path();
    let root = AppRoot::new(options.root);
    tracing::info!(root = %root.path().display(), "bootstrapping application");

    let environment = Arc::new((options.environment)(root.path())?);

    let mut container = Container::new();
    container
        .bind::<dyn DbInterface, _>(|c| {
            let config = c.get::<Configuration>()?;
            Ok(Arc::new(Db::from_settings(&config.database)?) as Arc<dyn DbInterface>)
        })
        .bind::<AuthContext, _>(|_| Ok(Arc::new(AuthContext::new())))
        .singleton::<EventManager, _>(|_| Ok(Arc::new(EventManager::new())))
        .singleton::<dyn Logger, _>(|c| {
            let config = c.get::<Configuration>()?;
            let root = c.get::<AppRoot>()?;
            let logging = &config.logging;
            Ok(Arc::new(FileLogger::new(
                root.join(&logging.file),
                logging.channel.clone(),
                logging.level,
            )) as Arc<dyn Logger>)
        })
        .instance(Arc::new(root.clone()))
        .instance(environment.clone());

    let config = Loader::load(&config_path, &mut container, &environment)?;

    let events = container.get::<EventManager>()?;
    EventServiceProvider::register(&container, &events)?;

    tracing::info!(env = %config.app.env, debug = config.app.debug, "application bootstrapped");
    Ok(App {
        container: Arc::new(container),
        config,
        environment,
        root,
    })
}

/// Holds the application once it has been bootstrapped.
///
/// The first successful [`AppCell::get_or_boot`] stores the application; every later
/// call returns that same instance without running the bootstrap again. A failed
/// bootstrap stores nothing, so the next call retries.
#[derive(Debug, Default)]
pub struct AppCell {
    cell: OnceCell<App>,
}

impl AppCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_boot<F>(&self, options: F) -> Result<&App, BootstrapError>
    where
        F: FnOnce() -> Result<BootstrapOptions, BootstrapError>,
    {
        self.cell.get_or_try_init(|| boot(options()?))
    }

    pub fn get(&self) -> Option<&App> {
        self.cell.get()
    }
}

static APP: AppCell = AppCell::new();

/// The process-wide application, bootstrapped from the process environment on
/// first use.
pub fn app() -> Result<&'static App, BootstrapError> {
    APP.get_or_boot(BootstrapOptions::from_process)
}

/// Like [`app`], with explicit options for the first call. Options are ignored
/// once the application exists.
pub fn app_with<F>(options: F) -> Result<&'static App, BootstrapError>
where
    F: FnOnce() -> Result<BootstrapOptions, BootstrapError>,
{
    APP.get_or_boot(options)
}
