//! Project configuration management for `coursync.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                           |
//! |-------------|---------------------------------------------------|
//! | `[course]`  | Values for HTML placeholders (name, url)          |
//! | `[sync]`    | Content root, extensions, destinations, prune     |
//! | `[watch]`   | External build command run on image changes       |
//! | `[serve]`   | Development server (port, interface, root, watch) |
//!
//! # Example
//!
//! ```toml
//! [course]
//! name = "AI Fundamentals"
//! url = "https://learn.example.com/ai"
//!
//! [sync]
//! content = "src/sections"
//! env = "development"
//!
//! [watch]
//! build = ["npm", "run", "build"]
//!
//! [serve]
//! port = 5173
//! ```
//!
//! The loaded config is built once in `main` and handed to every component
//! that needs it; there is no global config state.

mod course;
pub mod defaults;
mod error;
mod serve;
mod sync;
mod watch;

pub use course::CourseConfig;
pub use error::ConfigError;
pub use sync::Environment;

use serve::ServeConfig;
use sync::SyncConfig;
use watch::WatchConfig;

use crate::cli::{Cli, Commands};
use crate::log;
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing coursync.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Absolute project root (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    /// Course metadata for HTML placeholders
    #[serde(default)]
    pub course: CourseConfig,

    /// Asset synchronization settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Image watcher settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl ProjectConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: ProjectConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Load the config for a CLI invocation, apply CLI overrides and validate it.
    ///
    /// A missing config file is not an error: every section has usable defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            log!("config"; "{} not found, using defaults", cli.config.display());
            Self::default()
        };

        config.update_with_cli(cli);
        config.validate(cli)?;
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Destination directory of the configured environment.
    pub fn destination(&self) -> &Path {
        self.sync.destination_dir()
    }

    /// Update configuration with CLI arguments and resolve every path against root.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        Self::update_option(&mut self.sync.content, cli.content.as_ref());
        Self::update_option(&mut self.sync.env, cli.env.as_ref());

        // The preview server always mirrors into the development destination
        if cli.is_serve() && self.sync.env != Environment::Development {
            log!("config"; "serve uses the development destination, ignoring env {}", self.sync.env);
            self.sync.env = Environment::Development;
        }
        Self::update_option(self.sync.destination_dir_mut(), cli.dest.as_ref());

        if let Commands::Serve {
            interface,
            port,
            watch,
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.watch, watch.as_ref());
        }

        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        self.update_path_with_root(root, &cli.config);
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve all paths relative to root and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path, config_name: &Path) {
        let root = Self::normalize_path(&Self::expand(root));
        self.config_path = Self::normalize_path(&root.join(config_name));

        let resolve = |path: &Path| Self::normalize_path(&root.join(Self::expand(path)));
        self.sync.content = resolve(&self.sync.content);
        self.sync.destination.development = resolve(&self.sync.destination.development);
        self.sync.destination.production = resolve(&self.sync.destination.production);
        self.serve.root = resolve(&self.serve.root);

        self.root = root;
    }

    /// Expand a leading `~` to the home directory.
    fn expand(path: &Path) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration for the current command
    pub fn validate(&self, cli: &Cli) -> Result<()> {
        if self.sync.extensions.is_empty() {
            bail!(ConfigError::Validation(
                "[sync.extensions] must have at least one element".into()
            ));
        }

        if let Some(ext) = self
            .sync
            .extensions
            .iter()
            .find(|ext| ext.trim_start_matches('.').trim().is_empty())
        {
            bail!(ConfigError::Validation(format!(
                "[sync.extensions] contains an empty extension: {ext:?}"
            )));
        }

        if cli.is_watch() {
            self.check_build_command()?;
        }

        if cli.is_serve() {
            self.serve.interface.parse::<IpAddr>().map_err(|_| {
                ConfigError::Validation(format!(
                    "[serve.interface] is not an IP address: {}",
                    self.serve.interface
                ))
            })?;
            if self.serve.watch {
                self.check_build_command()?;
            }
        }

        Ok(())
    }

    /// Check the configured build command (if any) is installed.
    fn check_build_command(&self) -> Result<()> {
        match self.watch.build.first() {
            None => Ok(()),
            Some(cmd) if cmd.trim().is_empty() => bail!(ConfigError::Validation(
                "[watch.build] command name is empty".into()
            )),
            Some(cmd) => {
                which::which(cmd)
                    .with_context(|| format!("`{cmd}` not found. Please install it first."))?;
                Ok(())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
