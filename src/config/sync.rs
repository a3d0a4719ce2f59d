//! `[sync]` section configuration.
//!
//! Controls which images are mirrored and where they land.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// Build environment that selects the destination directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Assets served by the development server (default).
    #[default]
    Development,
    /// Assets bundled into the production build output.
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
        })
    }
}

/// `[sync.destination]` - one flat destination directory per environment.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    #[serde(default = "defaults::sync::destination::development")]
    #[educe(Default = defaults::sync::destination::development())]
    pub development: PathBuf,

    #[serde(default = "defaults::sync::destination::production")]
    #[educe(Default = defaults::sync::destination::production())]
    pub production: PathBuf,
}

/// `[sync]` section in coursync.toml - asset synchronization settings.
///
/// # Example
/// ```toml
/// [sync]
/// content = "src/sections"
/// extensions = ["png", "jpg", "svg"]
/// env = "production"
/// prune = true
///
/// [sync.destination]
/// development = "public/assets"
/// production = "dist/assets"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Content root searched recursively for images.
    #[serde(default = "defaults::sync::content")]
    #[educe(Default = defaults::sync::content())]
    pub content: PathBuf,

    /// Allow-listed extensions, matched case-insensitively. A leading dot is accepted.
    #[serde(default = "defaults::sync::extensions")]
    #[educe(Default = defaults::sync::extensions())]
    pub extensions: Vec<String>,

    /// Environment used to pick the destination directory.
    #[serde(default)]
    pub env: Environment,

    /// Remove destination images that no longer have a source counterpart.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub prune: bool,

    #[serde(default)]
    pub destination: DestinationConfig,
}

impl SyncConfig {
    /// Destination directory for the configured environment.
    pub fn destination_dir(&self) -> &PathBuf {
        match self.env {
            Environment::Development => &self.destination.development,
            Environment::Production => &self.destination.production,
        }
    }

    /// Mutable destination directory for the configured environment.
    pub fn destination_dir_mut(&mut self) -> &mut PathBuf {
        match self.env {
            Environment::Development => &mut self.destination.development,
            Environment::Production => &mut self.destination.production,
        }
    }
}
