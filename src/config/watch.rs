//! `[watch]` section configuration.

use serde::{Deserialize, Serialize};

/// `[watch]` section in coursync.toml - image watcher settings.
///
/// # Example
/// ```toml
/// [watch]
/// build = ["npm", "run", "build"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// External build command run from the project root when an image is added
    /// or modified. Empty means only the asset sync pass runs.
    #[serde(default)]
    pub build: Vec<String>,
}
