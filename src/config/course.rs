//! `[course]` section configuration.
//!
//! Values substituted into author-facing placeholders of generated HTML.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[course]` section in coursync.toml - course metadata.
///
/// # Example
/// ```toml
/// [course]
/// name = "AI Fundamentals"
/// url = "https://learn.example.com/ai-fundamentals"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CourseConfig {
    /// Replaces `%COURSE_NAME%`.
    #[serde(default = "defaults::course::name")]
    #[educe(Default = defaults::course::name())]
    pub name: String,

    /// Replaces `%COURSE_URL%`.
    #[serde(default = "defaults::course::url")]
    #[educe(Default = defaults::course::url())]
    pub url: String,
}
