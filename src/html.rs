//! Post-processing of generated course HTML.
//!
//! Two rewrites are applied:
//!
//! - `%COURSE_NAME%` / `%COURSE_URL%` placeholders become the `[course]` values
//! - `class="language-<alias>"` on code blocks becomes the highlighter's
//!   canonical language name (`language-sh` → `language-bash`)

use crate::{config::CourseConfig, log};
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
};

const NAME_PLACEHOLDER: &str = "%COURSE_NAME%";
const URL_PLACEHOLDER: &str = "%COURSE_URL%";

/// Code-fence aliases and the language the highlighter knows them by.
const LANGUAGE_ALIASES: &[(&str, &str)] = &[
    ("sh", "bash"),
    ("shell", "bash"),
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "javascript"),
    ("tsx", "javascript"),
    ("yml", "yaml"),
    ("cs", "csharp"),
    ("html", "markup"),
    ("xml", "markup"),
];

fn canonical_language(alias: &str) -> Option<&'static str> {
    LANGUAGE_ALIASES
        .iter()
        .find(|(from, _)| *from == alias)
        .map(|(_, to)| *to)
}

/// Substitute course placeholders. Text without placeholders is returned unchanged.
pub fn replace_placeholders(html: &str, course: &CourseConfig) -> String {
    html.replace(NAME_PLACEHOLDER, &course.name)
        .replace(URL_PLACEHOLDER, &course.url)
}

/// Applies placeholder substitution and language normalization.
///
/// Built once per run; holds the compiled class matcher.
pub struct HtmlProcessor {
    course: CourseConfig,
    language_class: Regex,
}

impl HtmlProcessor {
    pub fn new(course: &CourseConfig) -> Result<Self> {
        let language_class = Regex::new(r#"class="language-([A-Za-z0-9_+#-]+)""#)
            .context("Failed to compile language class pattern")?;

        Ok(Self {
            course: course.clone(),
            language_class,
        })
    }

    pub fn replace_placeholders(&self, html: &str) -> String {
        replace_placeholders(html, &self.course)
    }

    /// Rewrite aliased `class="language-…"` values.
    ///
    /// Only a class attribute that is exactly one `language-<alias>` token is
    /// touched, so `language-json` or `language-js line-numbers` stay as they are.
    pub fn normalize_code_languages<'a>(&self, html: &'a str) -> Cow<'a, str> {
        self.language_class.replace_all(html, |caps: &Captures| {
            match canonical_language(&caps[1]) {
                Some(language) => format!(r#"class="language-{language}""#),
                None => caps[0].to_string(),
            }
        })
    }

    pub fn process(&self, html: &str) -> String {
        let replaced = self.replace_placeholders(html);
        self.normalize_code_languages(&replaced).into_owned()
    }

    /// Process `input` and write it to `output`, or back to `input` when `None`.
    ///
    /// Returns the path written.
    pub fn process_file(&self, input: &Path, output: Option<&Path>) -> Result<PathBuf> {
        let html = fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;

        let processed = self.process(&html);
        let target = output.unwrap_or(input);

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(target, &processed)
            .with_context(|| format!("Failed to write {}", target.display()))?;

        if processed == html {
            log!("html"; "{}: nothing to replace", target.display());
        } else {
            log!("html"; "{}: updated", target.display());
        }
        Ok(target.to_path_buf())
    }
}
