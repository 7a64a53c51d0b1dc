//! Preview configuration, loaded from a TOML file.
//!
//! ```toml
//! template = "article"
//!
//! [tokenizer]
//! html = true
//! linkify = true
//! typographer = false
//!
//! [emoji]
//! ascii = true
//! sprite = true
//!
//! [watch]
//! poll-interval-ms = 500
//!
//! [log]
//! max-level = "info"
//! ```

use crate::error::PreviewError;
use crate::watcher::WatcherConfig;
use pulldown_cmark::Options;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Flags handed to the tokenizer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TokenizerOptions {
    /// Allow raw HTML through to the sanitizer. When off, raw HTML is kept as literal text.
    pub html: bool,
    /// Turn bare `http(s)://` URLs into links.
    pub linkify: bool,
    /// Smart quotes and dashes.
    pub typographer: bool,
    pub tables: bool,
    pub strikethrough: bool,
    pub tasklists: bool,
    pub footnotes: bool,
    /// Heading attributes (`{#id .class}`).
    pub heading_attributes: bool,
    /// GitHub alert blockquotes (`> [!NOTE]`).
    pub alerts: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            html: true,
            linkify: true,
            typographer: true,
            tables: true,
            strikethrough: true,
            tasklists: true,
            footnotes: true,
            heading_attributes: true,
            alerts: true,
        }
    }
}

impl TokenizerOptions {
    pub(crate) fn to_pulldown_options(&self) -> Options {
        let mut options = Options::empty();
        if self.tables {
            options.insert(Options::ENABLE_TABLES);
        }
        if self.strikethrough {
            options.insert(Options::ENABLE_STRIKETHROUGH);
        }
        if self.tasklists {
            options.insert(Options::ENABLE_TASKLISTS);
        }
        if self.footnotes {
            options.insert(Options::ENABLE_FOOTNOTES);
        }
        if self.heading_attributes {
            options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        }
        if self.typographer {
            options.insert(Options::ENABLE_SMART_PUNCTUATION);
        }
        if self.alerts {
            options.insert(Options::ENABLE_GFM);
        }
        options
    }
}

/// Code highlighting.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct HighlightConfig {
    /// Class put on every highlighted `<code>` element.
    pub class_prefix: String,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            class_prefix: "hljs".into(),
        }
    }
}

/// Emoji substitution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct EmojiConfig {
    /// Recognize ascii shortcuts such as `:)` and `<3`.
    pub ascii: bool,
    /// Render sprite-sheet spans instead of `<img>` tags.
    pub sprite: bool,
    /// Base URL of the emoji images when `sprite` is off.
    pub image_base_url: String,
}

impl Default for EmojiConfig {
    fn default() -> Self {
        Self {
            ascii: true,
            sprite: true,
            image_base_url: "https://cdn.jsdelivr.net/gh/twitter/twemoji@14.0.2/assets/72x72"
                .into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LogConfig {
    /// Specify the log file path.
    pub log_file: Option<String>,

    /// Specify the max log level.
    pub max_level: String,

    /// Extra `tracing_subscriber::EnvFilter` directives.
    ///
    /// ```toml
    /// [log]
    /// log-target = "live_preview_core::cache=trace"
    /// ```
    pub log_target: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            max_level: "info".into(),
            log_target: "".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Template used when the caller does not pick one.
    pub template: Option<String>,
    pub tokenizer: TokenizerOptions,
    pub highlight: HighlightConfig,
    pub emoji: EmojiConfig,
    pub watch: WatcherConfig,
    pub log: LogConfig,
}

impl PreviewConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, PreviewError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load the config file, falling back to the defaults.
    ///
    /// A missing file silently yields the defaults. A file that fails to
    /// parse also yields the defaults, and the error is handed back so the
    /// caller can report it.
    pub fn load(path: Option<&Path>) -> (Self, Option<PreviewError>) {
        let Some(path) = path else {
            return (Self::default(), None);
        };

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                return (Self::default(), None);
            }
            Err(err) => return (Self::default(), Some(err.into())),
        };

        match Self::from_toml_str(&contents) {
            Ok(config) => (config, None),
            Err(err) => (Self::default(), Some(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_from_empty_file() {
        let config = PreviewConfig::from_toml_str("").unwrap();
        assert_eq!(config, PreviewConfig::default());
        assert!(config.tokenizer.html);
        assert_eq!(config.highlight.class_prefix, "hljs");
    }

    #[test]
    fn test_partial_config() {
        let toml_content = r#"
          template = "article"

          [tokenizer]
          linkify = false

          [emoji]
          sprite = false
          image-base-url = "/emoji"

          [watch]
          force-polling = true
"#;
        let config = PreviewConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.template.as_deref(), Some("article"));
        assert!(!config.tokenizer.linkify);
        assert!(config.tokenizer.typographer);
        assert!(!config.emoji.sprite);
        assert_eq!(config.emoji.image_base_url, "/emoji");
        assert!(config.watch.force_polling);
        assert_eq!(config.watch.poll_interval_ms, 1000);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = PreviewConfig::from_toml_str("[tokenizer]\nmath = true").unwrap_err();
        assert!(matches!(err, PreviewError::Config(_)));
    }

    #[test]
    fn test_load_reports_error_and_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "template = ").unwrap();
        let (config, err) = PreviewConfig::load(Some(file.path()));
        assert_eq!(config, PreviewConfig::default());
        assert!(err.is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (config, err) = PreviewConfig::load(Some(&dir.path().join("config.toml")));
        assert_eq!(config, PreviewConfig::default());
        assert!(err.is_none());
    }

    #[test]
    fn test_pulldown_options() {
        let mut options = TokenizerOptions::default();
        assert!(options
            .to_pulldown_options()
            .contains(Options::ENABLE_SMART_PUNCTUATION));
        options.typographer = false;
        options.footnotes = false;
        let flags = options.to_pulldown_options();
        assert!(!flags.contains(Options::ENABLE_SMART_PUNCTUATION));
        assert!(!flags.contains(Options::ENABLE_FOOTNOTES));
        assert!(flags.contains(Options::ENABLE_TABLES));
    }
}
