//! Error type shared by every stage of the preview pipeline.

/// Error type for preview operations.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// I/O error while reading a document or config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tokenizer could not make sense of the document body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// No template is registered under the requested id.
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    /// The config file is not valid TOML or has unknown fields.
    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    /// The highlighter failed on a code span.
    #[error("Highlight error: {0}")]
    Highlight(String),

    /// The sanitizer failed on an HTML fragment.
    #[error("Sanitize error: {0}")]
    Sanitize(String),

    /// The document could not be watched for changes.
    #[error("Watch error: {0}")]
    Watch(String),
}
