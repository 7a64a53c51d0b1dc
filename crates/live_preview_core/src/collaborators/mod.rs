//! External collaborators of the pipeline and their one-shot loading.
//!
//! - [`Highlight`]: syntax highlighting of fenced code ([`SyntectHighlighter`])
//! - [`Sanitize`]: cleaning of raw HTML ([`AmmoniaSanitizer`])
//! - [`SubstituteEmoji`]: emoji shortcuts to images ([`EmojiImages`])
//!
//! Loading the syntax definitions is slow, so [`Collaborators::load`] builds
//! the bundle on a blocking task and hands it over through a oneshot channel.

mod emoji;
mod highlight;
mod sanitize;

pub use emoji::{EmojiImages, SubstituteEmoji};
pub use highlight::{Highlight, Highlighted, SyntectHighlighter};
pub use sanitize::{AmmoniaSanitizer, Sanitize};

use crate::config::PreviewConfig;
use tokio::sync::oneshot;

/// Everything the pipeline needs besides the tokenizer.
pub struct Collaborators {
    pub highlighter: Box<dyn Highlight>,
    pub sanitizer: Box<dyn Sanitize>,
    pub emoji: Box<dyn SubstituteEmoji>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Build the default collaborators on the current thread.
    pub fn with_defaults(config: &PreviewConfig) -> Self {
        Self {
            highlighter: Box::new(SyntectHighlighter::load()),
            sanitizer: Box::new(AmmoniaSanitizer::default()),
            emoji: Box::new(EmojiImages::new(config.emoji.clone())),
        }
    }

    /// Start loading the default collaborators in the background.
    ///
    /// Must be called from within a tokio runtime. The receiver fails if
    /// loading panicked; the previewer then never leaves its loading state.
    pub fn load(config: &PreviewConfig) -> oneshot::Receiver<Collaborators> {
        let (tx, rx) = oneshot::channel();
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            let started = std::time::Instant::now();
            let collaborators = Collaborators::with_defaults(&config);
            tracing::debug!(elapsed = ?started.elapsed(), "Loaded preview collaborators");
            if tx.send(collaborators).is_err() {
                tracing::debug!("Previewer dropped before collaborators were ready");
            }
        });
        rx
    }
}
