//! Incremental markdown live preview.
//!
//! A document is parsed into block tokens, the tokens are split into
//! top-level chunks and only the chunks that changed since the previous pass
//! are rendered again. Rendered fragments are then composed into plain
//! blocks or a templated page.
//!
//! # Modules
//!
//! - [`front_matter`] - YAML/TOML metadata header extraction
//! - [`tokenize`] - `pulldown-cmark` events folded into [`token::Token`]s
//! - [`chunk`] - Partitioning tokens into cacheable chunks
//! - [`cache`] - Change detection and the per-slot fragment cache
//! - [`render`] - Chunk to HTML, with highlighting and emoji
//! - [`template`] - Template registry and composition
//! - [`pipeline`] - The whole pass and the readiness gate
//! - [`scroll`] - Cursor fraction to viewport scroll offset
//! - [`watcher`] - File watching abstraction

pub mod alert;
pub mod cache;
pub mod chunk;
pub mod collaborators;
pub mod config;
pub mod env;
pub mod error;
pub mod front_matter;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod scroll;
pub mod template;
pub mod token;
pub mod tokenize;
pub mod watcher;

// Re-export commonly used types at crate root
pub use cache::{should_rerender, CacheStats, ChunkCache};
pub use chunk::{partition, Chunk};
pub use collaborators::Collaborators;
pub use config::PreviewConfig;
pub use env::RenderEnvironment;
pub use error::PreviewError;
pub use front_matter::{preprocess, FrontMatter, Metadata};
pub use output::{PreviewOutput, RenderReport};
pub use pipeline::{Pipeline, Previewer, Rendered};
pub use scroll::{FrameScheduler, FrameTicker, ScrollSync, Viewport};
pub use template::{compose, Composed, Template, TemplateRegistry};
pub use token::{Nesting, Token, TokenKind};
pub use tokenize::tokenize;
pub use watcher::{DocumentWatcher, WatcherConfig};
