//! Output types handed to the display surface.

use crate::cache::CacheStats;
use crate::front_matter::Metadata;
use crate::template::Composed;
use serde::{Deserialize, Serialize};

/// What the display surface should show.
///
/// Serialized with a `type` discriminator so a frontend can switch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreviewOutput {
    /// Collaborators are not ready yet, nothing was rendered.
    Loading,
    /// Independently mountable fragments, in document order.
    Blocks {
        blocks: Vec<String>,
        #[serde(default, skip_serializing_if = "Metadata::is_empty")]
        metadata: Metadata,
    },
    /// A page produced by a template.
    Page {
        html: String,
        #[serde(default, skip_serializing_if = "Metadata::is_empty")]
        metadata: Metadata,
    },
}

impl PreviewOutput {
    pub fn from_composed(composed: Composed, metadata: Metadata) -> Self {
        match composed {
            Composed::Blocks(blocks) => Self::Blocks { blocks, metadata },
            Composed::Page(html) => Self::Page { html, metadata },
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// The output as a single HTML string, `None` while loading.
    ///
    /// ```
    /// use live_preview_core::PreviewOutput;
    ///
    /// let output = PreviewOutput::Page {
    ///     html: "<p>Hello</p>".to_string(),
    ///     metadata: Default::default(),
    /// };
    /// assert_eq!(output.to_html().as_deref(), Some("<p>Hello</p>"));
    /// ```
    pub fn to_html(&self) -> Option<String> {
        match self {
            Self::Loading => None,
            Self::Blocks { blocks, .. } => Some(Composed::Blocks(blocks.clone()).to_html()),
            Self::Page { html, .. } => Some(html.clone()),
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            Self::Loading => None,
            Self::Blocks { metadata, .. } | Self::Page { metadata, .. } => Some(metadata),
        }
    }
}

/// Bookkeeping of one render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderReport {
    /// Number of chunks the document was split into.
    pub chunks: usize,
    #[serde(flatten)]
    pub cache: CacheStats,
    /// Configuration problem noticed during the pass, e.g. an unknown template id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_error: Option<String>,
}
