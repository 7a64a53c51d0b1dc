//! HTML sanitization backed by ammonia.

use crate::error::PreviewError;

/// Cleans untrusted HTML.
pub trait Sanitize: Send + Sync {
    fn sanitize(&self, html: &str) -> Result<String, PreviewError>;
}

pub struct AmmoniaSanitizer {
    builder: ammonia::Builder<'static>,
}

impl Default for AmmoniaSanitizer {
    fn default() -> Self {
        let mut builder = ammonia::Builder::default();
        builder.add_generic_attributes(&["class", "id", "align"]);
        Self { builder }
    }
}

impl Sanitize for AmmoniaSanitizer {
    fn sanitize(&self, html: &str) -> Result<String, PreviewError> {
        Ok(self.builder.clean(html).to_string())
    }
}
