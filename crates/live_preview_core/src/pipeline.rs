//! The render pipeline and its readiness gate.
//!
//! ```text
//! raw text → preprocess → tokenize → partition → [cache → render] per chunk → compose
//! ```
//!
//! [`Pipeline`] runs a pass synchronously with ready collaborators.
//! [`Previewer`] owns the pipeline once the collaborators have been loaded
//! and reports [`PreviewOutput::Loading`] until then.

use crate::cache::ChunkCache;
use crate::chunk::partition;
use crate::collaborators::{Collaborators, Sanitize};
use crate::config::{PreviewConfig, TokenizerOptions};
use crate::env::RenderEnvironment;
use crate::error::PreviewError;
use crate::front_matter::{preprocess, FrontMatter};
use crate::output::{PreviewOutput, RenderReport};
use crate::render::ChunkRenderer;
use crate::template::{compose, TemplateRegistry};
use crate::token::Token;
use crate::tokenize::tokenize;
use tokio::sync::oneshot::{self, error::TryRecvError};

/// Result of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub output: PreviewOutput,
    pub report: RenderReport,
}

impl Rendered {
    fn loading() -> Self {
        Self {
            output: PreviewOutput::Loading,
            report: RenderReport::default(),
        }
    }
}

pub struct Pipeline {
    collaborators: Collaborators,
    config: PreviewConfig,
    templates: TemplateRegistry,
    cache: ChunkCache,
}

impl Pipeline {
    pub fn new(
        collaborators: Collaborators,
        config: PreviewConfig,
        templates: TemplateRegistry,
    ) -> Self {
        Self {
            collaborators,
            config,
            templates,
            cache: ChunkCache::new(),
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Forget every cached fragment, the next pass renders all chunks.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Render `raw` into the template `template_id`, or into plain blocks when
    /// no template is selected.
    ///
    /// Only chunks that differ from the chunk in the same slot of the previous
    /// pass are rendered again. A tokenizer failure aborts the pass and leaves
    /// the cache as it was; an unknown template id is reported in the
    /// [`RenderReport`] and the blocks are returned instead.
    pub fn render(
        &mut self,
        raw: &str,
        template_id: Option<&str>,
    ) -> Result<Rendered, PreviewError> {
        self.render_with(raw, template_id, tokenize)
    }

    fn render_with<T>(
        &mut self,
        raw: &str,
        template_id: Option<&str>,
        tokenize: T,
    ) -> Result<Rendered, PreviewError>
    where
        T: FnOnce(
            &str,
            &mut RenderEnvironment,
            &TokenizerOptions,
            &dyn Sanitize,
        ) -> Result<Vec<Token>, PreviewError>,
    {
        let FrontMatter {
            data: metadata,
            content: body,
        } = preprocess(raw);

        let mut env = RenderEnvironment::new();
        let tokens = tokenize(
            &body,
            &mut env,
            &self.config.tokenizer,
            self.collaborators.sanitizer.as_ref(),
        )?;

        let chunks = partition(tokens);
        let chunk_count = chunks.len();

        let renderer = ChunkRenderer::new(&self.collaborators, &self.config.highlight);
        self.cache.begin_pass(&env);
        let mut fragments = Vec::with_capacity(chunk_count);
        for chunk in chunks {
            fragments.push(
                self.cache
                    .fragment(chunk, |chunk| renderer.render(chunk, &env)),
            );
        }
        let stats = self.cache.finish_pass(chunk_count);

        let (template_id, config_error) = match template_id.filter(|id| !id.is_empty()) {
            Some(id) if !self.templates.contains(id) => {
                let err = PreviewError::UnknownTemplate(id.to_string());
                tracing::warn!(
                    %err,
                    available = ?self.templates.ids(),
                    "Falling back to the block list"
                );
                (None, Some(err.to_string()))
            }
            id => (id, None),
        };

        let composed = compose(fragments, &metadata, template_id, &self.templates)?;

        tracing::debug!(
            chunks = chunk_count,
            rendered = stats.rendered,
            reused = stats.reused,
            template = ?template_id,
            "Rendered preview"
        );

        Ok(Rendered {
            output: PreviewOutput::from_composed(composed, metadata),
            report: RenderReport {
                chunks: chunk_count,
                cache: stats,
                config_error,
            },
        })
    }
}

enum Stage {
    Loading {
        rx: oneshot::Receiver<Collaborators>,
        config: PreviewConfig,
        templates: TemplateRegistry,
    },
    Ready(Pipeline),
    /// The collaborators will never arrive.
    Unavailable,
}

/// Pipeline gated on the one-time loading of its collaborators.
///
/// Nothing is rendered before the collaborators resolve. If their loader
/// goes away without delivering them the previewer keeps reporting
/// [`PreviewOutput::Loading`].
pub struct Previewer {
    stage: Stage,
}

impl Previewer {
    pub fn new(
        rx: oneshot::Receiver<Collaborators>,
        config: PreviewConfig,
        templates: TemplateRegistry,
    ) -> Self {
        Self {
            stage: Stage::Loading {
                rx,
                config,
                templates,
            },
        }
    }

    /// Start loading the default collaborators. Must be called within a tokio runtime.
    pub fn load(config: PreviewConfig, templates: TemplateRegistry) -> Self {
        let rx = Collaborators::load(&config);
        Self::new(rx, config, templates)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.stage, Stage::Ready(_))
    }

    pub fn pipeline_mut(&mut self) -> Option<&mut Pipeline> {
        match &mut self.stage {
            Stage::Ready(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    /// Wait for the collaborators. Returns `false` if they will never arrive.
    pub async fn ready(&mut self) -> bool {
        if let Stage::Loading { rx, .. } = &mut self.stage {
            let received = rx.await;
            self.advance(received.ok());
        }
        self.is_ready()
    }

    /// Pick up the collaborators without waiting.
    fn poll_ready(&mut self) {
        if let Stage::Loading { rx, .. } = &mut self.stage {
            match rx.try_recv() {
                Ok(collaborators) => self.advance(Some(collaborators)),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => self.advance(None),
            }
        }
    }

    fn advance(&mut self, collaborators: Option<Collaborators>) {
        let stage = std::mem::replace(&mut self.stage, Stage::Unavailable);
        self.stage = match (stage, collaborators) {
            (
                Stage::Loading {
                    config, templates, ..
                },
                Some(collaborators),
            ) => {
                tracing::debug!("Collaborators are ready");
                Stage::Ready(Pipeline::new(collaborators, config, templates))
            }
            (Stage::Loading { .. }, None) => {
                tracing::error!("Collaborators failed to load, the preview stays in loading state");
                Stage::Unavailable
            }
            (stage, _) => stage,
        };
    }

    /// Render `raw`, or report [`PreviewOutput::Loading`] if the collaborators
    /// have not arrived yet.
    pub fn render(
        &mut self,
        raw: &str,
        template_id: Option<&str>,
    ) -> Result<Rendered, PreviewError> {
        self.poll_ready();
        match &mut self.stage {
            Stage::Ready(pipeline) => pipeline.render(raw, template_id),
            Stage::Loading { .. } | Stage::Unavailable => Ok(Rendered::loading()),
        }
    }
}
