//! Rendering one chunk to an HTML fragment.

use crate::alert::Alert;
use crate::chunk::Chunk;
use crate::collaborators::{Collaborators, Highlight, SubstituteEmoji};
use crate::config::HighlightConfig;
use crate::env::RenderEnvironment;
use crate::token::{Token, TokenKind};
use crate::tokenize::slugify;
use pulldown_cmark::{CodeBlockKind, CowStr, Event, Tag, TagEnd};

/// Renders chunks with the collaborators of a ready previewer.
///
/// Chunks must be rendered in document order against the environment of the
/// pass that produced them, footnote numbers are read from it.
pub struct ChunkRenderer<'a> {
    highlighter: &'a dyn Highlight,
    emoji: &'a dyn SubstituteEmoji,
    config: &'a HighlightConfig,
}

impl<'a> ChunkRenderer<'a> {
    pub fn new(collaborators: &'a Collaborators, config: &'a HighlightConfig) -> Self {
        Self {
            highlighter: collaborators.highlighter.as_ref(),
            emoji: collaborators.emoji.as_ref(),
            config,
        }
    }

    /// Render `chunk` to HTML.
    ///
    /// Fence tokens get the class chosen by highlighting written into their
    /// `attrs`, which is the only mutation a chunk goes through.
    pub fn render(&self, chunk: &mut Chunk, env: &RenderEnvironment) -> String {
        let mut events = Vec::with_capacity(chunk.len());
        for token in chunk.tokens_mut() {
            self.push_events(token, env, &mut events);
        }

        let mut html = String::new();
        pulldown_cmark::html::push_html(&mut html, events.into_iter());
        self.emoji.to_image(&html)
    }

    fn push_events(
        &self,
        token: &mut Token,
        env: &RenderEnvironment,
        events: &mut Vec<Event<'static>>,
    ) {
        match &token.kind {
            TokenKind::Open(Tag::FootnoteDefinition(label)) => {
                let label = ammonia::clean_text(label);
                let number = footnote_label(env, &label);
                events.push(Event::Html(
                    format!(
                        r#"<div class="footnote-definition" id="{label}"><sup class="footnote-definition-label">{number}</sup>"#
                    )
                    .into(),
                ));
            }
            TokenKind::Close(TagEnd::FootnoteDefinition) => {
                events.push(Event::Html("</div>\n".into()));
            }
            TokenKind::Open(Tag::BlockQuote(Some(kind))) => {
                events.push(Event::Html(Alert::of(*kind).open_html().into()));
            }
            TokenKind::Close(TagEnd::BlockQuote(Some(_))) => {
                events.push(Event::Html("</div>\n".into()));
            }
            TokenKind::Open(tag) => events.push(Event::Start(tag.clone())),
            TokenKind::Close(end) => events.push(Event::End(*end)),
            TokenKind::Inline(inline) => {
                events.extend(inline.iter().map(|event| match event {
                    Event::FootnoteReference(label) => footnote_reference(env, label),
                    other => other.clone(),
                }));
            }
            TokenKind::Fence { info } => {
                let lang = info.split_whitespace().next().unwrap_or_default().to_string();
                let (class, body) = self.highlight_fence(&token.content, &lang);
                events.push(Event::Html(
                    format!(r#"<pre><code class="{class}">{body}</code></pre>"#).into(),
                ));
                events.push(Event::Html("\n".into()));
                token.set_attr("class", class);
            }
            TokenKind::CodeBlock => {
                events.push(Event::Start(Tag::CodeBlock(CodeBlockKind::Indented)));
                events.push(Event::Text(token.content.clone().into()));
                events.push(Event::End(TagEnd::CodeBlock));
            }
            TokenKind::HtmlBlock => events.push(Event::Html(token.content.clone().into())),
            TokenKind::Rule => events.push(Event::Rule),
        }
    }

    /// Returns the `class` attribute and the highlighted body of a fence.
    fn highlight_fence(&self, code: &str, lang: &str) -> (String, String) {
        let prefix = &self.config.class_prefix;

        let result = if !lang.is_empty() && self.highlighter.get_language(lang) {
            self.highlighter
                .highlight(code, lang)
                .map(|html| (Some(lang.to_string()), html))
        } else {
            // An info string the highlighter does not know still names the
            // language for client-side renderers such as mermaid.
            self.highlighter.highlight_auto(code).map(|highlighted| {
                let language = if lang.is_empty() {
                    highlighted.language
                } else {
                    Some(lang.to_string())
                };
                (language, highlighted.value)
            })
        };

        match result {
            Ok((Some(language), html)) => {
                (format!("{prefix} language-{}", slugify(&language)), html)
            }
            Ok((None, html)) => (prefix.clone(), html),
            Err(err) => {
                tracing::warn!(?err, lang, "Failed to highlight code block, rendering it empty");
                (prefix.clone(), String::new())
            }
        }
    }
}

fn footnote_label(env: &RenderEnvironment, label: &str) -> String {
    match env.footnote(label) {
        Some(number) => number.to_string(),
        None => {
            tracing::debug!(label, "Footnote missing from the environment");
            label.to_string()
        }
    }
}

fn footnote_reference(env: &RenderEnvironment, label: &CowStr<'_>) -> Event<'static> {
    let label = ammonia::clean_text(label);
    let number = footnote_label(env, &label);
    Event::InlineHtml(
        format!(r##"<sup class="footnote-reference"><a href="#{label}">{number}</a></sup>"##)
            .into(),
    )
}
