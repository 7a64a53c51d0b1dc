//! Tokenizer adapter: markdown body text to block tokens.
//!
//! `pulldown-cmark` produces a flat event stream. It is folded here into the
//! token shape the partitioner works with (see [`crate::token`]), while the
//! cross-chunk facts (link references, footnote numbers, heading anchors) are
//! recorded in the [`RenderEnvironment`] in document order. Raw HTML never
//! leaves this module unsanitized.

use crate::collaborators::Sanitize;
use crate::config::TokenizerOptions;
use crate::env::RenderEnvironment;
use crate::error::PreviewError;
use crate::token::{Token, TokenKind};
use pulldown_cmark::{CodeBlockKind, CowStr, Event, LinkType, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::LazyLock;

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>]+").expect("valid url regex"));

static IMAGE_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:image/(gif|png|jpeg|webp);").expect("valid data url regex")
});

/// Whether a link or image destination may reach the output.
///
/// `javascript:`, `vbscript:` and `file:` are refused everywhere, `data:` only
/// passes for raster images in an image source.
fn is_safe_destination(dest: &str, is_image: bool) -> bool {
    // Browsers ignore embedded whitespace and control characters in schemes.
    let normalized = dest
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    let Some((scheme, _)) = normalized.split_once(':') else {
        return true;
    };
    match scheme {
        "javascript" | "vbscript" | "file" => false,
        "data" => is_image && IMAGE_DATA.is_match(&normalized),
        _ => true,
    }
}

fn safe_destination(dest: CowStr<'_>, is_image: bool) -> CowStr<'_> {
    if is_safe_destination(&dest, is_image) {
        dest
    } else {
        tracing::debug!(dest = %dest, "Dropping unsafe link destination");
        CowStr::Borrowed("")
    }
}

/// Generate a URL-friendly anchor from heading text.
///
/// ```
/// use live_preview_core::tokenize::slugify;
///
/// assert_eq!(slugify("Hello, World!"), "hello-world");
/// ```
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else if c == ' ' || c == '-' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        // Collapse multiple hyphens into one
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn is_block_tag(tag: &Tag) -> bool {
    matches!(
        tag,
        Tag::Paragraph
            | Tag::Heading { .. }
            | Tag::BlockQuote(_)
            | Tag::List(_)
            | Tag::Item
            | Tag::FootnoteDefinition(_)
            | Tag::Table(_)
            | Tag::TableHead
            | Tag::TableRow
            | Tag::TableCell
    )
}

fn is_block_end(end: &TagEnd) -> bool {
    matches!(
        end,
        TagEnd::Paragraph
            | TagEnd::Heading(_)
            | TagEnd::BlockQuote(_)
            | TagEnd::List(_)
            | TagEnd::Item
            | TagEnd::FootnoteDefinition
            | TagEnd::Table
            | TagEnd::TableHead
            | TagEnd::TableRow
            | TagEnd::TableCell
    )
}

/// Plain text of the heading that starts right before `ahead`.
fn heading_text(ahead: &[Event]) -> String {
    let mut text = String::new();
    for event in ahead {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::End(TagEnd::Heading(_)) => break,
            _ => {}
        }
    }
    text.replace('`', "")
}

/// Code or HTML block whose text is still being collected.
struct LeafBlock {
    kind: TokenKind,
    content: String,
}

struct Folder<'a> {
    options: &'a TokenizerOptions,
    sanitizer: &'a dyn Sanitize,
    tokens: Vec<Token>,
    level: usize,
    inline: Vec<Event<'static>>,
    inline_text: String,
    link_depth: usize,
    leaf: Option<LeafBlock>,
}

impl<'a> Folder<'a> {
    fn new(options: &'a TokenizerOptions, sanitizer: &'a dyn Sanitize) -> Self {
        Self {
            options,
            sanitizer,
            tokens: Vec::new(),
            level: 0,
            inline: Vec::new(),
            inline_text: String::new(),
            link_depth: 0,
            leaf: None,
        }
    }

    fn sanitize(&self, html: &str) -> String {
        match self.sanitizer.sanitize(html) {
            Ok(clean) => clean,
            Err(err) => {
                tracing::warn!(?err, "Sanitizer failed, dropping the HTML fragment");
                String::new()
            }
        }
    }

    fn push(
        &mut self,
        event: Event<'_>,
        ahead: &[Event<'_>],
        env: &mut RenderEnvironment,
    ) -> Result<(), PreviewError> {
        if let Some(leaf) = self.leaf.as_mut() {
            match &event {
                Event::Text(text) | Event::Html(text) => {
                    leaf.content.push_str(text);
                    return Ok(());
                }
                Event::End(TagEnd::CodeBlock | TagEnd::HtmlBlock) => {
                    self.finish_leaf();
                    return Ok(());
                }
                _ => self.finish_leaf(),
            }
        }

        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                self.flush_inline();
                let kind = match kind {
                    CodeBlockKind::Fenced(info) => TokenKind::Fence {
                        info: info.to_string(),
                    },
                    CodeBlockKind::Indented => TokenKind::CodeBlock,
                };
                self.leaf = Some(LeafBlock {
                    kind,
                    content: String::new(),
                });
            }
            Event::Start(Tag::HtmlBlock) => {
                self.flush_inline();
                self.leaf = Some(LeafBlock {
                    kind: TokenKind::HtmlBlock,
                    content: String::new(),
                });
            }
            Event::Start(tag) if is_block_tag(&tag) => {
                self.flush_inline();
                let tag = match tag {
                    Tag::Heading {
                        level,
                        id: None,
                        classes,
                        attrs,
                    } => {
                        let id = env.unique_slug(slugify(&heading_text(ahead)));
                        Tag::Heading {
                            level,
                            id: Some(id.into()),
                            classes,
                            attrs,
                        }
                    }
                    Tag::FootnoteDefinition(label) => {
                        env.footnote_number(&label);
                        Tag::FootnoteDefinition(label)
                    }
                    other => other,
                };
                self.tokens
                    .push(Token::new(TokenKind::Open(tag.into_static()), self.level));
                self.level += 1;
            }
            Event::End(end) if is_block_end(&end) => {
                self.flush_inline();
                self.level = self
                    .level
                    .checked_sub(1)
                    .ok_or_else(|| PreviewError::Parse(format!("unbalanced end of {end:?}")))?;
                self.tokens
                    .push(Token::new(TokenKind::Close(end), self.level));
            }
            Event::Rule => {
                self.flush_inline();
                self.tokens.push(Token::new(TokenKind::Rule, self.level));
            }
            Event::Start(tag) => {
                let tag = match tag {
                    Tag::Link {
                        link_type,
                        dest_url,
                        title,
                        id,
                    } => {
                        self.link_depth += 1;
                        Tag::Link {
                            link_type,
                            dest_url: safe_destination(dest_url, false),
                            title,
                            id,
                        }
                    }
                    Tag::Image {
                        link_type,
                        dest_url,
                        title,
                        id,
                    } => {
                        self.link_depth += 1;
                        Tag::Image {
                            link_type,
                            dest_url: safe_destination(dest_url, true),
                            title,
                            id,
                        }
                    }
                    other => other,
                };
                self.inline.push(Event::Start(tag.into_static()));
            }
            Event::End(end) => {
                if matches!(end, TagEnd::Link | TagEnd::Image) {
                    self.link_depth = self.link_depth.saturating_sub(1);
                }
                self.inline.push(Event::End(end));
            }
            Event::Text(text) => {
                self.inline_text.push_str(&text);
                self.push_text(text);
            }
            Event::Code(code) => {
                self.inline_text.push_str(&code);
                self.inline.push(Event::Code(code.into_static()));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                if self.options.html {
                    // Sanitized together with the rest of the run in `flush_inline`.
                    self.inline.push(Event::InlineHtml(html.into_static()));
                } else {
                    self.inline_text.push_str(&html);
                    self.inline.push(Event::Text(html.into_static()));
                }
            }
            Event::FootnoteReference(label) => {
                env.footnote_number(&label);
                self.inline
                    .push(Event::FootnoteReference(label.into_static()));
            }
            other => self.inline.push(other.into_static()),
        }

        Ok(())
    }

    fn push_text(&mut self, text: CowStr<'_>) {
        if !self.options.linkify || self.link_depth > 0 || !text.contains("://") {
            self.inline.push(Event::Text(text.into_static()));
            return;
        }

        let mut last = 0;
        for found in URL.find_iter(&text) {
            let url = found
                .as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '\'', '"']);
            if found.start() > last {
                self.inline
                    .push(Event::Text(text[last..found.start()].to_string().into()));
            }
            self.inline.push(Event::Start(Tag::Link {
                link_type: LinkType::Autolink,
                dest_url: url.to_string().into(),
                title: CowStr::Borrowed(""),
                id: CowStr::Borrowed(""),
            }));
            self.inline.push(Event::Text(url.to_string().into()));
            self.inline.push(Event::End(TagEnd::Link));
            last = found.start() + url.len();
        }
        if last < text.len() {
            self.inline.push(Event::Text(text[last..].to_string().into()));
        }
    }

    fn flush_inline(&mut self) {
        if self.inline.is_empty() {
            return;
        }
        let mut events = std::mem::take(&mut self.inline);
        if events.iter().any(|e| matches!(e, Event::InlineHtml(_))) {
            events = self.sanitize_inline_run(events);
        }
        let content = std::mem::take(&mut self.inline_text);
        self.tokens
            .push(Token::new(TokenKind::Inline(events), self.level).with_content(content));
    }

    /// Raw inline tags only make sense together with their siblings
    /// (`<kbd>` ... `</kbd>`), so the run is rendered and cleaned as a whole.
    fn sanitize_inline_run(&self, events: Vec<Event<'static>>) -> Vec<Event<'static>> {
        // Footnote numbers are resolved at render time, keep the run intact.
        if events
            .iter()
            .any(|e| matches!(e, Event::FootnoteReference(_)))
        {
            return events
                .into_iter()
                .map(|event| match event {
                    Event::InlineHtml(html) => Event::InlineHtml(self.sanitize(&html).into()),
                    other => other,
                })
                .collect();
        }

        let mut html = String::new();
        pulldown_cmark::html::push_html(&mut html, events.into_iter());
        vec![Event::InlineHtml(self.sanitize(&html).into())]
    }

    fn finish_leaf(&mut self) {
        let Some(LeafBlock { kind, content }) = self.leaf.take() else {
            return;
        };

        match kind {
            TokenKind::HtmlBlock if !self.options.html => {
                // Raw HTML is disabled: show the markup as a paragraph of text.
                let text = content.trim_end().to_string();
                self.tokens
                    .push(Token::new(TokenKind::Open(Tag::Paragraph), self.level));
                self.tokens.push(
                    Token::new(
                        TokenKind::Inline(vec![Event::Text(text.clone().into())]),
                        self.level + 1,
                    )
                    .with_content(text),
                );
                self.tokens
                    .push(Token::new(TokenKind::Close(TagEnd::Paragraph), self.level));
            }
            TokenKind::HtmlBlock => {
                let clean = self.sanitize(&content);
                self.tokens
                    .push(Token::new(TokenKind::HtmlBlock, self.level).with_content(clean));
            }
            kind => {
                self.tokens
                    .push(Token::new(kind, self.level).with_content(content));
            }
        }
    }

    fn finish(mut self) -> Vec<Token> {
        self.finish_leaf();
        self.flush_inline();
        self.tokens
    }
}

/// Parse `body` into block tokens, recording cross-chunk state in `env`.
pub fn tokenize(
    body: &str,
    env: &mut RenderEnvironment,
    options: &TokenizerOptions,
    sanitizer: &dyn Sanitize,
) -> Result<Vec<Token>, PreviewError> {
    let parser = Parser::new_ext(body, options.to_pulldown_options());

    for (label, definition) in parser.reference_definitions().iter() {
        env.define_reference(
            label,
            definition.dest.to_string(),
            definition.title.as_ref().map(|title| title.to_string()),
        );
    }

    let events: Vec<Event> = parser.collect();
    let tokens = fold_events(&events, env, options, sanitizer)?;
    tracing::trace!(events = events.len(), tokens = tokens.len(), "Tokenized body");
    Ok(tokens)
}

/// Fold an already parsed event stream into block tokens.
pub(crate) fn fold_events(
    events: &[Event<'_>],
    env: &mut RenderEnvironment,
    options: &TokenizerOptions,
    sanitizer: &dyn Sanitize,
) -> Result<Vec<Token>, PreviewError> {
    // Explicit `{#id}` anchors are reserved up front so no generated slug
    // takes them, wherever the heading sits.
    for event in events {
        if let Event::Start(Tag::Heading { id: Some(id), .. }) = event {
            env.claim_slug(id);
        }
    }

    let mut folder = Folder::new(options, sanitizer);
    for (index, event) in events.iter().enumerate() {
        folder.push(event.clone(), &events[index + 1..], env)?;
    }
    Ok(folder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::AmmoniaSanitizer;
    use crate::token::Nesting;

    fn tokens_of(body: &str) -> (Vec<Token>, RenderEnvironment) {
        tokens_with(body, &TokenizerOptions::default())
    }

    fn tokens_with(body: &str, options: &TokenizerOptions) -> (Vec<Token>, RenderEnvironment) {
        let mut env = RenderEnvironment::new();
        let tokens = tokenize(body, &mut env, options, &AmmoniaSanitizer::default()).unwrap();
        (tokens, env)
    }

    fn names(tokens: &[Token]) -> Vec<&'static str> {
        tokens.iter().map(Token::name).collect()
    }

    struct FailingSanitizer;

    impl Sanitize for FailingSanitizer {
        fn sanitize(&self, _html: &str) -> Result<String, PreviewError> {
            Err(PreviewError::Sanitize("boom".into()))
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("API Reference"), "api-reference");
        assert_eq!(slugify("what's new?"), "whats-new");
        assert_eq!(slugify("  a -- b  "), "a-b");
    }

    #[test]
    fn test_paragraph_tokens() {
        let (tokens, _) = tokens_of("Hello *world*");
        assert_eq!(names(&tokens), ["paragraph_open", "inline", "paragraph_close"]);
        assert_eq!(tokens[0].level, 0);
        assert_eq!(tokens[1].level, 1);
        assert_eq!(tokens[1].content, "Hello world");
        assert_eq!(tokens[2].nesting, Nesting::Close);
    }

    #[test]
    fn test_fence_is_one_token() {
        let (tokens, _) = tokens_of("```rust\nfn main() {}\n```\n");
        assert_eq!(names(&tokens), ["fence"]);
        assert_eq!(
            tokens[0].kind,
            TokenKind::Fence {
                info: "rust".into()
            }
        );
        assert_eq!(tokens[0].content, "fn main() {}\n");
        assert_eq!(tokens[0].nesting, Nesting::SelfContained);
    }

    #[test]
    fn test_nested_list_levels() {
        let (tokens, _) = tokens_of("- a\n  - b\n");
        assert_eq!(
            names(&tokens),
            [
                "bullet_list_open",
                "list_item_open",
                "inline",
                "bullet_list_open",
                "list_item_open",
                "inline",
                "list_item_close",
                "bullet_list_close",
                "list_item_close",
                "bullet_list_close",
            ]
        );
        let levels: Vec<usize> = tokens.iter().map(|t| t.level).collect();
        assert_eq!(levels, [0, 1, 2, 2, 3, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_html_block_is_sanitized() {
        let (tokens, _) = tokens_of("<div>\n<script>alert('x')</script>\n</div>\n");
        let html = tokens.iter().find(|t| t.name() == "html_block").unwrap();
        assert!(!html.content.contains("<script"));
        assert!(!html.content.contains("alert"));
    }

    #[test]
    fn test_inline_html_is_sanitized_as_a_run() {
        let (tokens, _) = tokens_of("Press <kbd>Ctrl</kbd> <img src=x onerror=alert(1)>\n");
        let TokenKind::Inline(events) = &tokens[1].kind else {
            panic!("expected an inline token");
        };
        assert_eq!(events.len(), 1);
        let Event::InlineHtml(html) = &events[0] else {
            panic!("expected sanitized inline html");
        };
        assert!(html.contains("<kbd>Ctrl</kbd>"));
        assert!(!html.contains("onerror"));
    }

    #[test]
    fn test_html_disabled_keeps_markup_as_text() {
        let options = TokenizerOptions {
            html: false,
            ..Default::default()
        };
        let (tokens, _) = tokens_with("<div>hi</div>\n", &options);
        assert_eq!(names(&tokens), ["paragraph_open", "inline", "paragraph_close"]);
        assert_eq!(tokens[1].content, "<div>hi</div>");
    }

    #[test]
    fn test_sanitizer_failure_empties_the_block() {
        let mut env = RenderEnvironment::new();
        let tokens = tokenize(
            "<div>x</div>\n\nafter\n",
            &mut env,
            &TokenizerOptions::default(),
            &FailingSanitizer,
        )
        .unwrap();
        assert_eq!(tokens[0].name(), "html_block");
        assert_eq!(tokens[0].content, "");
        assert_eq!(tokens[2].content, "after");
    }

    #[test]
    fn test_heading_ids_are_unique() {
        let (tokens, _) = tokens_of("# Intro\n\n## Intro\n\n# Custom {#mine}\n");
        let ids: Vec<String> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Open(Tag::Heading { id, .. }) => id.as_ref().map(|id| id.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, ["intro", "intro-1", "mine"]);
    }

    #[test]
    fn test_explicit_ids_are_never_generated_again() {
        let (tokens, _) = tokens_of("# Intro\n\n# A {#intro}\n\n# Intro\n");
        let ids: Vec<String> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Open(Tag::Heading { id, .. }) => id.as_ref().map(|id| id.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, ["intro-1", "intro", "intro-2"]);
    }

    #[test]
    fn test_unsafe_destinations_are_emptied() {
        let body = "[a](javascript:alert(1)) <JavaScript:alert(2)> [b](vbscript:x) \
                    [c](file:///etc/passwd) [d](data:text/html;base64,PHNjcmlwdD4=) \
                    ![e](javascript:alert(3)) ![f](data:image/png;base64,iVBORw0KGgo=) \
                    [g](https://example.com) [h](./relative.md)\n";
        let (tokens, _) = tokens_of(body);
        let TokenKind::Inline(events) = &tokens[1].kind else {
            panic!("expected an inline token");
        };
        let destinations: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                Event::Start(Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. }) => {
                    Some(&**dest_url)
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            destinations,
            [
                "",
                "",
                "",
                "",
                "",
                "",
                "data:image/png;base64,iVBORw0KGgo=",
                "https://example.com",
                "./relative.md",
            ]
        );
    }

    #[test]
    fn test_safe_destination_rules() {
        assert!(!is_safe_destination(" java\tscript:alert(1)", false));
        assert!(!is_safe_destination("VBScript:x", true));
        assert!(!is_safe_destination("data:image/svg+xml;base64,AAAA", true));
        assert!(!is_safe_destination("data:image/png;base64,AAAA", false));
        assert!(is_safe_destination("data:image/webp;base64,AAAA", true));
        assert!(is_safe_destination("mailto:me@example.com", false));
        assert!(is_safe_destination("#section", false));
    }

    #[test]
    fn test_unbalanced_end_is_a_parse_error() {
        let mut env = RenderEnvironment::new();
        let events = [
            Event::Text("stray".into()),
            Event::End(TagEnd::Paragraph),
        ];
        let err = fold_events(
            &events,
            &mut env,
            &TokenizerOptions::default(),
            &AmmoniaSanitizer::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PreviewError::Parse(_)));
    }

    #[test]
    fn test_environment_is_populated() {
        let body = "See [docs][d] and note[^b] then[^a].\n\n[d]: https://docs.rs \"Docs\"\n\n[^a]: A\n[^b]: B\n";
        let (_, env) = tokens_of(body);
        let docs = env.reference("D").unwrap();
        assert_eq!(docs.dest, "https://docs.rs");
        assert_eq!(docs.title.as_deref(), Some("Docs"));
        assert_eq!(env.footnote("b"), Some(1));
        assert_eq!(env.footnote("a"), Some(2));
    }

    #[test]
    fn test_linkify() {
        let (tokens, _) = tokens_of("Visit https://example.com.\n");
        let TokenKind::Inline(events) = &tokens[1].kind else {
            panic!("expected an inline token");
        };
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Start(Tag::Link { dest_url, .. }) if &**dest_url == "https://example.com"
        )));
        assert!(matches!(events.last(), Some(Event::Text(t)) if &**t == "."));

        let options = TokenizerOptions {
            linkify: false,
            ..Default::default()
        };
        let (tokens, _) = tokens_with("Visit https://example.com.\n", &options);
        let TokenKind::Inline(events) = &tokens[1].kind else {
            panic!("expected an inline token");
        };
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::Start(Tag::Link { .. }))));
    }

    #[test]
    fn test_rule_is_self_contained_boundary() {
        let (tokens, _) = tokens_of("a\n\n---\n\nb\n");
        assert_eq!(tokens[3].name(), "hr");
        assert!(tokens[3].is_boundary());
    }
}
