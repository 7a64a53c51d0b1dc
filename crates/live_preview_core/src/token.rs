//! Block-level tokens.
//!
//! The tokenizer adapter folds the `pulldown-cmark` event stream into a flat
//! sequence of [`Token`]s in the shape of a markdown-it token stream: every
//! block container yields an open and a close token, leaf blocks such as
//! fenced code or raw HTML yield one self-contained token, and each run of
//! inline events is carried by a single `inline` token.

use pulldown_cmark::{Event, Tag, TagEnd};

/// Direction marker of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nesting {
    /// Opens a block (`+1`).
    Open,
    /// Self-contained token (`0`).
    SelfContained,
    /// Closes a block (`-1`).
    Close,
}

impl Nesting {
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Open => 1,
            Self::SelfContained => 0,
            Self::Close => -1,
        }
    }
}

/// What a token stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Start of a block container (paragraph, list, table, ...).
    Open(Tag<'static>),
    /// End of a block container.
    Close(TagEnd),
    /// A run of inline events inside a block.
    Inline(Vec<Event<'static>>),
    /// Fenced code block; `info` is the raw info string.
    Fence { info: String },
    /// Indented code block.
    CodeBlock,
    /// Raw HTML block, already sanitized.
    HtmlBlock,
    /// Thematic break.
    Rule,
}

impl TokenKind {
    /// markdown-it style type name, e.g. `paragraph_open` or `fence`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open(tag) => open_name(tag),
            Self::Close(end) => close_name(end),
            Self::Inline(_) => "inline",
            Self::Fence { .. } => "fence",
            Self::CodeBlock => "code_block",
            Self::HtmlBlock => "html_block",
            Self::Rule => "hr",
        }
    }

    fn nesting(&self) -> Nesting {
        match self {
            Self::Open(_) => Nesting::Open,
            Self::Close(_) => Nesting::Close,
            _ => Nesting::SelfContained,
        }
    }
}

fn open_name(tag: &Tag) -> &'static str {
    match tag {
        Tag::Paragraph => "paragraph_open",
        Tag::Heading { .. } => "heading_open",
        Tag::BlockQuote(_) => "blockquote_open",
        Tag::List(Some(_)) => "ordered_list_open",
        Tag::List(None) => "bullet_list_open",
        Tag::Item => "list_item_open",
        Tag::FootnoteDefinition(_) => "footnote_open",
        Tag::Table(_) => "table_open",
        Tag::TableHead => "thead_open",
        Tag::TableRow => "tr_open",
        Tag::TableCell => "td_open",
        _ => "block_open",
    }
}

fn close_name(end: &TagEnd) -> &'static str {
    match end {
        TagEnd::Paragraph => "paragraph_close",
        TagEnd::Heading(_) => "heading_close",
        TagEnd::BlockQuote(_) => "blockquote_close",
        TagEnd::List(true) => "ordered_list_close",
        TagEnd::List(false) => "bullet_list_close",
        TagEnd::Item => "list_item_close",
        TagEnd::FootnoteDefinition => "footnote_close",
        TagEnd::Table => "table_close",
        TagEnd::TableHead => "thead_close",
        TagEnd::TableRow => "tr_close",
        TagEnd::TableCell => "td_close",
        _ => "block_close",
    }
}

/// Rendering metadata attached to a token.
pub type Attrs = Vec<(String, String)>;

/// Atomic unit of a parsed document.
///
/// Tokens are immutable once the tokenizer has produced them, except for
/// [`Token::attrs`] on fence tokens, which the chunk renderer fills in with
/// the outcome of highlighting.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Nesting depth, 0 is the document root.
    pub level: usize,
    pub nesting: Nesting,
    /// Code for fences, sanitized markup for HTML blocks, plain text for inline runs.
    pub content: String,
    pub attrs: Option<Attrs>,
}

impl Token {
    pub fn new(kind: TokenKind, level: usize) -> Self {
        let nesting = kind.nesting();
        Self {
            kind,
            level,
            nesting,
            content: String::new(),
            attrs: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_fence(&self) -> bool {
        matches!(self.kind, TokenKind::Fence { .. })
    }

    /// Whether this token ends the top-level block it belongs to.
    pub fn is_boundary(&self) -> bool {
        self.level == 0 && matches!(self.nesting, Nesting::Close | Nesting::SelfContained)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .as_ref()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let attrs = self.attrs.get_or_insert_with(Vec::new);
        match attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => attrs.push((key.to_string(), value)),
        }
    }

    /// Structural equality with the highlighter-written `attrs` of fence
    /// tokens left out of the comparison.
    pub fn eq_ignoring_volatile(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.level == other.level
            && self.nesting == other.nesting
            && self.content == other.content
            && (self.is_fence() || self.attrs == other.attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulldown_cmark::HeadingLevel;

    #[test]
    fn test_token_names() {
        assert_eq!(
            Token::new(TokenKind::Open(Tag::Paragraph), 0).name(),
            "paragraph_open"
        );
        assert_eq!(
            Token::new(TokenKind::Close(TagEnd::Heading(HeadingLevel::H2)), 0).name(),
            "heading_close"
        );
        assert_eq!(Token::new(TokenKind::HtmlBlock, 0).name(), "html_block");
        assert_eq!(
            Token::new(
                TokenKind::Fence {
                    info: "rust".into()
                },
                0
            )
            .name(),
            "fence"
        );
    }

    #[test]
    fn test_nesting_follows_kind() {
        assert_eq!(
            Token::new(TokenKind::Open(Tag::Item), 1).nesting,
            Nesting::Open
        );
        assert_eq!(
            Token::new(TokenKind::Close(TagEnd::Item), 1).nesting,
            Nesting::Close
        );
        assert_eq!(Token::new(TokenKind::Rule, 0).nesting.as_i8(), 0);
    }

    #[test]
    fn test_boundary() {
        assert!(Token::new(TokenKind::Close(TagEnd::Paragraph), 0).is_boundary());
        assert!(Token::new(TokenKind::Rule, 0).is_boundary());
        assert!(!Token::new(TokenKind::Open(Tag::Paragraph), 0).is_boundary());
        assert!(!Token::new(TokenKind::Close(TagEnd::Item), 1).is_boundary());
    }

    #[test]
    fn test_set_attr_replaces_existing_key() {
        let mut token = Token::new(TokenKind::Fence { info: "".into() }, 0);
        token.set_attr("class", "hljs");
        token.set_attr("class", "hljs language-rust");
        assert_eq!(token.attr("class"), Some("hljs language-rust"));
        assert_eq!(token.attrs.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_eq_ignoring_volatile_only_skips_fence_attrs() {
        let fence = Token::new(TokenKind::Fence { info: "js".into() }, 0).with_content("let x;");
        let mut highlighted = fence.clone();
        highlighted.set_attr("class", "hljs language-js");
        assert!(fence.eq_ignoring_volatile(&highlighted));
        assert_ne!(fence, highlighted);

        let block = Token::new(TokenKind::HtmlBlock, 0).with_content("<p>x</p>");
        let mut annotated = block.clone();
        annotated.set_attr("data-x", "1");
        assert!(!block.eq_ignoring_volatile(&annotated));
    }
}
