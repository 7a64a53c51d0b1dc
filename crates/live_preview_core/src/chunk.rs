//! Grouping tokens into independently cacheable chunks.

use crate::token::Token;

/// A contiguous run of tokens forming one top-level block.
///
/// `slot` is the chunk's position within its pass and doubles as its cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    slot: usize,
    tokens: Vec<Token>,
}

impl Chunk {
    pub fn new(slot: usize, tokens: Vec<Token>) -> Self {
        Self { slot, tokens }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut [Token] {
        &mut self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Split a token sequence into chunks.
///
/// A token closes the current chunk when it sits at the document root and
/// either closes a block or is self-contained. Nested tokens never close a
/// chunk. Tokens left over after the last boundary (a truncated stream) are
/// emitted as a final chunk rather than dropped.
pub fn partition(tokens: Vec<Token>) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();

    for token in tokens {
        let is_boundary = token.is_boundary();
        current.push(token);
        if is_boundary {
            let slot = chunks.len();
            chunks.push(Chunk::new(slot, std::mem::take(&mut current)));
        }
    }

    if !current.is_empty() {
        tracing::warn!(
            trailing_tokens = current.len(),
            "Token stream ended inside a block, emitting it as a partial chunk"
        );
        let slot = chunks.len();
        chunks.push(Chunk::new(slot, current));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Nesting, TokenKind};
    use proptest::prelude::*;
    use pulldown_cmark::{Event, Tag, TagEnd};

    fn open(level: usize) -> Token {
        Token::new(TokenKind::Open(Tag::Paragraph), level)
    }

    fn close(level: usize) -> Token {
        Token::new(TokenKind::Close(TagEnd::Paragraph), level)
    }

    fn inline(level: usize, text: &str) -> Token {
        Token::new(
            TokenKind::Inline(vec![Event::Text(text.to_string().into())]),
            level,
        )
        .with_content(text)
    }

    #[test]
    fn test_partition_paragraphs_and_rule() {
        let tokens = vec![
            open(0),
            inline(1, "a"),
            close(0),
            Token::new(TokenKind::Rule, 0),
            open(0),
            inline(1, "b"),
            close(0),
        ];
        let chunks = partition(tokens);
        let sizes: Vec<usize> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, [3, 1, 3]);
        let slots: Vec<usize> = chunks.iter().map(Chunk::slot).collect();
        assert_eq!(slots, [0, 1, 2]);
    }

    #[test]
    fn test_nested_tokens_do_not_close_chunks() {
        let tokens = vec![
            Token::new(TokenKind::Open(Tag::List(None)), 0),
            Token::new(TokenKind::Open(Tag::Item), 1),
            inline(2, "x"),
            Token::new(TokenKind::Fence { info: "".into() }, 2),
            Token::new(TokenKind::Close(TagEnd::Item), 1),
            Token::new(TokenKind::Close(TagEnd::List(false)), 0),
        ];
        let chunks = partition(tokens);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 6);
    }

    #[test]
    fn test_trailing_tokens_become_partial_chunk() {
        let tokens = vec![open(0), inline(1, "done"), close(0), open(0), inline(1, "cut")];
        let chunks = partition(tokens);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].slot(), 1);
        assert_eq!(chunks[1].tokens()[1].content, "cut");
    }

    #[test]
    fn test_empty_input() {
        assert!(partition(Vec::new()).is_empty());
    }

    fn arb_token() -> impl Strategy<Value = Token> {
        (0usize..3, 0u8..3, "[a-z]{0,3}").prop_map(|(level, nesting, text)| match nesting {
            0 => open(level),
            1 => inline(level, &text),
            _ => close(level),
        })
    }

    proptest! {
        #[test]
        fn chunks_reconstruct_tokens(tokens in prop::collection::vec(arb_token(), 0..64)) {
            let chunks = partition(tokens.clone());
            let rebuilt: Vec<Token> = chunks.into_iter().flat_map(Chunk::into_tokens).collect();
            prop_assert_eq!(rebuilt, tokens);
        }

        #[test]
        fn boundaries_only_end_chunks(tokens in prop::collection::vec(arb_token(), 0..64)) {
            let chunks = partition(tokens.clone());
            let complete = if tokens.last().is_some_and(Token::is_boundary) {
                chunks.len()
            } else {
                chunks.len().saturating_sub(1)
            };
            for (index, chunk) in chunks.iter().enumerate() {
                let (last, init) = chunk.tokens().split_last().expect("chunks are never empty");
                prop_assert!(init.iter().all(|t| !t.is_boundary()));
                if index < complete {
                    prop_assert!(last.is_boundary());
                    prop_assert!(last.level == 0 && last.nesting != Nesting::Open);
                }
            }
        }
    }
}
