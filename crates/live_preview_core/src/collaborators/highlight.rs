//! Code highlighting backed by syntect's class-based HTML generator.

use crate::error::PreviewError;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

/// Result of highlighting with automatic language detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlighted {
    pub value: String,
    /// Detected language, `None` when the code was treated as plain text.
    pub language: Option<String>,
}

/// Turns code into highlighted HTML.
pub trait Highlight: Send + Sync {
    /// Whether `name` is a language this highlighter knows.
    fn get_language(&self, name: &str) -> bool;

    /// Highlight `code` as `lang`.
    fn highlight(&self, code: &str, lang: &str) -> Result<String, PreviewError>;

    /// Highlight `code`, guessing its language.
    fn highlight_auto(&self, code: &str) -> Result<Highlighted, PreviewError>;
}

pub struct SyntectHighlighter {
    syntax_set: SyntaxSet,
}

impl SyntectHighlighter {
    /// Load the bundled syntax definitions. This is slow, do it once.
    pub fn load() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
        }
    }

    fn highlight_with(&self, code: &str, syntax: &SyntaxReference) -> Result<String, PreviewError> {
        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntax_set, ClassStyle::Spaced);
        for line in LinesWithEndings::from(code) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|err| PreviewError::Highlight(err.to_string()))?;
        }
        Ok(generator.finalize())
    }
}

impl Highlight for SyntectHighlighter {
    fn get_language(&self, name: &str) -> bool {
        self.syntax_set.find_syntax_by_token(name).is_some()
    }

    fn highlight(&self, code: &str, lang: &str) -> Result<String, PreviewError> {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .ok_or_else(|| PreviewError::Highlight(format!("unknown language: {lang}")))?;
        self.highlight_with(code, syntax)
    }

    fn highlight_auto(&self, code: &str) -> Result<Highlighted, PreviewError> {
        let detected = code
            .lines()
            .next()
            .and_then(|first_line| self.syntax_set.find_syntax_by_first_line(first_line));

        match detected {
            Some(syntax) => Ok(Highlighted {
                value: self.highlight_with(code, syntax)?,
                language: Some(syntax.name.to_lowercase()),
            }),
            None => Ok(Highlighted {
                value: self.highlight_with(code, self.syntax_set.find_syntax_plain_text())?,
                language: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntect_highlighter() {
        let highlighter = SyntectHighlighter::load();
        assert!(highlighter.get_language("rust"));
        assert!(highlighter.get_language("rs"));
        assert!(!highlighter.get_language("not-a-language"));

        let html = highlighter.highlight("fn main() {}\n", "rust").unwrap();
        assert!(html.contains("<span class="));
        assert!(html.contains("main"));

        assert!(highlighter.highlight("x", "not-a-language").is_err());
    }

    #[test]
    fn test_highlight_auto() {
        let highlighter = SyntectHighlighter::load();

        let shell = highlighter
            .highlight_auto("#!/bin/bash\necho hi\n")
            .unwrap();
        assert!(shell.language.is_some());

        let plain = highlighter.highlight_auto("a < b\n").unwrap();
        assert_eq!(plain.language, None);
        assert!(plain.value.contains("&lt;"));
    }
}
