//! Emoji shortcut substitution on rendered HTML.
//!
//! `:shortcode:` names and, optionally, ascii shortcuts such as `:)` are
//! replaced by inline image markup. Text inside tags, attribute values and
//! `code`, `pre`, `script` or `style` elements is left alone.

use crate::config::EmojiConfig;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static SHORTCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([a-z0-9_+\-]+):").expect("valid shortcode regex"));

/// Ascii shortcut → gemoji shortcode. `<3` appears escaped in rendered HTML.
const ASCII_SHORTCUTS: &[(&str, &str)] = &[
    (":)", "slightly_smiling_face"),
    (":-)", "slightly_smiling_face"),
    (";)", "wink"),
    (";-)", "wink"),
    (":D", "smiley"),
    (":-D", "smiley"),
    (":(", "disappointed"),
    (":-(", "disappointed"),
    (":P", "stuck_out_tongue"),
    (":-P", "stuck_out_tongue"),
    (":o", "open_mouth"),
    (":'(", "cry"),
    ("&lt;3", "heart"),
    ("&lt;/3", "broken_heart"),
];

/// Elements whose text must never be touched.
const VERBATIM_ELEMENTS: &[&str] = &["code", "pre", "script", "style"];

/// Replaces emoji shortcuts in rendered HTML.
pub trait SubstituteEmoji: Send + Sync {
    fn to_image(&self, html: &str) -> String;
}

pub struct EmojiImages {
    config: EmojiConfig,
}

impl EmojiImages {
    pub fn new(config: EmojiConfig) -> Self {
        Self { config }
    }

    fn markup(&self, emoji: &emojis::Emoji, shortcode: &str) -> String {
        let code = emoji
            .as_str()
            .chars()
            .filter(|c| *c != '\u{fe0f}')
            .map(|c| format!("{:x}", c as u32))
            .collect::<Vec<_>>()
            .join("-");

        if self.config.sprite {
            format!(
                r#"<span class="emoji emoji-sprite emoji-{code}" role="img" aria-label="{name}" title=":{shortcode}:">{emoji}</span>"#,
                name = emoji.name(),
                emoji = emoji.as_str(),
            )
        } else {
            format!(
                r#"<img class="emoji" draggable="false" alt="{emoji}" title=":{shortcode}:" src="{base}/{code}.png">"#,
                emoji = emoji.as_str(),
                base = self.config.image_base_url.trim_end_matches('/'),
            )
        }
    }

    fn substitute_text(&self, text: &str, out: &mut String) {
        let replaced = SHORTCODE.replace_all(text, |caps: &Captures| {
            match emojis::get_by_shortcode(&caps[1]) {
                Some(emoji) => self.markup(emoji, &caps[1]),
                None => caps[0].to_string(),
            }
        });

        if !self.config.ascii {
            out.push_str(&replaced);
            return;
        }

        // Ascii shortcuts only count as whole words.
        for piece in replaced.split_inclusive(char::is_whitespace) {
            let word = piece.trim_end_matches(char::is_whitespace);
            let shortcut = ASCII_SHORTCUTS
                .iter()
                .find(|(ascii, _)| *ascii == word)
                .and_then(|(_, shortcode)| {
                    emojis::get_by_shortcode(shortcode).map(|emoji| (emoji, *shortcode))
                });
            match shortcut {
                Some((emoji, shortcode)) => {
                    out.push_str(&self.markup(emoji, shortcode));
                    out.push_str(&piece[word.len()..]);
                }
                None => out.push_str(piece),
            }
        }
    }
}

fn tag_name(tag: &str) -> (bool, String) {
    let inner = tag.trim_start_matches('<');
    let (closing, inner) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };
    let name = inner
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    (closing, name)
}

impl SubstituteEmoji for EmojiImages {
    fn to_image(&self, html: &str) -> String {
        let mut out = String::with_capacity(html.len());
        let mut verbatim_depth = 0usize;
        let mut rest = html;

        while !rest.is_empty() {
            let Some(tag_start) = rest.find('<') else {
                if verbatim_depth == 0 {
                    self.substitute_text(rest, &mut out);
                } else {
                    out.push_str(rest);
                }
                break;
            };

            let text = &rest[..tag_start];
            if verbatim_depth == 0 {
                self.substitute_text(text, &mut out);
            } else {
                out.push_str(text);
            }

            let tag_end = rest[tag_start..]
                .find('>')
                .map(|i| tag_start + i + 1)
                .unwrap_or(rest.len());
            let tag = &rest[tag_start..tag_end];
            let (closing, name) = tag_name(tag);
            if VERBATIM_ELEMENTS.contains(&name.as_str()) && !tag.ends_with("/>") {
                if closing {
                    verbatim_depth = verbatim_depth.saturating_sub(1);
                } else {
                    verbatim_depth += 1;
                }
            }
            out.push_str(tag);
            rest = &rest[tag_end..];
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images() -> EmojiImages {
        EmojiImages::new(EmojiConfig::default())
    }

    #[test]
    fn test_shortcode() {
        let html = images().to_image("<p>Ship it :rocket:</p>");
        assert!(html.starts_with("<p>Ship it <span class=\"emoji emoji-sprite emoji-1f680\""));
        assert!(html.contains("title=\":rocket:\""));
        assert!(html.ends_with("</span></p>"));
    }

    #[test]
    fn test_unknown_shortcode_is_kept() {
        assert_eq!(
            images().to_image("<p>:not_an_emoji_name:</p>"),
            "<p>:not_an_emoji_name:</p>"
        );
    }

    #[test]
    fn test_ascii_shortcuts_only_as_words() {
        let html = images().to_image("<p>nice :) see http://x.io &lt;3</p>");
        assert_eq!(html.matches("class=\"emoji").count(), 2);
        assert!(html.contains("http://x.io"));

        let mut config = EmojiConfig::default();
        config.ascii = false;
        let html = EmojiImages::new(config).to_image("<p>nice :)</p>");
        assert_eq!(html, "<p>nice :)</p>");
    }

    #[test]
    fn test_code_and_attributes_are_untouched() {
        let input = r#"<pre><code>let s = ":rocket:";</code></pre><a title=":rocket:">x</a>"#;
        assert_eq!(images().to_image(input), input);
    }

    #[test]
    fn test_image_markup() {
        let config = EmojiConfig {
            sprite: false,
            image_base_url: "/emoji/".into(),
            ..Default::default()
        };
        let html = EmojiImages::new(config).to_image("<p>:tada:</p>");
        assert!(html.contains(r#"src="/emoji/1f389.png""#));
        assert!(html.starts_with("<p><img class=\"emoji\""));
    }
}
