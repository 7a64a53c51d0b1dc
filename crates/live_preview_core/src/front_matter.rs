//! Front matter extraction.
//!
//! A document may start with a metadata header fenced by `---` (YAML, which
//! may also be closed by `...`) or `+++` (TOML):
//!
//! ```text
//! ---
//! title: Release notes
//! tags: [rust, preview]
//! ---
//! # Body starts here
//! ```

use serde_json::Value;

/// Metadata extracted from the front matter.
pub type Metadata = serde_json::Map<String, Value>;

/// A document split into its metadata header and body text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub data: Metadata,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderFormat {
    Yaml,
    Toml,
}

impl HeaderFormat {
    fn from_fence(line: &str) -> Option<Self> {
        match line {
            "---" => Some(Self::Yaml),
            "+++" => Some(Self::Toml),
            _ => None,
        }
    }

    fn is_closing(self, line: &str) -> bool {
        match self {
            Self::Yaml => line == "---" || line == "...",
            Self::Toml => line == "+++",
        }
    }

    fn decode(self, header: &str) -> Result<Metadata, String> {
        if header.trim().is_empty() {
            return Ok(Metadata::new());
        }
        let value = match self {
            Self::Yaml => {
                serde_yaml::from_str::<Value>(header).map_err(|err| err.to_string())?
            }
            Self::Toml => toml::from_str::<Value>(header).map_err(|err| err.to_string())?,
        };
        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Metadata::new()),
            other => Err(format!("front matter must be a mapping, found {other}")),
        }
    }
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

/// Split `raw` into metadata and body.
///
/// Text without a header, with an unterminated header or with a header that
/// does not decode to a mapping comes back unchanged with empty metadata.
///
/// # Example
///
/// ```
/// use live_preview_core::front_matter::preprocess;
///
/// let doc = preprocess("---\ntitle: X\n---\nBody");
/// assert_eq!(doc.data["title"], "X");
/// assert_eq!(doc.content, "Body");
/// ```
pub fn preprocess(raw: &str) -> FrontMatter {
    let unchanged = || FrontMatter {
        data: Metadata::new(),
        content: raw.to_string(),
    };

    let Some(first_line) = raw.split_inclusive('\n').next() else {
        return unchanged();
    };
    let Some(format) = HeaderFormat::from_fence(strip_line_ending(first_line)) else {
        return unchanged();
    };

    let rest = &raw[first_line.len()..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if format.is_closing(strip_line_ending(line)) {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return match format.decode(header) {
                Ok(data) => FrontMatter {
                    data,
                    content: body.to_string(),
                },
                Err(err) => {
                    tracing::warn!(?format, %err, "Ignoring undecodable front matter");
                    unchanged()
                }
            };
        }
        offset += line.len();
    }

    tracing::warn!(?format, "Front matter is not terminated, treating it as body");
    unchanged()
}
