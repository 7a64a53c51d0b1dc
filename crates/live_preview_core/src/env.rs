//! Cross-chunk state of one parse pass.

use std::collections::{BTreeMap, HashMap, HashSet};

/// A link-reference definition, e.g. `[label]: https://example.com "Title"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    pub dest: String,
    pub title: Option<String>,
}

/// State shared by all chunks of a single parse pass.
///
/// The tokenizer populates it in document order: link-reference definitions,
/// the footnote numbering (in order of first use) and the heading slugs
/// already handed out. Chunk rendering reads the footnote numbers from it,
/// which is why chunks must be rendered in document order against the
/// environment of the same pass.
///
/// Reference links are already resolved by the parser, so the reference
/// table is only read by callers of this API (outline views, link checks),
/// never by rendering or the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderEnvironment {
    references: BTreeMap<String, LinkReference>,
    footnotes: HashMap<String, usize>,
    /// Next suffix to try per generated slug.
    slugs: HashMap<String, usize>,
    /// Every id in use, generated or explicit.
    taken: HashSet<String>,
}

impl RenderEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link-reference definition. Labels match case-insensitively
    /// and the first definition wins.
    pub fn define_reference(&mut self, label: &str, dest: String, title: Option<String>) {
        self.references
            .entry(label.to_lowercase())
            .or_insert(LinkReference { dest, title });
    }

    pub fn reference(&self, label: &str) -> Option<&LinkReference> {
        self.references.get(&label.to_lowercase())
    }

    pub fn references(&self) -> impl Iterator<Item = (&str, &LinkReference)> {
        self.references.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of the footnote, assigning the next free one on first use.
    pub fn footnote_number(&mut self, label: &str) -> usize {
        let next = self.footnotes.len() + 1;
        *self.footnotes.entry(label.to_string()).or_insert(next)
    }

    pub fn footnote(&self, label: &str) -> Option<usize> {
        self.footnotes.get(label).copied()
    }

    pub fn footnotes(&self) -> &HashMap<String, usize> {
        &self.footnotes
    }

    /// Reserve an explicit heading id so generated slugs avoid it.
    pub fn claim_slug(&mut self, id: &str) {
        self.taken.insert(id.to_string());
    }

    /// Make `slug` unique within the document: `intro`, `intro-1`, `intro-2`, ...
    pub fn unique_slug(&mut self, slug: String) -> String {
        let slug = if slug.is_empty() {
            "section".to_string()
        } else {
            slug
        };
        let mut seen = self.slugs.get(&slug).copied().unwrap_or(0);
        loop {
            let candidate = if seen == 0 {
                slug.clone()
            } else {
                format!("{slug}-{seen}")
            };
            seen += 1;
            if self.taken.insert(candidate.clone()) {
                self.slugs.insert(slug, seen);
                return candidate;
            }
        }
    }
}
