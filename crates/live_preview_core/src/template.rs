//! Composition of rendered fragments into the final output.
//!
//! Templates live in an explicit [`TemplateRegistry`] handed to [`compose`],
//! so composition only depends on its arguments.

use crate::error::PreviewError;
use crate::front_matter::Metadata;
use serde_json::Value;
use std::collections::HashMap;

/// Wraps the ordered fragments of a document into a page.
pub trait Template: Send + Sync {
    fn render(&self, fragments: &[String], metadata: &Metadata) -> String;
}

impl<F> Template for F
where
    F: Fn(&[String], &Metadata) -> String + Send + Sync,
{
    fn render(&self, fragments: &[String], metadata: &Metadata) -> String {
        self(fragments, metadata)
    }
}

/// Templates by id.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Box<dyn Template>>,
}

impl std::fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl TemplateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `article` and `document` templates.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("article", article);
        registry.register("document", document);
        registry
    }

    /// Register `template` under `id`, replacing any previous one.
    pub fn register(&mut self, id: impl Into<String>, template: impl Template + 'static) {
        self.templates.insert(id.into(), Box::new(template));
    }

    pub fn get(&self, id: &str) -> Option<&dyn Template> {
        self.templates.get(id).map(|template| template.as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Output of the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Composed {
    /// No template: one independently mountable block per fragment.
    Blocks(Vec<String>),
    /// Output of a template.
    Page(String),
}

impl Composed {
    pub fn to_html(&self) -> String {
        match self {
            Self::Blocks(blocks) => blocks
                .iter()
                .map(|block| format!("<div class=\"md-chunk\">{block}</div>\n"))
                .collect(),
            Self::Page(html) => html.clone(),
        }
    }
}

/// Assemble `fragments` into the template `template_id`, or into plain blocks
/// when no template is selected.
pub fn compose(
    fragments: Vec<String>,
    metadata: &Metadata,
    template_id: Option<&str>,
    registry: &TemplateRegistry,
) -> Result<Composed, PreviewError> {
    match template_id.filter(|id| !id.is_empty()) {
        None => Ok(Composed::Blocks(fragments)),
        Some(id) => {
            let template = registry
                .get(id)
                .ok_or_else(|| PreviewError::UnknownTemplate(id.to_string()))?;
            Ok(Composed::Page(template.render(&fragments, metadata)))
        }
    }
}

/// Escaped text of a metadata entry. Non-string values use their JSON form.
fn metadata_text(metadata: &Metadata, key: &str) -> Option<String> {
    let text = match metadata.get(key)? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(ammonia::clean_text(&text))
}

fn article(fragments: &[String], metadata: &Metadata) -> String {
    let mut html = String::from("<article class=\"markdown-body\">\n");

    let title = metadata_text(metadata, "title");
    let byline: Vec<String> = ["author", "date"]
        .iter()
        .filter_map(|key| {
            metadata_text(metadata, key).map(|text| format!("<span class=\"{key}\">{text}</span>"))
        })
        .collect();

    if title.is_some() || !byline.is_empty() {
        html.push_str("<header>\n");
        if let Some(title) = title {
            html.push_str(&format!("<h1 class=\"title\">{title}</h1>\n"));
        }
        if !byline.is_empty() {
            html.push_str(&format!("<p class=\"byline\">{}</p>\n", byline.join(" ")));
        }
        html.push_str("</header>\n");
    }

    for fragment in fragments {
        html.push_str(fragment);
    }
    html.push_str("</article>\n");
    html
}

fn document(fragments: &[String], metadata: &Metadata) -> String {
    let title = metadata_text(metadata, "title").unwrap_or_else(|| "Preview".to_string());
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        article(fragments, metadata)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn fragments() -> Vec<String> {
        vec!["<p>a</p>\n".to_string(), "<p>b</p>\n".to_string()]
    }

    #[test]
    fn test_no_template_gives_blocks() {
        let registry = TemplateRegistry::with_builtins();
        for id in [None, Some("")] {
            let composed = compose(fragments(), &Metadata::new(), id, &registry).unwrap();
            assert_eq!(composed, Composed::Blocks(fragments()));
        }
        let html = Composed::Blocks(fragments()).to_html();
        assert_eq!(
            html,
            "<div class=\"md-chunk\"><p>a</p>\n</div>\n<div class=\"md-chunk\"><p>b</p>\n</div>\n"
        );
    }

    #[test]
    fn test_unknown_template() {
        let registry = TemplateRegistry::with_builtins();
        let err = compose(fragments(), &Metadata::new(), Some("slides"), &registry).unwrap_err();
        assert!(matches!(err, PreviewError::UnknownTemplate(id) if id == "slides"));
    }

    #[test]
    fn test_closure_template() {
        let mut registry = TemplateRegistry::new();
        registry.register("count", |fragments: &[String], metadata: &Metadata| {
            format!("{} fragments, {} keys", fragments.len(), metadata.len())
        });
        let meta = metadata(json!({"title": "X"}));
        let composed = compose(fragments(), &meta, Some("count"), &registry).unwrap();
        assert_eq!(composed, Composed::Page("2 fragments, 1 keys".into()));
        assert_eq!(registry.ids(), ["count"]);
    }

    #[test]
    fn test_article_escapes_metadata() {
        let registry = TemplateRegistry::with_builtins();
        let meta = metadata(json!({
            "title": "<script>alert(1)</script>",
            "author": "Ada",
            "date": 2024,
        }));
        let Composed::Page(html) = compose(fragments(), &meta, Some("article"), &registry).unwrap()
        else {
            panic!("expected a page");
        };
        assert!(!html.contains("<script>"));
        assert!(html.contains("<span class=\"author\">Ada</span>"));
        assert!(html.contains("<span class=\"date\">2024</span>"));
        assert!(html.contains("<p>a</p>\n<p>b</p>\n</article>"));
    }

    #[test]
    fn test_document_title_fallback() {
        let registry = TemplateRegistry::with_builtins();
        let composed = compose(Vec::new(), &Metadata::new(), Some("document"), &registry).unwrap();
        let html = composed.to_html();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Preview</title>"));
        assert!(!html.contains("<header>"));
    }
}
