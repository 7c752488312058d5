use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use html5ever::tendril::TendrilSink;
use html5ever::{LocalName, ParseOpts, QualName, ns, parse_document, parse_fragment};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

use super::PathMatcher;
use crate::error::{Result, UpdateError};
use crate::pipeline::DocumentFormat;

/// A parsed HTML fragment or full document. Nodes use interior mutability,
/// so plugins may edit the tree in place and return
/// [`PluginOutcome::Unchanged`](crate::PluginOutcome).
pub struct MarkupTree {
    dom: RcDom,
    document: bool,
}

impl MarkupTree {
    pub fn dom(&self) -> &RcDom {
        &self.dom
    }

    /// Whether the source was a full document (doctype or `<html>` first).
    pub fn is_document(&self) -> bool {
        self.document
    }

    /// Node whose children are the top-level nodes of the source: the
    /// document itself, or the synthetic element holding a fragment.
    pub fn root(&self) -> Option<Handle> {
        if self.document {
            return Some(self.dom.document.clone());
        }
        self.dom.document.children.borrow().first().cloned()
    }

    /// Every element below the root, in document order.
    pub fn elements(&self) -> Vec<Handle> {
        let mut out = Vec::new();
        let Some(root) = self.root() else {
            return out;
        };
        let mut stack: Vec<Handle> = root.children.borrow().iter().rev().cloned().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children.borrow().iter().rev().cloned());
            if matches!(node.data, NodeData::Element { .. }) {
                out.push(node);
            }
        }
        out
    }

    /// Renames attribute `from` to `to` on every element. Returns how many
    /// attributes were renamed.
    pub fn rename_attribute(&self, from: &str, to: &str) -> usize {
        let mut renamed = 0;
        for element in self.elements() {
            if let NodeData::Element { attrs, .. } = &element.data {
                for attr in attrs.borrow_mut().iter_mut() {
                    if &*attr.name.local == from {
                        attr.name = QualName::new(None, ns!(), LocalName::from(to));
                        renamed += 1;
                    }
                }
            }
        }
        renamed
    }
}

/// HTML files. Component templates and other fragments are parsed in the
/// context of a configurable element; sources starting with a doctype or an
/// `<html>` tag are parsed as whole documents.
#[derive(Debug, Clone)]
pub struct MarkupFormat {
    matcher: PathMatcher,
    context: String,
}

impl MarkupFormat {
    pub fn new() -> Self {
        Self { matcher: PathMatcher::extensions([".html", ".htm"]), context: "div".to_string() }
    }

    /// Element fragments are parsed inside of, `div` by default.
    pub fn with_context(mut self, element: impl Into<String>) -> Self {
        self.context = element.into();
        self
    }

    pub fn with_matcher(mut self, matcher: PathMatcher) -> Self {
        self.matcher = matcher;
        self
    }
}

impl Default for MarkupFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFormat for MarkupFormat {
    type Node = MarkupTree;

    fn name(&self) -> &'static str {
        "markup"
    }

    fn supports(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }

    fn parse(&mut self, src: &str, path: &str) -> Result<MarkupTree> {
        let document = is_document(src);
        let dom = if document {
            parse_document(RcDom::default(), ParseOpts::default()).one(src)
        } else {
            let context = QualName::new(None, ns!(html), LocalName::from(self.context.as_str()));
            parse_fragment(RcDom::default(), ParseOpts::default(), context, vec![], false).one(src)
        };
        let errors = dom.errors.borrow().len();
        if errors > 0 {
            // The HTML parser always recovers; keep going with its tree.
            tracing::debug!(path, errors, document, "recovered from markup parse errors");
        }
        Ok(MarkupTree { dom, document })
    }

    fn serialize(&mut self, node: &MarkupTree, path: &str) -> Result<String> {
        let Some(root) = node.root() else {
            return Ok(String::new());
        };
        let opts = SerializeOpts { traversal_scope: TraversalScope::ChildrenOnly(None), ..Default::default() };
        let mut out = Vec::new();
        serialize(&mut out, &SerializableHandle::from(root), opts).map_err(|e| UpdateError::Serialize {
            path: path.to_string(),
            format: "markup",
            message: e.to_string(),
        })?;
        String::from_utf8(out).map_err(|e| UpdateError::Serialize {
            path: path.to_string(),
            format: "markup",
            message: e.to_string(),
        })
    }
}

fn is_document(src: &str) -> bool {
    let head = src.trim_start();
    let starts_with = |prefix: &str| head.get(..prefix.len()).is_some_and(|h| h.eq_ignore_ascii_case(prefix));
    if starts_with("<!doctype") {
        return true;
    }
    // `<html-viewer>` and friends are custom elements, not the root element.
    starts_with("<html") && head[5..].chars().next().is_none_or(|c| c == '>' || c == '/' || c.is_ascii_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventStream;
    use crate::overlay::Overlay;
    use crate::pipeline::{PluginOutcome, Updater};
    use pretty_assertions::assert_eq;

    const TEMPLATE: &str = "<div id=\"app\"><!-- header --><p data-old=\"x\">Hi</p><span>there</span></div>";

    #[test]
    fn well_formed_fragments_round_trip() {
        let mut format = MarkupFormat::new();
        let tree = format.parse(TEMPLATE, "app.html").unwrap();
        assert_eq!(format.serialize(&tree, "app.html").unwrap(), TEMPLATE);
    }

    const PAGE: &str = "<!DOCTYPE html><html lang=\"en\"><head><title>App</title></head><body><app-root data-old=\"x\"></app-root></body></html>";

    #[test]
    fn full_documents_round_trip() {
        let mut format = MarkupFormat::new();
        let tree = format.parse(PAGE, "src/index.html").unwrap();
        assert!(tree.is_document());
        assert_eq!(format.serialize(&tree, "src/index.html").unwrap(), PAGE);
    }

    #[test]
    fn documents_are_detected_case_insensitively() {
        assert!(is_document("\n<!doctype html><p>x</p>"));
        assert!(is_document("<HTML><body></body></HTML>"));
        assert!(!is_document("<html-viewer></html-viewer>"));
        assert!(!is_document("<p>not a page</p>"));
        assert!(!is_document(""));
    }

    #[test]
    fn elements_are_listed_in_document_order() {
        let mut format = MarkupFormat::new();
        let tree = format.parse(TEMPLATE, "app.html").unwrap();
        let names: Vec<String> = tree
            .elements()
            .iter()
            .filter_map(|e| match &e.data {
                NodeData::Element { name, .. } => Some(name.local.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["div", "p", "span"]);
    }

    #[test]
    fn claims_html_files() {
        let format = MarkupFormat::new();
        assert!(format.supports("src/app/app.component.html"));
        assert!(format.supports("legacy/index.htm"));
        assert!(!format.supports("src/app/app.component.ts"));
    }

    #[tokio::test]
    async fn in_place_edits_are_serialized() {
        let mut updater = Updater::new(MarkupFormat::new()).with_plugin(|tree: &MarkupTree, _, _| {
            tree.rename_attribute("data-old", "data-new");
            Ok(PluginOutcome::Unchanged)
        });
        let mut overlay = Overlay::new("/p", EventStream::default());
        let out = updater.run(TEMPLATE, "app.html", &mut overlay).await.unwrap();
        assert_eq!(out, TEMPLATE.replace("data-old", "data-new"));
    }

    #[tokio::test]
    async fn edits_keep_document_structure() {
        let src = "<!DOCTYPE html>\n<html lang=\"en\"><head><title>App</title></head><body><app-root data-old=\"x\"></app-root></body></html>";
        let mut updater = Updater::new(MarkupFormat::new()).with_plugin(|tree: &MarkupTree, _, _| {
            tree.rename_attribute("data-old", "data-new");
            Ok(PluginOutcome::Unchanged)
        });
        let mut overlay = Overlay::new("/p", EventStream::default());
        let out = updater.run(src, "src/index.html", &mut overlay).await.unwrap();
        assert_eq!(out, PAGE.replace("data-old", "data-new"));
    }

    #[tokio::test]
    async fn unquoted_attributes_stay_as_written_when_untouched() {
        let src = "<p class=x>Hi</p>";
        let mut updater = Updater::new(MarkupFormat::new()).with_plugin(|_, _, _| Ok(PluginOutcome::Unchanged));
        let mut overlay = Overlay::new("/p", EventStream::default());
        assert_eq!(updater.run(src, "a.html", &mut overlay).await.unwrap(), src);
    }
}
