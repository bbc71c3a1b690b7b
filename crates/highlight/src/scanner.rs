//! Text-node scanner: which text nodes are worth tokenizing.

use dom::{Document, NodeId, ancestor_matches, text_nodes_under};
use memchr::memchr;

use crate::ident::{PROCESSED_ATTR, is_span_dom_id};

/// Content-bearing tags whose direct text children qualify. Scripts,
/// styles, and purely structural containers stay out.
const CONTENT_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "b", "i", "em", "strong", "small", "q", "a",
    "blockquote", "li", "dd", "dt", "td", "th", "caption", "figcaption", "article", "section",
    "main", "div", "span",
];

/// Anything at or under these is user-editable; never mutate it.
const EDITABLE_TAGS: &[&str] = &["textarea", "input"];

/// Below this many characters a node is stray punctuation/whitespace.
const MIN_CHARS: usize = 4;

pub fn is_content_tag(name: &str) -> bool {
    CONTENT_TAGS.contains(&name)
}

/// Eligible text nodes under `root` (which may itself be a text node),
/// in document order. Pure query: claiming is a separate step so the
/// caller controls the claim-before-dispatch ordering.
pub fn eligible_text_nodes(doc: &Document, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    text_nodes_under(doc, root, &|doc, parent| {
        doc.tag_name(parent).is_some_and(is_content_tag)
    }, &mut out);
    out.retain(|&node| eligible(doc, node));
    out
}

fn eligible(doc: &Document, node: NodeId) -> bool {
    let Some(text) = doc.text(node) else {
        return false;
    };
    if text.chars().count() < MIN_CHARS {
        return false;
    }
    // Pathetic hack to skip structured data rendered as text (image
    // search results embed JSON blobs in the page).
    let bytes = text.as_bytes();
    if memchr(b'{', bytes).is_some() && memchr(b'}', bytes).is_some() {
        return false;
    }
    if !segmenter::contains_japanese(text) {
        return false;
    }
    !disqualified_ancestry(doc, node)
}

fn disqualified_ancestry(doc: &Document, node: NodeId) -> bool {
    ancestor_matches(doc, node, &|doc, el| {
        if doc.has_attribute(el, PROCESSED_ATTR) {
            return true;
        }
        if doc.has_attribute(el, "contenteditable") {
            return true;
        }
        // Spans this pipeline inserted carry a prefixed dom id; their
        // synthesized text children must never be re-scanned as fresh.
        if doc.attribute(el, "id").is_some_and(is_span_dom_id) {
            return true;
        }
        doc.tag_name(el)
            .is_some_and(|name| EDITABLE_TAGS.contains(&name))
    })
}

/// Claim a text node for the pipeline by marking its parent element.
/// Done before dispatch: a mutation-triggered rescan that races the
/// in-flight tokenization sees the marker and skips the node.
pub fn mark_processed(doc: &mut Document, text_node: NodeId) {
    if let Some(parent) = doc.parent(text_node) {
        if doc.is_element(parent) {
            let _ = doc.set_attribute(parent, PROCESSED_ATTR, Some("1"));
        }
    }
}
