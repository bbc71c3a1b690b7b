//! Clearing already-rendered highlights for a lemma the user just
//! learned.
//!
//! The span element stays in place — removing it would mean re-merging
//! split text nodes for no visible benefit — but its style is stripped
//! and its identifier rewritten to the reserved cleared marker, so the
//! popup treats it as neutral from then on.

use dom::{Document, NodeId, for_each_node};

use crate::ident::{NEUTRAL_IDENT, parse_class};

/// Strip every highlight span whose identifier lemma equals `lemma`.
/// Returns how many spans changed; calling again is a no-op.
pub fn unhighlight(doc: &mut Document, lemma: &str) -> usize {
    let needle = lemma.replace(' ', "-");
    let mut targets: Vec<NodeId> = Vec::new();
    for_each_node(doc, doc.root(), &mut |doc, id| {
        let Some(class) = doc.attribute(id, "class") else {
            return;
        };
        if class == NEUTRAL_IDENT {
            return;
        }
        if parse_class(class).is_some_and(|ident| ident.lemma == needle) {
            targets.push(id);
        }
    });

    for &id in &targets {
        doc.remove_attribute(id, "style");
        let _ = doc.set_attribute(id, "class", Some(NEUTRAL_IDENT));
    }
    targets.len()
}
