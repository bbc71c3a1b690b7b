use crate::{Document, NodeId};

/// Depth-first, document-order visit of `root` and every descendant.
pub fn for_each_node(doc: &Document, root: NodeId, f: &mut impl FnMut(&Document, NodeId)) {
    f(doc, root);
    // children() copies nothing; the recursion borrows the doc immutably.
    for &child in doc.children(root) {
        for_each_node(doc, child, f);
    }
}

/// Collect text nodes under `root` (or `root` itself when it is one),
/// in document order, keeping those whose parent element passes `filter`.
pub fn text_nodes_under(
    doc: &Document,
    root: NodeId,
    filter: &dyn Fn(&Document, NodeId) -> bool,
    out: &mut Vec<NodeId>,
) {
    for_each_node(doc, root, &mut |doc, id| {
        if doc.is_text(id) {
            if let Some(parent) = doc.parent(id) {
                if filter(doc, parent) {
                    out.push(id);
                }
            }
        }
    });
}

/// Whether `node` or any ancestor element satisfies `pred`.
pub fn ancestor_matches(
    doc: &Document,
    node: NodeId,
    pred: &dyn Fn(&Document, NodeId) -> bool,
) -> bool {
    let mut cur = Some(node);
    while let Some(id) = cur {
        if doc.is_element(id) && pred(doc, id) {
            return true;
        }
        cur = doc.parent(id);
    }
    false
}
