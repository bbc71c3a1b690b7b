//! Arena document model for the highlighting pipeline.
//!
//! The host page owns the real DOM; this crate models the subset the
//! pipeline needs: element/text nodes, attribute access, subtree
//! insertion, and the text-splice primitives the reconciler uses
//! (`split_text`, `delete_text_prefix`). Nodes are arena-allocated and
//! never deallocated within a document's lifetime, so `NodeId`s stay
//! valid across mutations.
//!
//! Invariants:
//! - A node has at most one parent; insertion APIs refuse re-attachment.
//! - Element names are canonical ASCII-lowercase.
//! - Text offsets are **character** offsets, never bytes.
//! - Every subtree root attached under an in-document parent is recorded
//!   in the mutation journal, including nodes the pipeline itself
//!   inserts. Observers drain the journal with [`Document::take_mutations`].

mod serialize;
mod walk;

pub use serialize::to_html;
pub use walk::{ancestor_matches, for_each_node, text_nodes_under};

/// Index into the document arena. Stable for the document's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub enum NodeKind {
    Element {
        name: String,
        attributes: Vec<(String, Option<String>)>,
    },
    Text {
        text: String,
    },
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomError {
    MissingNode(NodeId),
    NotAText(NodeId),
    NotAnElement(NodeId),
    AlreadyAttached(NodeId),
    InvalidSibling { parent: NodeId, before: NodeId },
    CycleDetected { parent: NodeId, child: NodeId },
}

pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
    journal: Vec<NodeId>,
}

impl Document {
    /// A fresh document whose root is an empty `<body>` element.
    pub fn new() -> Self {
        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
            journal: Vec::new(),
        };
        doc.root = doc.push(NodeKind::Element {
            name: "body".to_string(),
            attributes: Vec::new(),
        });
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn data(&self, id: NodeId) -> Result<&NodeData, DomError> {
        self.nodes.get(id.index()).ok_or(DomError::MissingNode(id))
    }

    fn data_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(DomError::MissingNode(id))
    }

    /// Create a detached element. Names are folded to ASCII-lowercase.
    pub fn new_element(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Element {
            name: name.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    /// Create a detached text node.
    pub fn new_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text {
            text: text.to_string(),
        })
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), Ok(NodeData { kind: NodeKind::Element { .. }, .. }))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.data(id), Ok(NodeData { kind: NodeKind::Text { .. }, .. }))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.data(id).ok()?.kind {
            NodeKind::Element { name, .. } => Some(name.as_str()),
            NodeKind::Text { .. } => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.data(id).ok()?.kind {
            NodeKind::Text { text } => Some(text.as_str()),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn text_char_len(&self, id: NodeId) -> usize {
        self.text(id).map(|t| t.chars().count()).unwrap_or(0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).ok()?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.data(id).map(|d| d.children.as_slice()).unwrap_or(&[])
    }

    /// Whether `id` is reachable from the document root.
    pub fn attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.data(id).ok()?.kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| v.as_deref()),
            NodeKind::Text { .. } => None,
        }
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        match self.data(id) {
            Ok(NodeData { kind: NodeKind::Element { attributes, .. }, .. }) => {
                attributes.iter().any(|(k, _)| k == name)
            }
            _ => false,
        }
    }

    /// Set or replace an attribute. A `None` value models a bare boolean
    /// attribute (`contenteditable`).
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), DomError> {
        match &mut self.data_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => {
                let value = value.map(|v| v.to_string());
                if let Some(slot) = attributes.iter_mut().find(|(k, _)| k == name) {
                    slot.1 = value;
                } else {
                    attributes.push((name.to_string(), value));
                }
                Ok(())
            }
            NodeKind::Text { .. } => {
                debug_assert!(false, "attribute on text node");
                Err(DomError::NotAnElement(id))
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> bool {
        match self.data_mut(id) {
            Ok(NodeData { kind: NodeKind::Element { attributes, .. }, .. }) => {
                let before = attributes.len();
                attributes.retain(|(k, _)| k != name);
                attributes.len() != before
            }
            _ => false,
        }
    }

    /// Append a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        self.data_mut(parent)?.children.push(child);
        self.data_mut(child)?.parent = Some(parent);
        self.journal_insert(parent, child);
        Ok(())
    }

    /// Insert a detached node before an existing child of `parent`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        let pos = self
            .data(parent)?
            .children
            .iter()
            .position(|&c| c == before)
            .ok_or(DomError::InvalidSibling { parent, before })?;
        self.data_mut(parent)?.children.insert(pos, child);
        self.data_mut(child)?.parent = Some(parent);
        self.journal_insert(parent, child);
        Ok(())
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        match &self.data(parent)?.kind {
            NodeKind::Element { .. } => {}
            NodeKind::Text { .. } => {
                debug_assert!(false, "text node cannot have children");
                return Err(DomError::NotAnElement(parent));
            }
        }
        if self.data(child)?.parent.is_some() {
            debug_assert!(false, "child already has a parent");
            return Err(DomError::AlreadyAttached(child));
        }
        if parent == child || self.is_descendant(child, parent) {
            debug_assert!(false, "insertion would create a cycle");
            return Err(DomError::CycleDetected { parent, child });
        }
        Ok(())
    }

    fn is_descendant(&self, ancestor: NodeId, maybe_descendant: NodeId) -> bool {
        let mut stack: Vec<NodeId> = self.children(ancestor).to_vec();
        while let Some(cur) = stack.pop() {
            if cur == maybe_descendant {
                return true;
            }
            stack.extend_from_slice(self.children(cur));
        }
        false
    }

    fn journal_insert(&mut self, parent: NodeId, child: NodeId) {
        if self.attached(parent) {
            self.journal.push(child);
        }
    }

    /// Truncate a text node at `char_offset` (clamped to its length) and
    /// insert a new text node holding the remainder immediately after it.
    /// Returns the remainder node, which may be empty.
    pub fn split_text(&mut self, id: NodeId, char_offset: usize) -> Result<NodeId, DomError> {
        let parent = self.parent(id).ok_or(DomError::MissingNode(id))?;
        let (head, tail) = match &self.data(id)?.kind {
            NodeKind::Text { text } => {
                let byte = char_to_byte(text, char_offset);
                (text[..byte].to_string(), text[byte..].to_string())
            }
            NodeKind::Element { .. } => {
                debug_assert!(false, "split on element node");
                return Err(DomError::NotAText(id));
            }
        };
        let remainder = self.push(NodeKind::Text { text: tail });
        match &mut self.data_mut(id)?.kind {
            NodeKind::Text { text } => *text = head,
            NodeKind::Element { .. } => unreachable!(),
        }
        let pos = self
            .data(parent)?
            .children
            .iter()
            .position(|&c| c == id)
            .ok_or(DomError::InvalidSibling { parent, before: id })?;
        self.data_mut(parent)?.children.insert(pos + 1, remainder);
        self.data_mut(remainder)?.parent = Some(parent);
        self.journal_insert(parent, remainder);
        Ok(remainder)
    }

    /// Delete the first `char_count` characters of a text node. Counts
    /// past the end are clamped.
    pub fn delete_text_prefix(&mut self, id: NodeId, char_count: usize) -> Result<(), DomError> {
        match &mut self.data_mut(id)?.kind {
            NodeKind::Text { text } => {
                let byte = char_to_byte(text, char_count);
                text.drain(..byte);
                Ok(())
            }
            NodeKind::Element { .. } => {
                debug_assert!(false, "delete on element node");
                Err(DomError::NotAText(id))
            }
        }
    }

    pub(crate) fn kind_of(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.index()).map(|d| &d.kind)
    }

    /// Drain the mutation journal: every subtree root inserted under an
    /// in-document parent since the last drain, in insertion order.
    pub fn take_mutations(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.journal)
    }

    /// Locate an element by the value of its `id` attribute.
    pub fn element_by_dom_id(&self, dom_id: &str) -> Option<NodeId> {
        (0..self.nodes.len()).map(|i| NodeId(i as u32)).find(|&id| {
            self.is_element(id) && self.attribute(id, "id") == Some(dom_id) && self.attached(id)
        })
    }

    /// Concatenated text of all text nodes under `root`, document order.
    pub fn text_content(&self, root: NodeId) -> String {
        let mut out = String::new();
        for_each_node(self, root, &mut |doc, id| {
            if let Some(t) = doc.text(id) {
                out.push_str(t);
            }
        });
        out
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn char_to_byte(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_text(text: &str) -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let p = doc.new_element("p");
        let t = doc.new_text(text);
        doc.append_child(doc.root(), p).unwrap();
        doc.append_child(p, t).unwrap();
        (doc, p, t)
    }

    #[test]
    fn split_text_keeps_head_and_returns_remainder() {
        let (mut doc, p, t) = doc_with_text("私は学生です");
        let rest = doc.split_text(t, 2).unwrap();
        assert_eq!(doc.text(t), Some("私は"));
        assert_eq!(doc.text(rest), Some("学生です"));
        assert_eq!(doc.children(p), &[t, rest]);
    }

    #[test]
    fn split_text_clamps_past_the_end() {
        let (mut doc, _p, t) = doc_with_text("ab");
        let rest = doc.split_text(t, 10).unwrap();
        assert_eq!(doc.text(t), Some("ab"));
        assert_eq!(doc.text(rest), Some(""));
    }

    #[test]
    fn delete_text_prefix_is_char_based() {
        let (mut doc, _p, t) = doc_with_text("学生です");
        doc.delete_text_prefix(t, 2).unwrap();
        assert_eq!(doc.text(t), Some("です"));
    }

    #[test]
    fn insert_before_splices_into_sibling_order() {
        let (mut doc, p, t) = doc_with_text("abcdef");
        let rest = doc.split_text(t, 3).unwrap();
        let span = doc.new_element("span");
        doc.insert_before(p, span, rest).unwrap();
        assert_eq!(doc.children(p), &[t, span, rest]);
    }

    #[test]
    fn reattachment_is_refused() {
        let (mut doc, p, t) = doc_with_text("x");
        let err = doc.append_child(doc.root(), t).unwrap_err();
        assert_eq!(err, DomError::AlreadyAttached(t));
        assert_eq!(doc.parent(t), Some(p));
    }

    #[test]
    fn journal_records_attached_insertions_only() {
        let mut doc = Document::new();
        doc.take_mutations();

        // Building a detached subtree is silent.
        let div = doc.new_element("div");
        let t = doc.new_text("こんにちは");
        doc.append_child(div, t).unwrap();
        assert!(doc.take_mutations().is_empty());

        // Attaching the subtree root is observed once.
        doc.append_child(doc.root(), div).unwrap();
        assert_eq!(doc.take_mutations(), vec![div]);

        // Splits under an attached parent are observed as insertions.
        let rest = doc.split_text(t, 2).unwrap();
        assert_eq!(doc.take_mutations(), vec![rest]);
    }

    #[test]
    fn attribute_roundtrip_and_removal() {
        let (mut doc, p, _t) = doc_with_text("x");
        doc.set_attribute(p, "class", Some("a_b")).unwrap();
        assert_eq!(doc.attribute(p, "class"), Some("a_b"));
        doc.set_attribute(p, "class", Some("c")).unwrap();
        assert_eq!(doc.attribute(p, "class"), Some("c"));
        assert!(doc.remove_attribute(p, "class"));
        assert!(!doc.remove_attribute(p, "class"));
    }

    #[test]
    fn bare_attribute_has_no_value_but_exists() {
        let (mut doc, p, _t) = doc_with_text("x");
        doc.set_attribute(p, "contenteditable", None).unwrap();
        assert!(doc.has_attribute(p, "contenteditable"));
        assert_eq!(doc.attribute(p, "contenteditable"), None);
    }

    #[test]
    fn element_by_dom_id_finds_attached_elements() {
        let (mut doc, p, _t) = doc_with_text("x");
        doc.set_attribute(p, "id", Some("ktbhl_7")).unwrap();
        assert_eq!(doc.element_by_dom_id("ktbhl_7"), Some(p));
        assert_eq!(doc.element_by_dom_id("ktbhl_8"), None);
    }

    #[test]
    fn text_content_concatenates_in_document_order() {
        let (mut doc, p, t) = doc_with_text("私は学生です");
        let rest = doc.split_text(t, 2).unwrap();
        let span = doc.new_element("span");
        let inner = doc.new_text("!!");
        doc.append_child(span, inner).unwrap();
        doc.insert_before(p, span, rest).unwrap();
        assert_eq!(doc.text_content(doc.root()), "私は!!学生です");
    }
}
