use crate::{Document, NodeId, NodeKind};

/// Render a subtree as HTML-ish text, for the driver output and tests.
/// Escaping covers only what keeps the output unambiguous.
pub fn to_html(doc: &Document, root: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, root, &mut out);
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    match doc.kind_of(id) {
        Some(NodeKind::Text { text }) => escape_into(text, out),
        Some(NodeKind::Element { name, attributes }) => {
            out.push('<');
            out.push_str(name);
            for (k, v) in attributes {
                out.push(' ');
                out.push_str(k);
                if let Some(v) = v {
                    out.push_str("=\"");
                    escape_into(v, out);
                    out.push('"');
                }
            }
            out.push('>');
            for &child in doc.children(id) {
                write_node(doc, child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        None => {}
    }
}

fn escape_into(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
