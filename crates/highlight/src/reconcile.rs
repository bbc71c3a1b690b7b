//! Highlight reconciler: one text node, one tokenizer response, in-place
//! splicing of styled spans.
//!
//! The running offset `word_begin` is a char offset into the node's
//! content *as it was tokenized*; `last_end` is the offset where the
//! current remainder node begins. Each match splits the remainder at
//! `word_begin - last_end`, deletes the matched surface from the new
//! remainder's head, and inserts the span in front of it. Non-matching
//! tokens advance the offset without touching the DOM, so the offsets of
//! later tokens stay valid while the node chain grows.
//!
//! Must run to completion without yielding: the offsets only make sense
//! against the chain this function itself is mutating.

use dom::{Document, NodeId};
use policy::{NEUTRAL_STYLE, PolicySnapshot, TokenClass, classify, make_hl_style};
use segmenter::{Token, contains_japanese, token_lines};

use crate::ident::{highlight_class, neutral_class, span_dom_id};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub tokens: usize,
    pub highlighted: usize,
    pub neutral: usize,
    /// Final running offset, in chars. Equals the tokenized content's
    /// char length when the response was well-formed.
    pub chars: usize,
}

/// Splice spans for every matched token of `raw` into `text_node`'s
/// chain. Mutation failures abort the individual token, never the loop;
/// the worst case is a token left unhighlighted.
pub fn reconcile_text_node(
    doc: &mut Document,
    text_node: NodeId,
    raw: &str,
    snapshot: &PolicySnapshot,
    span_serial: &mut u32,
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();
    let Some(parent) = doc.parent(text_node) else {
        return stats;
    };
    let hl_style = make_hl_style(&snapshot.highlight.word_params);

    let mut current = text_node;
    let mut word_begin = 0usize;
    let mut last_end = 0usize;
    // One-shot artifact collapser: the engine sometimes emits two
    // replacement lines for a single undecodable char. The second line
    // at the same offset must not advance again.
    let mut artifact_armed = false;
    let mut artifact_offset = 0usize;

    for line in token_lines(raw) {
        let token = Token::parse(line);
        let surface_len = token.surface_char_len();
        stats.tokens += 1;

        if token.is_replacement_artifact() {
            if artifact_armed && artifact_offset == word_begin {
                artifact_armed = false;
                continue;
            }
            word_begin += surface_len;
            artifact_armed = true;
            artifact_offset = word_begin;
            continue;
        }
        artifact_armed = false;

        if !contains_japanese(token.surface) {
            word_begin += surface_len;
            continue;
        }

        let decorated = match classify(token.lemma, snapshot) {
            TokenClass::Highlighted { rank, frequency } => {
                stats.highlighted += 1;
                Some((
                    highlight_class(token.lemma, rank, frequency),
                    hl_style.clone(),
                ))
            }
            TokenClass::Neutral => {
                stats.neutral += 1;
                Some((neutral_class(token.surface), Some(NEUTRAL_STYLE.to_string())))
            }
            TokenClass::Skip => None,
        };

        if let Some((class, style)) = decorated {
            match splice_span(
                doc,
                parent,
                current,
                word_begin - last_end,
                token.surface,
                &class,
                style.as_deref(),
                span_serial,
            ) {
                Ok(remainder) => {
                    last_end = word_begin + surface_len;
                    current = remainder;
                }
                Err(err) => {
                    // DOM structure surprise: abort this token only.
                    log::debug!("span splice skipped: {err:?}");
                }
            }
        }
        word_begin += surface_len;
    }
    stats.chars = word_begin;
    stats
}

/// Split the current remainder at `rel_offset`, consume `surface` from
/// the new remainder, and insert the span before it. Returns the node
/// future splices continue from.
fn splice_span(
    doc: &mut Document,
    parent: NodeId,
    current: NodeId,
    rel_offset: usize,
    surface: &str,
    class: &str,
    style: Option<&str>,
    span_serial: &mut u32,
) -> Result<NodeId, dom::DomError> {
    let remainder = doc.split_text(current, rel_offset)?;
    if doc.text_char_len(remainder) == 0 {
        // Degenerate zero-length remainder (offset drift ran past the
        // end); wrapping here would corrupt the chain.
        return Ok(remainder);
    }

    let span = doc.new_element("span");
    let span_text = doc.new_text(surface);
    doc.append_child(span, span_text)?;
    doc.set_attribute(span, "id", Some(&span_dom_id(*span_serial)))?;
    *span_serial += 1;
    doc.set_attribute(span, "class", Some(class))?;
    if let Some(style) = style {
        doc.set_attribute(span, "style", Some(style))?;
    }

    doc.delete_text_prefix(remainder, surface.chars().count())?;
    doc.insert_before(parent, span, remainder)?;
    Ok(remainder)
}
