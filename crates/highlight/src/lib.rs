//! The highlighting core: text-node scanner, bounded tokenization queue,
//! highlight reconciler, and the unhighlight operation.
//!
//! The pipeline for one page: the scanner walks the document and claims
//! eligible text nodes (processed marker on the parent, written before
//! dispatch so a concurrent rescan cannot double-enqueue); the queue
//! sends each node's text to the background tokenizer, at most 20 in
//! flight; the reconciler consumes one node's tabular response and
//! splices styled spans into the node chain, offset by offset. Nothing
//! here blocks: completions arrive over the bus and interleave freely
//! across nodes, which is safe because a node's reconciliation only
//! touches descendants of that node's original position.

mod ident;
mod queue;
mod reconcile;
mod scanner;
mod unhighlight;

pub use ident::{
    CLASS_PREFIX, NEUTRAL_IDENT, PROCESSED_ATTR, SpanIdent, highlight_class, is_span_dom_id,
    neutral_class, parse_class, span_dom_id,
};
pub use queue::{MAX_IN_FLIGHT, TokenizeQueue};
pub use reconcile::{ReconcileStats, reconcile_text_node};
pub use scanner::{eligible_text_nodes, is_content_tag, mark_processed};
pub use unhighlight::unhighlight;
