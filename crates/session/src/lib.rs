//! Per-page orchestration: the content-script analogue.
//!
//! A session owns the page document and wires the pipeline together:
//! verdict check at init, policy snapshot capture, initial scan, queue
//! dispatch over the bus, the event pump, the mutation-journal bridge,
//! and pointer/key routing to the popup controller. The embedder (a real
//! shell, the driver binary, or a test) owns the bus's background end
//! and feeds events back in.

use std::sync::mpsc::Sender;
use std::time::Instant;

use bus::{CoreCommand, CoreEvent};
use core_types::{PageId, Verdict};
use dom::{Document, NodeId};
use highlight::{
    ReconcileStats, TokenizeQueue, eligible_text_nodes, mark_processed, reconcile_text_node,
    unhighlight,
};
use policy::PolicySnapshot;
use popup::{HoverHit, PopupAction, PopupController, PopupUpdate, Rect};
use storage::Storage;

/// Cumulative pipeline counters, for badges and the driver summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub nodes_enqueued: usize,
    pub nodes_reconciled: usize,
    pub nodes_skipped: usize,
    pub tokens: usize,
    pub highlighted: usize,
    pub neutral: usize,
}

pub enum PageInit {
    Active(Box<PageSession>),
    /// The verdict said no; the document comes back untouched.
    Skipped { verdict: Verdict, doc: Document },
}

pub struct PageSession {
    doc: Document,
    page: PageId,
    snapshot: PolicySnapshot,
    queue: TokenizeQueue,
    popup: PopupController,
    cmd_tx: Sender<CoreCommand>,
    span_serial: u32,
    stats: SessionStats,
    last_sync_error: Option<String>,
}

/// Check the verdict for `hostname`, report it for icon state, and when
/// it allows highlighting, capture the policy snapshot and start the
/// session. The snapshot is read exactly once; later storage writes do
/// not affect this page.
pub fn init_for_page(
    page: PageId,
    doc: Document,
    storage: &Storage,
    hostname: &str,
    cmd_tx: Sender<CoreCommand>,
) -> PageInit {
    let (enabled, black, white) = storage::site_config(storage);
    let black: std::collections::HashSet<String> = black.into_iter().collect();
    let white: std::collections::HashSet<String> = white.into_iter().collect();
    let verdict = policy::site_verdict(enabled, &black, &white, hostname);
    let _ = cmd_tx.send(CoreCommand::ReportVerdict { page, verdict });
    if !verdict.should_highlight() {
        return PageInit::Skipped { verdict, doc };
    }

    let snapshot = storage::load_snapshot(storage);
    let mut session = PageSession {
        doc,
        page,
        snapshot,
        queue: TokenizeQueue::new(),
        popup: PopupController::new(),
        cmd_tx,
        span_serial: 1,
        stats: SessionStats::default(),
        last_sync_error: None,
    };
    // Clear any journal noise from document construction; the initial
    // scan below covers the whole tree anyway.
    session.doc.take_mutations();
    session.scan_root();
    PageInit::Active(Box::new(session))
}

impl PageSession {
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Mutable access for the embedder's own DOM updates. Call
    /// [`flush_mutations`](Self::flush_mutations) afterwards so inserted
    /// subtrees get scanned.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn snapshot(&self) -> &PolicySnapshot {
        &self.snapshot
    }

    pub fn last_sync_error(&self) -> Option<&str> {
        self.last_sync_error.as_deref()
    }

    /// All tokenization work delivered and reconciled.
    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    fn scan_root(&mut self) {
        let root = self.doc.root();
        self.scan_subtree(root);
    }

    /// Scanner + claim + enqueue for one subtree, then top up dispatch.
    fn scan_subtree(&mut self, root: NodeId) {
        let nodes = eligible_text_nodes(&self.doc, root);
        for node in nodes {
            // Claim before dispatch: a rescan racing the in-flight
            // request sees the marker and cannot double-enqueue.
            mark_processed(&mut self.doc, node);
            let Some(text) = self.doc.text(node) else {
                continue;
            };
            self.queue.enqueue(node, text.to_string());
            self.stats.nodes_enqueued += 1;
        }
        self.dispatch();
    }

    fn dispatch(&mut self) {
        let page = self.page;
        let cmd_tx = self.cmd_tx.clone();
        self.queue.dispatch(|request, text| {
            let _ = cmd_tx.send(CoreCommand::Tokenize { page, request, text });
        });
    }

    /// Mutation-observer bridge: scan every subtree inserted since the
    /// last drain. Idempotent over the pipeline's own insertions, which
    /// carry the processed marker or span ids.
    pub fn flush_mutations(&mut self) {
        loop {
            let inserted = self.doc.take_mutations();
            if inserted.is_empty() {
                return;
            }
            for root in inserted {
                self.scan_subtree(root);
            }
        }
    }

    /// Feed one background event through the session.
    pub fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::TokenizeDone { page, request, output } => {
                if page != self.page {
                    return;
                }
                let Some(node) = self.queue.complete(request) else {
                    return;
                };
                match output {
                    Some(raw) => {
                        let stats = reconcile_text_node(
                            &mut self.doc,
                            node,
                            &raw,
                            &self.snapshot,
                            &mut self.span_serial,
                        );
                        self.absorb(stats);
                        // The reconciler's own insertions land in the
                        // journal; drain them so they cannot pile up.
                        self.flush_mutations();
                    }
                    None => self.stats.nodes_skipped += 1,
                }
                self.dispatch();
            }
            CoreEvent::Unhighlight { lemma } => {
                unhighlight(&mut self.doc, &lemma);
            }
            CoreEvent::AddLexemeDone { page, lexeme, report } => {
                if page == self.page {
                    log::debug!("add '{lexeme}': {report:?}");
                }
            }
            CoreEvent::SyncFeedback { error } => {
                self.last_sync_error = error;
            }
            // Shell concerns; the session has nothing to do.
            CoreEvent::IconUpdate { .. } | CoreEvent::TabOpened { .. } => {}
        }
    }

    fn absorb(&mut self, stats: ReconcileStats) {
        self.stats.nodes_reconciled += 1;
        self.stats.tokens += stats.tokens;
        self.stats.highlighted += stats.highlighted;
        self.stats.neutral += stats.neutral;
    }

    /// Page teardown: drop queued work; late completions become no-ops.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    // --- popup routing ---------------------------------------------------

    /// Pointer moved; the embedder resolved the element under it (the
    /// elementFromPoint analogue) to a dom id and bounding box.
    pub fn pointer_over_element(
        &mut self,
        dom_id: Option<&str>,
        rect: Rect,
        now: Instant,
    ) -> Option<PopupUpdate> {
        let hit = dom_id.and_then(|dom_id| {
            let el = self.doc.element_by_dom_id(dom_id)?;
            let class = self.doc.attribute(el, "class")?;
            Some(HoverHit {
                dom_id: dom_id.to_string(),
                class: class.to_string(),
                rect,
            })
        });
        self.popup.pointer_over(hit, &self.snapshot, now)
    }

    pub fn modifier_down(&mut self) -> Option<PopupUpdate> {
        self.popup.modifier_down(&self.snapshot)
    }

    pub fn modifier_up(&mut self) {
        self.popup.modifier_up();
    }

    pub fn scrolled(&mut self, now: Instant) {
        self.popup.leave(now);
    }

    pub fn tick(&mut self, now: Instant) -> Option<PopupUpdate> {
        self.popup.tick(now)
    }

    pub fn popup_enter(&mut self) {
        self.popup.popup_enter();
    }

    pub fn popup_leave(&mut self) -> Option<PopupUpdate> {
        self.popup.popup_leave()
    }

    /// The popup's add button: route the current lexeme to the
    /// background; the unhighlight comes back as a push event.
    pub fn popup_add(&mut self) {
        if let Some(PopupAction::AddLexeme(lexeme)) = self.popup.add_current() {
            let _ = self.cmd_tx.send(CoreCommand::AddLexeme {
                page: self.page,
                lexeme,
            });
        }
    }

    /// The popup's audio button: the shell performs the actual speech.
    pub fn popup_speak(&self) -> Option<String> {
        match self.popup.speak_current() {
            Some(PopupAction::Speak(lexeme)) => Some(lexeme),
            _ => None,
        }
    }

    /// A dictionary button: open the lookup URL in a new tab.
    pub fn popup_open_dictionary(&mut self, index: usize) {
        if let Some(PopupAction::OpenUrl(url)) = self.popup.open_dictionary(index, &self.snapshot)
        {
            let _ = self.cmd_tx.send(CoreCommand::OpenTab { url });
        }
    }
}
