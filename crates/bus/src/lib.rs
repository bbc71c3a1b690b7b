//! Message contract between the content side (per-page session) and the
//! privileged background runtime. Commands flow content → background,
//! events flow back. Channels are `std::sync::mpsc`; the background end
//! runs on its own thread and the session pumps its event receiver.

use core_types::{PageId, RequestId, Verdict};
use std::sync::mpsc::{Receiver, Sender};

#[derive(Debug)]
pub enum CoreCommand {
    /// Tokenize one text node's content.
    Tokenize {
        page: PageId,
        request: RequestId,
        text: String,
    },
    /// The page's init verdict, for icon/badge state.
    ReportVerdict { page: PageId, verdict: Verdict },
    /// Add a lexeme to the vocabulary (popup button, context menu).
    AddLexeme { page: PageId, lexeme: String },
    /// Open a dictionary-definition tab.
    OpenTab { url: String },
    /// Kick a vocabulary sync.
    StartSync { interactive: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BadgeState {
    None,
    SyncOk,
    SyncError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddLexemeReport {
    Ok,
    Exists,
    Bad,
}

#[derive(Debug)]
pub enum CoreEvent {
    /// Tokenizer response for one request. `None` when the engine was
    /// unavailable or failed; the node is skipped, never retried.
    TokenizeDone {
        page: PageId,
        request: RequestId,
        output: Option<String>,
    },
    /// Browser-chrome state derived from the verdict.
    IconUpdate {
        page: PageId,
        active: bool,
        badge: BadgeState,
    },
    /// Outcome of an add-lexeme command.
    AddLexemeDone {
        page: PageId,
        lexeme: String,
        report: AddLexemeReport,
    },
    /// Strip rendered highlights for a lemma (pushed after vocabulary
    /// changes from any surface: popup, context menu, options screens).
    Unhighlight { lemma: String },
    /// A sync attempt finished; `error` carries the sink message.
    SyncFeedback { error: Option<String> },
    /// Side action: the shell should open this URL.
    TabOpened { url: String },
}

pub struct Bus {
    pub cmd_tx: Sender<CoreCommand>,
    pub evt_rx: Receiver<CoreEvent>,
    pub evt_tx: Sender<CoreEvent>, // shareable for runtimes
}

impl Bus {
    /// Build both channel pairs; the background runtime takes the
    /// command receiver.
    pub fn new() -> (Bus, Receiver<CoreCommand>) {
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
        let (evt_tx, evt_rx) = std::sync::mpsc::channel();
        (
            Bus {
                cmd_tx,
                evt_rx,
                evt_tx,
            },
            cmd_rx,
        )
    }
}
