//! The privileged background runtime.
//!
//! One thread owning the tokenizer engine and the write side of storage.
//! It serves tokenization requests from page sessions, tracks icon/badge
//! state, performs vocabulary additions (answering with unhighlight
//! pushes), and runs the sync pipeline. The thread exits when the last
//! command sender is dropped.

use std::collections::BTreeSet;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use bus::{AddLexemeReport, BadgeState, CoreCommand, CoreEvent};
use segmenter::{Tokenizer, prepare_input};
use storage::{AddOutcome, Storage, keys};
use sync::{RemoteFiles, VocabState, full_sync};

/// Vocabulary name used for the remote file pair.
pub const VOCABULARY_NAME: &str = "japanese_vocabulary";

pub struct BackgroundConfig {
    pub tokenizer: Box<dyn Tokenizer>,
    pub storage: Arc<Mutex<Storage>>,
    /// Remote file store for sync; `None` leaves sync unconfigured.
    pub remote: Option<Box<dyn RemoteFiles + Send>>,
}

pub fn start_background_runtime(config: BackgroundConfig, cmd_rx: Receiver<CoreCommand>, evt_tx: Sender<CoreEvent>) {
    thread::spawn(move || {
        let BackgroundConfig {
            mut tokenizer,
            storage,
            mut remote,
        } = config;

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                CoreCommand::Tokenize { page, request, text } => {
                    let output = tokenizer.tokenize(&prepare_input(&text));
                    let _ = evt_tx.send(CoreEvent::TokenizeDone { page, request, output });
                }
                CoreCommand::ReportVerdict { page, verdict } => {
                    let badge = badge_state(&storage, verdict.should_highlight());
                    let _ = evt_tx.send(CoreEvent::IconUpdate {
                        page,
                        active: verdict.should_highlight(),
                        badge,
                    });
                }
                CoreCommand::AddLexeme { page, lexeme } => {
                    let report = add_lexeme(&storage, &lexeme);
                    let _ = evt_tx.send(CoreEvent::AddLexemeDone {
                        page,
                        lexeme: lexeme.clone(),
                        report,
                    });
                    if matches!(report, AddLexemeReport::Ok | AddLexemeReport::Exists) {
                        let _ = evt_tx.send(CoreEvent::Unhighlight { lemma: lexeme });
                    }
                    if report == AddLexemeReport::Ok {
                        maybe_sync(&storage, remote.as_deref_mut(), &evt_tx);
                    }
                }
                CoreCommand::OpenTab { url } => {
                    let _ = evt_tx.send(CoreEvent::TabOpened { url });
                }
                CoreCommand::StartSync { interactive } => {
                    log::debug!("sync requested (interactive: {interactive})");
                    run_sync(&storage, remote.as_deref_mut(), &evt_tx);
                }
            }
        }
    });
}

fn badge_state(storage: &Arc<Mutex<Storage>>, active: bool) -> BadgeState {
    if !active {
        return BadgeState::None;
    }
    let storage = match storage.lock() {
        Ok(guard) => guard,
        Err(_) => return BadgeState::None,
    };
    if !storage.get::<bool>(keys::SYNC_ENABLED).unwrap_or(false) {
        return BadgeState::None;
    }
    match storage.get::<Option<String>>(keys::LAST_SYNC_ERROR).flatten() {
        None => BadgeState::SyncOk,
        Some(_) => BadgeState::SyncError,
    }
}

fn add_lexeme(storage: &Arc<Mutex<Storage>>, lexeme: &str) -> AddLexemeReport {
    let mut storage = match storage.lock() {
        Ok(guard) => guard,
        Err(_) => return AddLexemeReport::Bad,
    };
    match storage::add_lexeme(&mut storage, lexeme) {
        Ok(AddOutcome::Added) => AddLexemeReport::Ok,
        Ok(AddOutcome::Exists) => AddLexemeReport::Exists,
        Ok(AddOutcome::Rejected) => AddLexemeReport::Bad,
        Err(err) => {
            log::warn!("vocabulary write failed: {err:?}");
            AddLexemeReport::Bad
        }
    }
}

/// Periodic sync trigger after a successful addition.
fn maybe_sync(
    storage: &Arc<Mutex<Storage>>,
    remote: Option<&mut (dyn RemoteFiles + Send + 'static)>,
    evt_tx: &Sender<CoreEvent>,
) {
    let due = storage
        .lock()
        .map(|guard| storage::sync_due(&guard, now_ms()))
        .unwrap_or(false);
    if due {
        run_sync(storage, remote, evt_tx);
    }
}

fn run_sync(
    storage: &Arc<Mutex<Storage>>,
    remote: Option<&mut (dyn RemoteFiles + Send + 'static)>,
    evt_tx: &Sender<CoreEvent>,
) {
    let error = match try_sync(storage, remote) {
        Ok(()) => None,
        Err(message) => {
            if let Ok(mut guard) = storage.lock() {
                let _ = storage::record_sync_failure(&mut guard, &message);
            }
            Some(message)
        }
    };
    let _ = evt_tx.send(CoreEvent::SyncFeedback { error });
}

fn try_sync(
    storage: &Arc<Mutex<Storage>>,
    remote: Option<&mut (dyn RemoteFiles + Send + 'static)>,
) -> Result<(), String> {
    let Some(remote) = remote else {
        return Err("sync is not configured".to_string());
    };

    // Snapshot the local state up front; the remote merge runs unlocked.
    let vocab = {
        let mut guard = storage.lock().map_err(|_| "storage poisoned".to_string())?;
        // A crash mid-pipeline must read as a failure, not as clean.
        storage::record_sync_failure(&mut guard, "Unknown sync problem")
            .map_err(|err| format!("{err:?}"))?;
        let all: BTreeSet<String> = guard.get(keys::USER_VOCABULARY).unwrap_or_default();
        let added: BTreeSet<String> = guard
            .get(keys::USER_VOCAB_ADDED)
            .unwrap_or_else(|| all.clone());
        let deleted: BTreeSet<String> = guard.get(keys::USER_VOCAB_DELETED).unwrap_or_default();
        VocabState {
            name: VOCABULARY_NAME.to_string(),
            all,
            added,
            deleted,
        }
    };

    let merged = full_sync(remote, &vocab).map_err(|err| err.message())?;

    let mut guard = storage.lock().map_err(|_| "storage poisoned".to_string())?;
    storage::apply_sync_result(&mut guard, &merged, now_ms()).map_err(|err| format!("{err:?}"))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Verdict;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Scripted;

    impl Tokenizer for Scripted {
        fn tokenize(&mut self, text: &str) -> Option<String> {
            if text.contains('学') {
                Some("学生\t名詞\t学生\t学生\nEOS\n".to_string())
            } else {
                None
            }
        }
    }

    fn seeded_storage() -> Arc<Mutex<Storage>> {
        let mut s = Storage::in_memory();
        storage::init_defaults(&mut s).unwrap();
        storage::load_dictionary_csv(&mut s, "の,10000\n学生,1234\n").unwrap();
        Arc::new(Mutex::new(s))
    }

    fn start(
        storage: Arc<Mutex<Storage>>,
        remote: Option<Box<dyn RemoteFiles + Send>>,
    ) -> (mpsc::Sender<CoreCommand>, mpsc::Receiver<CoreEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        start_background_runtime(
            BackgroundConfig {
                tokenizer: Box::new(Scripted),
                storage,
                remote,
            },
            cmd_rx,
            evt_tx,
        );
        (cmd_tx, evt_rx)
    }

    fn recv(evt_rx: &mpsc::Receiver<CoreEvent>) -> CoreEvent {
        evt_rx.recv_timeout(Duration::from_secs(5)).expect("event")
    }

    #[test]
    fn tokenize_round_trips_through_the_engine() {
        let (cmd_tx, evt_rx) = start(seeded_storage(), None);
        cmd_tx
            .send(CoreCommand::Tokenize {
                page: 1,
                request: 7,
                text: "学生".to_string(),
            })
            .unwrap();
        match recv(&evt_rx) {
            CoreEvent::TokenizeDone { page: 1, request: 7, output: Some(raw) } => {
                assert!(raw.ends_with("EOS\n"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn engine_failure_comes_back_as_none() {
        let (cmd_tx, evt_rx) = start(seeded_storage(), None);
        cmd_tx
            .send(CoreCommand::Tokenize {
                page: 1,
                request: 8,
                text: "english only".to_string(),
            })
            .unwrap();
        match recv(&evt_rx) {
            CoreEvent::TokenizeDone { output: None, .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn add_lexeme_pushes_an_unhighlight() {
        let (cmd_tx, evt_rx) = start(seeded_storage(), None);
        cmd_tx
            .send(CoreCommand::AddLexeme {
                page: 1,
                lexeme: "学生".to_string(),
            })
            .unwrap();
        match recv(&evt_rx) {
            CoreEvent::AddLexemeDone { report: AddLexemeReport::Ok, .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
        match recv(&evt_rx) {
            CoreEvent::Unhighlight { lemma } => assert_eq!(lemma, "学生"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_words_are_rejected_without_unhighlight() {
        let (cmd_tx, evt_rx) = start(seeded_storage(), None);
        cmd_tx
            .send(CoreCommand::AddLexeme {
                page: 1,
                lexeme: "未知語".to_string(),
            })
            .unwrap();
        match recv(&evt_rx) {
            CoreEvent::AddLexemeDone { report: AddLexemeReport::Bad, .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
        // The verdict probe below must be the very next event.
        cmd_tx
            .send(CoreCommand::ReportVerdict {
                page: 1,
                verdict: Verdict::Highlight,
            })
            .unwrap();
        match recv(&evt_rx) {
            CoreEvent::IconUpdate { active: true, badge: BadgeState::None, .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn sync_merges_and_reports_success() {
        let storage = seeded_storage();
        {
            let mut guard = storage.lock().unwrap();
            guard
                .set(keys::USER_VOCABULARY, &BTreeSet::from(["学生".to_string()]))
                .unwrap();
        }
        let mut remote = sync::InMemoryRemote::new();
        remote.seed(sync::SYNC_DIR_NAME, "japanese_vocabulary.txt", "先生");
        let (cmd_tx, evt_rx) = start(storage.clone(), Some(Box::new(remote)));

        cmd_tx
            .send(CoreCommand::StartSync { interactive: false })
            .unwrap();
        match recv(&evt_rx) {
            CoreEvent::SyncFeedback { error: None } => {}
            other => panic!("unexpected event: {other:?}"),
        }
        let guard = storage.lock().unwrap();
        let vocab: BTreeSet<String> = guard.get(keys::USER_VOCABULARY).unwrap();
        assert!(vocab.contains("学生") && vocab.contains("先生"));
        assert_eq!(
            guard.get::<Option<String>>(keys::LAST_SYNC_ERROR),
            Some(None)
        );
    }

    #[test]
    fn unconfigured_sync_reports_the_error_sink() {
        let storage = seeded_storage();
        let (cmd_tx, evt_rx) = start(storage.clone(), None);
        cmd_tx
            .send(CoreCommand::StartSync { interactive: true })
            .unwrap();
        match recv(&evt_rx) {
            CoreEvent::SyncFeedback { error: Some(msg) } => {
                assert!(msg.contains("not configured"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let guard = storage.lock().unwrap();
        assert!(
            guard
                .get::<Option<String>>(keys::LAST_SYNC_ERROR)
                .flatten()
                .is_some()
        );
    }
}
