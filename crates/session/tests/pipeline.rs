//! End-to-end pipeline tests: a real background runtime thread behind
//! the bus, a scripted tokenizer engine, and a session pumping events.

use std::collections::BTreeSet;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bus::{Bus, CoreEvent};
use dom::{Document, NodeId, to_html};
use popup::{PopupUpdate, Rect};
use runtime_background::{BackgroundConfig, start_background_runtime};
use segmenter::Tokenizer;
use session::{PageInit, PageSession, init_for_page};
use storage::{Storage, keys};

/// Canned engine: fixed responses for the fixture sentences, `None` for
/// anything else.
struct Scripted;

impl Tokenizer for Scripted {
    fn tokenize(&mut self, text: &str) -> Option<String> {
        match text {
            "私は学生です" => Some(
                "私\t代名詞\t私\t私\nは\t助詞\tは\tは\n学生\t名詞\t学生\t学生\nです\t助動詞\tです\tです\nEOS\n"
                    .to_string(),
            ),
            "先生も学生です" => Some(
                "先生\t名詞\t先生\t先生\nも\t助詞\tも\tも\n学生\t名詞\t学生\t学生\nです\t助動詞\tです\tです\nEOS\n"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

fn seeded_storage() -> Arc<Mutex<Storage>> {
    let mut s = Storage::in_memory();
    storage::init_defaults(&mut s).unwrap();
    storage::load_dictionary_csv(
        &mut s,
        "の,10000\n私,9000\n学生,1234\n先生,900\n",
    )
    .unwrap();
    // 私 (rank 2) is common enough to skip; 学生 (3) and 先生 (4) match.
    s.set(keys::MINIMUM_RANK, &3u32).unwrap();
    Arc::new(Mutex::new(s))
}

fn paragraph(doc: &mut Document, text: &str) -> NodeId {
    let p = doc.new_element("p");
    let t = doc.new_text(text);
    doc.append_child(doc.root(), p).unwrap();
    doc.append_child(p, t).unwrap();
    p
}

fn start_page(storage: &Arc<Mutex<Storage>>, doc: Document) -> (Box<PageSession>, Bus) {
    let (bus, cmd_rx) = Bus::new();
    start_background_runtime(
        BackgroundConfig {
            tokenizer: Box::new(Scripted),
            storage: storage.clone(),
            remote: None,
        },
        cmd_rx,
        bus.evt_tx.clone(),
    );
    let guard = storage.lock().unwrap();
    match init_for_page(1, doc, &guard, "example.jp", bus.cmd_tx.clone()) {
        PageInit::Active(session) => (session, bus),
        PageInit::Skipped { verdict, .. } => panic!("unexpected verdict: {verdict:?}"),
    }
}

/// Pump events until the session has no outstanding tokenization work.
fn pump(session: &mut PageSession, bus: &Bus) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !session.is_idle() {
        match bus.evt_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => {
                session.handle_event(event);
                session.flush_mutations();
            }
            Err(RecvTimeoutError::Timeout) => {
                assert!(Instant::now() < deadline, "pipeline never went idle");
            }
            Err(RecvTimeoutError::Disconnected) => panic!("background runtime died"),
        }
    }
}

/// Drain further events until `pred` matches one, or panic.
fn wait_for(session: &mut PageSession, bus: &Bus, pred: impl Fn(&CoreEvent) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match bus.evt_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => {
                let done = pred(&event);
                session.handle_event(event);
                session.flush_mutations();
                if done {
                    return;
                }
            }
            Err(_) => assert!(Instant::now() < deadline, "expected event never arrived"),
        }
    }
}

#[test]
fn initial_scan_highlights_rare_words_only() {
    let storage = seeded_storage();
    let mut doc = Document::new();
    let p = paragraph(&mut doc, "私は学生です");
    let (mut session, bus) = start_page(&storage, doc);

    pump(&mut session, &bus);

    let stats = session.stats();
    assert_eq!(stats.nodes_enqueued, 1);
    assert_eq!(stats.highlighted, 1);
    assert_eq!(stats.neutral, 0);

    let html = to_html(session.document(), p);
    assert!(html.contains("class=\"ktbhl_学生_3:1234\""), "html: {html}");
    assert!(!html.contains("ktbhl_私"), "common word wrapped: {html}");
    assert_eq!(session.document().text_content(p), "私は学生です");
}

#[test]
fn non_japanese_and_tiny_nodes_are_never_sent() {
    let storage = seeded_storage();
    let mut doc = Document::new();
    paragraph(&mut doc, "no japanese here at all");
    paragraph(&mut doc, "短い");
    let (mut session, bus) = start_page(&storage, doc);
    pump(&mut session, &bus);
    assert_eq!(session.stats().nodes_enqueued, 0);
}

#[test]
fn inserted_subtrees_are_picked_up_like_a_mutation_observer() {
    let storage = seeded_storage();
    let mut doc = Document::new();
    paragraph(&mut doc, "私は学生です");
    let (mut session, bus) = start_page(&storage, doc);
    pump(&mut session, &bus);
    assert_eq!(session.stats().nodes_reconciled, 1);

    // Late insertion, the infinite-scroll case. Content identical to an
    // already-processed node must still be processed independently.
    let inserted = {
        let doc = session.document_mut();
        paragraph(doc, "私は学生です")
    };
    session.flush_mutations();
    pump(&mut session, &bus);

    assert_eq!(session.stats().nodes_reconciled, 2);
    let html = to_html(session.document(), inserted);
    assert!(html.contains("class=\"ktbhl_学生_3:1234\""));
}

#[test]
fn rescanning_processed_content_enqueues_nothing() {
    let storage = seeded_storage();
    let mut doc = Document::new();
    paragraph(&mut doc, "私は学生です");
    let (mut session, bus) = start_page(&storage, doc);
    pump(&mut session, &bus);

    let before = session.stats().nodes_enqueued;
    session.flush_mutations();
    assert_eq!(session.stats().nodes_enqueued, before);
    assert!(session.is_idle());
}

#[test]
fn engine_failure_leaves_the_node_untouched() {
    let storage = seeded_storage();
    let mut doc = Document::new();
    let p = paragraph(&mut doc, "未知の文章ですよ");
    let (mut session, bus) = start_page(&storage, doc);
    pump(&mut session, &bus);

    assert_eq!(session.stats().nodes_skipped, 1);
    let html = to_html(session.document(), p);
    assert!(!html.contains("<span"), "spans without output: {html}");
    assert_eq!(session.document().text_content(p), "未知の文章ですよ");
}

#[test]
fn unhighlight_push_strips_rendered_spans() {
    let storage = seeded_storage();
    let mut doc = Document::new();
    let p = paragraph(&mut doc, "私は学生です");
    let (mut session, bus) = start_page(&storage, doc);
    pump(&mut session, &bus);
    assert!(to_html(session.document(), p).contains("style="));

    // The user adds 学生 from the popup; the background acknowledges
    // and pushes the unhighlight.
    let hit_id = span_dom_id_in(session.document(), p);
    let now = Instant::now();
    let update = session.pointer_over_element(Some(&hit_id), Rect::default(), now);
    assert!(matches!(update, Some(PopupUpdate::Show(_))));
    session.popup_add();
    wait_for(&mut session, &bus, |e| matches!(e, CoreEvent::Unhighlight { .. }));

    let html = to_html(session.document(), p);
    assert!(html.contains("class=\"ktbhl_none_none\""), "html: {html}");
    assert!(!html.contains("style="), "style survived: {html}");
    assert_eq!(session.document().text_content(p), "私は学生です");

    // And the vocabulary actually grew.
    let vocab: BTreeSet<String> = storage
        .lock()
        .unwrap()
        .get(keys::USER_VOCABULARY)
        .unwrap();
    assert!(vocab.contains("学生"));
}

#[test]
fn vocabulary_words_stay_plain_on_later_pages() {
    let storage = seeded_storage();
    {
        let mut guard = storage.lock().unwrap();
        let vocab = BTreeSet::from(["学生".to_string()]);
        guard.set(keys::USER_VOCABULARY, &vocab).unwrap();
    }
    let mut doc = Document::new();
    let p = paragraph(&mut doc, "先生も学生です");
    let (mut session, bus) = start_page(&storage, doc);
    pump(&mut session, &bus);

    let html = to_html(session.document(), p);
    assert!(html.contains("ktbhl_先生_4:900"), "html: {html}");
    assert!(!html.contains("ktbhl_学生_"), "known word highlighted: {html}");
}

#[test]
fn blacklisted_sites_never_start_a_session() {
    let storage = seeded_storage();
    {
        let mut guard = storage.lock().unwrap();
        guard
            .set(keys::BLACK_LIST, &BTreeSet::from(["spam.example".to_string()]))
            .unwrap();
    }
    let (bus, _cmd_rx) = Bus::new();
    let mut doc = Document::new();
    paragraph(&mut doc, "私は学生です");
    let guard = storage.lock().unwrap();
    match init_for_page(1, doc, &guard, "spam.example", bus.cmd_tx.clone()) {
        PageInit::Skipped { verdict, doc } => {
            assert_eq!(verdict, core_types::Verdict::Blacklisted);
            assert_eq!(doc.text_content(doc.root()), "私は学生です");
        }
        PageInit::Active(_) => panic!("session started on a blacklisted site"),
    }
}

#[test]
fn many_nodes_respect_the_in_flight_bound() {
    let storage = seeded_storage();
    let mut doc = Document::new();
    for _ in 0..50 {
        paragraph(&mut doc, "私は学生です");
    }
    let (mut session, bus) = start_page(&storage, doc);

    // Claim-before-dispatch: all 50 enqueued, at most 20 outstanding.
    assert_eq!(session.stats().nodes_enqueued, 50);
    pump(&mut session, &bus);
    assert_eq!(session.stats().nodes_reconciled, 50);
    assert_eq!(session.stats().highlighted, 50);
}

/// First highlight span id under `root`.
fn span_dom_id_in(doc: &Document, root: NodeId) -> String {
    let mut found = None;
    dom::for_each_node(doc, root, &mut |doc, id| {
        if found.is_none()
            && doc
                .attribute(id, "id")
                .is_some_and(|v| v.starts_with("ktbhl_"))
        {
            found = Some(doc.attribute(id, "id").unwrap().to_string());
        }
    });
    found.expect("no span found")
}
