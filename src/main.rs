//! Demo driver: run the highlighting pipeline over plain text.
//!
//! Builds a one-paragraph-per-line document, runs it through the full
//! session/background pipeline, and prints the annotated HTML. Uses the
//! external analyzer when `--tokenizer` is given, the dictionary-driven
//! fallback otherwise.
//!
//!     kotoba --dict bccwj.csv --text article.txt [--vocab known.txt]
//!            [--min-rank N] [--tokenizer mecab] [--tokenize-other]

use std::collections::BTreeSet;
use std::process::ExitCode;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bus::Bus;
use dom::{Document, to_html};
use policy::{HoverMode, HoverSettings};
use runtime_background::{BackgroundConfig, start_background_runtime};
use segmenter::{LexiconTokenizer, SubprocessTokenizer, Tokenizer};
use session::{PageInit, init_for_page};
use storage::{Storage, keys};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

struct Args {
    dict: String,
    text: String,
    vocab: Option<String>,
    min_rank: Option<u32>,
    tokenizer: Option<String>,
    tokenize_other: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut dict = None;
    let mut text = None;
    let mut vocab = None;
    let mut min_rank = None;
    let mut tokenizer = None;
    let mut tokenize_other = false;

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next().ok_or_else(|| format!("{name} needs a value"))
        };
        match arg.as_str() {
            "--dict" => dict = Some(value("--dict")?),
            "--text" => text = Some(value("--text")?),
            "--vocab" => vocab = Some(value("--vocab")?),
            "--min-rank" => {
                min_rank = Some(
                    value("--min-rank")?
                        .parse::<u32>()
                        .map_err(|e| format!("--min-rank: {e}"))?,
                )
            }
            "--tokenizer" => tokenizer = Some(value("--tokenizer")?),
            "--tokenize-other" => tokenize_other = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Args {
        dict: dict.ok_or("--dict is required")?,
        text: text.ok_or("--text is required")?,
        vocab,
        min_rank,
        tokenizer,
        tokenize_other,
    })
}

fn run(args: Args) -> Result<(), String> {
    let csv =
        std::fs::read_to_string(&args.dict).map_err(|e| format!("{}: {e}", args.dict))?;
    let text =
        std::fs::read_to_string(&args.text).map_err(|e| format!("{}: {e}", args.text))?;

    let mut store = Storage::in_memory();
    storage::init_defaults(&mut store).map_err(|e| format!("storage: {e:?}"))?;
    let words =
        storage::load_dictionary_csv(&mut store, &csv).map_err(|e| format!("dict: {e:?}"))?;
    log::info!("dictionary loaded: {words} words");

    if let Some(path) = &args.vocab {
        let known = std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
        let vocabulary: BTreeSet<String> = known
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        log::info!("known vocabulary: {} words", vocabulary.len());
        store
            .set(keys::USER_VOCABULARY, &vocabulary)
            .map_err(|e| format!("storage: {e:?}"))?;
    }
    if let Some(min_rank) = args.min_rank {
        store
            .set(keys::MINIMUM_RANK, &min_rank)
            .map_err(|e| format!("storage: {e:?}"))?;
    }
    if args.tokenize_other {
        let hover = HoverSettings {
            hl_hover: HoverMode::Always,
            ow_hover: HoverMode::Always,
        };
        store
            .set(keys::HOVER_SETTINGS, &hover)
            .map_err(|e| format!("storage: {e:?}"))?;
    }

    let engine: Box<dyn Tokenizer> = match &args.tokenizer {
        Some(program) => Box::new(SubprocessTokenizer::new(program.clone(), Vec::new())),
        None => {
            let snapshot = storage::load_snapshot(&store);
            Box::new(LexiconTokenizer::new(
                snapshot.dictionary.lemmas().map(str::to_string),
            ))
        }
    };

    let mut doc = Document::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let p = doc.new_element("p");
        let t = doc.new_text(line);
        doc.append_child(doc.root(), p)
            .and_then(|_| doc.append_child(p, t))
            .map_err(|e| format!("document build: {e:?}"))?;
    }

    let store = Arc::new(Mutex::new(store));
    let (bus, cmd_rx) = Bus::new();
    start_background_runtime(
        BackgroundConfig {
            tokenizer: engine,
            storage: store.clone(),
            remote: None,
        },
        cmd_rx,
        bus.evt_tx.clone(),
    );

    let mut session = {
        let guard = store.lock().map_err(|_| "storage poisoned".to_string())?;
        match init_for_page(1, doc, &guard, "local", bus.cmd_tx.clone()) {
            PageInit::Active(session) => session,
            PageInit::Skipped { verdict, .. } => {
                return Err(format!("page skipped: {}", verdict.reason()));
            }
        }
    };

    while !session.is_idle() {
        match bus.evt_rx.recv_timeout(Duration::from_secs(30)) {
            Ok(event) => {
                session.handle_event(event);
                session.flush_mutations();
            }
            Err(RecvTimeoutError::Timeout) => return Err("tokenizer stalled".to_string()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err("background runtime died".to_string());
            }
        }
    }

    println!("{}", to_html(session.document(), session.document().root()));
    let stats = session.stats();
    log::info!(
        "{} nodes, {} tokens, {} highlighted, {} neutral, {} skipped",
        stats.nodes_reconciled,
        stats.tokens,
        stats.highlighted,
        stats.neutral,
        stats.nodes_skipped,
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("kotoba: {err}");
            eprintln!(
                "usage: kotoba --dict <freq.csv> --text <file> [--vocab <file>] \
                 [--min-rank N] [--tokenizer CMD] [--tokenize-other]"
            );
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = run(args) {
        eprintln!("kotoba: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
