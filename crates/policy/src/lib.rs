//! Dictionary and policy store.
//!
//! Read-mostly configuration consumed by the pipeline: the frequency
//! dictionary, the user's known-vocabulary set, highlight and hover
//! settings, and the rank threshold. The whole store is captured once at
//! page init as a [`PolicySnapshot`] and threaded through the pipeline;
//! nothing here mutates mid-session.

use std::collections::{HashMap, HashSet};

use core_types::Verdict;
use serde::{Deserialize, Serialize};

/// Frequency dictionary entry. Rank is dense, 1 = most frequent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictEntry {
    pub rank: u32,
    pub frequency: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Dictionary {
    entries: HashMap<String, DictEntry>,
}

impl Dictionary {
    pub fn new(entries: HashMap<String, DictEntry>) -> Self {
        Dictionary { entries }
    }

    /// Parse a `word,frequency` CSV; rank is the 1-based line number.
    /// Blank lines (a trailing newline) are skipped without consuming a
    /// rank.
    pub fn from_frequency_csv(text: &str) -> Self {
        let mut entries = HashMap::new();
        let mut rank = 0u32;
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (word, frequency) = match line.split_once(',') {
                Some((w, f)) => (w, f.trim().parse::<u64>().unwrap_or(0)),
                None => (line, 0),
            };
            rank += 1;
            entries.insert(word.to_string(), DictEntry { rank, frequency });
        }
        Dictionary { entries }
    }

    pub fn get(&self, lemma: &str) -> Option<DictEntry> {
        self.entries.get(lemma).copied()
    }

    pub fn contains(&self, lemma: &str) -> bool {
        self.entries.contains_key(lemma)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lemmas(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Styling knobs for the highlighted-word span.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordParams {
    pub enabled: bool,
    pub bold: bool,
    pub use_background: bool,
    pub background_color: String,
    pub use_color: bool,
    pub color: String,
}

impl Default for WordParams {
    fn default() -> Self {
        WordParams {
            enabled: true,
            bold: true,
            use_background: false,
            background_color: "rgb(255, 248, 220)".to_string(),
            use_color: true,
            color: "red".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HighlightSettings {
    pub word_params: WordParams,
}

/// When the hover popup may appear for a given target kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoverMode {
    Never,
    Key,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoverSettings {
    /// Popups over highlighted spans.
    pub hl_hover: HoverMode,
    /// Popups over neutral ("other word") spans.
    pub ow_hover: HoverMode,
}

impl Default for HoverSettings {
    fn default() -> Self {
        HoverSettings {
            hl_hover: HoverMode::Always,
            ow_hover: HoverMode::Never,
        }
    }
}

impl HoverSettings {
    /// Neutral spans only exist so the popup can target them, so they are
    /// produced exactly when their popups are not disabled outright.
    pub fn tokenize_other(&self) -> bool {
        self.ow_hover != HoverMode::Never
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineDict {
    pub title: String,
    pub url: String,
}

pub fn default_online_dicts() -> Vec<OnlineDict> {
    let pair = |title: &str, url: &str| OnlineDict {
        title: title.to_string(),
        url: url.to_string(),
    };
    vec![
        pair("Define in weblio dictionary", "https://www.weblio.jp/content/"),
        pair("Define in goo dictionary", "https://dictionary.goo.ne.jp/word/"),
        pair(
            "Define in Google",
            "https://encrypted.google.com/search?hl=en&gl=en&q=define:",
        ),
        pair(
            "View pictures in Google",
            "https://encrypted.google.com/search?hl=en&gl=en&tbm=isch&q=",
        ),
    ]
}

/// Immutable per-page view of everything the pipeline reads.
#[derive(Clone, Debug, Default)]
pub struct PolicySnapshot {
    pub dictionary: Dictionary,
    pub vocabulary: HashSet<String>,
    pub highlight: HighlightSettings,
    pub hover: HoverSettings,
    pub minimum_rank: u32,
    pub online_dicts: Vec<OnlineDict>,
    pub tts_enabled: bool,
}

/// Classification of one token against the snapshot. A pure function of
/// its inputs; no hidden state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenClass {
    /// Unknown-to-the-user word worth highlighting.
    Highlighted { rank: u32, frequency: u64 },
    /// Wrapped without styling so the hover popup can target it.
    Neutral,
    /// Left alone entirely.
    Skip,
}

pub fn classify(lemma: &str, snapshot: &PolicySnapshot) -> TokenClass {
    if snapshot.highlight.word_params.enabled && !snapshot.vocabulary.contains(lemma) {
        if let Some(entry) = snapshot.dictionary.get(lemma) {
            if entry.rank >= snapshot.minimum_rank {
                return TokenClass::Highlighted {
                    rank: entry.rank,
                    frequency: entry.frequency,
                };
            }
        }
    }
    if snapshot.hover.tokenize_other() {
        TokenClass::Neutral
    } else {
        TokenClass::Skip
    }
}

/// Inline style for a highlighted span, or `None` when highlighting is
/// effectively disabled by the params.
pub fn make_hl_style(params: &WordParams) -> Option<String> {
    if !params.enabled {
        return None;
    }
    let mut result = String::new();
    if params.bold {
        result.push_str("font-weight:bold;");
    }
    if params.use_background {
        result.push_str(&format!("background-color:{};", params.background_color));
    }
    if params.use_color {
        result.push_str(&format!("color:{};", params.color));
    }
    if result.is_empty() {
        return None;
    }
    result.push_str("font-size:inherit;display:inline;");
    Some(result)
}

/// Style for neutral spans: inherit everything, change nothing visible.
pub const NEUTRAL_STYLE: &str =
    "font:inherit;display:inline;color:inherit;background-color:inherit;";

/// Frequency heat color: common words run hot (red), rare ones cold
/// (green). `freq_percent` is the word's rank percentile, clamped to
/// 0..=100.
pub fn heat_color(freq_percent: f64) -> String {
    let freq_percent = if freq_percent.is_finite() {
        freq_percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let hue = 100.0 - freq_percent;
    format!("hsl({}, 100%, 50%)", hue.round() as i64)
}

/// Per-site decision. Blacklist beats whitelist beats the global flag.
pub fn site_verdict(
    enabled_mode: bool,
    black_list: &HashSet<String>,
    white_list: &HashSet<String>,
    hostname: &str,
) -> Verdict {
    if black_list.contains(hostname) {
        return Verdict::Blacklisted;
    }
    if white_list.contains(hostname) {
        return Verdict::Highlight;
    }
    if enabled_mode {
        Verdict::Highlight
    } else {
        Verdict::NotWhitelisted
    }
}
