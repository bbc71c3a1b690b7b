//! Gateway to the external morphological tokenizer.
//!
//! The engine is a black box with a line-oriented contract: the request
//! is raw text, the response is one tab-delimited line per token followed
//! by the sentinel pair `EOS` + empty line. Field 0 is the surface form;
//! field 3 is the lemma, except when it carries compound/variant notation
//! (contains `-`), in which case field 2 holds the canonical lemma. Spans
//! the engine cannot decode come back as U+FFFD replacement lines.
//!
//! This crate owns that contract: input preparation, line parsing, the
//! `Tokenizer` trait, a subprocess-backed engine, and a dictionary-driven
//! fallback used where no engine is installed.

mod lexicon;
mod subprocess;

pub use lexicon::LexiconTokenizer;
pub use subprocess::SubprocessTokenizer;

/// First sentinel line terminating every engine response.
pub const EOS_LINE: &str = "EOS";

/// Surface emitted for spans the engine could not decode.
pub const REPLACEMENT: char = '\u{FFFD}';

/// Abstraction over the engine call. Implementations receive text already
/// run through [`prepare_input`] and return the raw tabular response, or
/// `None` when the engine is unavailable or failed; callers treat `None`
/// as "nothing to highlight" and never retry.
pub trait Tokenizer: Send {
    fn tokenize(&mut self, text: &str) -> Option<String>;
}

/// Replace every whitespace character with U+3001 IDEOGRAPHIC COMMA.
///
/// The engine splits on whitespace, which would break the one-to-one
/// mapping between response surfaces and source characters; a fullwidth
/// comma keeps the char count identical while acting as a natural clause
/// break for the engine.
pub fn prepare_input(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_whitespace() { '、' } else { ch })
        .collect()
}

/// Whether a character falls in the Japanese script ranges: CJK symbols
/// and punctuation, hiragana, katakana, fullwidth/halfwidth forms, and
/// the unified ideograph blocks (base + extension A).
pub fn is_japanese(ch: char) -> bool {
    matches!(ch,
        '\u{3000}'..='\u{303f}'
        | '\u{3040}'..='\u{309f}'
        | '\u{30a0}'..='\u{30ff}'
        | '\u{ff00}'..='\u{ff9f}'
        | '\u{4e00}'..='\u{9faf}'
        | '\u{3400}'..='\u{4dbf}')
}

/// Cheap pre-filter: does the text contain any Japanese character at all.
pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(is_japanese)
}

/// One token of a parsed response line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub surface: &'a str,
    pub lemma: &'a str,
    pub fields: Vec<&'a str>,
}

impl<'a> Token<'a> {
    pub fn parse(line: &'a str) -> Token<'a> {
        let fields: Vec<&str> = line.split('\t').collect();
        let surface = fields.first().copied().unwrap_or("");
        let lemma = match fields.get(3) {
            // Compound/variant notation in the lemma field; the base form
            // column holds the canonical lemma.
            Some(l) if l.contains('-') => fields.get(2).copied().unwrap_or(surface),
            Some(l) => l,
            None => surface,
        };
        Token {
            surface,
            lemma,
            fields,
        }
    }

    pub fn surface_char_len(&self) -> usize {
        self.surface.chars().count()
    }

    /// A replacement-artifact line: the engine stood in a single U+FFFD
    /// for an undecodable span.
    pub fn is_replacement_artifact(&self) -> bool {
        self.surface.chars().all(|c| c == REPLACEMENT) && !self.surface.is_empty()
    }
}

/// Token lines of a response, excluding the two sentinel lines.
///
/// The sentinel pair is positional in the contract (always the last two
/// lines), so the final two lines are dropped even when a malformed
/// response does not actually end with `EOS` + empty.
pub fn token_lines(raw: &str) -> impl Iterator<Item = &str> {
    let lines: Vec<&str> = raw.split('\n').collect();
    let take = lines.len().saturating_sub(2);
    lines.into_iter().take(take)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_input_preserves_char_count() {
        let src = "今日 は\tいい天気\nです";
        let prepared = prepare_input(src);
        assert_eq!(prepared.chars().count(), src.chars().count());
        assert_eq!(prepared, "今日、は、いい天気、です");
    }

    #[test]
    fn token_lines_drop_the_sentinel_pair() {
        let raw = "私\t代名詞\t私\t私\nは\t助詞\tは\tは\nEOS\n";
        let lines: Vec<&str> = token_lines(raw).collect();
        assert_eq!(lines, vec!["私\t代名詞\t私\t私", "は\t助詞\tは\tは"]);
    }

    #[test]
    fn token_lines_on_truncated_response() {
        assert_eq!(token_lines("EOS\n").count(), 0);
        assert_eq!(token_lines("").count(), 0);
    }

    #[test]
    fn lemma_comes_from_the_fourth_field() {
        let tok = Token::parse("学生\t名詞\t学生\t学生");
        assert_eq!(tok.surface, "学生");
        assert_eq!(tok.lemma, "学生");
    }

    #[test]
    fn compound_lemma_falls_back_to_base_form_field() {
        let tok = Token::parse("行っ\t動詞\t行く\tイク-行く");
        assert_eq!(tok.surface, "行っ");
        assert_eq!(tok.lemma, "行く");
    }

    #[test]
    fn short_lines_fall_back_to_the_surface() {
        let tok = Token::parse("猫");
        assert_eq!(tok.surface, "猫");
        assert_eq!(tok.lemma, "猫");
        assert_eq!(tok.fields, vec!["猫"]);
    }

    #[test]
    fn japanese_detection_covers_the_script_ranges() {
        assert!(contains_japanese("ひらがな"));
        assert!(contains_japanese("カタカナ"));
        assert!(contains_japanese("漢字"));
        assert!(contains_japanese("ﾊﾝｶｸ"));
        assert!(contains_japanese("latin との混在"));
        assert!(!contains_japanese("plain ASCII 123"));
        assert!(!contains_japanese(""));
    }

    #[test]
    fn replacement_artifact_detection() {
        assert!(Token::parse("\u{FFFD}\t記号").is_replacement_artifact());
        assert!(!Token::parse("猫\t名詞").is_replacement_artifact());
        assert!(!Token::parse("").is_replacement_artifact());
    }
}
