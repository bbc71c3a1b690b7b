use std::collections::HashSet;

use crate::{EOS_LINE, Tokenizer};

/// Dictionary-driven fallback engine: greedy longest match against the
/// frequency dictionary's lemmas, single-char fallthrough for everything
/// else. Far cruder than a real morphological analyzer, but it emits the
/// exact tabular contract, so the rest of the pipeline cannot tell the
/// difference.
pub struct LexiconTokenizer {
    lemmas: HashSet<String>,
    max_chars: usize,
}

impl LexiconTokenizer {
    pub fn new(lemmas: impl IntoIterator<Item = String>) -> Self {
        let lemmas: HashSet<String> = lemmas.into_iter().collect();
        let max_chars = lemmas.iter().map(|l| l.chars().count()).max().unwrap_or(1);
        LexiconTokenizer { lemmas, max_chars }
    }

    fn longest_match<'a>(&self, rest: &'a str) -> Option<&'a str> {
        let mut ends: Vec<usize> = rest
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take(self.max_chars)
            .collect();
        while let Some(end) = ends.pop() {
            let candidate = &rest[..end];
            if self.lemmas.contains(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

impl Tokenizer for LexiconTokenizer {
    fn tokenize(&mut self, text: &str) -> Option<String> {
        let mut out = String::new();
        let mut rest = text;
        while !rest.is_empty() {
            let surface = match self.longest_match(rest) {
                Some(m) => m,
                None => {
                    let ch_len = rest.chars().next().map(|c| c.len_utf8()).unwrap_or(0);
                    &rest[..ch_len]
                }
            };
            // surface / pos / base form / lemma — the field layout the
            // reconciler reads.
            out.push_str(surface);
            out.push_str("\t*\t");
            out.push_str(surface);
            out.push('\t');
            out.push_str(surface);
            out.push('\n');
            rest = &rest[surface.len()..];
        }
        out.push_str(EOS_LINE);
        out.push('\n');
        Some(out)
    }
}
