//! Span identifier encoding.
//!
//! Every span the reconciler inserts carries a class of the shape
//! `ktbhl_<lemma>_<rank>:<frequency>` (highlighted) or `ktbhl_<surface>`
//! (neutral), plus a unique dom id `ktbhl_<serial>`. The class is the
//! only channel later code has for recovering a span's classification —
//! the popup and the unhighlight operation both parse it back by
//! splitting on `_`, so the shape is a compatibility contract.

pub const CLASS_PREFIX: &str = "ktbhl";

/// Class of a span that matched once but was explicitly cleared.
pub const NEUTRAL_IDENT: &str = "ktbhl_none_none";

/// Marker attribute claiming an element's text children for the
/// pipeline. Present means: already scanned (or scan in flight), leave
/// alone.
pub const PROCESSED_ATTR: &str = "data-ktbhl-scanned";

/// Lemmas may contain spaces (multi-word dictionary entries); dashes keep
/// the class token-safe. The popup reverses this for display.
fn normalize_lemma(lemma: &str) -> String {
    lemma.replace(' ', "-")
}

pub fn highlight_class(lemma: &str, rank: u32, frequency: u64) -> String {
    format!("{}_{}_{}:{}", CLASS_PREFIX, normalize_lemma(lemma), rank, frequency)
}

pub fn neutral_class(surface: &str) -> String {
    format!("{}_{}", CLASS_PREFIX, normalize_lemma(surface))
}

pub fn span_dom_id(serial: u32) -> String {
    format!("{CLASS_PREFIX}_{serial}")
}

pub fn is_span_dom_id(dom_id: &str) -> bool {
    dom_id.starts_with(CLASS_PREFIX)
}

/// Decoded span classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpanIdent<'a> {
    pub lemma: &'a str,
    /// `rank:frequency` for highlighted spans; absent on neutral spans.
    pub rank_and_count: Option<&'a str>,
}

impl SpanIdent<'_> {
    pub fn rank(&self) -> Option<u32> {
        let (rank, _) = self.rank_and_count?.split_once(':')?;
        rank.parse().ok()
    }
}

/// Parse a span class back into its identifier. Returns `None` for
/// classes this pipeline did not produce.
pub fn parse_class(class: &str) -> Option<SpanIdent<'_>> {
    let mut parts = class.splitn(3, '_');
    if parts.next() != Some(CLASS_PREFIX) {
        return None;
    }
    let lemma = parts.next()?;
    Some(SpanIdent {
        lemma,
        rank_and_count: parts.next(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlight_class_roundtrip() {
        let class = highlight_class("学生", 500, 1234);
        assert_eq!(class, "ktbhl_学生_500:1234");
        let ident = parse_class(&class).unwrap();
        assert_eq!(ident.lemma, "学生");
        assert_eq!(ident.rank_and_count, Some("500:1234"));
        assert_eq!(ident.rank(), Some(500));
    }

    #[test]
    fn neutral_class_has_no_rank_segment() {
        let class = neutral_class("です");
        let ident = parse_class(&class).unwrap();
        assert_eq!(ident.lemma, "です");
        assert_eq!(ident.rank_and_count, None);
        assert_eq!(ident.rank(), None);
    }

    #[test]
    fn spaced_lemmas_are_dashed() {
        assert_eq!(highlight_class("a b", 1, 2), "ktbhl_a-b_1:2");
    }

    #[test]
    fn cleared_ident_parses_as_none_lemma() {
        let ident = parse_class(NEUTRAL_IDENT).unwrap();
        assert_eq!(ident.lemma, "none");
        assert_eq!(ident.rank_and_count, Some("none"));
        assert_eq!(ident.rank(), None);
    }

    #[test]
    fn foreign_classes_do_not_parse() {
        assert_eq!(parse_class("nav_item_3"), None);
        assert_eq!(parse_class("ktbhl"), None);
    }
}
