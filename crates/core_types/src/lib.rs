pub type PageId = u64;
pub type RequestId = u64;

/// Decision made at page init from the enabled flag and the site lists.
///
/// Blacklist wins over whitelist; the whitelist wins over a disabled
/// extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Highlight,
    Blacklisted,
    NotWhitelisted,
}

impl Verdict {
    pub fn should_highlight(self) -> bool {
        matches!(self, Verdict::Highlight)
    }

    /// Human-readable reason, shown by the shell next to the page icon.
    pub fn reason(self) -> &'static str {
        match self {
            Verdict::Highlight => "highlight",
            Verdict::Blacklisted => "site in \"Skip List\"",
            Verdict::NotWhitelisted => "site is not in \"Favorites List\"",
        }
    }
}
