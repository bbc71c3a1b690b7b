//! Hover popup controller.
//!
//! UI-agnostic state machine over `{hidden, pending, shown}`, keyed by
//! the dom id of the highlight span under the pointer. The embedder
//! resolves pointer coordinates to a [`HoverHit`] and forwards pointer,
//! key, scroll, and clock events; the controller answers with
//! [`PopupUpdate`]s (show with a computed view, or hide) and turns
//! button presses into [`PopupAction`]s for the session to route. It
//! never touches the document or the bus.
//!
//! Hiding is debounced: leaving a span schedules a hide 300 ms out,
//! canceled when the pointer re-enters a span or the popup's own box
//! within the window — the pointer routinely crosses the popup on its
//! way somewhere else.

use std::time::{Duration, Instant};

use highlight::{NEUTRAL_IDENT, SpanIdent, parse_class};
use policy::{HoverMode, PolicySnapshot, heat_color};

const HIDE_DELAY: Duration = Duration::from_millis(300);

/// Longest lexeme shown verbatim; longer ones are elided.
const MAX_DISPLAY_CHARS: usize = 20;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// The highlight span currently under the pointer, as resolved by the
/// embedder's hit test.
#[derive(Clone, Debug, PartialEq)]
pub struct HoverHit {
    pub dom_id: String,
    pub class: String,
    pub rect: Rect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopupState {
    Hidden,
    /// A target is under the pointer but gating (mode/key) kept the
    /// popup closed, or a hide is pending.
    Pending,
    Shown,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PopupView {
    /// Lexeme as acted on (add/speak/lookup) and displayed.
    pub lexeme: String,
    /// `rank:frequency` chip, absent on neutral spans.
    pub rank_and_count: Option<String>,
    /// Chip tint derived from the rank percentile.
    pub heat_color: Option<String>,
    pub left: f64,
    pub top: f64,
    /// Pronounce on show (tts setting).
    pub speak: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PopupUpdate {
    Show(PopupView),
    Hide,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PopupAction {
    AddLexeme(String),
    Speak(String),
    OpenUrl(String),
}

pub struct PopupController {
    rendered: Option<String>,
    to_render: Option<HoverHit>,
    modifier_held: bool,
    pointer_on_popup: bool,
    hide_at: Option<Instant>,
    current_lexeme: String,
}

impl PopupController {
    pub fn new() -> Self {
        PopupController {
            rendered: None,
            to_render: None,
            modifier_held: false,
            pointer_on_popup: false,
            hide_at: None,
            current_lexeme: String::new(),
        }
    }

    pub fn state(&self) -> PopupState {
        if self.rendered.is_some() {
            PopupState::Shown
        } else if self.to_render.is_some() {
            PopupState::Pending
        } else {
            PopupState::Hidden
        }
    }

    /// Lexeme of the popup most recently shown.
    pub fn current_lexeme(&self) -> &str {
        &self.current_lexeme
    }

    /// Pointer moved; `hit` is the span under it, if any.
    pub fn pointer_over(
        &mut self,
        hit: Option<HoverHit>,
        snapshot: &PolicySnapshot,
        now: Instant,
    ) -> Option<PopupUpdate> {
        match hit {
            Some(hit) if parse_class(&hit.class).is_some() => {
                self.hide_at = None;
                self.to_render = Some(hit);
                self.try_show(snapshot)
            }
            _ => {
                self.leave(now);
                None
            }
        }
    }

    /// Pointer left the highlighted region (or the page scrolled).
    pub fn leave(&mut self, now: Instant) {
        self.to_render = None;
        if self.rendered.is_some() && self.hide_at.is_none() {
            self.hide_at = Some(now + HIDE_DELAY);
        }
    }

    /// The modifier key that force-enables "on key" popups went down.
    pub fn modifier_down(&mut self, snapshot: &PolicySnapshot) -> Option<PopupUpdate> {
        self.modifier_held = true;
        self.try_show(snapshot)
    }

    pub fn modifier_up(&mut self) {
        self.modifier_held = false;
    }

    /// Pointer entered the popup's own box: a pending hide is moot.
    pub fn popup_enter(&mut self) {
        self.pointer_on_popup = true;
        self.hide_at = None;
    }

    /// Pointer left the popup's box.
    pub fn popup_leave(&mut self) -> Option<PopupUpdate> {
        self.pointer_on_popup = false;
        if self.to_render_id() != self.rendered.as_deref() {
            self.hide_now()
        } else {
            None
        }
    }

    /// Clock tick; fires a debounced hide when it is due.
    pub fn tick(&mut self, now: Instant) -> Option<PopupUpdate> {
        let due = self.hide_at.is_some_and(|at| now >= at);
        if !due {
            return None;
        }
        self.hide_at = None;
        if self.pointer_on_popup {
            return None;
        }
        if self.to_render_id() == self.rendered.as_deref() {
            return None;
        }
        self.hide_now()
    }

    fn hide_now(&mut self) -> Option<PopupUpdate> {
        self.rendered.take().map(|_| PopupUpdate::Hide)
    }

    fn to_render_id(&self) -> Option<&str> {
        self.to_render.as_ref().map(|h| h.dom_id.as_str())
    }

    fn try_show(&mut self, snapshot: &PolicySnapshot) -> Option<PopupUpdate> {
        let hit = self.to_render.clone()?;
        if Some(hit.dom_id.as_str()) == self.rendered.as_deref() {
            return None;
        }
        let ident = parse_class(&hit.class)?;

        // A parseable rank segment marks a live highlight; neutral and
        // cleared spans both fall to the other-word setting.
        let is_highlighted = hit.class != NEUTRAL_IDENT && ident.rank().is_some();
        let mode = if is_highlighted {
            snapshot.hover.hl_hover
        } else {
            snapshot.hover.ow_hover
        };
        match mode {
            HoverMode::Never => return None,
            HoverMode::Key if !self.modifier_held => return None,
            _ => {}
        }

        let view = self.build_view(&hit, ident, snapshot);
        self.rendered = Some(hit.dom_id.clone());
        Some(PopupUpdate::Show(view))
    }

    fn build_view(
        &mut self,
        hit: &HoverHit,
        ident: SpanIdent<'_>,
        snapshot: &PolicySnapshot,
    ) -> PopupView {
        self.current_lexeme = format_lexeme(ident.lemma);
        let rank_and_count = ident.rank_and_count.map(str::to_string);
        let heat = ident.rank().map(|rank| {
            let dict_len = snapshot.dictionary.len().max(1) as f64;
            heat_color(rank as f64 / dict_len * 100.0)
        });
        PopupView {
            lexeme: self.current_lexeme.clone(),
            rank_and_count,
            heat_color: heat,
            left: (((hit.rect.left + hit.rect.right) / 2.0).floor() - 100.0).max(5.0),
            top: hit.rect.bottom,
            speak: snapshot.tts_enabled,
        }
    }

    // --- button handlers -------------------------------------------------

    pub fn add_current(&self) -> Option<PopupAction> {
        if self.current_lexeme.is_empty() {
            return None;
        }
        Some(PopupAction::AddLexeme(self.current_lexeme.clone()))
    }

    pub fn speak_current(&self) -> Option<PopupAction> {
        if self.current_lexeme.is_empty() {
            return None;
        }
        Some(PopupAction::Speak(self.current_lexeme.clone()))
    }

    /// Look the current lexeme up in the nth configured online
    /// dictionary.
    pub fn open_dictionary(&self, index: usize, snapshot: &PolicySnapshot) -> Option<PopupAction> {
        if self.current_lexeme.is_empty() {
            return None;
        }
        let dict = snapshot.online_dicts.get(index)?;
        Some(PopupAction::OpenUrl(dict_definition_url(
            &dict.url,
            &self.current_lexeme,
        )))
    }
}

impl Default for PopupController {
    fn default() -> Self {
        Self::new()
    }
}

/// Display/action form of an identifier lemma: the dash normalization is
/// reversed and over-long lexemes are elided.
pub fn format_lexeme(lemma: &str) -> String {
    let word = lemma.replace('-', " ");
    if word.chars().count() <= MAX_DISPLAY_CHARS {
        return word;
    }
    let cut: String = word.chars().take(MAX_DISPLAY_CHARS).collect();
    format!("{cut}...")
}

/// Lookup URL: the configured base with the percent-encoded lexeme
/// appended.
pub fn dict_definition_url(base: &str, lexeme: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(lexeme.as_bytes()).collect();
    format!("{base}{encoded}")
}
