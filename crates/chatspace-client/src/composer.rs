//! Outgoing side of presence: the local text box.
//!
//! The composer decides when the local state goes out. Input that changes the
//! trimmed text is sent at once; an unchanged state is force-resent as a
//! heartbeat once [`HEARTBEAT_AFTER`] has passed so peers never sweep us.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

use chatspace_proto::{Command, NO_CARET, PresenceUpdate};

use crate::presence::{clamp_caret, sanitize_name, utf16_len};

/// Resend the current state when nothing was sent for this long.
pub const HEARTBEAT_AFTER: Duration = Duration::from_secs(3);

/// Losing focus commits the text after this delay.
pub const BLUR_COMMIT_AFTER: Duration = Duration::from_secs(15);

/// Per-send context supplied by the client.
#[derive(Debug, Clone, Copy)]
pub struct SendContext {
    /// Whether the local page is visible.
    pub is_active: bool,
    /// Wall clock in milliseconds since the Unix epoch.
    pub time: u64,
}

/// Local text box state and the last state sent.
#[derive(Debug, Clone)]
pub struct Composer<I> {
    session_id: String,
    name: String,
    text: String,
    caret_offset: i64,
    focused: bool,
    last_sent: String,
    last_sent_at: Option<I>,
    heartbeat_after: Duration,
}

impl<I> Composer<I>
where
    I: Copy + Ord + Add<Duration, Output = I> + Sub<Output = Duration>,
{
    /// Composer for `session_id` with an empty text box.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            name: String::new(),
            text: String::new(),
            caret_offset: NO_CARET,
            focused: false,
            last_sent: String::new(),
            last_sent_at: None,
            heartbeat_after: HEARTBEAT_AFTER,
        }
    }

    /// Override the heartbeat interval.
    pub fn with_heartbeat_after(mut self, heartbeat_after: Duration) -> Self {
        self.heartbeat_after = heartbeat_after;
        self
    }

    /// Session identifier stamped on every message.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current raw text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Trimmed text of the last message sent.
    pub fn last_sent(&self) -> &str {
        &self.last_sent
    }

    /// Whether the text box has focus.
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Display name sent with every message.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the display name. Takes effect on the next send.
    pub fn set_name(&mut self, name: &str) {
        self.name = sanitize_name(name);
    }

    /// Track focus. Unfocused text boxes report no caret.
    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    /// Text box changed. Returns a message if the trimmed text differs from
    /// the last one sent.
    pub fn input(
        &mut self,
        text: &str,
        caret_offset: i64,
        now: I,
        context: SendContext,
    ) -> Option<Command> {
        self.text = text.to_string();
        self.caret_offset = caret_offset;
        self.update(false, now, context)
    }

    /// Send the current state if it changed, or unconditionally when `force`.
    ///
    /// Empty text goes out as `text_cleared`, anything else as
    /// `text_updated`.
    pub fn update(&mut self, force: bool, now: I, context: SendContext) -> Option<Command> {
        let text = self.text.trim().to_string();
        if text == self.last_sent && !force {
            return None;
        }

        let update = self.presence_update(&text, context);
        self.last_sent = text;
        self.last_sent_at = Some(now);

        if update.text.is_empty() {
            Some(Command::TextCleared(update))
        } else {
            Some(Command::TextUpdated(update))
        }
    }

    /// Empty the text box. Sends `text_cleared` only if something non-empty
    /// was sent before.
    pub fn commit(&mut self, now: I, context: SendContext) -> Option<Command> {
        self.text.clear();
        self.caret_offset = NO_CARET;
        if self.last_sent.is_empty() {
            return None;
        }

        self.last_sent.clear();
        self.last_sent_at = Some(now);
        Some(Command::TextCleared(self.presence_update("", context)))
    }

    /// Whether a heartbeat is due at `now`.
    pub fn heartbeat_due(&self, now: I) -> bool {
        match self.last_sent_at {
            Some(sent) => now - sent > self.heartbeat_after,
            None => true,
        }
    }

    /// Force-resend if a heartbeat is due.
    pub fn heartbeat(&mut self, now: I, context: SendContext) -> Option<Command> {
        if self.heartbeat_due(now) { self.update(true, now, context) } else { None }
    }

    /// Forget what was sent so the next update announces the full state.
    pub fn reset_sent(&mut self) {
        self.last_sent.clear();
        self.last_sent_at = None;
    }

    fn presence_update(&self, trimmed: &str, context: SendContext) -> PresenceUpdate {
        PresenceUpdate {
            session_id: self.session_id.clone(),
            text: trimmed.to_string(),
            name: self.name.clone(),
            caret_offset: self.trimmed_caret(trimmed),
            is_active: context.is_active,
            time: context.time,
        }
    }

    /// Caret shifted into the trimmed text.
    fn trimmed_caret(&self, trimmed: &str) -> i64 {
        if !self.focused || self.caret_offset < 0 || trimmed.is_empty() {
            return NO_CARET;
        }
        let leading = utf16_len(&self.text[..self.text.len() - self.text.trim_start().len()]);
        let caret = (self.caret_offset - leading).clamp(0, utf16_len(trimmed));
        clamp_caret(caret, trimmed)
    }
}

#[cfg(test)]
mod tests {
    use chatspace_core::VirtualInstant;

    use super::*;

    fn at(millis: u64) -> VirtualInstant {
        VirtualInstant::from_elapsed(Duration::from_millis(millis))
    }

    fn ctx() -> SendContext {
        SendContext { is_active: true, time: 1_700_000_000_000 }
    }

    fn focused() -> Composer<VirtualInstant> {
        let mut composer = Composer::new("tab-1");
        composer.set_name("  Alice ");
        composer.set_focused(true);
        composer
    }

    #[test]
    fn changed_text_is_sent_immediately() {
        let mut composer = focused();

        let Some(Command::TextUpdated(update)) = composer.input("hi", 2, at(0), ctx()) else {
            panic!("expected text_updated");
        };
        assert_eq!(update.text, "hi");
        assert_eq!(update.name, "Alice");
        assert_eq!(update.session_id, "tab-1");
        assert_eq!(update.caret_offset, 2);
        assert!(update.is_active);
    }

    #[test]
    fn unchanged_trimmed_text_is_not_resent() {
        let mut composer = focused();
        composer.input("hi", 2, at(0), ctx());

        assert!(composer.input("hi  ", 4, at(10), ctx()).is_none());
    }

    #[test]
    fn emptied_text_sends_clear() {
        let mut composer = focused();
        composer.input("hi", 2, at(0), ctx());

        assert!(matches!(composer.input("  ", 1, at(10), ctx()), Some(Command::TextCleared(_))));
    }

    #[test]
    fn commit_only_clears_after_non_empty_send() {
        let mut composer = focused();
        assert!(composer.commit(at(0), ctx()).is_none());

        composer.input("hi", 2, at(0), ctx());
        assert!(matches!(composer.commit(at(10), ctx()), Some(Command::TextCleared(_))));
        assert_eq!(composer.text(), "");
        assert!(composer.commit(at(20), ctx()).is_none());
    }

    #[test]
    fn heartbeat_fires_after_three_seconds() {
        let mut composer = focused();
        composer.input("hi", 2, at(0), ctx());

        assert!(composer.heartbeat(at(3_000), ctx()).is_none());
        assert!(matches!(composer.heartbeat(at(3_001), ctx()), Some(Command::TextUpdated(_))));
        assert!(composer.heartbeat(at(3_002), ctx()).is_none());
    }

    #[test]
    fn first_heartbeat_announces_empty_state() {
        let mut composer: Composer<VirtualInstant> = Composer::new("tab");

        assert!(matches!(composer.heartbeat(at(0), ctx()), Some(Command::TextCleared(_))));
    }

    #[test]
    fn caret_shifts_past_leading_whitespace() {
        let mut composer = focused();

        let Some(Command::TextUpdated(update)) = composer.input("  hey ", 4, at(0), ctx()) else {
            panic!("expected text_updated");
        };
        assert_eq!(update.text, "hey");
        assert_eq!(update.caret_offset, 2);
    }

    #[test]
    fn unfocused_caret_is_absent() {
        let mut composer = focused();
        composer.set_focused(false);

        let Some(Command::TextUpdated(update)) = composer.input("hey", 1, at(0), ctx()) else {
            panic!("expected text_updated");
        };
        assert_eq!(update.caret_offset, NO_CARET);
    }

    #[test]
    fn long_names_are_capped() {
        let mut composer = focused();
        composer.set_name(&"x".repeat(50));

        assert_eq!(composer.name().len(), 30);
    }
}
