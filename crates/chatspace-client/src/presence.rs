//! Presence tracking for peers in the current room.
//!
//! One [`PresenceRecord`] per `(fingerprint, session)` pair. Updates apply
//! immediately; clears are debounced through a [`Scheduler`] so a
//! clear-then-type sequence from backspacing never flickers; records that
//! stop refreshing are swept after [`STALE_AFTER`].
//!
//! ```text
//!            text_updated (text)           text_cleared + CLEAR_DELAY
//!   absent ─────────────────────► Typing ───────────────────────────► Idle
//!      ▲                             ▲                                  │
//!      │                             └──────── text_updated ────────────┘
//!      │
//!      └──── no message for STALE_AFTER (any state)
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    ops::{Add, Sub},
    time::Duration,
};

use chatspace_core::{Scheduler, TaskId};
use chatspace_crypto::Fingerprint;
use chatspace_proto::{NO_CARET, PresenceUpdate};
use serde::Serialize;

/// Delay before an explicit clear takes effect.
pub const CLEAR_DELAY: Duration = Duration::from_secs(1);

/// A record that has not been refreshed for longer than this is evicted.
pub const STALE_AFTER: Duration = Duration::from_secs(10);

/// Longest display name kept, in characters.
pub const MAX_NAME_CHARS: usize = 30;

/// Identifies one session of one peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PresenceKey {
    /// Verified sender fingerprint.
    pub fingerprint: Fingerprint,
    /// Sender's session identifier.
    pub session_id: String,
}

impl PresenceKey {
    /// Key for `session_id` of `fingerprint`.
    pub fn new(fingerprint: Fingerprint, session_id: impl Into<String>) -> Self {
        Self { fingerprint, session_id: session_id.into() }
    }
}

impl fmt::Display for PresenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.fingerprint, self.session_id)
    }
}

/// How a record should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Non-empty text.
    Typing,
    /// No text, but named and active, so shown as a member.
    Idle,
    /// No text and either unnamed or inactive. Counted online, not shown.
    Hidden,
}

/// Which command produced an incoming update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// `text_updated`
    Updated,
    /// `text_cleared`
    Cleared,
}

/// Cached state of one peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord<I> {
    /// Record key.
    pub key: PresenceKey,
    /// Text with newlines stripped.
    pub text: String,
    /// Trimmed display name, at most [`MAX_NAME_CHARS`] characters.
    pub name: String,
    /// Whether the peer's page is visible.
    pub is_active: bool,
    /// Caret in UTF-16 code units into `text`, or [`NO_CARET`].
    pub caret_offset: i64,
    /// Local time the record was last written.
    pub received_at: I,
}

impl<I> PresenceRecord<I> {
    /// Display status of this record.
    pub fn status(&self) -> PresenceStatus {
        if !self.text.is_empty() {
            PresenceStatus::Typing
        } else if !self.name.is_empty() && self.is_active {
            PresenceStatus::Idle
        } else {
            PresenceStatus::Hidden
        }
    }

    /// Whether the record should be rendered.
    pub fn is_visible(&self) -> bool {
        self.status() != PresenceStatus::Hidden
    }
}

/// Online, typing and idle counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PresenceCounts {
    /// Every known record, shown or not.
    pub online: usize,
    /// Records with text.
    pub typing: usize,
    /// Shown records without text.
    pub idle: usize,
}

/// Effect of an update or tick on the record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    /// Record was created or rewritten.
    Upserted(PresenceKey),
    /// Record was evicted.
    Removed(PresenceKey),
}

#[derive(Debug, Clone)]
struct Sanitized {
    text: String,
    name: String,
    is_active: bool,
    caret_offset: i64,
}

impl Sanitized {
    fn from_update(update: &PresenceUpdate) -> Self {
        let text = strip_newlines(&update.text);
        let caret_offset = clamp_caret(update.caret_offset, &text);
        Self { name: sanitize_name(&update.name), text, is_active: update.is_active, caret_offset }
    }
}

#[derive(Debug)]
struct PendingClear {
    key: PresenceKey,
    state: Sanitized,
}

/// Presence records for one room.
///
/// Generic over the instant type so tests can drive it with a virtual clock.
#[derive(Debug)]
pub struct PresenceTracker<I> {
    records: BTreeMap<PresenceKey, PresenceRecord<I>>,
    clears: Scheduler<I, PendingClear>,
    pending_clears: HashMap<PresenceKey, TaskId>,
}

impl<I> Default for PresenceTracker<I> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            clears: Scheduler::default(),
            pending_clears: HashMap::new(),
        }
    }
}

impl<I> PresenceTracker<I>
where
    I: Copy + Ord + Add<Duration, Output = I> + Sub<Output = Duration>,
{
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an update from `key` received at `now`.
    ///
    /// `Updated` cancels any pending clear and upserts at once. `Cleared`
    /// starts a [`CLEAR_DELAY`] timer unless one is already running for the
    /// key; nothing changes until it fires.
    pub fn receive(
        &mut self,
        key: PresenceKey,
        kind: UpdateKind,
        update: &PresenceUpdate,
        now: I,
    ) -> Vec<PresenceChange> {
        let state = Sanitized::from_update(update);

        match kind {
            UpdateKind::Updated => {
                if let Some(task) = self.pending_clears.remove(&key) {
                    self.clears.cancel(task);
                }
                self.upsert(key.clone(), state, now);
                vec![PresenceChange::Upserted(key)]
            },
            UpdateKind::Cleared => {
                if !self.pending_clears.contains_key(&key) {
                    let task = self
                        .clears
                        .schedule(now + CLEAR_DELAY, PendingClear { key: key.clone(), state });
                    self.pending_clears.insert(key, task);
                }
                Vec::new()
            },
        }
    }

    /// Fire due clears, then evict records older than [`STALE_AFTER`].
    pub fn tick(&mut self, now: I) -> Vec<PresenceChange> {
        let mut changes = Vec::new();

        for (_, clear) in self.clears.pop_due(now) {
            self.pending_clears.remove(&clear.key);
            self.upsert(clear.key.clone(), clear.state, now);
            changes.push(PresenceChange::Upserted(clear.key));
        }

        let stale: Vec<PresenceKey> = self
            .records
            .values()
            .filter(|record| now - record.received_at > STALE_AFTER)
            .map(|record| record.key.clone())
            .collect();

        for key in stale {
            self.records.remove(&key);
            if let Some(task) = self.pending_clears.remove(&key) {
                self.clears.cancel(task);
            }
            changes.push(PresenceChange::Removed(key));
        }

        changes
    }

    /// Drop every record and pending clear.
    pub fn reset(&mut self) -> Vec<PresenceKey> {
        self.clears.clear();
        self.pending_clears.clear();
        std::mem::take(&mut self.records).into_keys().collect()
    }

    /// Record for `key`.
    pub fn get(&self, key: &PresenceKey) -> Option<&PresenceRecord<I>> {
        self.records.get(key)
    }

    /// Records in key order.
    pub fn records(&self) -> impl Iterator<Item = &PresenceRecord<I>> {
        self.records.values()
    }

    /// Records belonging to `fingerprint`.
    pub fn records_for<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
    ) -> impl Iterator<Item = &'a PresenceRecord<I>> + 'a {
        self.records.values().filter(move |record| &record.key.fingerprint == fingerprint)
    }

    /// Whether a clear is waiting to fire for `key`.
    pub fn has_pending_clear(&self, key: &PresenceKey) -> bool {
        self.pending_clears.contains_key(key)
    }

    /// Earliest pending clear deadline.
    pub fn next_deadline(&self) -> Option<I> {
        self.clears.next_deadline()
    }

    /// Current counts.
    pub fn counts(&self) -> PresenceCounts {
        let mut counts = PresenceCounts { online: self.records.len(), ..PresenceCounts::default() };
        for record in self.records.values() {
            match record.status() {
                PresenceStatus::Typing => counts.typing += 1,
                PresenceStatus::Idle => counts.idle += 1,
                PresenceStatus::Hidden => {},
            }
        }
        counts
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record exists.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn upsert(&mut self, key: PresenceKey, state: Sanitized, now: I) {
        let record = PresenceRecord {
            key: key.clone(),
            text: state.text,
            name: state.name,
            is_active: state.is_active,
            caret_offset: state.caret_offset,
            received_at: now,
        };
        self.records.insert(key, record);
    }
}

/// Rate limiter for the "first comment appeared" flash.
#[derive(Debug, Clone)]
pub struct FlashLimiter<I> {
    cooldown: Duration,
    last_fired: Option<I>,
}

impl<I> FlashLimiter<I>
where
    I: Copy + Sub<Output = Duration>,
{
    /// Limiter allowing one flash per `cooldown`.
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last_fired: None }
    }

    /// Record a flash at `now` if the cooldown has passed.
    pub fn try_fire(&mut self, now: I) -> bool {
        match self.last_fired {
            Some(last) if now - last < self.cooldown => false,
            _ => {
                self.last_fired = Some(now);
                true
            },
        }
    }
}

/// Remove line breaks from displayed text.
pub fn strip_newlines(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '\n' | '\r')).collect()
}

/// Trim a display name and cap it at [`MAX_NAME_CHARS`] characters.
pub fn sanitize_name(name: &str) -> String {
    name.trim().chars().take(MAX_NAME_CHARS).collect()
}

/// Length of `text` in UTF-16 code units.
pub fn utf16_len(text: &str) -> i64 {
    text.chars().map(|c| c.len_utf16() as i64).sum()
}

/// Caret offset if it lies within `text`, else [`NO_CARET`].
pub fn clamp_caret(caret_offset: i64, text: &str) -> i64 {
    if (0..=utf16_len(text)).contains(&caret_offset) { caret_offset } else { NO_CARET }
}
