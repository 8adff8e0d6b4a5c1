//! Ephemeral "who is typing" state.
//!
//! One mutex guards the whole map: writes happen at human typing speed and
//! the sweeper runs concurrently with `mark_*`, so a single writer at a time
//! is all that is needed. Nothing here is persisted or fanned out; the relay
//! does delivery.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::time::{Duration, Instant};

use tribune_core::{ConversationId, Principal};

type TypingMap = HashMap<ConversationId, HashMap<Principal, Instant>>;

pub struct TypingTracker {
    window: Duration,
    entries: Mutex<TypingMap>,
}

impl TypingTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, TypingMap> {
        // The map holds no invariants a panicking writer could break halfway.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or refresh. Returns `true` when the principal was not already
    /// typing in this conversation.
    pub fn mark_typing(&self, conversation: &ConversationId, principal: &Principal, now: Instant) -> bool {
        self.lock()
            .entry(conversation.clone())
            .or_default()
            .insert(principal.clone(), now + self.window)
            .is_none()
    }

    /// Remove immediately. Returns `true` if an entry existed.
    pub fn mark_stopped(&self, conversation: &ConversationId, principal: &Principal) -> bool {
        let mut map = self.lock();
        let Some(typists) = map.get_mut(conversation) else {
            return false;
        };
        let removed = typists.remove(principal).is_some();
        if typists.is_empty() {
            map.remove(conversation);
        }
        removed
    }

    /// Drop every entry whose expiry is at or before `now`.
    pub fn sweep_expired(&self, now: Instant) -> Vec<(ConversationId, Principal)> {
        let mut expired = Vec::new();
        self.lock().retain(|conversation, typists| {
            typists.retain(|principal, deadline| {
                if *deadline <= now {
                    expired.push((conversation.clone(), principal.clone()));
                    false
                } else {
                    true
                }
            });
            !typists.is_empty()
        });
        expired
    }

    pub fn is_typing(&self, conversation: &ConversationId, principal: &Principal) -> bool {
        self.lock()
            .get(conversation)
            .is_some_and(|t| t.contains_key(principal))
    }

    /// Principals currently typing in `conversation`.
    pub fn typing_in(&self, conversation: &ConversationId) -> Vec<Principal> {
        let mut out: Vec<Principal> = self
            .lock()
            .get(conversation)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ConversationId, Principal) {
        (ConversationId::from("c1"), Principal::from("alice"))
    }

    #[test]
    fn refresh_does_not_duplicate() {
        let t = TypingTracker::new(Duration::from_secs(3));
        let (c, p) = ids();
        let now = Instant::now();
        assert!(t.mark_typing(&c, &p, now));
        assert!(!t.mark_typing(&c, &p, now + Duration::from_secs(1)));
        assert_eq!(t.len(), 1);
        assert_eq!(t.typing_in(&c), vec![p]);
    }

    #[test]
    fn is_typing_tracks_mark_and_stop() {
        let t = TypingTracker::new(Duration::from_secs(3));
        let (c, p) = ids();
        assert!(!t.is_typing(&c, &p));
        t.mark_typing(&c, &p, Instant::now());
        assert!(t.is_typing(&c, &p));
        assert!(!t.is_typing(&c, &Principal::from("bob")));
        t.mark_stopped(&c, &p);
        assert!(!t.is_typing(&c, &p));
    }

    #[test]
    fn refresh_extends_deadline() {
        let t = TypingTracker::new(Duration::from_secs(3));
        let (c, p) = ids();
        let now = Instant::now();
        t.mark_typing(&c, &p, now);
        t.mark_typing(&c, &p, now + Duration::from_secs(2));

        assert!(t.sweep_expired(now + Duration::from_secs(4)).is_empty());
        assert_eq!(t.sweep_expired(now + Duration::from_secs(5)), vec![(c, p)]);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let t = TypingTracker::new(Duration::from_secs(3));
        let c = ConversationId::from("c1");
        let now = Instant::now();
        t.mark_typing(&c, &"alice".into(), now);
        t.mark_typing(&c, &"bob".into(), now + Duration::from_secs(2));

        let gone = t.sweep_expired(now + Duration::from_secs(3));
        assert_eq!(gone, vec![(c.clone(), Principal::from("alice"))]);
        assert_eq!(t.typing_in(&c), vec![Principal::from("bob")]);

        // already swept: nothing twice
        assert!(t.sweep_expired(now + Duration::from_secs(3)).is_empty());
    }

    #[test]
    fn stop_removes_and_reports() {
        let t = TypingTracker::new(Duration::from_secs(3));
        let (c, p) = ids();
        t.mark_typing(&c, &p, Instant::now());
        assert!(t.mark_stopped(&c, &p));
        assert!(!t.mark_stopped(&c, &p));
        assert!(t.is_empty());
    }
}
