//! One physical drop can reach the panel twice: once through the panel's own
//! drop zone and once forwarded from the page. Payloads are keyed by content
//! hash and suppressed until their key expires. Observations are checked at
//! the time they arrived, so a copy that waited behind a slow request still
//! matches.

use std::{collections::HashMap, time::Duration};

use sha2::{Digest, Sha256};
use tokio::time::Instant;

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey([u8; 32]);

impl DedupKey {
    pub fn for_text(text: &str) -> Self {
        let digest = Sha256::digest(text.trim().as_bytes());
        Self(digest.into())
    }
}

#[derive(Debug)]
pub struct DropDeduplicator {
    window: Duration,
    expires_at: HashMap<DedupKey, Instant>,
    latest: Option<Instant>,
}

impl DropDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            expires_at: HashMap::new(),
            latest: None,
        }
    }

    /// Records an observation of `text` made at `observed_at`. Returns
    /// `true` for the first observation inside the window and `false` for
    /// every repeat. Stamps need not arrive in order.
    pub fn register(&mut self, text: &str, observed_at: Instant) -> bool {
        self.purge(observed_at);
        let key = DedupKey::for_text(text);
        if self
            .expires_at
            .get(&key)
            .is_some_and(|expires| *expires > observed_at)
        {
            tracing::debug!("duplicate drop suppressed");
            return false;
        }
        self.expires_at.insert(key, observed_at + self.window);
        true
    }

    pub fn tracked(&self) -> usize {
        self.expires_at.len()
    }

    /// Keys outlive their expiry by one more window so that a late, earlier
    /// stamped observation can still be matched.
    fn purge(&mut self, observed_at: Instant) {
        let latest = self.latest.map_or(observed_at, |latest| latest.max(observed_at));
        self.latest = Some(latest);
        let window = self.window;
        self.expires_at.retain(|_, expires| *expires + window > latest);
    }
}

impl Default for DropDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_inside_window_is_suppressed() {
        let start = Instant::now();
        let mut dedup = DropDeduplicator::default();
        assert!(dedup.register("dragged paragraph", start));
        assert!(!dedup.register("dragged paragraph", start + Duration::from_millis(499)));
    }

    #[test]
    fn repeat_after_expiry_is_accepted() {
        let start = Instant::now();
        let mut dedup = DropDeduplicator::default();
        assert!(dedup.register("dragged paragraph", start));
        assert!(dedup.register("dragged paragraph", start + Duration::from_millis(500)));
    }

    #[test]
    fn different_payloads_do_not_collide() {
        let start = Instant::now();
        let mut dedup = DropDeduplicator::default();
        assert!(dedup.register("first", start));
        assert!(dedup.register("second", start));
        assert_eq!(dedup.tracked(), 2);
    }

    #[test]
    fn surrounding_whitespace_does_not_defeat_the_key() {
        let start = Instant::now();
        let mut dedup = DropDeduplicator::default();
        assert!(dedup.register("payload\n", start));
        assert!(!dedup.register("  payload", start));
    }

    #[test]
    fn expired_keys_are_purged() {
        let start = Instant::now();
        let mut dedup = DropDeduplicator::new(Duration::from_millis(10));
        dedup.register("a", start);
        dedup.register("b", start);
        dedup.register("c", start + Duration::from_millis(20));
        assert_eq!(dedup.tracked(), 1);
    }

    #[test]
    fn earlier_stamp_processed_late_still_matches() {
        let start = Instant::now();
        let mut dedup = DropDeduplicator::default();
        assert!(dedup.register("dropped text", start));
        assert!(dedup.register("unrelated", start + Duration::from_millis(600)));
        assert!(!dedup.register("dropped text", start + Duration::from_millis(100)));
    }

    #[test]
    fn expiry_is_measured_from_the_first_stamp() {
        let start = Instant::now();
        let mut dedup = DropDeduplicator::default();
        assert!(dedup.register("dropped text", start + Duration::from_millis(100)));
        assert!(!dedup.register("dropped text", start));
        assert!(dedup.register("dropped text", start + Duration::from_millis(600)));
    }
}
