//! In-memory key-value backend for development and testing
//!
//! [`InMemoryKvBackend`] implements [`KvBackend`] on a `HashMap` behind an
//! `Arc<RwLock<..>>`, with per-key expiry measured on the tokio clock. Under
//! `#[tokio::test(start_paused = true)]` tests can advance time with
//! `tokio::time::advance` and watch keys expire without sleeping.
//!
//! Beyond the trait, it exposes a few hooks tests need:
//!
//! - [`insert_raw`](InMemoryKvBackend::insert_raw) plants arbitrary bytes
//! - [`raw`](InMemoryKvBackend::raw) and [`ttl`](InMemoryKvBackend::ttl) inspect a key
//! - [`set_unavailable`](InMemoryKvBackend::set_unavailable) makes every call
//!   fail with [`BackendError::Connection`]
//!
//! Pipelines apply under a single write lock, so no reader observes half of one.
//!
//! Scan cursors name the last key they returned, not a position, so keys
//! expiring mid-scan never shift a live key past the cursor. As with Redis,
//! a key present for the whole scan is returned at least once.

use crate::backend::{BackendResult, KvBackend, KvOp, ScanPage};
use async_trait::async_trait;
use langgraph_checkpoint::BackendError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

type Storage = Arc<RwLock<HashMap<String, Entry>>>;

/// Thread-safe in-memory [`KvBackend`]
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKvBackend {
    entries: Storage,
    unavailable: Arc<AtomicBool>,
    /// Open scan cursors, each resuming after the key it maps to
    cursors: Arc<Mutex<HashMap<u64, String>>>,
    next_cursor: Arc<AtomicU64>,
}

impl InMemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable store
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Store bytes without expiry, bypassing any encoding
    pub async fn insert_raw(&self, key: impl Into<String>, value: Vec<u8>) {
        self.entries.write().await.insert(
            key.into(),
            Entry {
                value,
                expires_at: None,
            },
        );
    }

    /// Bytes stored at `key`, if it has not expired
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Remaining time to live of `key`; `None` when missing or persistent
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at - now)
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every key
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    async fn open_cursor(&self, resume_after: String) -> u64 {
        // Zero means "start" and "done", so it is never handed out.
        let cursor = self.next_cursor.fetch_add(1, Ordering::Relaxed) + 1;
        self.cursors.lock().await.insert(cursor, resume_after);
        cursor
    }

    fn check_available(&self) -> BackendResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BackendError::Connection(
                "in-memory backend marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn expiry(ttl_seconds: u64) -> BackendResult<Instant> {
    if ttl_seconds == 0 {
        return Err(BackendError::Command(
            "invalid expire time in 'setex' command".to_string(),
        ));
    }
    Ok(Instant::now() + Duration::from_secs(ttl_seconds))
}

#[async_trait]
impl KvBackend for InMemoryKvBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.raw(key).await)
    }

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> BackendResult<()> {
        self.check_available()?;
        let expires_at = expiry(ttl_seconds)?;
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> BackendResult<ScanPage> {
        self.check_available()?;
        let resume_after = if cursor == 0 {
            None
        } else {
            let key = self.cursors.lock().await.remove(&cursor);
            Some(key.ok_or_else(|| BackendError::Command(format!("invalid cursor {}", cursor)))?)
        };

        let now = Instant::now();
        let mut keys: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
                .filter(|(key, _)| resume_after.as_ref().map_or(true, |after| *key > after))
                .map(|(key, _)| key.clone())
                .collect()
        };
        keys.sort();

        let more = keys.len() > count.max(1);
        keys.truncate(count.max(1));
        let next = match keys.last() {
            Some(last) if more => self.open_cursor(last.clone()).await,
            _ => 0,
        };
        Ok(ScanPage { cursor: next, keys })
    }

    async fn pipeline(&self, ops: Vec<KvOp>) -> BackendResult<()> {
        self.check_available()?;

        // Validate everything before touching storage so a bad op applies nothing.
        let mut prepared = Vec::with_capacity(ops.len());
        for op in ops {
            let ttl_seconds = match &op {
                KvOp::SetEx { ttl_seconds, .. } | KvOp::Expire { ttl_seconds, .. } => *ttl_seconds,
            };
            prepared.push((op, expiry(ttl_seconds)?));
        }

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.is_live(now));
        for (op, expires_at) in prepared {
            match op {
                KvOp::SetEx { key, value, .. } => {
                    entries.insert(
                        key,
                        Entry {
                            value,
                            expires_at: Some(expires_at),
                        },
                    );
                }
                KvOp::Expire { key, .. } => {
                    if let Some(entry) = entries.get_mut(&key) {
                        entry.expires_at = Some(expires_at);
                    }
                }
            }
        }
        Ok(())
    }

    async fn ping(&self) -> BackendResult<()> {
        self.check_available()
    }
}

/// Redis-compatible glob matching: `*`, `?`, `[abc]`, `[^a-z]` and `\` escapes.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    matches_at(pattern.as_bytes(), text.as_bytes())
}

fn matches_at(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'*') => {
            let mut rest = &pattern[1..];
            while rest.first() == Some(&b'*') {
                rest = &rest[1..];
            }
            if rest.is_empty() {
                return true;
            }
            (0..=text.len()).any(|skip| matches_at(rest, &text[skip..]))
        }
        Some(b'?') => !text.is_empty() && matches_at(&pattern[1..], &text[1..]),
        Some(b'[') => {
            let Some((&c, text_rest)) = text.split_first() else {
                return false;
            };
            match match_class(&pattern[1..], c) {
                Some((matched, pattern_rest)) => matched && matches_at(pattern_rest, text_rest),
                None => c == b'[' && matches_at(&pattern[1..], text_rest),
            }
        }
        Some(b'\\') if pattern.len() > 1 => {
            text.first() == Some(&pattern[1]) && matches_at(&pattern[2..], &text[1..])
        }
        Some(&p) => text.first() == Some(&p) && matches_at(&pattern[1..], &text[1..]),
    }
}

/// Match `c` against a character class whose opening `[` is already consumed.
/// Returns the outcome and the pattern after `]`, or `None` if unterminated.
fn match_class(class: &[u8], c: u8) -> Option<(bool, &[u8])> {
    let (negated, mut rest) = match class.first() {
        Some(b'^') => (true, &class[1..]),
        _ => (false, class),
    };
    let mut matched = false;
    loop {
        match rest {
            [] => return None,
            [b']', tail @ ..] => return Some((matched != negated, tail)),
            [b'\\', escaped, tail @ ..] => {
                matched |= *escaped == c;
                rest = tail;
            }
            [low, b'-', high, tail @ ..] if *high != b']' => {
                let (low, high) = if low <= high { (*low, *high) } else { (*high, *low) };
                matched |= (low..=high).contains(&c);
                rest = tail;
            }
            [single, tail @ ..] => {
                matched |= *single == c;
                rest = tail;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("checkpoint:u1:*", "checkpoint:u1:abc"));
        assert!(glob_match("checkpoint:u1:*", "checkpoint:u1:"));
        assert!(!glob_match("checkpoint:u1:*", "checkpoint:u10:abc"));
        assert!(glob_match("h?llo", "hello"));
        assert!(!glob_match("h?llo", "hllo"));
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("h[a-c]llo", "hbllo"));
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
        assert!(glob_match("**x", "abcx"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_expire_on_the_tokio_clock() {
        let backend = InMemoryKvBackend::new();
        backend.set_with_expiry("k", b"v".to_vec(), 10).await.unwrap();
        assert_eq!(backend.ttl("k").await, Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_resets_ttl_and_ignores_missing_keys() {
        let backend = InMemoryKvBackend::new();
        backend.set_with_expiry("k", b"v".to_vec(), 10).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        backend
            .pipeline(vec![
                KvOp::Expire {
                    key: "k".to_string(),
                    ttl_seconds: 10,
                },
                KvOp::Expire {
                    key: "missing".to_string(),
                    ttl_seconds: 10,
                },
            ])
            .await
            .unwrap();

        assert_eq!(backend.ttl("k").await, Some(Duration::from_secs(10)));
        assert_eq!(backend.raw("missing").await, None);
    }

    #[tokio::test]
    async fn test_pipeline_is_all_or_nothing() {
        let backend = InMemoryKvBackend::new();
        let result = backend
            .pipeline(vec![
                KvOp::SetEx {
                    key: "a".to_string(),
                    value: b"1".to_vec(),
                    ttl_seconds: 60,
                },
                KvOp::SetEx {
                    key: "b".to_string(),
                    value: b"2".to_vec(),
                    ttl_seconds: 0,
                },
            ])
            .await;

        assert!(matches!(result, Err(BackendError::Command(_))));
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_scan_pages_until_cursor_returns_to_zero() {
        let backend = InMemoryKvBackend::new();
        for i in 0..5 {
            backend
                .set_with_expiry(&format!("t:{}", i), vec![], 60)
                .await
                .unwrap();
        }
        backend.set_with_expiry("other", vec![], 60).await.unwrap();

        let first = backend.scan("t:*", 0, 2).await.unwrap();
        assert_eq!(first.keys, vec!["t:0", "t:1"]);
        assert_ne!(first.cursor, 0);

        let all = backend.scan_keys("t:*", 2).await.unwrap();
        assert_eq!(all, vec!["t:0", "t:1", "t:2", "t:3", "t:4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_survives_keys_expiring_between_pages() {
        let backend = InMemoryKvBackend::new();
        backend.set_with_expiry("t:a", vec![], 10).await.unwrap();
        for key in ["t:b", "t:c", "t:d"] {
            backend.set_with_expiry(key, vec![], 100).await.unwrap();
        }

        let first = backend.scan("t:*", 0, 2).await.unwrap();
        assert_eq!(first.keys, vec!["t:a", "t:b"]);

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = backend.scan("t:*", first.cursor, 2).await.unwrap();
        assert_eq!(second.keys, vec!["t:c", "t:d"]);
        assert_eq!(second.cursor, 0);
    }

    #[tokio::test]
    async fn test_unknown_scan_cursor_is_a_command_error() {
        let backend = InMemoryKvBackend::new();
        assert!(matches!(
            backend.scan("*", 42, 10).await,
            Err(BackendError::Command(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_every_call() {
        let backend = InMemoryKvBackend::new();
        backend.set_unavailable(true);

        assert!(matches!(backend.get("k").await, Err(BackendError::Connection(_))));
        assert!(matches!(backend.ping().await, Err(BackendError::Connection(_))));
        assert!(backend.scan_keys("*", 10).await.is_err());

        backend.set_unavailable(false);
        assert!(backend.ping().await.is_ok());
    }
}
