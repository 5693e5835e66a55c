//! Key naming
//!
//! ```text
//! checkpoint:{thread_id}:{checkpoint_id}   one snapshot's envelope
//! checkpoint:{thread_id}:latest            full envelope of the newest snapshot
//! ```

/// Prefix shared by every checkpoint key
pub const KEY_PREFIX: &str = "checkpoint";

/// Suffix of the latest-pointer key; reserved as a checkpoint ID
pub const LATEST_SUFFIX: &str = "latest";

/// Key of one checkpoint
pub fn checkpoint_key(thread_id: &str, checkpoint_id: &str) -> String {
    format!("{}:{}:{}", KEY_PREFIX, thread_id, checkpoint_id)
}

/// Key of a thread's latest pointer
pub fn latest_key(thread_id: &str) -> String {
    checkpoint_key(thread_id, LATEST_SUFFIX)
}

/// IDs the saver refuses to store.
///
/// Besides `latest` itself, an ID ending in `:latest` would make
/// `checkpoint_key("a", "b:latest")` collide with `latest_key("a:b")`.
pub fn is_reserved_checkpoint_id(checkpoint_id: &str) -> bool {
    checkpoint_id
        .strip_suffix(LATEST_SUFFIX)
        .map_or(false, |head| head.is_empty() || head.ends_with(':'))
}

/// `SCAN MATCH` pattern covering every key of a thread.
///
/// Glob metacharacters in the thread ID are escaped so a thread named `a*`
/// does not match the keys of thread `ab`.
pub fn scan_pattern(thread_id: &str) -> String {
    format!("{}:{}:*", KEY_PREFIX, escape_glob(thread_id))
}

/// Checkpoint ID encoded in `key`, or `None` for the latest pointer and for
/// keys outside the thread's namespace.
pub fn checkpoint_id_from_key<'a>(thread_id: &str, key: &'a str) -> Option<&'a str> {
    let id = key
        .strip_prefix(KEY_PREFIX)?
        .strip_prefix(':')?
        .strip_prefix(thread_id)?
        .strip_prefix(':')?;
    if id.is_empty() || id == LATEST_SUFFIX {
        None
    } else {
        Some(id)
    }
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
