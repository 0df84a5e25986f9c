//! The ordered-store contract the limiter runs against.

use async_trait::async_trait;

use crate::{WindowEntry, ZwindowError};

/// Admission logic run by a store as one indivisible unit.
///
/// `KEYS[1]` is the window key. `ARGV` is `capacity, now_micros, token,
/// clear_before_micros, ttl_ms`. Returns `{"allowed" | "rejected", count}` where
/// `count` is the window size after pruning and before the conditional insert.
///
/// The TTL is refreshed after the insert so a window created by this very call also
/// carries one.
pub(crate) const ADMISSION_LUA: &str = r#"
    local key = KEYS[1]

    local capacity = tonumber(ARGV[1])
    local now_micros = tonumber(ARGV[2])
    local token = ARGV[3]
    local clear_before_micros = tonumber(ARGV[4])
    local ttl_ms = tonumber(ARGV[5])

    redis.call("ZREMRANGEBYSCORE", key, 0, clear_before_micros)

    local count = redis.call("ZCARD", key)
    local result = "rejected"

    if count < capacity then
        redis.call("ZADD", key, now_micros, token)
        result = "allowed"
    end

    redis.call("PEXPIRE", key, ttl_ms)

    return {result, tostring(count)}
"#;

/// The advisory sequence, sent to the store as one transaction:
///
/// 1. remove entries scored in `[0, clear_before_micros]`
/// 2. read every remaining entry with its score
/// 3. add `entry`
/// 4. set the key's TTL to `ttl_ms`
#[derive(Clone, Debug)]
pub struct WindowBatch {
    /// Store key of the window.
    pub key: String,
    /// Entries scored at or below this are pruned.
    pub clear_before_micros: i64,
    /// Entry written unconditionally after the read.
    pub entry: WindowEntry,
    /// TTL applied to the key, in milliseconds.
    pub ttl_ms: u64,
}

/// Positional arguments of [the admission script](WindowStore::run_admission_script).
#[derive(Clone, Debug)]
pub struct AdmissionScriptArgs {
    /// Maximum window size.
    pub capacity: u64,
    /// Score of the candidate entry.
    pub now_micros: i64,
    /// Member name of the candidate entry.
    pub token: String,
    /// Entries scored at or below this are pruned.
    pub clear_before_micros: i64,
    /// TTL applied to the key, in milliseconds.
    pub ttl_ms: u64,
}

/// An ordered key-value store holding one scored set per window key.
///
/// Implementations must make [`record_and_read`](WindowStore::record_and_read) and
/// [`run_admission_script`](WindowStore::run_admission_script) atomic with respect to
/// every other operation on the same key. Operations on different keys never need to
/// coordinate.
///
/// Range replies are raw: a flat `[member, score, member, score, ...]` list ascending
/// by score, decoded by [`parse_range_with_scores`](crate::parse_range_with_scores).
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Delete all members of `key` scored in `[min, max]`, returning how many went.
    async fn remove_range_by_score(&self, key: &str, min: i64, max: i64)
    -> Result<u64, ZwindowError>;

    /// Members of `key` ranked `start..=stop` (negative ranks count from the end),
    /// ascending by score, with their scores.
    async fn range_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, ZwindowError>;

    /// Insert `member` at `score`, or move it there if present. Returns `true` when the
    /// member is new.
    async fn add_with_score(&self, key: &str, score: i64, member: &str)
    -> Result<bool, ZwindowError>;

    /// Set the TTL of `key` to `ttl_ms` milliseconds. Returns `false` if the key does
    /// not exist.
    async fn expire(&self, key: &str, ttl_ms: u64) -> Result<bool, ZwindowError>;

    /// Run the advisory sequence as one transaction and return the raw range reply
    /// read in its second step.
    async fn record_and_read(&self, batch: &WindowBatch) -> Result<Vec<String>, ZwindowError>;

    /// Run the admission logic atomically on `key` and return its raw reply,
    /// `[decision, count]`.
    ///
    /// In order: prune entries scored in `[0, clear_before_micros]`, count the rest,
    /// add the candidate entry if the count is below `capacity`, refresh the TTL.
    /// `decision` is `"allowed"` or `"rejected"` and `count` is the pre-insert size.
    async fn run_admission_script(
        &self,
        key: &str,
        args: &AdmissionScriptArgs,
    ) -> Result<Vec<String>, ZwindowError>;
}
