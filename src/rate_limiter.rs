//! The sliding-window limiter.

use std::sync::Arc;

use crate::{
    Admission, Capacity, Clock, OsRngTokenSource, SystemClock, TokenSource, WindowDurationMs,
    WindowEntry, WindowKey, WindowStore, ZwindowError,
    store::{AdmissionScriptArgs, WindowBatch},
    window_parser::parse_range_with_scores,
};

/// Configuration for [`SlidingWindowRateLimiter`].
///
/// # Examples
///
/// ```
/// use zwindow::{Capacity, SlidingWindowOptions, WindowDurationMs, WindowKey};
///
/// let options = SlidingWindowOptions {
///     window_duration_ms: WindowDurationMs::try_from(60_000).unwrap(),
///     capacity: Capacity::try_from(1_200).unwrap(),
///     prefix: Some(WindowKey::try_from("api").unwrap()), // keys: api:<identity>
/// };
/// # let _ = options;
/// ```
#[derive(Clone, Debug)]
pub struct SlidingWindowOptions {
    /// Trailing span over which admitted events are counted.
    pub window_duration_ms: WindowDurationMs,

    /// Maximum number of events admitted within one window.
    pub capacity: Capacity,

    /// Optional prefix for all window keys.
    ///
    /// The window of identity `id` is stored under `<prefix>:<id>`. If `None`,
    /// defaults to `"zwindow"`.
    pub prefix: Option<WindowKey>,
}

/// Sliding-window rate limiter over a shared [`WindowStore`].
///
/// Each identity owns one scored set in the store. Every admission attempt is an entry
/// whose score is the attempt's timestamp in microseconds and whose member is a random
/// token, so attempts made in the same microsecond never overwrite each other. Every
/// call refreshes the key's TTL to the window length, so idle windows are dropped by
/// the store.
///
/// The limiter itself is immutable; all state lives in the store. Share it freely
/// (e.g. behind an [`Arc`]) across tasks, threads or processes pointed at the same store.
///
/// Two operations are offered, with different guarantees:
///
/// | | [`time_left`](Self::time_left) | [`allow_request`](Self::allow_request) |
/// |---|---|---|
/// | Store round-trip | transactional batch | atomic script |
/// | Records the attempt | always | only if admitted |
/// | Window size bounded by capacity | no | yes |
/// | Enforcement | by the caller | by the store |
///
/// Neither operation retries. Store failures, entropy failures and malformed replies
/// are returned as errors and never turned into a decision.
pub struct SlidingWindowRateLimiter<S> {
    store: S,
    prefix: WindowKey,
    window_duration_ms: WindowDurationMs,
    capacity: Capacity,
    token_source: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
}

impl<S: WindowStore> SlidingWindowRateLimiter<S> {
    /// Create a limiter bound to `store`, with OS-random tokens and the system clock.
    pub fn new(options: SlidingWindowOptions, store: S) -> Self {
        Self {
            store,
            prefix: options.prefix.unwrap_or_else(WindowKey::default_prefix),
            window_duration_ms: options.window_duration_ms,
            capacity: options.capacity,
            token_source: Arc::new(OsRngTokenSource),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the token source.
    pub fn with_token_source(mut self, token_source: Arc<dyn TokenSource>) -> Self {
        self.token_source = token_source;
        self
    }

    /// Replace the clock.
    ///
    /// All processes sharing a store should agree on time; only swap the clock for one
    /// that does (or in tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The configured window length.
    pub fn window_duration_ms(&self) -> WindowDurationMs {
        self.window_duration_ms
    }

    /// The configured capacity.
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store key holding the window of `identity`.
    ///
    /// Identities are used verbatim and may contain anything, colons included: the
    /// prefix never does, so the first `:` always ends it.
    pub fn window_key(&self, identity: &str) -> String {
        format!("{}:{identity}", *self.prefix)
    }

    /// Advisory check: milliseconds to wait before the next request for `identity`
    /// would fit, or `0` to proceed now.
    ///
    /// In one transaction the window is pruned, read, and the current attempt is
    /// recorded **unconditionally**, whatever the answer. The count the answer is based
    /// on is the one read before that insert.
    ///
    /// The answer is only advice: callers are expected to reject the request when it
    /// is non-zero. Concurrent callers can all be told `0` and the window can hold more
    /// than `capacity` entries. Use [`allow_request`](Self::allow_request) when the
    /// bound must hold.
    ///
    /// When the window is full the wait is the time until its oldest entry leaves
    /// the window, truncated to whole milliseconds but never below 1, so `0` always
    /// means "admit".
    pub async fn time_left(&self, identity: &str) -> Result<u64, ZwindowError> {
        let now_micros = self.clock.now_micros();
        let clear_before_micros = now_micros.saturating_sub(self.window_duration_ms.as_micros());
        let token = self.token_source.next_token()?;
        let key = self.window_key(identity);

        tracing::debug!(key = %key, clear_before_micros, token = %token, "zwindow.time_left");

        let reply = self
            .store
            .record_and_read(&WindowBatch {
                key: key.clone(),
                clear_before_micros,
                entry: WindowEntry {
                    timestamp_micros: now_micros,
                    token,
                },
                ttl_ms: self.window_duration_ms.ttl_ms(),
            })
            .await?;

        let entries = parse_range_with_scores(reply).inspect_err(|err| {
            tracing::warn!(key = %key, error = %err, "zwindow.time_left.protocol_error");
        })?;

        if (entries.len() as u64) < *self.capacity {
            tracing::debug!(key = %key, count = entries.len(), "zwindow.time_left.admit");
            return Ok(0);
        }

        let oldest = entries.first().ok_or_else(|| {
            ZwindowError::ProtocolError("full window returned no entries".to_string())
        })?;

        let wait_ms = oldest.timestamp_micros.saturating_sub(clear_before_micros) / 1000;
        let wait_ms = u64::try_from(wait_ms).unwrap_or(0).max(1);

        tracing::debug!(key = %key, count = entries.len(), wait_ms, "zwindow.time_left.wait");

        Ok(wait_ms)
    } // end method time_left

    /// Atomic check: whether a request for `identity` is admitted.
    ///
    /// Pruning, counting and the conditional insert run as one script on the store, so
    /// the window never holds more than `capacity` entries, whatever the concurrency.
    /// Rejected attempts are not recorded.
    pub async fn allow_request(&self, identity: &str) -> Result<bool, ZwindowError> {
        Ok(self.admit(identity).await?.allowed)
    }

    /// Like [`allow_request`](Self::allow_request), also reporting the window size the
    /// decision was based on.
    pub async fn admit(&self, identity: &str) -> Result<Admission, ZwindowError> {
        let now_micros = self.clock.now_micros();
        let clear_before_micros = now_micros.saturating_sub(self.window_duration_ms.as_micros());
        let token = self.token_source.next_token()?;
        let key = self.window_key(identity);

        tracing::debug!(key = %key, clear_before_micros, token = %token, "zwindow.admit");

        let reply = self
            .store
            .run_admission_script(
                &key,
                &AdmissionScriptArgs {
                    capacity: *self.capacity,
                    now_micros,
                    token,
                    clear_before_micros,
                    ttl_ms: self.window_duration_ms.ttl_ms(),
                },
            )
            .await?;

        let admission = parse_admission_reply(reply, self.capacity).inspect_err(|err| {
            tracing::warn!(key = %key, error = %err, "zwindow.admit.protocol_error");
        })?;

        tracing::debug!(
            key = %key,
            allowed = admission.allowed,
            count = admission.count,
            "zwindow.admit.decision"
        );

        Ok(admission)
    } // end method admit

    /// Entries currently inside the window of `identity`, oldest first.
    ///
    /// Read-only: nothing is pruned or recorded, entries that have aged out but are not
    /// yet pruned are filtered from the result.
    pub async fn window(&self, identity: &str) -> Result<Vec<WindowEntry>, ZwindowError> {
        let clear_before_micros = self
            .clock
            .now_micros()
            .saturating_sub(self.window_duration_ms.as_micros());
        let key = self.window_key(identity);

        let reply = self.store.range_with_scores(&key, 0, -1).await?;
        let mut entries = parse_range_with_scores(reply)?;
        entries.retain(|entry| entry.timestamp_micros > clear_before_micros);

        Ok(entries)
    }
}

/// Decode `[decision, count]`. Anything else, including an admission the capacity
/// cannot account for, is a protocol error rather than a decision.
fn parse_admission_reply(reply: Vec<String>, capacity: Capacity) -> Result<Admission, ZwindowError> {
    let [decision, count] = <[String; 2]>::try_from(reply).map_err(|reply| {
        ZwindowError::ProtocolError(format!(
            "admission reply has {} items, expected 2",
            reply.len()
        ))
    })?;

    let count = count.parse::<u64>().map_err(|_| {
        ZwindowError::ProtocolError(format!("admission count {count:?} is not a number"))
    })?;

    let allowed = match decision.as_str() {
        "allowed" => true,
        "rejected" => false,
        other => {
            return Err(ZwindowError::ProtocolError(format!(
                "unexpected admission decision {other:?}"
            )));
        }
    };

    if allowed && count >= *capacity {
        return Err(ZwindowError::ProtocolError(format!(
            "admitted with {count} entries at capacity {}",
            *capacity
        )));
    }

    Ok(Admission { allowed, count })
}
