use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
    Clock, SystemClock, WindowStore, ZwindowError,
    store::{AdmissionScriptArgs, WindowBatch},
};

#[derive(Debug, Default)]
struct MemoryWindow {
    // (score, member); ties are ordered by member, as in a Redis sorted set
    ordered: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
    expires_at_micros: Option<i64>,
}

impl MemoryWindow {
    fn is_expired(&self, now_micros: i64) -> bool {
        self.expires_at_micros.is_some_and(|at| at <= now_micros)
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn remove_range_by_score(&mut self, min: i64, max: i64) -> u64 {
        if min > max {
            return 0;
        }

        let doomed: Vec<(i64, String)> = self
            .ordered
            .range((min, String::new())..)
            .take_while(|(score, _)| *score <= max)
            .cloned()
            .collect();

        for entry in &doomed {
            self.ordered.remove(entry);
            self.scores.remove(&entry.1);
        }

        doomed.len() as u64
    }

    fn range_with_scores(&self, start: isize, stop: isize) -> Vec<String> {
        let len = self.ordered.len() as isize;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

        if start > stop || start >= len {
            return Vec::new();
        }

        self.ordered
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .flat_map(|(score, member)| [member.clone(), score.to_string()])
            .collect()
    }

    fn add_with_score(&mut self, score: i64, member: &str) -> bool {
        let previous = self.scores.insert(member.to_string(), score);

        if let Some(previous) = previous {
            self.ordered.remove(&(previous, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));

        previous.is_none()
    }

    fn expire(&mut self, now_micros: i64, ttl_ms: u64) -> bool {
        if self.is_empty() {
            return false;
        }

        let ttl_micros = i64::try_from(ttl_ms.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.expires_at_micros = Some(now_micros.saturating_add(ttl_micros));

        true
    }
}

/// A [`WindowStore`] kept in process memory.
///
/// Every operation on a key runs while holding that key's entry lock, which makes
/// batches and admission scripts atomic per key, like a single Redis instance. Keys
/// whose TTL has passed behave as absent; keys left without members are removed,
/// together with their TTL.
pub struct MemoryWindowStore {
    windows: DashMap<String, MemoryWindow>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWindowStore {
    /// Create an empty store expiring keys by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store expiring keys by `clock`.
    ///
    /// Give the store and the limiter the same clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    /// Number of entries stored under `key`, `0` if the key is absent or expired.
    pub fn window_len(&self, key: &str) -> usize {
        self.read(key, MemoryWindow::len).unwrap_or(0)
    }

    /// Remaining time-to-live of `key` in microseconds.
    ///
    /// `None` if the key is absent, expired, or has no TTL.
    pub fn ttl_micros(&self, key: &str) -> Option<i64> {
        let now_micros = self.clock.now_micros();

        self.read(key, |window| window.expires_at_micros)
            .flatten()
            .map(|at| at - now_micros)
    }

    fn read<R>(&self, key: &str, f: impl FnOnce(&MemoryWindow) -> R) -> Option<R> {
        let now_micros = self.clock.now_micros();
        let window = self.windows.get(key)?;

        if window.is_expired(now_micros) {
            return None;
        }

        Some(f(&window))
    }

    fn write<R>(&self, key: &str, f: impl FnOnce(&mut MemoryWindow, i64) -> R) -> R {
        let now_micros = self.clock.now_micros();
        let mut window = self.windows.entry(key.to_string()).or_default();

        if window.is_expired(now_micros) {
            *window = MemoryWindow::default();
        }

        let result = f(&mut window, now_micros);
        let is_empty = window.is_empty();
        drop(window);

        if is_empty {
            self.windows.remove_if(key, |_, window| window.is_empty());
        }

        result
    } // end method write
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn remove_range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<u64, ZwindowError> {
        Ok(self.write(key, |window, _| window.remove_range_by_score(min, max)))
    }

    async fn range_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, ZwindowError> {
        Ok(self
            .read(key, |window| window.range_with_scores(start, stop))
            .unwrap_or_default())
    }

    async fn add_with_score(
        &self,
        key: &str,
        score: i64,
        member: &str,
    ) -> Result<bool, ZwindowError> {
        Ok(self.write(key, |window, _| window.add_with_score(score, member)))
    }

    async fn expire(&self, key: &str, ttl_ms: u64) -> Result<bool, ZwindowError> {
        Ok(self.write(key, |window, now_micros| window.expire(now_micros, ttl_ms)))
    }

    async fn record_and_read(&self, batch: &WindowBatch) -> Result<Vec<String>, ZwindowError> {
        Ok(self.write(&batch.key, |window, now_micros| {
            window.remove_range_by_score(0, batch.clear_before_micros);
            let snapshot = window.range_with_scores(0, -1);
            window.add_with_score(batch.entry.timestamp_micros, &batch.entry.token);
            window.expire(now_micros, batch.ttl_ms);

            snapshot
        }))
    }

    async fn run_admission_script(
        &self,
        key: &str,
        args: &AdmissionScriptArgs,
    ) -> Result<Vec<String>, ZwindowError> {
        Ok(self.write(key, |window, now_micros| {
            window.remove_range_by_score(0, args.clear_before_micros);

            let count = window.len() as u64;
            let allowed = count < args.capacity;
            if allowed {
                window.add_with_score(args.now_micros, &args.token);
            }

            window.expire(now_micros, args.ttl_ms);

            let decision = if allowed { "allowed" } else { "rejected" };
            vec![decision.to_string(), count.to_string()]
        }))
    }
}
