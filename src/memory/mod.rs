//! In-process window store.
//!
//! [`MemoryWindowStore`] implements the full [`WindowStore`](crate::WindowStore)
//! contract inside the current process: score-ordered windows, per-key atomic batches
//! and scripts, key TTLs and removal of emptied keys. It serves as a single-process
//! backend and as a stand-in for a shared store in tests.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** per-key locking through [`DashMap`](dashmap::DashMap) entries
//! - **Process-scoped:** windows are not shared with other processes
//! - **Lazy expiry:** an expired key is dropped when it is next touched
//!
//! # Examples
//!
//! ```no_run
//! use zwindow::{Capacity, SlidingWindowOptions, SlidingWindowRateLimiter, WindowDurationMs};
//! use zwindow::memory::MemoryWindowStore;
//!
//! # async fn run() -> Result<(), zwindow::ZwindowError> {
//! let limiter = SlidingWindowRateLimiter::new(
//!     SlidingWindowOptions {
//!         window_duration_ms: WindowDurationMs::try_from(1_000).unwrap(),
//!         capacity: Capacity::try_from(10).unwrap(),
//!         prefix: None,
//!     },
//!     MemoryWindowStore::new(),
//! );
//!
//! if !limiter.allow_request("user_123").await? {
//!     // reject
//! }
//! # Ok(())
//! # }
//! ```

mod memory_window_store;
pub use memory_window_store::*;
