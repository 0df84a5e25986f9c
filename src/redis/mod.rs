//! Redis-backed window store.
//!
//! Each window is a Redis sorted set. The advisory sequence runs as a `MULTI`/`EXEC`
//! pipeline and the admission logic as a Lua script, which Redis executes without
//! interleaving other commands.

mod common;
pub use common::*;

mod redis_window_store;
pub use redis_window_store::*;
