/// Error type for this crate.
///
/// Every failure reaches the caller unchanged. Whether to fail open or closed on an
/// error is the caller's decision, never this crate's.
#[derive(Debug, thiserror::Error)]
pub enum ZwindowError {
    /// Redis error.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// A non-Redis [`WindowStore`](crate::WindowStore) could not complete the request.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The random source could not produce a token.
    #[error("entropy source failure: {0}")]
    EntropyFailure(String),

    /// The store answered with a reply of unexpected shape.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Invalid window key.
    #[error("invalid window key: {0}")]
    InvalidWindowKey(String),

    /// Invalid Redis connection count.
    #[error("invalid redis client connection count: {0}")]
    InvalidRedisClientConnectionCount(String),
}
