use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};

use super::ZwindowRedisClient;
use crate::{
    WindowStore, ZwindowError,
    store::{ADMISSION_LUA, AdmissionScriptArgs, WindowBatch},
};

/// A [`WindowStore`] backed by Redis sorted sets.
///
/// # Requirements
///
/// - **Redis version:** >= 6.2.0
/// - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
///
/// # Consistency Semantics
///
/// - [`record_and_read`](WindowStore::record_and_read) is a `MULTI`/`EXEC` transaction:
///   no other client's command runs between its four steps.
/// - [`run_admission_script`](WindowStore::run_admission_script) is a Lua script, atomic
///   on the server. The script is sent once and then invoked by hash.
/// - Scores are wall-clock microseconds taken by each caller; processes sharing a
///   Redis instance should keep their clocks in sync.
///
/// # Examples
///
/// ```ignore
/// use zwindow::redis::{RedisWindowStore, ZwindowRedisClient};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let store = RedisWindowStore::new(ZwindowRedisClient::from_client(client, 4).await?);
/// ```
pub struct RedisWindowStore {
    client: ZwindowRedisClient,
    admission_script: Script,
}

impl RedisWindowStore {
    /// Create a store issuing commands through `client`.
    pub fn new(client: ZwindowRedisClient) -> Self {
        Self {
            client,
            admission_script: Script::new(ADMISSION_LUA),
        }
    }

    /// Create a store issuing commands through a single connection manager.
    pub fn from_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self::new(ZwindowRedisClient::from_connection_manager(connection_manager))
    }
}

fn ttl_ms_arg(ttl_ms: u64) -> i64 {
    i64::try_from(ttl_ms).unwrap_or(i64::MAX)
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn remove_range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<u64, ZwindowError> {
        let mut connection_manager = self.client.get();
        let removed: u64 = connection_manager.zrembyscore(key, min, max).await?;

        Ok(removed)
    }

    async fn range_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, ZwindowError> {
        let mut connection_manager = self.client.get();
        let reply: Vec<String> = connection_manager
            .zrange_withscores(key, start, stop)
            .await?;

        Ok(reply)
    }

    async fn add_with_score(
        &self,
        key: &str,
        score: i64,
        member: &str,
    ) -> Result<bool, ZwindowError> {
        let mut connection_manager = self.client.get();
        let added: u64 = connection_manager.zadd(key, member, score).await?;

        Ok(added > 0)
    }

    async fn expire(&self, key: &str, ttl_ms: u64) -> Result<bool, ZwindowError> {
        let mut connection_manager = self.client.get();
        let applied: bool = connection_manager
            .pexpire(key, ttl_ms_arg(ttl_ms))
            .await?;

        Ok(applied)
    }

    async fn record_and_read(&self, batch: &WindowBatch) -> Result<Vec<String>, ZwindowError> {
        let mut connection_manager = self.client.get();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrembyscore(&batch.key, 0, batch.clear_before_micros)
            .ignore()
            .zrange_withscores(&batch.key, 0, -1)
            .zadd(
                &batch.key,
                &batch.entry.token,
                batch.entry.timestamp_micros,
            )
            .ignore()
            .pexpire(&batch.key, ttl_ms_arg(batch.ttl_ms))
            .ignore();

        let (reply,): (Vec<String>,) = pipe
            .query_async(&mut connection_manager)
            .await
            .inspect_err(|err| {
                tracing::error!("redis.batch.error, error executing transaction: {:?}", err);
            })?;

        Ok(reply)
    } // end method record_and_read

    async fn run_admission_script(
        &self,
        key: &str,
        args: &AdmissionScriptArgs,
    ) -> Result<Vec<String>, ZwindowError> {
        let mut connection_manager = self.client.get();

        let reply: Vec<String> = self
            .admission_script
            .key(key)
            .arg(args.capacity)
            .arg(args.now_micros)
            .arg(&args.token)
            .arg(args.clear_before_micros)
            .arg(args.ttl_ms)
            .invoke_async(&mut connection_manager)
            .await
            .inspect_err(|err| {
                tracing::error!("redis.script.error, error invoking admission script: {:?}", err);
            })?;

        Ok(reply)
    } // end method run_admission_script
}
