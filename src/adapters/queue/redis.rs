use crate::adapters::queue::{QueueError, RegistrationQueue};
use crate::adapters::redis::RedisClient;
use crate::config::QueueConfig;
use crate::domain::registration::QueueRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// KEYS: visible zset, bodies hash, receive counts hash, dead-letter list (JSON {messageId, body})
// ARGV: now (ms), limit, invisible-until (ms), max receive count
const LEASE_SCRIPT: &str = r"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
local out = {}
for _, id in ipairs(ids) do
    local body = redis.call('HGET', KEYS[2], id)
    if not body then
        redis.call('ZREM', KEYS[1], id)
        redis.call('HDEL', KEYS[3], id)
    else
        local receives = redis.call('HINCRBY', KEYS[3], id, 1)
        if receives > tonumber(ARGV[4]) then
            redis.call('ZREM', KEYS[1], id)
            redis.call('HDEL', KEYS[2], id)
            redis.call('HDEL', KEYS[3], id)
            redis.call('RPUSH', KEYS[4], cjson.encode({messageId = id, body = body}))
        else
            redis.call('ZADD', KEYS[1], ARGV[3], id)
            table.insert(out, id)
            table.insert(out, body)
        end
    end
end
return out
";

/// Registration queue stored in Redis.
///
/// Visibility is a sorted set scored by the time (ms) a record becomes visible again; leasing moves
/// the score forward atomically inside a Lua script so concurrent workers never share a lease.
#[derive(Debug, Clone)]
pub struct RedisRegistrationQueue {
    redis: Arc<RedisClient>,
    visible_key: String,
    bodies_key: String,
    receives_key: String,
    dead_letter_key: String,
    max_receive_count: u32,
    lease_script: Arc<::redis::Script>,
}

impl RedisRegistrationQueue {
    #[must_use]
    pub fn new(redis: Arc<RedisClient>, config: &QueueConfig) -> Self {
        let prefix = &config.key_prefix;
        Self {
            redis,
            visible_key: format!("{prefix}:visible"),
            bodies_key: format!("{prefix}:bodies"),
            receives_key: format!("{prefix}:receives"),
            dead_letter_key: format!("{prefix}:dead"),
            max_receive_count: config.max_receive_count,
            lease_script: Arc::new(::redis::Script::new(LEASE_SCRIPT)),
        }
    }
}

fn now_millis() -> i64 {
    i64::try_from(time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

#[async_trait]
impl RegistrationQueue for RedisRegistrationQueue {
    #[tracing::instrument(level = "debug", skip(self, body), err)]
    async fn enqueue(&self, body: &str) -> Result<String, QueueError> {
        let message_id = Uuid::now_v7().to_string();
        let mut conn = self.redis.connection();

        ::redis::pipe()
            .atomic()
            .hset(&self.bodies_key, &message_id, body)
            .ignore()
            .zadd(&self.visible_key, &message_id, now_millis())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(message_id)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn lease(&self, limit: usize, visibility_timeout: Duration) -> Result<Vec<QueueRecord>, QueueError> {
        let now = now_millis();
        let timeout_ms = i64::try_from(visibility_timeout.as_millis()).unwrap_or(i64::MAX);
        let mut conn = self.redis.connection();

        let flat: Vec<String> = self
            .lease_script
            .key(&self.visible_key)
            .key(&self.bodies_key)
            .key(&self.receives_key)
            .key(&self.dead_letter_key)
            .arg(now)
            .arg(limit)
            .arg(now.saturating_add(timeout_ms))
            .arg(self.max_receive_count)
            .invoke_async(&mut conn)
            .await?;

        if flat.len() % 2 != 0 {
            return Err(QueueError::Protocol);
        }

        Ok(flat.chunks_exact(2).map(|pair| QueueRecord::new(pair[0].clone(), pair[1].clone())).collect())
    }

    #[tracing::instrument(level = "debug", skip(self, message_ids), fields(count = message_ids.len()), err)]
    async fn ack(&self, message_ids: &[String]) -> Result<(), QueueError> {
        if message_ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.redis.connection();
        ::redis::pipe()
            .atomic()
            .zrem(&self.visible_key, message_ids)
            .ignore()
            .hdel(&self.bodies_key, message_ids)
            .ignore()
            .hdel(&self.receives_key, message_ids)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn dead_letter_count(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.connection();
        let len: usize = ::redis::cmd("LLEN").arg(&self.dead_letter_key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(self.redis.ping().await?)
    }
}
