// Per-tenant token buckets over a shared Redis store

use redis::aio::ConnectionManager;
use redis::Script;
use tracing::debug;

use ldp_shared::{Result, ServiceError};

use crate::config::{RateLimitPolicy, RateLimitingConfig};

/// Refill-and-take in one round trip. Buckets live only in Redis so every
/// gateway instance draws from the same counter; a client cannot evade the
/// limit by fanning out across instances. Redis TIME keeps the clock single
/// too.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])

local time = redis.call('TIME')
local now = tonumber(time[1]) + tonumber(time[2]) / 1000000

local bucket = redis.call('HMGET', key, 'tokens', 'ts')
local tokens = tonumber(bucket[1])
local ts = tonumber(bucket[2])
if tokens == nil then
    tokens = burst
    ts = now
end

tokens = math.min(burst, tokens + (now - ts) * rate)

local allowed = 0
local retry_after = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
else
    retry_after = math.ceil((1 - tokens) / rate)
end

redis.call('HSET', key, 'tokens', tokens, 'ts', now)
redis.call('EXPIRE', key, math.max(60, math.ceil(burst / rate) * 2))

return {allowed, math.floor(tokens), retry_after}
"#;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    conn: Option<ConnectionManager>,
    config: RateLimitingConfig,
    script: Script,
}

impl RateLimiter {
    pub async fn new(redis_url: &str, config: RateLimitingConfig) -> Result<Self> {
        let conn = if config.enabled {
            let client = redis::Client::open(redis_url)?;
            Some(ConnectionManager::new(client).await?)
        } else {
            None
        };

        Ok(Self {
            conn,
            config,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
        })
    }

    /// Takes one token from the bucket for `key` under `policy` (falls back
    /// to the configured default policy).
    pub async fn check(
        &self,
        key: &str,
        policy: Option<RateLimitPolicy>,
    ) -> Result<RateLimitDecision> {
        let Some(conn) = &self.conn else {
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: u32::MAX,
                retry_after_secs: 0,
            });
        };

        let policy = policy.unwrap_or(self.config.default_policy);
        let mut conn = conn.clone();

        let (allowed, remaining, retry_after): (i64, i64, i64) = self
            .script
            .key(format!("rate_limit:{}", key))
            .arg(policy.replenish_rate)
            .arg(policy.burst_capacity)
            .invoke_async(&mut conn)
            .await?;

        debug!(
            key = %key,
            allowed = allowed == 1,
            remaining = remaining,
            "Rate limit checked"
        );

        Ok(RateLimitDecision {
            allowed: allowed == 1,
            remaining: remaining.max(0) as u32,
            retry_after_secs: retry_after.max(1) as u64,
        })
    }

    pub fn enabled(&self) -> bool {
        self.conn.is_some()
    }
}

impl RateLimitDecision {
    pub fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(ServiceError::RateLimited {
                retry_after_secs: self.retry_after_secs,
            })
        }
    }
}
