use redis::{aio::MultiplexedConnection, AsyncCommands};
use std::time::{Duration, Instant};

const QUEUE_KEY: &str = "queue:inference";
const DLQ_KEY: &str = "dlq:failed_jobs";

fn image_key(job_id: i64) -> String {
    format!("image:{job_id}")
}

fn cache_key(sha256_hex: &str) -> String {
    format!("cache:sha256:{sha256_hex}")
}

fn retry_key(job_id: i64) -> String {
    format!("retry:{job_id}")
}

/// Redis client for everything ephemeral: the pending-job list, the
/// dead-letter list, transient image payloads, the fingerprint dedup cache,
/// and per-job retry counters. This is the only coordination point between
/// the submission path and the workers; the database stays the source of
/// truth for job state.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Push a job id onto the pending list. Workers pop from the other end,
    /// so the list behaves as a FIFO queue.
    pub async fn enqueue(&self, job_id: i64) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, job_id).await?;
        Ok(())
    }

    /// Collect a micro-batch of job ids.
    ///
    /// Blocks up to `brpop_timeout` for the first id (empty batch on
    /// timeout), then keeps issuing non-blocking pops for up to `window`,
    /// stopping early when the queue runs dry or the batch hits `max_size`.
    pub async fn collect_batch(
        &self,
        brpop_timeout: Duration,
        window: Duration,
        max_size: usize,
    ) -> Result<Vec<i64>, QueueError> {
        let mut conn = self.conn().await?;

        let first: Option<(String, i64)> = conn
            .brpop(QUEUE_KEY, brpop_timeout.as_secs_f64())
            .await?;

        let Some((_, first_id)) = first else {
            return Ok(Vec::new());
        };

        let mut batch = vec![first_id];
        let deadline = Instant::now() + window;

        while Instant::now() < deadline && batch.len() < max_size {
            let next: Option<i64> = conn.rpop(QUEUE_KEY, None).await?;
            match next {
                Some(id) => batch.push(id),
                None => break,
            }
        }

        Ok(batch)
    }

    /// Stash image bytes for a job, expiring after `ttl`.
    pub async fn store_image(&self, job_id: i64, bytes: &[u8], ttl: Duration) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(image_key(job_id), bytes, ttl.as_secs())
            .await?;
        Ok(())
    }

    /// Fetch the image payload for a job. `None` means expired or never stored.
    pub async fn fetch_image(&self, job_id: i64) -> Result<Option<Vec<u8>>, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(image_key(job_id)).await?)
    }

    /// Look up the job id cached for a content fingerprint.
    pub async fn cache_lookup(&self, sha256_hex: &str) -> Result<Option<i64>, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(cache_key(sha256_hex)).await?)
    }

    /// Map a content fingerprint to a job id, expiring after `ttl`.
    pub async fn cache_store(
        &self,
        sha256_hex: &str,
        job_id: i64,
        ttl: Duration,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(cache_key(sha256_hex), job_id, ttl.as_secs())
            .await?;
        Ok(())
    }

    /// Increment the retry counter for a job and return the post-increment
    /// value. The TTL is refreshed on every bump.
    pub async fn bump_retry(&self, job_id: i64, ttl: Duration) -> Result<i64, QueueError> {
        let mut conn = self.conn().await?;
        let attempt: i64 = conn.incr(retry_key(job_id), 1).await?;
        conn.expire::<_, ()>(retry_key(job_id), ttl.as_secs() as i64)
            .await?;
        Ok(attempt)
    }

    /// Current retry counter value, if the key is live.
    pub async fn retry_count(&self, job_id: i64) -> Result<Option<i64>, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(retry_key(job_id)).await?)
    }

    /// Delete the retry counter once a job reaches a terminal state.
    pub async fn clear_retry(&self, job_id: i64) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(retry_key(job_id)).await?;
        Ok(())
    }

    /// Push a job id onto the dead-letter list.
    pub async fn push_dlq(&self, job_id: i64) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        conn.lpush::<_, _, ()>(DLQ_KEY, job_id).await?;
        Ok(())
    }

    /// All job ids currently on the dead-letter list.
    pub async fn dlq_entries(&self) -> Result<Vec<i64>, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.lrange(DLQ_KEY, 0, -1).await?)
    }

    /// Length of the dead-letter list.
    pub async fn dlq_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(DLQ_KEY).await?)
    }

    /// Number of pending jobs. Queue depth is the system's backpressure
    /// signal; submissions themselves are never rejected.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(QUEUE_KEY).await?)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
