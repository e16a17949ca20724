//! Typed accessor over the shared Redis-backed account/token store.
//!
//! Plain reads and writes go through the shared, multiplexed
//! [`redis::aio::ConnectionManager`] — cheap to clone, auto-reconnecting.
//! Read-modify-write account updates cannot use that connection: `WATCH` and
//! the pipelined `MULTI`/`EXEC` that follows it are state scoped to one
//! physical server-side connection, and a `ConnectionManager` clone shares
//! that physical connection with every other clone in the process, so two
//! concurrent updates can interleave their `WATCH`/`EXEC` pairs on the wire
//! and silently defeat the optimistic-concurrency guarantee. `update_account`
//! instead opens its own exclusive [`redis::aio::Connection`] per call, so
//! its `WATCH` can only ever be invalidated by a genuine concurrent writer,
//! never by an unrelated command sharing the same socket.

pub mod error;

use chrono::{DateTime, Utc};
use kiro_core::types::{Account, Token};
use redis::AsyncCommands;
use tracing::{debug, warn};

pub use error::{Result, StoreError};

const MAX_CONFLICT_RETRIES: u32 = 5;

/// Process-wide Redis accessor. Cheap to clone for plain reads/writes —
/// `redis::aio::ConnectionManager` auto-reconnects and multiplexes commands
/// internally. `update_account` does not use this connection; see the module
/// docs.
#[derive(Clone)]
pub struct StoreClient {
    conn: redis::aio::ConnectionManager,
    client: redis::Client,
    key_prefix: String,
}

impl StoreClient {
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            client,
            key_prefix: key_prefix.into(),
        })
    }

    fn pools_key(&self) -> String {
        format!("{}pools:claude-kiro-oauth", self.key_prefix)
    }

    fn token_key(&self, uuid: &str) -> String {
        format!("{}tokens:claude-kiro-oauth:{}", self.key_prefix, uuid)
    }

    fn counter_key(&self) -> String {
        format!("{}kiro:round-robin-counter", self.key_prefix)
    }

    /// All accounts in the pool — disabled and healthy together. Filtering
    /// eligibility is the account selector's job, not the store's.
    pub async fn get_all_accounts(&self) -> Result<Vec<Account>> {
        let mut conn = self.conn.clone();
        let raw: std::collections::HashMap<String, String> =
            conn.hgetall(self.pools_key()).await?;
        let mut accounts = Vec::with_capacity(raw.len());
        for (uuid, blob) in raw {
            match serde_json::from_str::<Account>(&blob) {
                Ok(acc) => accounts.push(acc),
                Err(e) => warn!(uuid, error = %e, "dropping unparseable account record"),
            }
        }
        Ok(accounts)
    }

    async fn get_account_on(
        &self,
        conn: &mut redis::aio::Connection,
        uuid: &str,
    ) -> Result<Account> {
        let blob: Option<String> = conn.hget(self.pools_key(), uuid).await?;
        let blob = blob.ok_or_else(|| StoreError::AccountNotFound {
            uuid: uuid.to_string(),
        })?;
        Ok(serde_json::from_str(&blob)?)
    }

    pub async fn get_token(&self, uuid: &str) -> Result<Token> {
        let mut conn = self.conn.clone();
        let blob: Option<String> = conn.get(self.token_key(uuid)).await?;
        let blob = blob.ok_or_else(|| StoreError::TokenNotFound {
            uuid: uuid.to_string(),
        })?;
        Ok(serde_json::from_str(&blob)?)
    }

    pub async fn set_token(&self, uuid: &str, token: &Token) -> Result<()> {
        let mut conn = self.conn.clone();
        let blob = serde_json::to_string(token)?;
        conn.set(self.token_key(uuid), blob).await?;
        Ok(())
    }

    /// Atomically increment the round-robin counter, returning the
    /// post-increment value. `INCR` is atomic in Redis without any
    /// WATCH/MULTI wrapper, so this runs over the shared multiplexed
    /// connection like the other plain reads and writes above.
    pub async fn increment_round_robin_counter(&self) -> Result<i64> {
        let mut conn = self.conn.clone();
        let next: i64 = conn.incr(self.counter_key(), 1).await?;
        Ok(next)
    }

    pub async fn mark_unhealthy(&self, uuid: &str) -> Result<()> {
        let now = Utc::now();
        self.update_account(uuid, move |acc| {
            acc.is_healthy = false;
            acc.last_error_time = Some(now);
            acc.error_count += 1;
        })
        .await
    }

    pub async fn mark_unhealthy_with_recovery(
        &self,
        uuid: &str,
        recovery_time: DateTime<Utc>,
    ) -> Result<()> {
        let now = Utc::now();
        self.update_account(uuid, move |acc| {
            acc.is_healthy = false;
            acc.last_error_time = Some(now);
            acc.scheduled_recovery_time = Some(recovery_time);
            acc.error_count += 1;
        })
        .await
    }

    pub async fn mark_healthy(&self, uuid: &str) -> Result<()> {
        self.update_account(uuid, |acc| {
            acc.is_healthy = true;
            acc.scheduled_recovery_time = None;
        })
        .await
    }

    /// Increment `usageCount` and set `isHealthy = true` in one atomic write —
    /// the combined side effect of a successful upstream call.
    pub async fn record_success_atomic(&self, uuid: &str) -> Result<()> {
        self.update_account(uuid, |acc| {
            acc.is_healthy = true;
            acc.scheduled_recovery_time = None;
            acc.usage_count += 1;
        })
        .await
    }

    pub async fn increment_usage(&self, uuid: &str) -> Result<()> {
        self.update_account(uuid, |acc| {
            acc.usage_count += 1;
        })
        .await
    }

    /// Apply `mutate` to the account identified by `uuid` using optimistic
    /// concurrency: `WATCH` the pool hash, read-modify-write, retry on a
    /// concurrent writer until `MAX_CONFLICT_RETRIES` is exhausted.
    ///
    /// Opens a fresh, exclusive `redis::aio::Connection` for the duration of
    /// the call rather than cloning the shared `ConnectionManager` — see the
    /// module docs for why a multiplexed clone can't carry `WATCH` state
    /// safely.
    async fn update_account<F>(&self, uuid: &str, mut mutate: F) -> Result<()>
    where
        F: FnMut(&mut Account),
    {
        let mut conn = self.client.get_async_connection().await?;
        let pools_key = self.pools_key();

        for attempt in 0..MAX_CONFLICT_RETRIES {
            let _: () = redis::cmd("WATCH")
                .arg(&pools_key)
                .query_async(&mut conn)
                .await?;

            let mut account = match self.get_account_on(&mut conn, uuid).await {
                Ok(acc) => acc,
                Err(e) => {
                    let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await?;
                    return Err(e);
                }
            };
            mutate(&mut account);
            let blob = serde_json::to_string(&account)?;

            let mut pipe = redis::pipe();
            pipe.atomic().hset(&pools_key, uuid, blob);
            let result: Option<Vec<i64>> = pipe.query_async(&mut conn).await?;

            match result {
                Some(_) => return Ok(()),
                None => {
                    debug!(uuid, attempt, "optimistic write conflict, retrying");
                    continue;
                }
            }
        }

        Err(StoreError::ConflictRetriesExhausted { key: pools_key })
    }
}

#[cfg(test)]
mod tests {
    // Read-modify-write correctness against a live Redis instance is covered
    // by the account-selector/health integration tests in `kiro-accounts`;
    // this module only checks the store's key-layout conventions, which are
    // pure string formatting and don't need a connection.

    #[test]
    fn key_layout_matches_documented_prefix_scheme() {
        let key_prefix = "aiclient:";
        assert_eq!(
            format!("{}pools:claude-kiro-oauth", key_prefix),
            "aiclient:pools:claude-kiro-oauth"
        );
        assert_eq!(
            format!("{}tokens:claude-kiro-oauth:{}", key_prefix, "u1"),
            "aiclient:tokens:claude-kiro-oauth:u1"
        );
        assert_eq!(
            format!("{}kiro:round-robin-counter", key_prefix),
            "aiclient:kiro:round-robin-counter"
        );
    }
}
