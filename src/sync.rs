use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::db::DB;
use crate::models::{LOCAL_ID_PREFIX, MutationKind, QueuedMutation};
use crate::ports::{Connectivity, RemoteSink};

/// A mutation is dropped once it has failed this many times.
pub const MAX_RETRIES: u32 = 5;

/// Outcome of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub connected: bool,
    pub synced: usize,
    pub failed: usize,
    pub dropped: usize,
}

/// Durable FIFO of remote writes that must eventually succeed.
///
/// Each drain pass walks a snapshot of the queue in order. Successes are
/// deleted row-by-row as they happen so a crash mid-pass cannot re-apply
/// them; failures are collected on the side and written back in a single
/// transaction at the end of the pass, never while the snapshot is being
/// walked.
pub struct SyncQueue {
    pool: DB,
}

impl SyncQueue {
    pub fn new(pool: DB) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, kind: MutationKind, payload: Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_queue (kind, body, retries, created_at) VALUES (?, ?, 0, ?)",
        )
        .bind(kind.as_str())
        .bind(payload.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("could not enqueue mutation")?;
        Ok(())
    }

    /// Queue contents in drain order. Rows that no longer parse are skipped
    /// with a warning; `drain` handles their retirement.
    pub async fn pending(&self) -> Result<Vec<QueuedMutation>> {
        let rows: Vec<(i64, String, String, i64, String)> = sqlx::query_as(
            "SELECT seq, kind, body, retries, created_at FROM sync_queue ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .context("could not read sync queue")?;

        let mut out = Vec::with_capacity(rows.len());
        for (seq, kind, body, retries, created_at) in rows {
            let Some(kind) = MutationKind::parse(&kind) else {
                tracing::warn!(seq, kind = %kind, "skipping mutation with unknown kind");
                continue;
            };
            let Ok(payload) = serde_json::from_str(&body) else {
                tracing::warn!(seq, "skipping mutation with unreadable payload");
                continue;
            };
            out.push(QueuedMutation {
                seq,
                kind,
                payload,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default(),
                retries: retries as u32,
            });
        }
        Ok(out)
    }

    pub async fn drain(
        &self,
        remote: &dyn RemoteSink,
        connectivity: &dyn Connectivity,
    ) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        if !connectivity.is_connected() {
            tracing::debug!("drain skipped, not connected");
            return Ok(report);
        }
        report.connected = true;

        let rows: Vec<(i64, String, String, i64)> =
            sqlx::query_as("SELECT seq, kind, body, retries FROM sync_queue ORDER BY seq")
                .fetch_all(&self.pool)
                .await
                .context("could not read sync queue")?;

        // Local ids promoted to server ids during this pass.
        let mut promoted: HashMap<String, String> = HashMap::new();
        // Retry bookkeeping buffered until the snapshot walk is done.
        let mut failures: Vec<(i64, u32)> = Vec::new();
        let mut drops: Vec<i64> = Vec::new();

        for (seq, kind, body, retries) in rows {
            match self.apply(remote, &kind, &body, &mut promoted).await {
                Ok(()) => {
                    // Persisted per item so a crash here cannot replay it.
                    sqlx::query("DELETE FROM sync_queue WHERE seq = ?")
                        .bind(seq)
                        .execute(&self.pool)
                        .await
                        .context("could not remove synced mutation")?;
                    report.synced += 1;
                }
                Err(e) => {
                    let attempts = retries as u32 + 1;
                    if attempts >= MAX_RETRIES {
                        tracing::warn!(
                            seq,
                            kind = %kind,
                            error = %e,
                            "dropping mutation after {MAX_RETRIES} failed attempts"
                        );
                        drops.push(seq);
                        report.dropped += 1;
                    } else {
                        tracing::debug!(seq, kind = %kind, error = %e, "mutation failed, keeping for retry");
                        failures.push((seq, attempts));
                        report.failed += 1;
                    }
                }
            }
        }

        if !failures.is_empty() || !drops.is_empty() {
            let mut tx = self.pool.begin().await.context("could not start queue write-back")?;
            for (seq, attempts) in failures {
                sqlx::query("UPDATE sync_queue SET retries = ? WHERE seq = ?")
                    .bind(attempts)
                    .bind(seq)
                    .execute(&mut *tx)
                    .await?;
            }
            for seq in drops {
                sqlx::query("DELETE FROM sync_queue WHERE seq = ?")
                    .bind(seq)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await.context("could not write back queue state")?;
        }

        Ok(report)
    }

    async fn apply(
        &self,
        remote: &dyn RemoteSink,
        kind: &str,
        body: &str,
        promoted: &mut HashMap<String, String>,
    ) -> Result<()> {
        let kind =
            MutationKind::parse(kind).ok_or_else(|| anyhow!("unknown mutation kind `{kind}`"))?;
        let mut payload: Value =
            serde_json::from_str(body).context("unreadable mutation payload")?;
        rewrite_ids(&mut payload, promoted);

        match kind {
            MutationKind::CreateLog => {
                let existing = payload
                    .get("log_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.starts_with(LOCAL_ID_PREFIX))
                    .map(str::to_owned);
                remote.submit_log(&payload, existing.as_deref()).await?;
            }
            MutationKind::CreateWorkout => {
                let local = payload
                    .get("workout_id")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let server_id = remote.create_workout(&payload).await?;
                if let Some(local) = local.filter(|id| id.starts_with(LOCAL_ID_PREFIX)) {
                    // Later queued payloads still carry the local id; rewrite
                    // them durably so the mapping survives a failed pass.
                    self.promote(&local, &server_id).await?;
                    promoted.insert(local, server_id);
                }
            }
            MutationKind::UpdateWorkout => {
                let id = payload
                    .get("workout_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("update-workout payload missing workout_id"))?
                    .to_owned();
                remote.update_workout(&id, &payload).await?;
            }
        }
        Ok(())
    }

    /// Rewrites every queued body that references `local` to use `server`.
    /// Ids are whole JSON string tokens, so a quoted text replace is exact.
    async fn promote(&self, local: &str, server: &str) -> Result<()> {
        sqlx::query("UPDATE sync_queue SET body = replace(body, ?, ?)")
            .bind(format!("\"{local}\""))
            .bind(format!("\"{server}\""))
            .execute(&self.pool)
            .await
            .context("could not rewrite promoted id")?;
        Ok(())
    }
}

/// Replaces any string in `value` that matches a promoted local id.
fn rewrite_ids(value: &mut Value, promoted: &HashMap<String, String>) {
    match value {
        Value::String(s) => {
            if let Some(server) = promoted.get(s.as_str()) {
                *s = server.clone();
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_ids(item, promoted);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                rewrite_ids(item, promoted);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{PortError, PortResult};
    use async_trait::async_trait;
    use serde_json::json;
    use sqlx::SqlitePool;
    use std::sync::Mutex;

    async fn queue() -> SyncQueue {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        SyncQueue::new(pool)
    }

    struct Online(bool);

    impl Connectivity for Online {
        fn is_connected(&self) -> bool {
            self.0
        }
    }

    /// Records calls in arrival order; logs fail while `fail_logs` is set.
    #[derive(Default)]
    struct FakeRemote {
        calls: Mutex<Vec<String>>,
        fail_logs: bool,
    }

    #[async_trait]
    impl RemoteSink for FakeRemote {
        async fn submit_log(
            &self,
            payload: &Value,
            existing_id: Option<&str>,
        ) -> PortResult<String> {
            if self.fail_logs {
                return Err(PortError::Unexpected("remote down".into()));
            }
            let id = existing_id.unwrap_or("srv-log").to_string();
            self.calls
                .lock()
                .unwrap()
                .push(format!("log:{}", payload["name"].as_str().unwrap_or("?")));
            Ok(id)
        }

        async fn create_workout(&self, payload: &Value) -> PortResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create:{}", payload["workout_id"]));
            Ok("srv-workout-1".into())
        }

        async fn update_workout(&self, id: &str, _payload: &Value) -> PortResult<()> {
            self.calls.lock().unwrap().push(format!("update:{id}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn enqueue_preserves_fifo_order() {
        let q = queue().await;
        q.enqueue(MutationKind::CreateWorkout, json!({"workout_id": "local-a"}))
            .await
            .unwrap();
        q.enqueue(MutationKind::CreateLog, json!({"log_id": "local-b"}))
            .await
            .unwrap();

        let pending = q.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].seq < pending[1].seq);
        assert_eq!(pending[0].kind, MutationKind::CreateWorkout);
        assert_eq!(pending[1].kind, MutationKind::CreateLog);
    }

    #[tokio::test]
    async fn drain_is_gated_on_connectivity() {
        let q = queue().await;
        q.enqueue(MutationKind::CreateLog, json!({"log_id": "local-a", "name": "x"}))
            .await
            .unwrap();

        let report = q.drain(&FakeRemote::default(), &Online(false)).await.unwrap();
        assert!(!report.connected);
        assert_eq!(q.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drain_applies_in_order_and_empties_the_queue() {
        let q = queue().await;
        q.enqueue(MutationKind::CreateWorkout, json!({"workout_id": "local-w", "name": "A"}))
            .await
            .unwrap();
        q.enqueue(MutationKind::CreateLog, json!({"log_id": "local-l", "name": "A"}))
            .await
            .unwrap();

        let remote = FakeRemote::default();
        let report = q.drain(&remote, &Online(true)).await.unwrap();

        assert_eq!(report.synced, 2);
        assert!(q.pending().await.unwrap().is_empty());
        let calls = remote.calls.lock().unwrap();
        assert!(calls[0].starts_with("create:"));
        assert!(calls[1].starts_with("log:"));
    }

    #[tokio::test]
    async fn failing_mutation_retries_without_blocking_the_rest() {
        let q = queue().await;
        q.enqueue(MutationKind::CreateLog, json!({"log_id": "local-bad", "name": "bad"}))
            .await
            .unwrap();
        q.enqueue(MutationKind::CreateWorkout, json!({"workout_id": "local-w"}))
            .await
            .unwrap();
        q.enqueue(MutationKind::UpdateWorkout, json!({"workout_id": "srv-9"}))
            .await
            .unwrap();

        let remote = FakeRemote {
            fail_logs: true,
            ..Default::default()
        };
        let report = q.drain(&remote, &Online(true)).await.unwrap();

        assert_eq!(report.synced, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.dropped, 0);

        let pending = q.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::CreateLog);
        assert_eq!(pending[0].retries, 1);
    }

    #[tokio::test]
    async fn mutation_is_dropped_after_five_failed_attempts() {
        let q = queue().await;
        q.enqueue(MutationKind::CreateLog, json!({"log_id": "local-bad", "name": "bad"}))
            .await
            .unwrap();

        let remote = FakeRemote {
            fail_logs: true,
            ..Default::default()
        };

        for attempt in 1..MAX_RETRIES {
            let report = q.drain(&remote, &Online(true)).await.unwrap();
            assert_eq!(report.failed, 1, "attempt {attempt} should keep the row");
            assert_eq!(q.pending().await.unwrap()[0].retries, attempt);
        }

        let report = q.drain(&remote, &Online(true)).await.unwrap();
        assert_eq!(report.dropped, 1);
        assert!(q.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn promoted_workout_id_rewrites_later_payloads() {
        let q = queue().await;
        q.enqueue(MutationKind::CreateWorkout, json!({"workout_id": "local-w", "name": "A"}))
            .await
            .unwrap();
        q.enqueue(
            MutationKind::CreateLog,
            json!({"log_id": "local-l", "workout_id": "local-w", "name": "A"}),
        )
        .await
        .unwrap();
        q.enqueue(MutationKind::UpdateWorkout, json!({"workout_id": "local-w"}))
            .await
            .unwrap();

        let remote = FakeRemote::default();
        let report = q.drain(&remote, &Online(true)).await.unwrap();
        assert_eq!(report.synced, 3);

        let calls = remote.calls.lock().unwrap();
        assert_eq!(calls[2], "update:srv-workout-1");
    }

    #[tokio::test]
    async fn promotion_survives_a_failed_pass() {
        let q = queue().await;
        q.enqueue(MutationKind::CreateWorkout, json!({"workout_id": "local-w", "name": "A"}))
            .await
            .unwrap();
        q.enqueue(
            MutationKind::CreateLog,
            json!({"log_id": "local-l", "workout_id": "local-w", "name": "A"}),
        )
        .await
        .unwrap();

        let remote = FakeRemote {
            fail_logs: true,
            ..Default::default()
        };
        let report = q.drain(&remote, &Online(true)).await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 1);

        // The surviving mutation now references the server id durably.
        let pending = q.pending().await.unwrap();
        assert_eq!(pending[0].payload["workout_id"], "srv-workout-1");
    }
}
