//! Durable task broker backed by the same SQLite database as the vector
//! store.
//!
//! The gateway inserts a `queued` row per accepted question; workers claim
//! the oldest queued row with a single `UPDATE ... RETURNING`, which is
//! atomic under SQLite's write lock, so no two workers ever process the
//! same task. Finished rows carry an expiry timestamp and are pruned
//! lazily on poll, so an expired task is indistinguishable from one that
//! never existed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::models::{Answer, Task, TaskStatus, TaskView};

#[derive(Clone)]
pub struct TaskBroker {
    pool: SqlitePool,
    result_ttl_secs: u64,
}

impl TaskBroker {
    pub fn new(pool: SqlitePool, result_ttl_secs: u64) -> Self {
        Self {
            pool,
            result_ttl_secs,
        }
    }

    /// Enqueue an accepted question.
    pub async fn submit(&self, task: &Task) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO tasks (task_id, question, session_id, top_k, use_web_search,
                               status, created_at, enqueued_at)
            VALUES (?, ?, ?, ?, ?, 'queued', ?, ?)
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.question)
        .bind(&task.session_id)
        .bind(task.top_k as i64)
        .bind(task.use_web_search as i64)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("enqueue task")?;

        debug!(task_id = %task.task_id, "task enqueued");
        Ok(())
    }

    /// Claim the oldest queued task, moving it to `processing`.
    ///
    /// The claim is a single UPDATE, so concurrent workers get disjoint
    /// tasks; returns `None` when the queue is empty.
    pub async fn claim(&self) -> Result<Option<Task>> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            r#"
            UPDATE tasks SET status = 'processing', started_at = ?
            WHERE task_id = (
                SELECT task_id FROM tasks
                WHERE status = 'queued'
                ORDER BY enqueued_at ASC, task_id ASC
                LIMIT 1
            )
            RETURNING task_id, question, session_id, top_k, use_web_search
            "#,
        )
        .bind(&now)
        .fetch_optional(&self.pool)
        .await
        .context("claim task")?;

        Ok(row.map(|row| Task {
            task_id: row.get("task_id"),
            question: row.get("question"),
            session_id: row.get("session_id"),
            top_k: row.get::<i64, _>("top_k") as usize,
            use_web_search: row.get::<i64, _>("use_web_search") != 0,
        }))
    }

    /// Record a successful result and start the retention clock.
    pub async fn complete(&self, task_id: &str, answer: &Answer) -> Result<()> {
        let now = Utc::now();
        let expires_at = now.timestamp() + self.result_ttl_secs as i64;
        sqlx::query(
            r#"
            UPDATE tasks SET status = 'completed', ended_at = ?, result_json = ?, expires_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(serde_json::to_string(answer)?)
        .bind(expires_at)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("complete task")?;
        Ok(())
    }

    /// Record a failure; failed rows expire on the same clock as results.
    pub async fn fail(&self, task_id: &str, error: &str) -> Result<()> {
        let now = Utc::now();
        let expires_at = now.timestamp() + self.result_ttl_secs as i64;
        sqlx::query(
            r#"
            UPDATE tasks SET status = 'failed', ended_at = ?, error = ?, expires_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(error)
        .bind(expires_at)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("fail task")?;
        Ok(())
    }

    /// Fetch the current view of a task; expired rows are pruned first, so
    /// an expired task id reads as unknown.
    pub async fn poll(&self, task_id: &str) -> Result<Option<TaskView>> {
        self.prune_expired().await?;

        let row = sqlx::query(
            r#"
            SELECT task_id, status, created_at, enqueued_at, started_at, ended_at,
                   result_json, error
            FROM tasks WHERE task_id = ?
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("poll task")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status_str: String = row.get("status");
        let status = TaskStatus::parse(&status_str)
            .with_context(|| format!("unknown task status {status_str:?}"))?;
        let result = row
            .get::<Option<String>, _>("result_json")
            .map(|json| serde_json::from_str::<Answer>(&json))
            .transpose()
            .context("decode task result")?;

        Ok(Some(TaskView {
            task_id: row.get("task_id"),
            status,
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            enqueued_at: parse_ts(&row.get::<String, _>("enqueued_at"))?,
            started_at: parse_opt_ts(row.get("started_at"))?,
            ended_at: parse_opt_ts(row.get("ended_at"))?,
            result,
            error: row.get("error"),
        }))
    }

    /// Delete finished rows past their retention window.
    pub async fn prune_expired(&self) -> Result<u64> {
        let now = Utc::now().timestamp();
        let done = sqlx::query("DELETE FROM tasks WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("prune expired tasks")?;
        if done.rows_affected() > 0 {
            debug!(pruned = done.rows_affected(), "expired tasks removed");
        }
        Ok(done.rows_affected())
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp {s:?}"))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}
