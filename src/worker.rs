//! Worker pool: claims queued questions, runs the retrieval pipeline, and
//! writes back an answer or a failure.
//!
//! Any error inside a task is caught at the loop boundary and recorded on
//! the task row; a bad question never takes a worker down. Workers poll
//! the broker with a short sleep when the queue is empty.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::broker::TaskBroker;
use crate::cite::{assign_citations, build_prompt};
use crate::context::AppContext;
use crate::models::{Answer, Task};
use crate::pipeline::RetrievalPipeline;

const IDLE_POLL: Duration = Duration::from_millis(250);

/// Spawn `count` worker loops sharing one context. Returns the join
/// handles; the loops run until the process exits.
pub fn run_workers(ctx: Arc<AppContext>, count: usize) -> Vec<tokio::task::JoinHandle<()>> {
    info!(workers = count, "starting worker pool");
    (0..count)
        .map(|id| {
            let ctx = ctx.clone();
            tokio::spawn(async move { worker_loop(ctx, id).await })
        })
        .collect()
}

async fn worker_loop(ctx: Arc<AppContext>, worker_id: usize) {
    let broker = TaskBroker::new(ctx.pool.clone(), ctx.config.queue.result_ttl_secs);
    loop {
        let task = match broker.claim().await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tokio::time::sleep(IDLE_POLL).await;
                continue;
            }
            Err(e) => {
                error!(worker_id, "claim failed: {e:#}");
                tokio::time::sleep(IDLE_POLL).await;
                continue;
            }
        };

        info!(worker_id, task_id = %task.task_id, "processing task");
        match process_task(&ctx, &task).await {
            Ok(answer) => {
                if let Err(e) = broker.complete(&task.task_id, &answer).await {
                    error!(worker_id, task_id = %task.task_id, "complete failed: {e:#}");
                }
            }
            Err(e) => {
                warn!(worker_id, task_id = %task.task_id, "task failed: {e:#}");
                if let Err(e) = broker.fail(&task.task_id, &format!("{e:#}")).await {
                    error!(worker_id, task_id = %task.task_id, "fail-write failed: {e:#}");
                }
            }
        }
    }
}

/// Run one question end to end: pipeline, citations, generation, session
/// history.
pub async fn process_task(ctx: &AppContext, task: &Task) -> Result<Answer> {
    let question = task.question.trim();
    if question.is_empty() {
        // Nothing to retrieve or generate; completes with an empty answer
        // rather than failing the task.
        return Ok(Answer {
            question: String::new(),
            answer: String::new(),
            citations: Vec::new(),
            note: String::new(),
            session_id: task.session_id.clone(),
        });
    }

    let pipeline = RetrievalPipeline::from_context(ctx);
    let state = pipeline
        .run(question, task.top_k, task.use_web_search)
        .await;
    let (contexts, citations) = assign_citations(state.combined_contexts);

    // Generation is fail-soft like every other provider: the citations are
    // still a useful answer, so an error or an empty completion degrades to
    // an empty answer with a note. The model is never prompted without
    // contexts to ground it.
    let mut note = String::new();
    let answer_text = if contexts.is_empty() {
        note = "No supporting passages were found for this question.".to_string();
        String::new()
    } else {
        match ctx.generator.as_deref() {
            None => {
                note =
                    "Answer generation is not configured; see the cited passages.".to_string();
                String::new()
            }
            Some(generator) => {
                let prompt = build_prompt(question, &contexts);
                match generator.complete(&prompt).await {
                    Ok(text) if text.is_empty() => {
                        note = "The model returned an empty answer; see the cited passages."
                            .to_string();
                        text
                    }
                    Ok(text) => text,
                    Err(e) => {
                        warn!(task_id = %task.task_id, "answer generation failed: {e:#}");
                        note =
                            "Answer generation failed; see the cited passages.".to_string();
                        String::new()
                    }
                }
            }
        }
    };

    let answer = Answer {
        question: question.to_string(),
        answer: answer_text,
        citations,
        note,
        session_id: task.session_id.clone(),
    };

    if let Err(e) = append_exchange(
        &ctx.pool,
        &answer,
        ctx.config.queue.session_history_max,
    )
    .await
    {
        // History is advisory; losing an entry must not fail the task.
        warn!(session_id = %answer.session_id, "session history write failed: {e:#}");
    }

    Ok(answer)
}

/// Append one question/answer exchange to the session and trim the session
/// to the newest `max_entries` rows.
pub async fn append_exchange(pool: &SqlitePool, answer: &Answer, max_entries: usize) -> Result<()> {
    let mut tx = pool.begin().await?;

    let next_seq: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM sessions WHERE session_id = ?",
    )
    .bind(&answer.session_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO sessions (session_id, seq, question, answer, note, citations_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&answer.session_id)
    .bind(next_seq)
    .bind(&answer.question)
    .bind(&answer.answer)
    .bind(&answer.note)
    .bind(serde_json::to_string(&answer.citations)?)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM sessions WHERE session_id = ? AND seq <= ?")
        .bind(&answer.session_id)
        .bind(next_seq - max_entries as i64)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Read a session's retained exchanges, oldest first.
pub async fn session_history(pool: &SqlitePool, session_id: &str) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT question, answer FROM sessions WHERE session_id = ? ORDER BY seq ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
