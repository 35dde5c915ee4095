use anyhow::Result;
use sqlx::SqlitePool;

/// Create all tables. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Vector collection: one row per chunk per generation. The active
    // generation pointer lives in `collections`, so a rebuild can write a
    // whole new generation before the flip.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT NOT NULL,
            collection TEXT NOT NULL,
            generation INTEGER NOT NULL,
            document TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection, generation, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            active_generation INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_collection_gen ON chunks(collection, generation)",
    )
    .execute(pool)
    .await?;

    // Task broker: queued questions and their results.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            task_id TEXT PRIMARY KEY,
            question TEXT NOT NULL,
            session_id TEXT NOT NULL,
            top_k INTEGER NOT NULL,
            use_web_search INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            created_at TEXT NOT NULL,
            enqueued_at TEXT NOT NULL,
            started_at TEXT,
            ended_at TEXT,
            result_json TEXT,
            error TEXT,
            expires_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_status_enqueued ON tasks(status, enqueued_at)",
    )
    .execute(pool)
    .await?;

    // Session history: append-only per session, trimmed to a configured cap.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            note TEXT NOT NULL,
            citations_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            PRIMARY KEY (session_id, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
