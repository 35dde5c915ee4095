//! Filesystem watcher: debounced re-ingest of the data directory.
//!
//! Notify events arrive on an OS thread and are forwarded into a tokio
//! channel; the debounce loop collapses any burst of events into a single
//! rebuild that fires once the directory has been quiet for the configured
//! window. A save that touches ten files re-ingests once, not ten times.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::ingest;

/// Watch the data directory and re-ingest after each quiet period.
///
/// Runs until the watcher backend shuts down. Re-ingest failures are
/// logged and the watch continues; a transient error must not stop
/// future rebuilds.
pub async fn watch_and_reingest(ctx: Arc<AppContext>) -> Result<()> {
    let data_dir = ctx.config.retrieval.data_dir.clone();
    let window = Duration::from_secs_f64(ctx.config.watch.debounce_secs);

    let (tx, rx) = mpsc::channel::<()>(256);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        match res {
            Ok(event) if is_relevant(&event.kind) => {
                // Full channel means a rebuild is already pending.
                let _ = tx.try_send(());
            }
            Ok(_) => {}
            Err(e) => warn!("watch error: {e}"),
        }
    })
    .context("create filesystem watcher")?;
    watcher
        .watch(&data_dir, RecursiveMode::Recursive)
        .with_context(|| format!("watch {}", data_dir.display()))?;

    info!(
        dir = %data_dir.display(),
        debounce_secs = ctx.config.watch.debounce_secs,
        "watching documents"
    );

    debounce_loop(rx, window, || {
        let ctx = ctx.clone();
        async move {
            info!("document change detected, re-ingesting");
            if let Err(e) = ingest::reingest(&ctx).await {
                warn!("watcher re-ingest failed: {e:#}");
            }
        }
    })
    .await;

    Ok(())
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Collapse bursts of channel events: every event pushes the deadline out
/// by `window`, and `action` runs once when the deadline passes. Returns
/// when the channel closes.
pub async fn debounce_loop<F, Fut>(mut rx: mpsc::Receiver<()>, window: Duration, mut action: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut deadline: Option<Instant> = None;

    loop {
        match deadline {
            None => match rx.recv().await {
                Some(()) => deadline = Some(Instant::now() + window),
                None => return,
            },
            Some(at) => {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(()) => deadline = Some(Instant::now() + window),
                        None => return,
                    },
                    _ = tokio::time::sleep_until(at) => {
                        deadline = None;
                        action().await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn send_and_settle(tx: &mpsc::Sender<()>) {
        tx.send(()).await.unwrap();
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_events_triggers_one_action() {
        let (tx, rx) = mpsc::channel(16);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let loop_handle = tokio::spawn(debounce_loop(rx, Duration::from_secs(3), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        for _ in 0..5 {
            send_and_settle(&tx).await;
            tokio::time::advance(Duration::from_millis(500)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(tx);
        loop_handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn each_quiet_period_triggers_again() {
        let (tx, rx) = mpsc::channel(16);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let loop_handle = tokio::spawn(debounce_loop(rx, Duration::from_secs(3), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        send_and_settle(&tx).await;
        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        send_and_settle(&tx).await;
        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        drop(tx);
        loop_handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn event_during_window_extends_the_deadline() {
        let (tx, rx) = mpsc::channel(16);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let loop_handle = tokio::spawn(debounce_loop(rx, Duration::from_secs(3), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        send_and_settle(&tx).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        send_and_settle(&tx).await;
        // Two seconds past the first deadline but inside the second window.
        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(tx);
        loop_handle.await.unwrap();
    }

    #[test]
    fn only_mutating_events_are_relevant() {
        use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_relevant(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_relevant(&EventKind::Access(AccessKind::Any)));
    }
}
