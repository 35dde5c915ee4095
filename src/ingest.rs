//! Document ingestion: walk the data directory, extract and chunk every
//! file, embed the chunks, and replace the collection in one shot.
//!
//! The walk order is sorted and chunk ids are content-address hashes of
//! `source::index`, so re-ingesting an unchanged directory produces the
//! same ids. A rebuild goes through [`VectorStore::replace_collection`],
//! which keeps the old generation live until the new one is complete.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunk::{chunk_id, chunk_text};
use crate::context::AppContext;
use crate::models::{IngestChunk, PassageMetadata};

#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    pub skipped: usize,
}

/// Rebuild the collection from the configured data directory.
///
/// Holds the context's re-ingest lock, so a watcher-triggered rebuild and a
/// manual one never interleave.
pub async fn reingest(ctx: &AppContext) -> Result<IngestReport> {
    let _guard = ctx.reingest_lock.lock().await;

    let Some(embedder) = ctx.embedder.as_deref() else {
        bail!("embedding provider is required for ingest");
    };

    let data_dir = &ctx.config.retrieval.data_dir;
    if !data_dir.is_dir() {
        bail!("data directory {} does not exist", data_dir.display());
    }

    let mut report = IngestReport::default();
    let mut chunks: Vec<IngestChunk> = Vec::new();

    let chunking = &ctx.config.chunking;
    for path in scan_files(data_dir)? {
        match chunk_file(data_dir, &path, chunking.chunk_chars, chunking.overlap_chars) {
            Ok(file_chunks) if file_chunks.is_empty() => {
                report.skipped += 1;
            }
            Ok(file_chunks) => {
                report.files += 1;
                chunks.extend(file_chunks);
            }
            Err(e) => {
                warn!(path = %path.display(), "skipping unreadable file: {e:#}");
                report.skipped += 1;
            }
        }
    }

    if chunks.is_empty() {
        warn!(dir = %data_dir.display(), "no ingestable documents found");
    }

    let batch_size = ctx.config.embedding.batch_size.max(1);
    let mut embedded: Vec<(IngestChunk, Vec<f32>)> = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await.context("embed chunk batch")?;
        if vectors.len() != batch.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            );
        }
        if let Some(dims) = ctx.config.embedding.dims {
            if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
                bail!("embedder returned a {}-dim vector, expected {dims}", bad.len());
            }
        }
        embedded.extend(batch.iter().cloned().zip(vectors));
    }

    report.chunks = embedded.len();
    ctx.store.replace_collection(&embedded).await?;

    info!(
        files = report.files,
        chunks = report.chunks,
        skipped = report.skipped,
        collection = ctx.store.collection(),
        "ingest complete"
    );
    Ok(report)
}

/// All regular files under `data_dir`, sorted by path, minus editor and
/// hidden junk.
fn scan_files(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let ignore = ignore_set()?;
    let mut files: Vec<PathBuf> = WalkDir::new(data_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy().to_string());
            match name {
                Some(name) => !name.starts_with('.') && !ignore.is_match(&name),
                None => false,
            }
        })
        .collect();
    files.sort();
    Ok(files)
}

fn ignore_set() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ["*.tmp", "*.swp", "*~", "*.lock"] {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Extract and chunk one file into embedding-ready pieces.
fn chunk_file(
    data_dir: &Path,
    path: &Path,
    chunk_chars: usize,
    overlap_chars: usize,
) -> Result<Vec<IngestChunk>> {
    let text = crate::extract::file_to_text(path)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let source = path
        .strip_prefix(data_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source.clone());
    let last_modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64);
    // Citations link to the resolved on-disk location.
    let url = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string();

    let pieces = chunk_text(text, chunk_chars, overlap_chars);
    let total = pieces.len();

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| IngestChunk {
            id: chunk_id(&source, i),
            text: piece,
            metadata: PassageMetadata {
                source: Some(source.clone()),
                filename: Some(filename.clone()),
                chunk: Some(i),
                total_chunks: Some(total),
                section_label: Some(format!("Section {} of {}", i + 1, total)),
                last_modified,
                url: Some(url.clone()),
                ..Default::default()
            },
        })
        .collect())
}
