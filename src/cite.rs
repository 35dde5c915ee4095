//! Citation assignment and prompt construction.
//!
//! Contexts are numbered 1-based in the order the pipeline combined them;
//! the citation list is parallel to (and never reorders) its input, so a
//! `[n]` marker in the generated answer always points at combined context
//! number n.

use crate::models::{Citation, ContextEntry};

/// Maximum characters of a citation preview.
const PREVIEW_CHARS: usize = 240;

/// Maximum characters of a context snippet inside the prompt.
const PROMPT_SNIPPET_CHARS: usize = 500;

/// Number contexts and build the parallel citation list.
///
/// Each returned context carries `citation_label = "[i]"`; citation ids are
/// dense, 1-based, and follow input order exactly.
pub fn assign_citations(contexts: Vec<ContextEntry>) -> (Vec<ContextEntry>, Vec<Citation>) {
    let mut prepared = Vec::with_capacity(contexts.len());
    let mut citations = Vec::with_capacity(contexts.len());

    for (i, mut ctx) in contexts.into_iter().enumerate() {
        let id = i + 1;
        let metadata = &ctx.metadata;

        let title = metadata
            .title
            .clone()
            .or_else(|| metadata.filename.clone())
            .or_else(|| metadata.source.clone())
            .unwrap_or_else(|| "Source".to_string());
        let url = metadata.url.clone().or_else(|| metadata.source.clone());

        citations.push(Citation {
            id,
            label: format!("[{id}]"),
            title,
            url,
            section: metadata.section_label.clone(),
            source_type: metadata
                .source_type
                .clone()
                .unwrap_or_else(|| "document".to_string()),
            preview: preview(&ctx.document),
        });

        ctx.citation_label = Some(format!("[{id}]"));
        prepared.push(ctx);
    }

    (prepared, citations)
}

/// Collapse internal whitespace and truncate to [`PREVIEW_CHARS`],
/// appending "..." when truncated.
fn preview(document: &str) -> String {
    let one_line = document.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&one_line, PREVIEW_CHARS)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

/// Build the generation prompt from the annotated contexts.
pub fn build_prompt(question: &str, contexts: &[ContextEntry]) -> String {
    let mut numbered = Vec::with_capacity(contexts.len());
    for ctx in contexts {
        let metadata = &ctx.metadata;
        let label = ctx.citation_label.as_deref().unwrap_or("");
        let title = metadata
            .title
            .clone()
            .or_else(|| metadata.filename.clone())
            .or_else(|| metadata.source.clone())
            .unwrap_or_else(|| "Source".to_string());

        let mut descriptor_parts = vec![title];
        if let Some(section) = &metadata.section_label {
            descriptor_parts.push(section.clone());
        }
        if let Some(url) = &metadata.url {
            if !descriptor_parts.contains(url) {
                descriptor_parts.push(url.clone());
            }
        }
        let descriptor = descriptor_parts.join(" - ");

        let snippet = ctx.document.trim().replace('\n', " ");
        let snippet = truncate_chars(&snippet, PROMPT_SNIPPET_CHARS);
        numbered.push(format!("{label} {descriptor}\n{snippet}"));
    }
    let context_block = numbered.join("\n\n");

    format!(
        "You are a product support engineer answering an administrator's question.\n\
         Using only the numbered CONTEXT provided, craft a professional, technically precise response.\n\
         If the necessary information is absent from the context, say so instead of guessing.\n\
         \n\
         USER QUESTION:\n\
         {question}\n\
         \n\
         CONTEXT (numbered passages):\n\
         {context_block}\n\
         \n\
         Response requirements:\n\
         - Answer the question directly and concisely, in 3-5 key points\n\
         - Quote configuration names, menu paths, or feature names exactly as they appear in the context\n\
         - Cite supporting passages using [n] references matching the numbered CONTEXT\n\
         - Never invent details that are not in the context\n"
    )
}
