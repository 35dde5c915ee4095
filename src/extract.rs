//! Per-format text extraction for the document directory.
//!
//! Plain text and Markdown are read as-is, HTML is reduced to its visible
//! text, and PDFs go through `pdf-extract`. Unknown extensions fall back to
//! a best-effort UTF-8 read so a stray `.rst` or `.log` still gets indexed.

use scraper::Html;
use std::path::Path;

/// Extraction error; the ingester skips the file and logs it.
#[derive(Debug)]
pub enum ExtractError {
    Io(std::io::Error),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "read failed: {e}"),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {e}"),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<std::io::Error> for ExtractError {
    fn from(e: std::io::Error) -> Self {
        ExtractError::Io(e)
    }
}

/// Extract the text content of a file based on its extension.
pub fn file_to_text(path: &Path) -> Result<String, ExtractError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" | "markdown" => Ok(read_lossy(path)?),
        "html" | "htm" => Ok(html_to_text(&read_lossy(path)?)),
        "pdf" => {
            let bytes = std::fs::read(path)?;
            pdf_extract::extract_text_from_mem(&bytes)
                .map(|t| t.trim().to_string())
                .map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        _ => Ok(read_lossy(path)?),
    }
}

fn read_lossy(path: &Path) -> Result<String, std::io::Error> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reduce an HTML document to its visible text: script/style/noscript
/// subtrees are dropped, remaining text nodes are joined and blank runs
/// collapsed.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut parts: Vec<String> = Vec::new();
    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_strips_tags_and_scripts() {
        let html = r#"
            <html><head>
              <style>body { color: red; }</style>
              <script>var hidden = 1;</script>
            </head><body>
              <h1>MFA Enrollment</h1>
              <p>Enable <b>two-factor</b> login.</p>
            </body></html>
        "#;
        let text = html_to_text(html);
        assert!(text.contains("MFA Enrollment"));
        assert!(text.contains("two-factor"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("var hidden"));
    }

    #[test]
    fn plain_files_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello world").unwrap();
        assert_eq!(file_to_text(&path).unwrap(), "hello world");
    }

    #[test]
    fn unknown_extension_falls_back_to_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.rst");
        std::fs::write(&path, "restructured").unwrap();
        assert_eq!(file_to_text(&path).unwrap(), "restructured");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(file_to_text(Path::new("/nonexistent/file.txt")).is_err());
    }
}
