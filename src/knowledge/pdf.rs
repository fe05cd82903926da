//! PDF text extraction and discovery.

use super::types::IngestError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Text of a single PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfPage {
    /// One-based page number.
    pub number: usize,
    /// Extracted text, trimmed.
    pub text: String,
}

/// Extract per-page text from the PDF at `path`.
///
/// Extraction is CPU-bound and runs on the blocking pool. Pages without any text are dropped.
pub async fn extract_pages(path: &Path) -> Result<Vec<PdfPage>, IngestError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(IngestError::MissingSource(path.to_path_buf()));
    }

    let owned = path.to_path_buf();
    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
        .await
        .map_err(|error| IngestError::Task(error.to_string()))?
        .map_err(|error| IngestError::Extraction {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

    let pages = split_pages(&raw);
    tracing::debug!(path = %path.display(), pages = pages.len(), "Extracted PDF text");
    Ok(pages)
}

/// Split extractor output on form feeds, numbering pages from one.
pub(crate) fn split_pages(raw: &str) -> Vec<PdfPage> {
    raw.split('\u{c}')
        .enumerate()
        .filter_map(|(idx, text)| {
            let text = text.trim();
            (!text.is_empty()).then(|| PdfPage {
                number: idx + 1,
                text: text.to_string(),
            })
        })
        .collect()
}

/// Collect PDFs under `root` (or `root` itself when it is a file), sorted by path.
pub fn discover_pdfs(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(error = %error, "Skipping unreadable path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_pdf(path))
        .collect();
    found.sort();
    found
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
