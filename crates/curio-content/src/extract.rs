//! Per-page text extraction from documents.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use curio_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use curio_core::{Error, Result};

/// Extracts the raw text of each page of a local document.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<String>>;
}

/// Extractor backed by `pdftotext` (poppler-utils).
///
/// `pdftotext` separates pages with form feeds, which is how the output is
/// split back into pages.
#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    program: String,
    timeout: Duration,
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self {
            program: "pdftotext".to_string(),
            timeout: Duration::from_secs(EXTRACTION_CMD_TIMEOUT_SECS),
        }
    }
}

impl PdfTextExtractor {
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Split `pdftotext` output on form feeds, dropping the empty tail after the
/// final page break.
pub fn split_pages(output: &str) -> Vec<String> {
    let mut pages: Vec<String> = output.split('\x0c').map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

#[async_trait]
impl PageExtractor for PdfTextExtractor {
    #[instrument(skip(self, path), fields(subsystem = "content", component = "pdf_text", op = "extract_pages"))]
    async fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program)
                .arg(path)
                .arg("-")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            Error::Internal(format!(
                "{} timed out after {}s",
                self.program,
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| Error::Internal(format!("Failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Internal(format!(
                "{} failed (exit {}): {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let pages = split_pages(&String::from_utf8_lossy(&output.stdout));
        debug!(page_count = pages.len(), "Extracted page text");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_drops_trailing_break() {
        let pages = split_pages("first page\n\x0csecond page\n\x0c");
        assert_eq!(pages, vec!["first page\n", "second page\n"]);
    }

    #[test]
    fn test_split_pages_keeps_blank_inner_pages() {
        let pages = split_pages("one\x0c\x0cthree");
        assert_eq!(pages.len(), 3);
        assert!(pages[1].is_empty());
    }

    #[test]
    fn test_split_pages_single_page() {
        assert_eq!(split_pages("only"), vec!["only"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_internal_error() {
        let extractor = PdfTextExtractor::default().with_program("curio-no-such-binary");
        let err = extractor
            .extract_pages(Path::new("/tmp/x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_program_with_path_and_stdout_marker() {
        // `echo <path> -` prints its arguments as a single page.
        let extractor = PdfTextExtractor::default().with_program("echo");
        let pages = extractor
            .extract_pages(Path::new("/tmp/doc.pdf"))
            .await
            .unwrap();
        assert_eq!(pages, vec!["/tmp/doc.pdf -\n"]);
    }
}
