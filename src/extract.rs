//! Per-page text extraction.
//!
//! PDFs are split into their physical pages; plain text and Markdown files
//! are treated as single-page documents. Extraction never panics: malformed
//! input comes back as an [`ExtractError`] and the loader skips the file.

use std::path::Path;

/// Extraction error. The loader records it against the file and moves on.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
    Text(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => {
                write!(f, "unsupported file type: {}", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Text(e) => write!(f, "text decoding failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract page texts from file bytes, choosing the format by extension.
pub fn extract_pages(path: &Path, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => extract_pdf_pages(bytes),
        "txt" | "md" | "markdown" => extract_text(bytes).map(|t| vec![t]),
        other => Err(ExtractError::UnsupportedExtension(other.to_string())),
    }
}

/// Extract one string per PDF page, in page order.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract can panic on some malformed inputs.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".to_string())),
    }
}

fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| ExtractError::Text(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_file_is_single_page() {
        let pages = extract_pages(Path::new("welcome.md"), b"# Welcome\n\nHello.").unwrap();
        assert_eq!(pages, vec!["# Welcome\n\nHello.".to_string()]);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = extract_pages(Path::new("slides.pptx"), b"PK").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedExtension(ref e) if e == "pptx"));
    }

    #[test]
    fn test_invalid_utf8_text() {
        assert!(matches!(
            extract_pages(Path::new("notes.txt"), &[0xff, 0xfe, 0x00]),
            Err(ExtractError::Text(_))
        ));
    }

    #[test]
    fn test_garbage_pdf_is_error_not_panic() {
        let err = extract_pages(Path::new("broken.PDF"), b"this is not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
