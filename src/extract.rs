//! Text extraction for uploaded documents.
//!
//! Uploads arrive as bytes plus a filename and an optional content type.
//! [`DocumentKind::detect`] decides whether the upload is accepted at all;
//! [`extract_text`] turns accepted bytes into plain UTF-8 text. Everything
//! happens in memory, so no temporary file is ever left behind.

use std::io::Read;

use crate::error::{RagError, Result};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Accepted document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
    Markdown,
}

impl DocumentKind {
    /// Classify an upload by filename extension, falling back to the declared
    /// content type. Returns `None` for anything that is not accepted.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Option<Self> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match ext.as_deref() {
            Some("pdf") => return Some(Self::Pdf),
            Some("docx") => return Some(Self::Docx),
            Some("txt") => return Some(Self::PlainText),
            Some("md") | Some("markdown") => return Some(Self::Markdown),
            _ => {}
        }

        let mime = content_type?.split(';').next()?.trim().to_ascii_lowercase();
        match mime.as_str() {
            MIME_PDF => Some(Self::Pdf),
            MIME_DOCX => Some(Self::Docx),
            "text/plain" => Some(Self::PlainText),
            "text/markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::PlainText => "text",
            Self::Markdown => "markdown",
        }
    }
}

/// Extract the full text of a document.
///
/// Parse failures become [`RagError::ExtractionFailed`]; this never panics on
/// malformed input.
pub fn extract_text(bytes: &[u8], kind: DocumentKind) -> Result<String> {
    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Docx => extract_docx(bytes),
        DocumentKind::PlainText | DocumentKind::Markdown => String::from_utf8(bytes.to_vec())
            .map_err(|e| RagError::ExtractionFailed(format!("text is not valid UTF-8: {}", e))),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    // pdf-extract can panic on some malformed inputs.
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| RagError::ExtractionFailed("PDF parser panicked".into()))?
        .map_err(|e| RagError::ExtractionFailed(format!("PDF extraction failed: {}", e)))
}

fn docx_err(e: impl std::fmt::Display) -> RagError {
    RagError::ExtractionFailed(format!("DOCX extraction failed: {}", e))
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(docx_err)?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| docx_err("word/document.xml not found"))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(docx_err)?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(docx_err("word/document.xml exceeds size limit"));
    }

    docx_paragraphs(&doc_xml)
}

/// Collect `<w:t>` runs, one line per `<w:p>` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                out.push_str(t.unescape().map_err(docx_err)?.as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(docx_err(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
