//! File loading and text extraction.
//!
//! [`load_document`] turns a path into a [`SourceDocument`]: the file
//! name, the document kind derived from its extension, and UTF-8 text.
//!
//! | Extension | Extraction |
//! |-----------|------------|
//! | `pdf` | `pdf-extract` |
//! | `docx` | `zip` + `quick-xml`, `w:t` runs, one line per `w:p` paragraph |
//! | `doc` | unsupported (legacy binary format) |
//! | anything else | read as UTF-8; invalid UTF-8 is an error |
//!
//! Errors are per-file; callers report them and continue with the batch.

use std::io::Read;
use std::path::Path;

use easy_research_core::models::SourceDocument;
use thiserror::Error;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported file type: .{0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Ooxml(String),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
}

/// Read `path` and extract its text.
pub fn load_document(path: &Path) -> Result<SourceDocument, ExtractError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let bytes = std::fs::read(path)?;
    let text = extract_text(&filename, &bytes)?;
    Ok(SourceDocument::new(filename, text))
}

/// Extract text from file bytes, dispatching on the file name's extension.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "doc" => Err(ExtractError::Unsupported(ext)),
        _ => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Ooxml("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraphs(&doc_xml)
}

/// Concatenate `w:t` runs, ending each `w:p` paragraph with a newline.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => out.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
