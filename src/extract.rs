//! Text extraction for binary documents (PDF, DOCX).
//!
//! The pipeline supplies bytes plus a [`DocFormat`]; this module returns
//! plain UTF-8 text. Native Google documents never reach this code: callers
//! export them to DOCX through the storage gateway first, so the decoder
//! itself never touches the network.

use std::io::Read;

use crate::models::DocFormat;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error. Callers that only need "did anything come out" can
/// map any of these to empty text; tests and reports can still tell a
/// corrupt payload apart from an unsupported one.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat(String),
    Pdf(String),
    Docx(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFormat(what) => {
                write!(f, "unsupported format: {}", what)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts plain text from binary content.
///
/// PDF text comes back page by page in reading order; DOCX text comes back
/// one line per paragraph, with explicit line breaks preserved.
pub fn extract_text(bytes: &[u8], format: DocFormat) -> Result<String, ExtractError> {
    match format {
        DocFormat::Pdf => extract_pdf(bytes),
        DocFormat::Docx => extract_docx(bytes),
        DocFormat::GoogleDoc => Err(ExtractError::UnsupportedFormat(
            "native document without an export".to_string(),
        )),
        DocFormat::Unsupported => {
            Err(ExtractError::UnsupportedFormat("unknown".to_string()))
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| ExtractError::Docx(e.to_string()))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(ExtractError::Docx(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(ExtractError::Docx(
            "word/document.xml not found".to_string(),
        ));
    }
    paragraph_text(&doc_xml)
}

/// Pulls the text of every `w:t` run, inserting a newline at each paragraph
/// end (`w:p`) and each explicit break (`w:br`).
fn paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"br" {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
