//! Response post-processing: DOCX rendering and collision-free save names.
//!
//! The rendering is a minimal but valid DOCX package: `[Content_Types].xml`,
//! `_rels/.rels`, and `word/document.xml` carrying one heading paragraph and
//! the body as a single paragraph (newlines become explicit `<w:br/>` runs).
//! It round-trips through this crate's own DOCX extractor.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::Write;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// Builds a DOCX byte stream with `title` as a heading and `body` as one
/// paragraph block.
pub fn render_docx(title: &str, body: &str) -> Result<Vec<u8>> {
    let document = document_xml(title, body);

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();

        zip.start_file("[Content_Types].xml", options)
            .context("Failed to start [Content_Types].xml")?;
        zip.write_all(CONTENT_TYPES_XML.as_bytes())?;

        zip.start_file("_rels/.rels", options)
            .context("Failed to start _rels/.rels")?;
        zip.write_all(RELS_XML.as_bytes())?;

        zip.start_file("word/document.xml", options)
            .context("Failed to start word/document.xml")?;
        zip.write_all(document.as_bytes())?;

        zip.finish().context("Failed to finish DOCX archive")?;
    }
    Ok(buf)
}

fn document_xml(title: &str, body: &str) -> String {
    let mut body_runs = String::new();
    for (i, line) in body.split('\n').enumerate() {
        if i > 0 {
            body_runs.push_str("<w:r><w:br/></w:r>");
        }
        body_runs.push_str(&format!(
            "<w:r><w:t xml:space=\"preserve\">{}</w:t></w:r>",
            escape_xml(line)
        ));
    }

    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
            "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">",
            "<w:body>",
            "<w:p><w:pPr><w:pStyle w:val=\"Heading1\"/></w:pPr><w:r><w:t>{}</w:t></w:r></w:p>",
            "<w:p>{}</w:p>",
            "</w:body></w:document>"
        ),
        escape_xml(title),
        body_runs
    )
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Derives collision-avoiding save names: base name plus a capture-time
/// timestamp, with a sequence suffix when two saves land in the same
/// second. Repeated saves never overwrite a prior one.
pub struct SaveNamer {
    base_name: String,
    issued: std::collections::HashSet<String>,
}

impl SaveNamer {
    pub fn new(base_name: &str) -> Self {
        Self {
            base_name: base_name.to_string(),
            issued: std::collections::HashSet::new(),
        }
    }

    /// Next unique name with the given extension (no leading dot).
    pub fn next(&mut self, extension: &str) -> String {
        self.next_at(Utc::now(), extension)
    }

    fn next_at(&mut self, at: DateTime<Utc>, extension: &str) -> String {
        let stamp = at.format("%Y%m%d-%H%M%S");
        let candidate = format!("{}-{}.{}", self.base_name, stamp, extension);
        if self.issued.insert(candidate.clone()) {
            return candidate;
        }
        let mut seq = 2;
        loop {
            let candidate = format!("{}-{}-{}.{}", self.base_name, stamp, seq, extension);
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
            seq += 1;
        }
    }
}
