//! Markdown → DOCX: one plain paragraph per line of rendered text.

use std::io::Write;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::WML_NS;
use crate::error::Result;
use crate::html::decode_entities;
use crate::markdown::render_html;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.*?>").expect("valid regex"));

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
  <Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

fn styles_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="{WML_NS}">
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>
</w:styles>"#
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            // Control characters other than tab are not allowed in XML 1.0.
            c if c.is_control() && c != '\t' => {}
            c => out.push(c),
        }
    }
    out
}

/// The paragraphs a Markdown text becomes: each line of the rendered HTML with its tags
/// removed, trimmed, skipping empty ones.
pub fn docx_paragraphs(markdown: &str) -> Vec<String> {
    render_html(markdown)
        .split('\n')
        .map(|line| decode_entities(&TAG.replace_all(line, "")).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn document_xml(paragraphs: &[String]) -> String {
    let mut body = String::new();
    for p in paragraphs {
        body.push_str("<w:p><w:r><w:t xml:space=\"preserve\">");
        body.push_str(&escape_xml(p));
        body.push_str("</w:t></w:r></w:p>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{WML_NS}"><w:body>{body}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr></w:body></w:document>"#
    )
}

/// Write `markdown` as a minimal DOCX package at `out`.
pub fn markdown_to_docx(markdown: &str, out: &Path) -> Result<()> {
    let t0 = std::time::Instant::now();
    let paragraphs = docx_paragraphs(markdown);

    let file = std::fs::File::create(out)?;
    let mut zip = ZipWriter::new(file);
    let opt = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opt)?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;
    zip.start_file("_rels/.rels", opt)?;
    zip.write_all(PACKAGE_RELS.as_bytes())?;
    zip.start_file("word/_rels/document.xml.rels", opt)?;
    zip.write_all(DOCUMENT_RELS.as_bytes())?;
    zip.start_file("word/document.xml", opt)?;
    zip.write_all(document_xml(&paragraphs).as_bytes())?;
    zip.start_file("word/styles.xml", opt)?;
    zip.write_all(styles_xml().as_bytes())?;
    zip.finish()?;

    log::info!(
        "Markdown → DOCX: {} paragraphs, {:.1}ms",
        paragraphs.len(),
        t0.elapsed().as_secs_f64() * 1000.0,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stripped_per_line() {
        let paras = docx_paragraphs("# Quote\n\nTotal **due**: 5 &amp; more\n\n- one\n- two\n");
        assert_eq!(paras, ["Quote", "Total due: 5 & more", "one", "two"]);
    }

    #[test]
    fn document_xml_escapes_text() {
        let xml = document_xml(&["a < b & c".to_string()]);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let text: String = doc
            .descendants()
            .filter(|n| n.tag_name().name() == "t")
            .filter_map(|n| n.text())
            .collect();
        assert_eq!(text, "a < b & c");
    }
}
