//! Format dispatch: picks a converter from the source and target file extensions.

pub mod engine;
pub mod text;

use std::path::Path;
use std::time::Instant;

use crate::config::{ConvertOptions, RenderOptions};
use crate::error::{Error, Result};
use crate::model::LayoutStatus;
use crate::{docx, markdown, normalize, pdf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Docx,
    Txt,
    Markdown,
}

impl Format {
    /// Format named by the file extension, compared case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(Format::Pdf),
            "docx" => Ok(Format::Docx),
            "txt" => Ok(Format::Txt),
            "md" | "markdown" => Ok(Format::Markdown),
            "" => Err(Error::UnsupportedFormat(format!(
                "{} has no file extension",
                path.display()
            ))),
            other => Err(Error::UnsupportedFormat(format!(".{other}"))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Docx => "docx",
            Format::Txt => "txt",
            Format::Markdown => "md",
        }
    }
}

/// What a Markdown → PDF conversion produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PdfReport {
    pub page_count: usize,
    pub status: LayoutStatus,
}

fn read_utf8(path: &Path) -> Result<String> {
    Ok(String::from_utf8(std::fs::read(path)?)?)
}

/// Extract Markdown from a PDF, DOCX, TXT or Markdown file.
pub fn convert_to_markdown(path: &Path, options: &ConvertOptions) -> Result<String> {
    match Format::from_path(path)? {
        Format::Pdf => pdf::extract::pdf_to_markdown(path),
        Format::Docx => {
            let side_file = options
                .markdown_side_file
                .clone()
                .unwrap_or_else(|| path.with_extension("md"));
            docx::docx_to_markdown(path, Some(&side_file))
        }
        Format::Txt => Ok(text::text_to_markdown(&read_utf8(path)?)),
        Format::Markdown => read_utf8(path),
    }
}

/// Normalize generated Markdown, render it below the letterhead spacer and write the PDF.
pub fn markdown_to_pdf(markdown: &str, output: &Path, options: &RenderOptions) -> Result<PdfReport> {
    let t0 = Instant::now();
    let cleaned = normalize::normalize_markdown(markdown);
    let html = markdown::render_with_spacer(&cleaned, &options.letterhead_spacer);
    let outcome = pdf::render_html(&html, &options.stylesheet, options)?;
    std::fs::write(output, &outcome.pdf)?;

    log::info!(
        "Markdown → PDF: {} page(s), {} bytes, {:.1}ms",
        outcome.page_count,
        outcome.pdf.len(),
        t0.elapsed().as_secs_f64() * 1000.0,
    );
    Ok(PdfReport {
        page_count: outcome.page_count,
        status: outcome.status,
    })
}

/// Write Markdown text as the format `output`'s extension names. Only PDF output
/// produces a report.
pub fn convert_markdown(
    markdown: &str,
    output: &Path,
    options: &ConvertOptions,
) -> Result<Option<PdfReport>> {
    match Format::from_path(output)? {
        Format::Pdf => markdown_to_pdf(markdown, output, &options.render).map(Some),
        Format::Docx => docx::writer::markdown_to_docx(markdown, output).map(|_| None),
        Format::Txt => {
            std::fs::write(output, text::markdown_to_text(markdown))?;
            Ok(None)
        }
        Format::Markdown => save_markdown(markdown, output).map(|_| None),
    }
}

/// Convert a Markdown file. Relative image paths resolve against the file's directory
/// unless the render options name another base.
pub fn convert_markdown_file(
    md_path: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<Option<PdfReport>> {
    let markdown = read_utf8(md_path)?;
    if options.render.base_dir.is_some() {
        return convert_markdown(&markdown, output, options);
    }
    let mut options = options.clone();
    options.render.base_dir = md_path.parent().map(Path::to_path_buf);
    convert_markdown(&markdown, output, &options)
}

/// Convert between any supported pair of formats. DOCX → PDF goes through the configured
/// document engine; everything else passes through Markdown.
pub fn convert(input: &Path, output: &Path, options: &ConvertOptions) -> Result<Option<PdfReport>> {
    let from = Format::from_path(input)?;
    let to = Format::from_path(output)?;
    match (from, to) {
        (Format::Docx, Format::Pdf) => engine::docx_to_pdf(input, output, options).map(|_| None),
        (Format::Markdown, _) => convert_markdown_file(input, output, options),
        (_, Format::Markdown) => {
            save_markdown(&convert_to_markdown(input, options)?, output).map(|_| None)
        }
        _ => {
            let markdown = convert_to_markdown(input, options)?;
            convert_markdown(&markdown, output, options)
        }
    }
}

pub fn save_markdown(markdown: &str, path: &Path) -> Result<()> {
    std::fs::write(path, markdown)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(Format::from_path(Path::new("a/Quote.PDF")).unwrap(), Format::Pdf);
        assert_eq!(Format::from_path(Path::new("x.Markdown")).unwrap(), Format::Markdown);
        assert_eq!(Format::from_path(Path::new("notes.txt")).unwrap(), Format::Txt);
    }

    #[test]
    fn unknown_extension_is_named() {
        let err = Format::from_path(Path::new("sheet.odt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert!(err.to_string().contains(".odt"));
        let err = Format::from_path(Path::new("README")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn txt_source_becomes_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("note.txt");
        std::fs::write(&src, "TERMS\npay in 30 days").unwrap();
        let md = convert_to_markdown(&src, &ConvertOptions::default()).unwrap();
        assert_eq!(md, "## TERMS\n\npay in 30 days\n");
    }

    #[test]
    fn invalid_utf8_text_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("bad.txt");
        std::fs::write(&src, [0xff, 0xfe, 0x41]).unwrap();
        let err = convert_to_markdown(&src, &ConvertOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSource);
    }

    #[test]
    fn markdown_to_txt_and_back_to_md() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("q.txt");
        let report = convert_markdown("# Quote\n\n**Tea** x2", &out, &ConvertOptions::default())
            .unwrap();
        assert!(report.is_none());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "Quote\n\nTea x2");
    }
}
