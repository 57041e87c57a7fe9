mod common;

use std::path::Path;

use letterpress::docx::writer::docx_paragraphs;
use letterpress::{ConvertOptions, EngineChoice, ErrorKind, LayoutStatus, convert};

const QUOTE: &str = "# Quotation\n\nDear *client*,\n\n| Item | Price |\n| --- | --- |\n| Tea | 3 |\n\n- delivery: free\n- valid 30 days\n";

#[test]
fn markdown_to_docx_reopens_with_stripped_lines() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let md = dir.path().join("quote.md");
    std::fs::write(&md, QUOTE).unwrap();
    let out = dir.path().join("quote.docx");

    let report = convert(&md, &out, &ConvertOptions::default()).unwrap();
    assert!(report.is_none());

    let paragraphs = common::docx_paragraph_texts(&out);
    assert_eq!(paragraphs, docx_paragraphs(QUOTE));
    assert_eq!(paragraphs.first().map(String::as_str), Some("Quotation"));
    assert!(paragraphs.iter().any(|p| p == "Dear client,"));
    assert!(paragraphs.iter().all(|p| !p.contains('<') && !p.trim().is_empty()));

    // The package is readable by the DOCX reader too.
    let back = letterpress::docx::docx_to_markdown(&out, None).unwrap();
    assert!(back.starts_with("Quotation\n\nDear client,"));
}

#[test]
fn markdown_to_txt_has_no_markup() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let md = dir.path().join("quote.MD");
    std::fs::write(&md, "## Terms\n\n**Pay** within [30 days](https://x.test).\n").unwrap();
    let out = dir.path().join("quote.txt");
    convert(&md, &out, &ConvertOptions::default()).unwrap();
    let txt = std::fs::read_to_string(&out).unwrap();
    assert_eq!(txt, "Terms\n\nPay within 30 days.\n");
}

#[test]
fn docx_to_pdf_with_builtin_engine() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let body = [
        common::styled_para("Heading1", "Hello"),
        common::table(&[&["Item", "Price"], &["Tea", "3"]]),
    ]
    .concat();
    let input = common::write_docx(dir.path(), "hello.docx", &body);
    let out = dir.path().join("hello.pdf");
    let mut options = ConvertOptions {
        engine: EngineChoice::Builtin,
        ..Default::default()
    };
    options.render.system_fonts = false;

    convert(&input, &out, &options).unwrap();
    let (pages, _) = common::pdf_pages(&out);
    assert_eq!(pages, 1);
}

#[test]
fn missing_engine_is_reported() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_docx(dir.path(), "in.docx", &common::para("x"));
    let out = dir.path().join("out.pdf");
    let options = ConvertOptions {
        engine: EngineChoice::SofficeAt("letterpress-missing-soffice".into()),
        ..Default::default()
    };
    let err = convert(&input, &out, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineNotFound);
    assert!(!out.exists());
}

#[test]
fn txt_to_pdf_goes_through_markdown() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("note.txt");
    std::fs::write(&input, "QUOTATION\nTea 3\n").unwrap();
    let out = dir.path().join("note.pdf");
    let mut options = ConvertOptions::default();
    options.render.system_fonts = false;
    let report = convert(&input, &out, &options).unwrap().unwrap();
    assert_eq!(report.status, LayoutStatus::Fit);
    assert_eq!(report.page_count, 1);
}

#[test]
fn unsupported_extensions_are_rejected() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sheet.odt");
    std::fs::write(&input, "x").unwrap();
    let err = convert(&input, &dir.path().join("out.md"), &ConvertOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert!(err.to_string().contains(".odt"));

    let err = letterpress::convert_markdown("# x", Path::new("out.html"), &ConvertOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
}

#[test]
fn docx_to_md_saves_markdown() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_docx(
        dir.path(),
        "bill.docx",
        &[common::styled_para("Heading1", "Bill"), common::para("Amount: 10")].concat(),
    );
    let out = dir.path().join("bill-out.md");
    let report = convert(&input, &out, &ConvertOptions::default()).unwrap();
    assert!(report.is_none());
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "# Bill\n\nAmount: 10");
    // The reader's own side file lands next to the source.
    assert!(dir.path().join("bill.md").exists());
}
