mod common;

use letterpress::{ConvertOptions, ErrorKind, RenderOptions, convert_to_markdown, markdown_to_pdf};

#[test]
fn pages_and_images_are_extracted_in_order() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    common::write_png(&dir.path().join("logo.png"), 12, 8);
    let md = "# Invoice 42\n\n![logo](logo.png)\n\nTotal due: 120.00\n";
    let pdf = dir.path().join("invoice.pdf");
    let options = RenderOptions {
        system_fonts: false,
        base_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    markdown_to_pdf(md, &pdf, &options).unwrap();

    let extracted = convert_to_markdown(&pdf, &ConvertOptions::default()).unwrap();
    assert!(extracted.starts_with("## Page 1\n"), "{extracted:?}");
    assert!(extracted.contains("Invoice 42"));
    assert!(extracted.ends_with("![Image 1 from page 1](image_p1_1.png)\n\n"));
    assert!(!extracted.contains("## Page 2"));

    let saved = image::open(dir.path().join("image_p1_1.png")).unwrap();
    assert_eq!((saved.width(), saved.height()), (12, 8));
}

#[test]
fn one_section_per_page() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("long.pdf");
    let md: String = (0..120).map(|i| format!("Entry {i}\n\n")).collect();
    let options = RenderOptions {
        system_fonts: false,
        flow: letterpress::PageFlow::Continuous,
        ..Default::default()
    };
    let report = markdown_to_pdf(&md, &pdf, &options).unwrap();
    assert!(report.page_count > 1);

    let extracted = letterpress::pdf::extract::pdf_to_markdown(&pdf).unwrap();
    for page in 1..=report.page_count {
        assert_eq!(extracted.matches(&format!("## Page {page}\n")).count(), 1);
    }
    assert!(!extracted.contains("![Image"));
}

#[test]
fn garbage_is_malformed() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("broken.pdf");
    std::fs::write(&pdf, b"%PDF-1.7\nthis is not a pdf body").unwrap();
    let err = convert_to_markdown(&pdf, &ConvertOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSource);
}
