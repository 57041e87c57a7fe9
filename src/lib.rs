pub mod config;
pub mod convert;
pub mod css;
pub mod docx;
mod error;
mod fonts;
pub mod html;
pub mod markdown;
pub mod model;
pub mod normalize;
pub mod pdf;

pub use config::{ConvertOptions, RenderOptions};
pub use convert::engine::{BuiltinEngine, DocumentEngine, EngineChoice, SofficeEngine};
pub use convert::{
    Format, PdfReport, convert, convert_markdown, convert_markdown_file, convert_to_markdown,
    markdown_to_pdf, save_markdown,
};
pub use error::{Error, ErrorKind, Result};
pub use fonts::FONTS_ENV;
pub use model::{LayoutStatus, PageFlow, PageSetup, Rect};
pub use normalize::normalize_markdown;

use std::path::Path;

/// Markdown source → PDF file, the path generated quotations and bills take.
pub fn render_markdown_file(md_path: &Path, output: &Path, options: &RenderOptions) -> Result<PdfReport> {
    let t0 = std::time::Instant::now();
    let markdown = String::from_utf8(std::fs::read(md_path)?)?;
    let t_read = t0.elapsed();

    let mut options = options.clone();
    if options.base_dir.is_none() {
        options.base_dir = md_path.parent().map(Path::to_path_buf);
    }
    let report = markdown_to_pdf(&markdown, output, &options)?;

    log::info!(
        "Timing: read={:.1}ms, total={:.1}ms ({} page(s), {})",
        t_read.as_secs_f64() * 1000.0,
        t0.elapsed().as_secs_f64() * 1000.0,
        report.page_count,
        match report.status {
            LayoutStatus::Fit => "fit",
            LayoutStatus::Overflow(_) => "overflow",
        },
    );
    Ok(report)
}
