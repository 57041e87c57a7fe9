//! DOCX reading: WordprocessingML body → [`Document`] → Markdown.

mod markdown;
mod styles;
pub mod writer;

use std::io::Read;
use std::path::Path;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::model::{Block, Document, Paragraph, Run, Table};

pub use markdown::to_markdown;
use styles::{StyleNames, paragraph_style_id, parse_style_names};

pub(crate) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Parse a WML boolean toggle element (e.g., w:b, w:i).
/// Present with no val or val != "0"/"false" means true.
fn wml_bool(parent: roxmltree::Node, name: &str) -> Option<bool> {
    wml(parent, name).map(|n| {
        n.attribute((WML_NS, "val"))
            .is_none_or(|v| v != "0" && v != "false")
    })
}

fn is_wml(node: roxmltree::Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(WML_NS)
}

pub(super) fn wml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children().find(|n| is_wml(*n, name))
}

pub(super) fn wml_attr<'a>(node: roxmltree::Node<'a, 'a>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(|n| n.attribute((WML_NS, "val")))
}

fn read_zip_text(zip: &mut zip::ZipArchive<std::fs::File>, name: &str) -> Option<String> {
    let mut content = String::new();
    zip.by_name(name).ok()?.read_to_string(&mut content).ok()?;
    Some(content)
}

/// Flatten SDT wrappers: descend into w:sdtContent and collect effective children.
fn collect_block_nodes<'a>(parent: roxmltree::Node<'a, 'a>) -> Vec<roxmltree::Node<'a, 'a>> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        if is_wml(child, "sdt") {
            if let Some(content) = wml(child, "sdtContent") {
                nodes.extend(collect_block_nodes(content));
            }
        } else {
            nodes.push(child);
        }
    }
    nodes
}

/// Runs of a paragraph in reading order, including those inside hyperlinks,
/// smart tags and inline content controls.
fn collect_run_nodes<'a>(parent: roxmltree::Node<'a, 'a>, out: &mut Vec<roxmltree::Node<'a, 'a>>) {
    for child in parent.children() {
        if child.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match child.tag_name().name() {
            "r" => out.push(child),
            "hyperlink" | "smartTag" | "ins" => collect_run_nodes(child, out),
            "sdt" => {
                if let Some(content) = wml(child, "sdtContent") {
                    collect_run_nodes(content, out);
                }
            }
            _ => {}
        }
    }
}

fn run_text(run_node: roxmltree::Node) -> String {
    let mut text = String::new();
    for child in run_node.children() {
        if child.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match child.tag_name().name() {
            "t" => text.push_str(child.text().unwrap_or("")),
            "tab" => text.push('\t'),
            "br" | "cr" => text.push('\n'),
            "noBreakHyphen" => text.push('-'),
            _ => {}
        }
    }
    text
}

fn has_drawing(run_node: roxmltree::Node) -> bool {
    run_node
        .descendants()
        .any(|n| is_wml(n, "drawing") || is_wml(n, "pict"))
}

fn parse_paragraph(para_node: roxmltree::Node) -> Paragraph {
    let mut run_nodes = Vec::new();
    collect_run_nodes(para_node, &mut run_nodes);

    let mut para = Paragraph::default();
    for run_node in run_nodes {
        para.has_drawing |= has_drawing(run_node);
        let rpr = wml(run_node, "rPr");
        // Only direct formatting counts; style-inherited emphasis is not marked up.
        let bold = rpr.and_then(|n| wml_bool(n, "b")).unwrap_or(false);
        let italic = rpr.and_then(|n| wml_bool(n, "i")).unwrap_or(false);
        para.runs.push(Run {
            text: run_text(run_node),
            bold,
            italic,
        });
    }
    para
}

/// Heading level for a paragraph style name. `Heading n` gives `n` (a trailing `0`
/// gives 2), a bare `Heading…` gives 1, `Title` 1 and `Subtitle` 2.
fn heading_level(style_name: &str) -> Option<u8> {
    if style_name.eq_ignore_ascii_case("title") {
        return Some(1);
    }
    if style_name.eq_ignore_ascii_case("subtitle") {
        return Some(2);
    }
    if !style_name.starts_with("Heading") {
        return None;
    }
    let level = match style_name.chars().last().and_then(|c| c.to_digit(10)) {
        Some(0) => 2,
        Some(d) => d as u8,
        None => 1,
    };
    Some(level)
}

fn cell_text(tc: roxmltree::Node) -> String {
    tc.descendants()
        .filter(|n| is_wml(*n, "p"))
        .map(|p| parse_paragraph(p).text().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rows of cell text on the table grid. A cell spanning several grid columns repeats
/// its text in each; a vertically continued cell repeats the text above it.
fn parse_table(tbl: roxmltree::Node) -> Table {
    let mut rows: Vec<Vec<String>> = Vec::new();
    for tr in collect_block_nodes(tbl).into_iter().filter(|n| is_wml(*n, "tr")) {
        let mut row = Vec::new();
        for tc in collect_block_nodes(tr).into_iter().filter(|n| is_wml(*n, "tc")) {
            let tc_pr = wml(tc, "tcPr");
            let grid_span = tc_pr
                .and_then(|pr| wml_attr(pr, "gridSpan"))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);
            let continues = tc_pr
                .and_then(|pr| wml(pr, "vMerge"))
                .is_some_and(|n| n.attribute((WML_NS, "val")) != Some("restart"));

            let grid_col = row.len();
            let text = if continues {
                rows.last()
                    .and_then(|above| above.get(grid_col))
                    .cloned()
                    .unwrap_or_default()
            } else {
                cell_text(tc)
            };
            row.extend(std::iter::repeat_n(text, grid_span));
        }
        rows.push(row);
    }
    Table { rows }
}

fn parse_body(body: roxmltree::Node, styles: &StyleNames) -> Vec<Block> {
    let mut blocks = Vec::new();
    for node in collect_block_nodes(body) {
        if node.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match node.tag_name().name() {
            "p" => {
                let para = parse_paragraph(node);
                let level = styles
                    .name_of(paragraph_style_id(node))
                    .and_then(heading_level);
                match level {
                    Some(level) if !para.is_blank() => blocks.push(Block::Heading {
                        level,
                        text: para.text().trim().to_string(),
                    }),
                    _ => blocks.push(Block::Paragraph(para)),
                }
            }
            "tbl" => blocks.push(Block::Table(parse_table(node))),
            _ => {}
        }
    }
    blocks
}

pub fn parse(path: &Path) -> Result<Document> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::Io(
            std::io::Error::new(e.kind(), format!("{}: {}", e, path.display())),
        ),
        _ => Error::Io(e),
    })?;

    let mut zip = zip::ZipArchive::new(file)
        .map_err(|_| Error::InvalidDocx("file is not a ZIP archive".into()))?;

    let styles = parse_style_names(read_zip_text(&mut zip, "word/styles.xml").as_deref());

    let mut xml_content = String::new();
    zip.by_name("word/document.xml")
        .map_err(|_| Error::InvalidDocx("missing word/document.xml (is this a DOCX file?)".into()))?
        .read_to_string(&mut xml_content)?;

    let xml = roxmltree::Document::parse(&xml_content)?;
    let body = wml(xml.root_element(), "body")
        .ok_or_else(|| Error::InvalidDocx("missing w:body".into()))?;

    Ok(Document {
        blocks: parse_body(body, &styles),
    })
}

/// Convert a DOCX file to Markdown. The untrimmed Markdown is also written to
/// `side_file` when given; failing to write it only logs a warning.
pub fn docx_to_markdown(path: &Path, side_file: Option<&Path>) -> Result<String> {
    let t0 = Instant::now();
    let doc = parse(path)?;
    let t_parse = t0.elapsed();

    let md = to_markdown(&doc);
    if let Some(side) = side_file
        && let Err(e) = std::fs::write(side, &md)
    {
        log::warn!("Could not save Markdown to {}: {e}", side.display());
    }

    log::info!(
        "DOCX → Markdown: {} blocks, parse={:.1}ms, total={:.1}ms",
        doc.blocks.len(),
        t_parse.as_secs_f64() * 1000.0,
        t0.elapsed().as_secs_f64() * 1000.0,
    );
    Ok(md.trim().to_string())
}
