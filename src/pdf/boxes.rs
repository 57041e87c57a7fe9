//! Turns the parsed HTML tree into block boxes with computed styles.

use crate::css::{ComputedStyle, StyleResolver};
use crate::fonts::font_key;
use crate::html::{Element, Node};

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "div", "dl", "dt",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "html", "img", "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "ul",
];

const HIDDEN_ELEMENTS: &[&str] = &["head", "link", "meta", "script", "style", "title"];

/// Upper bound browsers apply to `colspan`.
pub(super) const MAX_COLSPAN: usize = 1000;

const BULLETS: [&str; 2] = ["\u{2022}", "\u{2013}"];

/// The font and paint of a run of text.
#[derive(Clone, Debug, PartialEq)]
pub(super) struct RunStyle {
    pub(super) family: String,
    pub(super) bold: bool,
    pub(super) italic: bool,
    pub(super) size: f32,
    pub(super) color: Option<[u8; 3]>,
    pub(super) preserve: bool,
}

impl RunStyle {
    fn from_computed(s: &ComputedStyle) -> Self {
        Self {
            family: s.font_family.clone(),
            bold: s.bold,
            italic: s.italic,
            size: s.font_size,
            color: s.color,
            preserve: s.preserve_whitespace,
        }
    }

    pub(super) fn font_key(&self) -> String {
        font_key(&self.family, self.bold, self.italic)
    }
}

#[derive(Clone, Debug)]
pub(super) struct StyledRun {
    pub(super) text: String,
    pub(super) style: RunStyle,
    /// A forced line break (`<br>`); `text` is empty.
    pub(super) line_break: bool,
}

impl StyledRun {
    fn text(text: &str, style: &ComputedStyle) -> Self {
        Self {
            text: text.to_string(),
            style: RunStyle::from_computed(style),
            line_break: false,
        }
    }

    fn line_break(style: &ComputedStyle) -> Self {
        Self {
            text: String::new(),
            style: RunStyle::from_computed(style),
            line_break: true,
        }
    }
}

pub(super) struct BlockBox {
    pub(super) style: ComputedStyle,
    pub(super) kind: BoxKind,
}

pub(super) enum BoxKind {
    Container(Vec<BlockBox>),
    Lines {
        runs: Vec<StyledRun>,
        /// List bullet or ordinal hung left of the first line.
        marker: Option<StyledRun>,
    },
    Table(Vec<TableRow>),
    Rule,
    Image {
        src: String,
        width: Option<f32>,
        height: Option<f32>,
        alt: String,
    },
}

pub(super) struct TableRow {
    pub(super) cells: Vec<TableCell>,
}

pub(super) struct TableCell {
    pub(super) style: ComputedStyle,
    pub(super) runs: Vec<StyledRun>,
    pub(super) colspan: usize,
}

impl BlockBox {
    /// Visit every run that will be drawn, markers and table cells included.
    pub(super) fn for_each_run(&self, f: &mut impl FnMut(&StyledRun)) {
        match &self.kind {
            BoxKind::Container(children) => children.iter().for_each(|c| c.for_each_run(&mut *f)),
            BoxKind::Lines { runs, marker } => {
                marker.iter().for_each(&mut *f);
                runs.iter().for_each(&mut *f);
            }
            BoxKind::Table(rows) => rows
                .iter()
                .flat_map(|r| r.cells.iter())
                .flat_map(|c| c.runs.iter())
                .for_each(f),
            BoxKind::Rule | BoxKind::Image { .. } => {}
        }
    }

    pub(super) fn image_sources<'a>(&'a self, out: &mut Vec<&'a str>) {
        match &self.kind {
            BoxKind::Container(children) => children.iter().for_each(|c| c.image_sources(out)),
            BoxKind::Image { src, .. } => out.push(src),
            _ => {}
        }
    }
}

/// Build the box tree for a parsed fragment. The root box carries the `body` style.
pub(super) fn build(root: &Element, resolver: &StyleResolver) -> BlockBox {
    let html_style = resolver.compute("html", None, &ComputedStyle::default());
    let body_style = resolver.compute("body", None, &html_style);
    let mut builder = BoxBuilder {
        resolver,
        list_depth: 0,
    };
    let mut blocks = Vec::new();
    let mut inline = Vec::new();
    builder.collect(root, &body_style, &mut blocks, &mut inline);
    flush_inline(&body_style, &mut inline, &mut blocks);
    BlockBox {
        style: body_style,
        kind: BoxKind::Container(blocks),
    }
}

struct BoxBuilder<'a> {
    resolver: &'a StyleResolver,
    list_depth: usize,
}

impl BoxBuilder<'_> {
    fn collect(
        &mut self,
        el: &Element,
        style: &ComputedStyle,
        blocks: &mut Vec<BlockBox>,
        inline: &mut Vec<StyledRun>,
    ) {
        for child in &el.children {
            self.collect_node(child, style, blocks, inline);
        }
    }

    fn collect_node(
        &mut self,
        node: &Node,
        style: &ComputedStyle,
        blocks: &mut Vec<BlockBox>,
        inline: &mut Vec<StyledRun>,
    ) {
        let el = match node {
            Node::Text(t) => {
                if !t.is_empty() {
                    inline.push(StyledRun::text(t, style));
                }
                return;
            }
            Node::Element(el) => el,
        };
        let name = el.name.as_str();
        if HIDDEN_ELEMENTS.contains(&name) {
            return;
        }
        if name == "br" {
            inline.push(StyledRun::line_break(style));
            return;
        }
        let child_style = self.resolver.compute(name, el.attr("style"), style);
        if BLOCK_ELEMENTS.contains(&name) {
            flush_inline(style, inline, blocks);
            blocks.push(self.block(el, child_style));
        } else {
            self.collect(el, &child_style, blocks, inline);
        }
    }

    fn block(&mut self, el: &Element, style: ComputedStyle) -> BlockBox {
        let kind = match el.name.as_str() {
            "hr" => BoxKind::Rule,
            "img" => BoxKind::Image {
                src: el.attr("src").unwrap_or_default().to_string(),
                width: el.attr("width").and_then(|w| pixel_attr(w)),
                height: el.attr("height").and_then(|h| pixel_attr(h)),
                alt: el.attr("alt").unwrap_or_default().to_string(),
            },
            "table" => BoxKind::Table(self.table_rows(el, &style)),
            "ul" | "ol" => self.list(el, &style),
            _ => {
                let mut blocks = Vec::new();
                let mut inline = Vec::new();
                self.collect(el, &style, &mut blocks, &mut inline);
                if blocks.is_empty() {
                    BoxKind::Lines {
                        runs: inline,
                        marker: None,
                    }
                } else {
                    flush_inline(&style, &mut inline, &mut blocks);
                    BoxKind::Container(blocks)
                }
            }
        };
        BlockBox { style, kind }
    }

    fn list(&mut self, el: &Element, style: &ComputedStyle) -> BoxKind {
        let ordered = el.name == "ol";
        let mut ordinal: i64 = el.attr("start").and_then(|s| s.trim().parse().ok()).unwrap_or(1);
        let bullet = BULLETS[self.list_depth.min(BULLETS.len() - 1)];
        self.list_depth += 1;

        let mut blocks = Vec::new();
        let mut inline = Vec::new();
        for child in &el.children {
            match child {
                Node::Element(li) if li.name == "li" => {
                    flush_inline(style, &mut inline, &mut blocks);
                    let li_style = self.resolver.compute("li", li.attr("style"), style);
                    let marker = if ordered {
                        format!("{ordinal}.")
                    } else {
                        bullet.to_string()
                    };
                    ordinal += 1;
                    let mut item = self.block(li, li_style);
                    attach_marker(&mut item, &marker);
                    blocks.push(item);
                }
                other => self.collect_node(other, style, &mut blocks, &mut inline),
            }
        }
        flush_inline(style, &mut inline, &mut blocks);

        self.list_depth -= 1;
        BoxKind::Container(blocks)
    }

    fn table_rows(&mut self, table: &Element, style: &ComputedStyle) -> Vec<TableRow> {
        let mut rows = Vec::new();
        for child in table.elements() {
            match child.name.as_str() {
                "thead" | "tbody" | "tfoot" => {
                    let section = self.resolver.compute(&child.name, child.attr("style"), style);
                    for tr in child.elements().filter(|e| e.name == "tr") {
                        rows.push(self.table_row(tr, &section));
                    }
                }
                "tr" => rows.push(self.table_row(child, style)),
                _ => {}
            }
        }
        rows
    }

    fn table_row(&mut self, tr: &Element, parent: &ComputedStyle) -> TableRow {
        let row_style = self.resolver.compute("tr", tr.attr("style"), parent);
        let cells = tr
            .elements()
            .filter(|e| e.name == "td" || e.name == "th")
            .map(|cell| {
                let style = self.resolver.compute(&cell.name, cell.attr("style"), &row_style);
                let mut blocks = Vec::new();
                let mut inline = Vec::new();
                self.collect(cell, &style, &mut blocks, &mut inline);
                let mut runs = Vec::new();
                for b in &blocks {
                    flatten_runs(b, &mut runs);
                }
                if !runs.is_empty() && inline.iter().any(|r| !r.text.trim().is_empty()) {
                    runs.push(StyledRun::line_break(&style));
                }
                runs.extend(inline);
                TableCell {
                    colspan: cell.attr("colspan").map_or(1, span_attr),
                    style,
                    runs,
                }
            })
            .collect();
        TableRow { cells }
    }
}

/// `colspan` value: leading digits, clamped to `1..=MAX_COLSPAN`. Garbage counts as 1.
fn span_attr(value: &str) -> usize {
    let value = value.trim();
    let digits = &value[..value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len())];
    if digits.is_empty() {
        return 1;
    }
    digits.parse::<usize>().unwrap_or(MAX_COLSPAN).clamp(1, MAX_COLSPAN)
}

/// Close the pending inline content of a container into an anonymous line box.
fn flush_inline(parent: &ComputedStyle, inline: &mut Vec<StyledRun>, blocks: &mut Vec<BlockBox>) {
    let runs = std::mem::take(inline);
    if runs.iter().all(|r| !r.line_break && r.text.trim().is_empty()) {
        return;
    }
    blocks.push(BlockBox {
        style: parent.inherit(),
        kind: BoxKind::Lines { runs, marker: None },
    });
}

/// Table cells hold a single flow of lines; nested blocks are joined with line breaks.
fn flatten_runs(b: &BlockBox, out: &mut Vec<StyledRun>) {
    let start = out.len();
    match &b.kind {
        BoxKind::Container(children) => children.iter().for_each(|c| flatten_runs(c, out)),
        BoxKind::Lines { runs, marker } => {
            if let Some(m) = marker {
                let mut m = m.clone();
                m.text.push(' ');
                out.push(m);
            }
            out.extend(runs.iter().cloned());
        }
        BoxKind::Table(rows) => {
            for row in rows {
                for cell in &row.cells {
                    out.extend(cell.runs.iter().cloned());
                }
            }
        }
        BoxKind::Image { alt, .. } if !alt.is_empty() => out.push(StyledRun::text(alt, &b.style)),
        BoxKind::Rule | BoxKind::Image { .. } => {}
    }
    if out.len() > start && start > 0 {
        out.insert(start, StyledRun::line_break(&b.style));
    }
}

fn attach_marker(item: &mut BlockBox, marker: &str) {
    if set_first_marker(item, marker) {
        return;
    }
    let inner_style = item.style.inherit();
    let lines = BlockBox {
        style: inner_style.clone(),
        kind: BoxKind::Lines {
            runs: Vec::new(),
            marker: Some(StyledRun::text(marker, &item.style)),
        },
    };
    match &mut item.kind {
        BoxKind::Container(children) => children.insert(0, lines),
        kind => {
            let inner = std::mem::replace(kind, BoxKind::Container(Vec::new()));
            item.kind = BoxKind::Container(vec![
                lines,
                BlockBox {
                    style: inner_style,
                    kind: inner,
                },
            ]);
        }
    }
}

fn set_first_marker(b: &mut BlockBox, marker: &str) -> bool {
    match &mut b.kind {
        BoxKind::Lines { marker: Some(_), .. } => false,
        BoxKind::Lines { marker: slot, runs } => {
            let style = runs
                .iter()
                .find(|r| !r.line_break)
                .map(|r| r.style.clone())
                .unwrap_or_else(|| RunStyle::from_computed(&b.style));
            *slot = Some(StyledRun {
                text: marker.to_string(),
                style: RunStyle { bold: false, italic: false, ..style },
                line_break: false,
            });
            true
        }
        BoxKind::Container(children) => children.iter_mut().any(|c| set_first_marker(c, marker)),
        _ => false,
    }
}

/// `width`/`height` attributes are CSS pixels.
fn pixel_attr(v: &str) -> Option<f32> {
    v.trim()
        .trim_end_matches("px")
        .parse::<f32>()
        .ok()
        .filter(|n| *n > 0.0)
        .map(|n| n * 0.75)
}
