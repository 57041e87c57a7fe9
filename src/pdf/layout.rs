use std::collections::HashMap;

use crate::css::{Borders, ComputedStyle};
use crate::fonts::FontEntry;
use crate::model::{Alignment, Rect};

use super::boxes::{BlockBox, BoxKind, StyledRun};
use super::table::layout_table;

pub(super) type FontMap = HashMap<String, FontEntry>;

/// An image XObject written to the document, with its natural size in layout units.
pub(super) struct PlacedImage {
    pub(super) name: String,
    pub(super) width: f32,
    pub(super) height: f32,
}

pub(super) struct LayoutContext<'a> {
    pub(super) fonts: &'a FontMap,
    pub(super) images: &'a HashMap<String, PlacedImage>,
}

/// A drawing instruction. `x` is absolute on the page, `y` runs downwards from the top of
/// the slice that owns the op.
#[derive(Clone, Debug, PartialEq)]
pub(super) enum DrawOp {
    /// One line of text, painted as a single text object.
    Text {
        baseline: f32,
        spans: Vec<TextSpan>,
    },
    Fill {
        rect: Rect,
        color: [u8; 3],
    },
    Line {
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
        color: [u8; 3],
    },
    Image {
        name: String,
        rect: Rect,
    },
}

/// Encoded glyphs drawn at `x` in one font, size and colour.
#[derive(Clone, Debug, PartialEq)]
pub(super) struct TextSpan {
    pub(super) x: f32,
    pub(super) font: String,
    pub(super) size: f32,
    pub(super) color: Option<[u8; 3]>,
    pub(super) bytes: Vec<u8>,
}

/// A horizontal band of laid-out content. Pages are filled with whole slices.
#[derive(Clone, Debug, Default)]
pub(super) struct Slice {
    pub(super) height: f32,
    pub(super) ops: Vec<DrawOp>,
}

impl Slice {
    pub(super) fn gap(height: f32) -> Self {
        Self {
            height,
            ops: Vec::new(),
        }
    }

    /// Nothing is painted in this slice (vertical margins, empty spacers).
    pub(super) fn is_blank(&self) -> bool {
        self.ops.is_empty()
    }
}

pub(super) struct WordChunk {
    pub(super) pdf_font: String,
    pub(super) font_key: String,
    pub(super) text: String,
    pub(super) font_size: f32,
    pub(super) color: Option<[u8; 3]>,
    pub(super) x_offset: f32, // x relative to line start
    pub(super) width: f32,
}

pub(super) struct TextLine {
    pub(super) chunks: Vec<WordChunk>,
    pub(super) total_width: f32,
}

struct LineBuilder {
    max_width: f32,
    lines: Vec<TextLine>,
    chunks: Vec<WordChunk>,
    x: f32,
    prev_ended_with_ws: bool,
    prev_space_w: f32,
}

impl LineBuilder {
    fn finish_line(&mut self) {
        let total_width = self.chunks.last().map_or(0.0, |c| c.x_offset + c.width);
        self.lines.push(TextLine {
            chunks: std::mem::take(&mut self.chunks),
            total_width,
        });
        self.x = 0.0;
    }

    /// Place a word at `proposed_x`, wrapping first when it would pass the right edge.
    fn place(&mut self, entry: &FontEntry, run: &StyledRun, word: &str, proposed_x: f32) {
        let width = entry.word_width(word, run.style.size);
        if !self.chunks.is_empty() && proposed_x + width > self.max_width {
            self.finish_line();
        } else {
            self.x = proposed_x;
        }
        self.chunks.push(WordChunk {
            pdf_font: entry.pdf_name.clone(),
            font_key: run.style.font_key(),
            text: word.to_string(),
            font_size: run.style.size,
            color: run.style.color,
            x_offset: self.x,
            width,
        });
        self.x += width;
    }

    /// Collapsing whitespace: words separated by single spaces, no space inserted between
    /// runs unless one side carries whitespace ("bold" + ", " stays "bold,").
    fn push_collapsed(&mut self, entry: &FontEntry, run: &StyledRun) {
        let space_w = entry.space_width(run.style.size);
        let starts_with_ws = run.text.starts_with(char::is_whitespace);
        for (i, word) in run.text.split_whitespace().enumerate() {
            let need_space =
                !self.chunks.is_empty() && (i > 0 || starts_with_ws || self.prev_ended_with_ws);
            // The space belongs to the run that holds the whitespace character.
            let effective_space_w = if i > 0 || starts_with_ws {
                space_w
            } else {
                self.prev_space_w
            };
            let proposed_x = if need_space {
                self.x + effective_space_w
            } else {
                self.x
            };
            self.place(entry, run, word, proposed_x);
        }
        if !run.text.trim().is_empty() || !self.chunks.is_empty() {
            self.prev_ended_with_ws = run.text.ends_with(char::is_whitespace);
        }
        self.prev_space_w = space_w;
    }

    /// Preserved whitespace: newlines break lines, every space is kept.
    fn push_preserved(&mut self, entry: &FontEntry, run: &StyledRun) {
        let space_w = entry.space_width(run.style.size);
        let text = run.text.replace('\t', "    ").replace("\r\n", "\n");
        for (li, segment) in text.split('\n').enumerate() {
            if li > 0 {
                self.finish_line();
            }
            let mut pending = 0.0f32;
            for (wi, word) in segment.split(' ').enumerate() {
                if wi > 0 {
                    pending += space_w;
                }
                if word.is_empty() {
                    continue;
                }
                let proposed_x = self.x + pending;
                pending = 0.0;
                self.place(entry, run, word, proposed_x);
            }
            self.x += pending;
        }
        self.prev_ended_with_ws = text.ends_with(' ');
        self.prev_space_w = space_w;
    }
}

/// Break runs into lines no wider than `max_width`.
pub(super) fn build_lines(runs: &[StyledRun], fonts: &FontMap, max_width: f32) -> Vec<TextLine> {
    let mut b = LineBuilder {
        max_width,
        lines: Vec::new(),
        chunks: Vec::new(),
        x: 0.0,
        prev_ended_with_ws: false,
        prev_space_w: 0.0,
    };

    for run in runs {
        if run.line_break {
            b.finish_line();
            b.prev_ended_with_ws = false;
            continue;
        }
        let entry = fonts
            .get(&run.style.font_key())
            .expect("fonts are registered for every run before layout");
        if run.style.preserve {
            b.push_preserved(entry, run);
        } else {
            b.push_collapsed(entry, run);
        }
    }

    if !b.chunks.is_empty() {
        b.finish_line();
    }
    b.lines
}

/// Line pitch and baseline offset of one line.
fn line_metrics(line: &TextLine, style: &ComputedStyle, fonts: &FontMap) -> (f32, f32) {
    let mut pitch = 0.0f32;
    let mut size = 0.0f32;
    let mut ascent = 0.0f32;
    for chunk in &line.chunks {
        let entry = fonts.get(&chunk.font_key);
        let ratio = style
            .line_height
            .or_else(|| entry.and_then(|e| e.line_h_ratio))
            .unwrap_or(1.2);
        pitch = pitch.max(chunk.font_size * ratio);
        size = size.max(chunk.font_size);
        let ar = entry.and_then(|e| e.ascender_ratio).unwrap_or(0.75);
        ascent = ascent.max(chunk.font_size * ar);
    }
    if line.chunks.is_empty() {
        size = style.font_size;
        pitch = size * style.line_height.unwrap_or(1.2);
        ascent = size * 0.75;
    }
    let baseline = (pitch - size) / 2.0 + ascent;
    (pitch, baseline)
}

/// Text ops for pre-built lines, one slice per line.
pub(super) fn render_lines(
    lines: &[TextLine],
    style: &ComputedStyle,
    fonts: &FontMap,
    x: f32,
    width: f32,
) -> Vec<Slice> {
    let last = lines.len().saturating_sub(1);
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let (pitch, baseline) = line_metrics(line, style, fonts);
            let justified =
                style.text_align == Alignment::Justify && i != last && line.chunks.len() > 1;
            let start_x = match style.text_align {
                Alignment::Center => x + (width - line.total_width) / 2.0,
                Alignment::Right => x + width - line.total_width,
                Alignment::Left | Alignment::Justify => x,
            };
            let extra_per_gap = if justified {
                (width - line.total_width) / (line.chunks.len() - 1) as f32
            } else {
                0.0
            };
            let mut spans = Vec::with_capacity(line.chunks.len());
            let mut prev_end: Option<f32> = None;
            for (ci, chunk) in line.chunks.iter().enumerate() {
                let Some(entry) = fonts.get(&chunk.font_key) else {
                    continue;
                };
                let mut x = start_x + chunk.x_offset + ci as f32 * extra_per_gap;
                let mut bytes = Vec::new();
                // Word gaps carry a real space so extracted text keeps its words apart.
                if prev_end.is_some_and(|end| chunk.x_offset > end + 0.01) {
                    bytes.extend(entry.encode(" "));
                    x -= entry.space_width(chunk.font_size);
                }
                bytes.extend(entry.encode(&chunk.text));
                prev_end = Some(chunk.x_offset + chunk.width);
                spans.push(TextSpan {
                    x,
                    font: chunk.pdf_font.clone(),
                    size: chunk.font_size,
                    color: chunk.color,
                    bytes,
                });
            }
            let ops = if spans.is_empty() {
                Vec::new()
            } else {
                vec![DrawOp::Text { baseline, spans }]
            };
            Slice { height: pitch, ops }
        })
        .collect()
}

fn layout_lines(
    ctx: &LayoutContext,
    runs: &[StyledRun],
    marker: Option<&StyledRun>,
    style: &ComputedStyle,
    x: f32,
    width: f32,
) -> Vec<Slice> {
    let mut lines = build_lines(runs, ctx.fonts, width);
    if lines.is_empty() && marker.is_some() {
        lines.push(TextLine {
            chunks: Vec::new(),
            total_width: 0.0,
        });
    }
    let mut slices = render_lines(&lines, style, ctx.fonts, x, width);

    if let (Some(marker), Some(first)) = (marker, slices.first_mut())
        && let Some(entry) = ctx.fonts.get(&marker.style.font_key())
    {
        let size = marker.style.size;
        let marker_w = entry.word_width(&marker.text, size);
        let span = TextSpan {
            x: x - marker_w - size * 0.4,
            font: entry.pdf_name.clone(),
            size,
            color: marker.style.color,
            bytes: entry.encode(&marker.text),
        };
        match first.ops.first_mut() {
            Some(DrawOp::Text { spans, .. }) => spans.insert(0, span),
            _ => {
                let baseline = line_metrics(&lines[0], style, ctx.fonts).1;
                first.ops.push(DrawOp::Text {
                    baseline,
                    spans: vec![span],
                });
            }
        }
    }
    slices
}

fn layout_image(ctx: &LayoutContext, src: &str, attr_w: Option<f32>, attr_h: Option<f32>, x: f32, width: f32) -> Vec<Slice> {
    let Some(img) = ctx.images.get(src) else {
        return Vec::new();
    };
    let aspect = if img.width > 0.0 { img.height / img.width } else { 1.0 };
    let (mut w, mut h) = match (attr_w, attr_h) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w * aspect),
        (None, Some(h)) => (if aspect > 0.0 { h / aspect } else { h }, h),
        (None, None) => (img.width, img.height),
    };
    if w > width {
        h *= width / w;
        w = width;
    }
    vec![Slice {
        height: h,
        ops: vec![DrawOp::Image {
            name: img.name.clone(),
            rect: Rect::new(x, 0.0, x + w, h),
        }],
    }]
}

/// Lay out sibling blocks top to bottom, collapsing adjacent vertical margins.
pub(super) fn layout_children(ctx: &LayoutContext, children: &[BlockBox], x: f32, width: f32) -> Vec<Slice> {
    let mut out = Vec::new();
    let mut pending_margin = 0.0f32;
    for child in children {
        let margin = child.style.margin;
        let slices = layout_block(ctx, child, x, width);
        if slices.is_empty() {
            pending_margin = pending_margin.max(margin.top).max(margin.bottom);
            continue;
        }
        let gap = pending_margin.max(margin.top);
        if gap > 0.0 {
            out.push(Slice::gap(gap));
        }
        out.extend(slices);
        pending_margin = margin.bottom;
    }
    if pending_margin > 0.0 {
        out.push(Slice::gap(pending_margin));
    }
    out
}

/// Lay out one block inside a containing block of the given `x` and `width`. Vertical
/// margins are left to the caller.
pub(super) fn layout_block(ctx: &LayoutContext, b: &BlockBox, x: f32, width: f32) -> Vec<Slice> {
    let s = &b.style;
    let border_x = x + s.margin.left;
    let border_w = (width - s.margin.left - s.margin.right).max(1.0);
    let bl = Borders::width(s.borders.left);
    let br = Borders::width(s.borders.right);
    let bt = Borders::width(s.borders.top);
    let bb = Borders::width(s.borders.bottom);
    let content_x = border_x + bl + s.padding.left;
    let content_w = (border_w - bl - br - s.padding.left - s.padding.right).max(1.0);

    let mut slices = match &b.kind {
        BoxKind::Container(children) => layout_children(ctx, children, content_x, content_w),
        BoxKind::Lines { runs, marker } => {
            layout_lines(ctx, runs, marker.as_ref(), s, content_x, content_w)
        }
        BoxKind::Table(rows) => layout_table(ctx, rows, content_x, content_w),
        BoxKind::Rule => Vec::new(),
        BoxKind::Image {
            src, width, height, ..
        } => layout_image(ctx, src, *width, *height, content_x, content_w),
    };

    let content_h: f32 = slices.iter().map(|sl| sl.height).sum();
    if let Some(h) = s.height
        && h > content_h
    {
        slices.push(Slice::gap(h - content_h));
    }
    if s.padding.top + bt > 0.0 {
        slices.insert(0, Slice::gap(s.padding.top + bt));
    }
    if s.padding.bottom + bb > 0.0 {
        slices.push(Slice::gap(s.padding.bottom + bb));
    }
    decorate(&mut slices, s, border_x, border_w);
    slices
}

/// Paint background and borders behind the slices of one box.
fn decorate(slices: &mut [Slice], s: &ComputedStyle, x: f32, width: f32) {
    let b = &s.borders;
    if s.background.is_none() && b.top.is_none() && b.right.is_none() && b.bottom.is_none() && b.left.is_none() {
        return;
    }
    let last = slices.len().saturating_sub(1);
    for (i, slice) in slices.iter_mut().enumerate() {
        let h = slice.height;
        let mut deco = Vec::new();
        if let Some(color) = s.background {
            deco.push(DrawOp::Fill {
                rect: Rect::new(x, 0.0, x + width, h),
                color,
            });
        }
        if let Some(l) = b.left {
            deco.push(vertical_rule(x + l.width / 2.0, h, l));
        }
        if let Some(r) = b.right {
            deco.push(vertical_rule(x + width - r.width / 2.0, h, r));
        }
        if i == 0
            && let Some(t) = b.top
        {
            deco.push(horizontal_rule(x, x + width, t.width / 2.0, t));
        }
        if i == last
            && let Some(bt) = b.bottom
        {
            deco.push(horizontal_rule(x, x + width, h - bt.width / 2.0, bt));
        }
        slice.ops.splice(0..0, deco);
    }
}

pub(super) fn vertical_rule(x: f32, height: f32, border: crate::css::Border) -> DrawOp {
    DrawOp::Line {
        from: (x, 0.0),
        to: (x, height),
        width: border.width,
        color: border.color,
    }
}

pub(super) fn horizontal_rule(x0: f32, x1: f32, y: f32, border: crate::css::Border) -> DrawOp {
    DrawOp::Line {
        from: (x0, y),
        to: (x1, y),
        width: border.width,
        color: border.color,
    }
}

#[cfg(test)]
pub(super) mod tests {
    use std::collections::HashSet;

    use pdf_writer::{Pdf, Ref};

    use super::*;
    use crate::fonts::register_font;

    /// Base-14 fonts for the given runs, registered the way the renderer does it.
    pub(in crate::pdf) fn base14_fonts(runs: &[&StyledRun]) -> FontMap {
        let mut pdf = Pdf::new();
        let mut next = 1;
        let mut alloc = || {
            let r = Ref::new(next);
            next += 1;
            r
        };
        let mut fonts = FontMap::new();
        for run in runs {
            let key = run.style.font_key();
            if fonts.contains_key(&key) {
                continue;
            }
            let chars: HashSet<char> = run.text.chars().collect();
            let name = format!("F{}", fonts.len() + 1);
            let entry = register_font(
                &mut pdf,
                &run.style.family,
                run.style.bold,
                run.style.italic,
                name,
                &mut alloc,
                &chars,
                false,
            );
            fonts.insert(key, entry);
        }
        fonts
    }

    fn run(text: &str) -> StyledRun {
        StyledRun {
            text: text.to_string(),
            style: super::super::boxes::RunStyle {
                family: "Helvetica".into(),
                bold: false,
                italic: false,
                size: 10.0,
                color: None,
                preserve: false,
            },
            line_break: false,
        }
    }

    #[test]
    fn words_wrap_at_the_width() {
        let r = run("aaaa aaaa aaaa");
        let fonts = base14_fonts(&[&r]);
        // "aaaa" is 4 * 5.56 = 22.24 wide at 10pt, a space 2.78.
        let lines = build_lines(std::slice::from_ref(&r), &fonts, 50.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].chunks.len(), 2);
        assert!((lines[0].chunks[1].x_offset - 25.02).abs() < 0.01);
    }

    #[test]
    fn no_space_between_touching_runs() {
        let a = run("bold");
        let b = run(", then");
        let fonts = base14_fonts(&[&a, &b]);
        let lines = build_lines(&[a, b], &fonts, 500.0);
        let chunks = &lines[0].chunks;
        assert_eq!(chunks[1].text, ",");
        assert_eq!(chunks[1].x_offset, chunks[0].width);
    }

    #[test]
    fn breaks_and_preserved_text() {
        let mut pre = run("a  b\nc");
        pre.style.preserve = true;
        let fonts = base14_fonts(&[&pre]);
        let lines = build_lines(std::slice::from_ref(&pre), &fonts, 500.0);
        assert_eq!(lines.len(), 2);
        assert!((lines[0].chunks[1].x_offset - (5.56 + 2.0 * 2.78)).abs() < 0.01);

        let mut br = run("");
        br.line_break = true;
        let lines = build_lines(&[run("x"), br.clone(), br, run("y")], &fonts, 500.0);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].chunks.is_empty());
    }

    #[test]
    fn each_line_is_one_text_op_with_spaced_words() {
        let r = run("Invoice 42 due");
        let fonts = base14_fonts(&[&r]);
        let lines = build_lines(std::slice::from_ref(&r), &fonts, 500.0);
        let slices = render_lines(&lines, &ComputedStyle::default(), &fonts, 50.0, 500.0);
        assert_eq!(slices.len(), 1);
        let [DrawOp::Text { spans, .. }] = slices[0].ops.as_slice() else {
            panic!("expected a single text op, got {:?}", slices[0].ops);
        };
        let text: Vec<u8> = spans.iter().flat_map(|s| s.bytes.clone()).collect();
        assert_eq!(text, b"Invoice 42 due");
        // The leading space of a word is drawn one space width before the word.
        assert!((spans[1].x - (50.0 + lines[0].chunks[1].x_offset - 2.78)).abs() < 0.01);
    }
}
