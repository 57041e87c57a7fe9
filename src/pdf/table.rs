use crate::css::Borders;
use crate::model::Rect;

use super::boxes::{MAX_COLSPAN, TableCell, TableRow};
use super::layout::{
    DrawOp, FontMap, LayoutContext, Slice, build_lines, horizontal_rule, render_lines,
    vertical_rule,
};

/// Grid width of the widest row, capped at `MAX_COLSPAN` columns.
fn column_count(rows: &[TableRow]) -> usize {
    rows.iter()
        .map(|r| r.cells.iter().fold(0usize, |n, c| n.saturating_add(c.colspan)))
        .max()
        .unwrap_or(0)
        .min(MAX_COLSPAN)
}

fn horizontal_chrome(cell: &TableCell) -> f32 {
    let s = &cell.style;
    s.padding.left + s.padding.right + Borders::width(s.borders.left) + Borders::width(s.borders.right)
}

/// Start from equal columns and grow the ones whose longest unbreakable word would not
/// fit; the others shrink proportionally. Total width is preserved.
fn auto_fit_columns(rows: &[TableRow], ncols: usize, width: f32, fonts: &FontMap) -> Vec<f32> {
    let mut widths = vec![width / ncols as f32; ncols];
    let mut min_widths = vec![0.0f32; ncols];

    for row in rows {
        let mut grid_col = 0usize;
        for cell in &row.cells {
            if grid_col >= ncols || cell.colspan > 1 {
                grid_col = grid_col.saturating_add(cell.colspan);
                continue;
            }
            let chrome = horizontal_chrome(cell);
            for run in &cell.runs {
                let Some(entry) = fonts.get(&run.style.font_key()) else {
                    continue;
                };
                for word in run.text.split_whitespace() {
                    let ww = entry.word_width(word, run.style.size) + chrome;
                    min_widths[grid_col] = min_widths[grid_col].max(ww);
                }
            }
            grid_col += 1;
        }
    }

    let mut extra_needed = 0.0f32;
    let mut shrinkable = 0.0f32;
    for (w, &min) in widths.iter_mut().zip(&min_widths) {
        if min > *w {
            extra_needed += min - *w;
            *w = min;
        } else {
            shrinkable += *w - min;
        }
    }

    if extra_needed > 0.0 && shrinkable > 0.0 {
        let factor = extra_needed.min(shrinkable) / shrinkable;
        for (w, &min) in widths.iter_mut().zip(&min_widths) {
            if *w > min {
                *w -= (*w - min) * factor;
            }
        }
        let new_total: f32 = widths.iter().sum();
        if (new_total - width).abs() > 0.01 {
            let scale = width / new_total;
            widths.iter_mut().for_each(|w| *w *= scale);
        }
    }
    widths
}

fn shift_down(op: DrawOp, dy: f32) -> DrawOp {
    match op {
        DrawOp::Text { baseline, spans } => DrawOp::Text {
            baseline: baseline + dy,
            spans,
        },
        DrawOp::Fill { rect, color } => DrawOp::Fill {
            rect: Rect::new(rect.x0, rect.y0 + dy, rect.x1, rect.y1 + dy),
            color,
        },
        DrawOp::Line {
            from,
            to,
            width,
            color,
        } => DrawOp::Line {
            from: (from.0, from.1 + dy),
            to: (to.0, to.1 + dy),
            width,
            color,
        },
        DrawOp::Image { name, rect } => DrawOp::Image {
            name,
            rect: Rect::new(rect.x0, rect.y0 + dy, rect.x1, rect.y1 + dy),
        },
    }
}

struct CellLayout {
    x: f32,
    width: f32,
    content_height: f32,
    text: Vec<Slice>,
}

/// One slice per row. Cell text is centred vertically in the row like browsers do.
pub(super) fn layout_table(ctx: &LayoutContext, rows: &[TableRow], x: f32, width: f32) -> Vec<Slice> {
    let ncols = column_count(rows);
    if ncols == 0 {
        return Vec::new();
    }
    let col_widths = auto_fit_columns(rows, ncols, width, ctx.fonts);

    rows.iter()
        .enumerate()
        .map(|(ri, row)| {
            let mut grid_col = 0usize;
            let cells: Vec<CellLayout> = row
                .cells
                .iter()
                .map(|cell| {
                    let start = grid_col.min(ncols);
                    let end = grid_col.saturating_add(cell.colspan).min(ncols);
                    grid_col = grid_col.saturating_add(cell.colspan);
                    let cell_x = x + col_widths[..start].iter().sum::<f32>();
                    let cell_w: f32 = col_widths[start..end].iter().sum();

                    let s = &cell.style;
                    let text_x = cell_x + Borders::width(s.borders.left) + s.padding.left;
                    let text_w = (cell_w - horizontal_chrome(cell)).max(1.0);
                    let lines = build_lines(&cell.runs, ctx.fonts, text_w);
                    let text = render_lines(&lines, s, ctx.fonts, text_x, text_w);
                    let lines_h: f32 = text.iter().map(|sl| sl.height).sum();
                    let content_height = lines_h
                        + s.padding.top
                        + s.padding.bottom
                        + Borders::width(s.borders.top)
                        + Borders::width(s.borders.bottom);
                    CellLayout {
                        x: cell_x,
                        width: cell_w,
                        content_height,
                        text,
                    }
                })
                .collect();

            let row_h = cells.iter().map(|c| c.content_height).fold(0.0f32, f32::max);
            log::debug!("table row={ri} row_h={row_h:.2} cells={}", cells.len());

            let mut ops = Vec::new();
            for (cell, layout) in row.cells.iter().zip(&cells) {
                if let Some(color) = cell.style.background {
                    ops.push(DrawOp::Fill {
                        rect: Rect::new(layout.x, 0.0, layout.x + layout.width, row_h),
                        color,
                    });
                }
            }
            for (cell, layout) in row.cells.iter().zip(cells) {
                let s = &cell.style;
                let mut y = Borders::width(s.borders.top)
                    + s.padding.top
                    + ((row_h - layout.content_height) / 2.0).max(0.0);
                for line in layout.text {
                    ops.extend(line.ops.into_iter().map(|op| shift_down(op, y)));
                    y += line.height;
                }
                let (x0, x1) = (layout.x, layout.x + layout.width);
                if let Some(b) = s.borders.top {
                    ops.push(horizontal_rule(x0, x1, 0.0, b));
                }
                if let Some(b) = s.borders.bottom {
                    ops.push(horizontal_rule(x0, x1, row_h, b));
                }
                if let Some(b) = s.borders.left {
                    ops.push(vertical_rule(x0, row_h, b));
                }
                if let Some(b) = s.borders.right {
                    ops.push(vertical_rule(x1, row_h, b));
                }
            }
            Slice { height: row_h, ops }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::css::{DEFAULT_STYLESHEET, StyleResolver, Stylesheet};
    use crate::html::parse_fragment;
    use crate::pdf::boxes::{BoxKind, build};
    use crate::pdf::layout::tests::base14_fonts;

    fn table_rows(html: &str) -> Vec<TableRow> {
        let resolver = StyleResolver::new(Stylesheet::parse(DEFAULT_STYLESHEET).unwrap());
        let root = build(&parse_fragment(html), &resolver);
        match root.kind {
            BoxKind::Container(mut kids) => match kids.remove(0).kind {
                BoxKind::Table(rows) => rows,
                _ => panic!("expected table"),
            },
            _ => panic!("expected container"),
        }
    }

    #[test]
    fn one_slice_per_row_with_all_cell_text() {
        let rows = table_rows("<table><tr><th>a</th><th>b</th></tr><tr><td>1</td><td>2</td></tr></table>");
        let runs: Vec<_> = rows.iter().flat_map(|r| &r.cells).flat_map(|c| &c.runs).collect();
        let fonts = base14_fonts(&runs);
        let images = HashMap::new();
        let ctx = LayoutContext {
            fonts: &fonts,
            images: &images,
        };
        let slices = layout_table(&ctx, &rows, 50.0, 495.0);
        assert_eq!(slices.len(), 2);
        let texts: Vec<Vec<u8>> = slices
            .iter()
            .flat_map(|s| &s.ops)
            .filter_map(|op| match op {
                DrawOp::Text { spans, .. } => Some(spans.iter().flat_map(|s| s.bytes.clone()).collect()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, [b"a".to_vec(), b"b".to_vec(), b"1".to_vec(), b"2".to_vec()]);
        // Header cells are shaded.
        assert!(slices[0].ops.iter().any(|op| matches!(op, DrawOp::Fill { .. })));
        assert!(!slices[1].ops.iter().any(|op| matches!(op, DrawOp::Fill { .. })));
    }

    #[test]
    fn long_words_widen_their_column() {
        let rows = table_rows("<table><tr><td>x</td><td>Supercalifragilistic</td><td>y</td><td>z</td><td>w</td><td>v</td><td>u</td><td>t</td></tr></table>");
        let runs: Vec<_> = rows.iter().flat_map(|r| &r.cells).flat_map(|c| &c.runs).collect();
        let fonts = base14_fonts(&runs);
        let widths = auto_fit_columns(&rows, 8, 200.0, &fonts);
        assert!(widths[1] > widths[0]);
        assert!((widths.iter().sum::<f32>() - 200.0).abs() < 0.1);
    }

    #[test]
    fn huge_colspan_is_clamped() {
        let rows = table_rows(&format!(
            "<table><tr><td colspan=\"{}\">wide</td><td colspan=\"{}\">x</td></tr><tr><td>1</td></tr></table>",
            usize::MAX,
            "99999999999999999999999999"
        ));
        assert_eq!(rows[0].cells[0].colspan, MAX_COLSPAN);
        assert_eq!(rows[0].cells[1].colspan, MAX_COLSPAN);
        assert_eq!(column_count(&rows), MAX_COLSPAN);

        let runs: Vec<_> = rows.iter().flat_map(|r| &r.cells).flat_map(|c| &c.runs).collect();
        let fonts = base14_fonts(&runs);
        let images = HashMap::new();
        let ctx = LayoutContext {
            fonts: &fonts,
            images: &images,
        };
        let slices = layout_table(&ctx, &rows, 50.0, 495.0);
        assert_eq!(slices.len(), 2);
    }
}
