mod boxes;
pub mod extract;
mod layout;
mod table;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use pdf_writer::{Content, Filter, Name, Pdf, Ref, Str};

use crate::config::RenderOptions;
use crate::css::{StyleResolver, Stylesheet};
use crate::error::{Error, Result};
use crate::fonts::{FontEntry, register_font};
use crate::html;
use crate::model::{LayoutStatus, PageFlow, Rect};

use layout::{DrawOp, LayoutContext, PlacedImage, Slice, layout_block};

/// Slack for float rounding when testing whether a slice fits.
const FIT_EPSILON: f32 = 0.01;

/// A laid-out and written PDF.
#[derive(Clone, Debug)]
pub struct LayoutOutcome {
    pub pdf: Vec<u8>,
    pub page_count: usize,
    pub status: LayoutStatus,
}

/// Lay out an HTML fragment styled with `css` (plus any `<style>` blocks it carries) onto
/// pages and write the PDF.
pub fn render_html(html_src: &str, css: &str, options: &RenderOptions) -> Result<LayoutOutcome> {
    let t0 = std::time::Instant::now();
    let root = html::parse_fragment(html_src);
    let mut sheet = Stylesheet::parse(css)?;
    for embedded in root.style_sheets() {
        sheet.extend(Stylesheet::parse(&embedded)?);
    }
    let resolver = StyleResolver::new(sheet);
    let tree = boxes::build(&root, &resolver);
    let t_boxes = t0.elapsed();

    let mut pdf = Pdf::new();
    let mut next_id = 1i32;
    let mut alloc = || {
        let r = Ref::new(next_id);
        next_id += 1;
        r
    };
    let catalog_id = alloc();
    let pages_id = alloc();

    // Phase 1: fonts, one entry per family/weight/slant with the characters it draws
    let mut font_order: Vec<String> = Vec::new();
    let mut font_specs: HashMap<String, (String, bool, bool)> = HashMap::new();
    let mut used_chars: HashMap<String, HashSet<char>> = HashMap::new();
    tree.for_each_run(&mut |run| {
        let key = run.style.font_key();
        if !font_specs.contains_key(&key) {
            font_order.push(key.clone());
            font_specs.insert(
                key.clone(),
                (run.style.family.clone(), run.style.bold, run.style.italic),
            );
        }
        let chars = used_chars.entry(key).or_default();
        chars.extend(run.text.chars());
        chars.insert(' ');
    });

    let mut seen_fonts: HashMap<String, FontEntry> = HashMap::new();
    for (i, key) in font_order.iter().enumerate() {
        let (family, bold, italic) = &font_specs[key];
        let entry = register_font(
            &mut pdf,
            family,
            *bold,
            *italic,
            format!("F{}", i + 1),
            &mut alloc,
            &used_chars[key],
            options.system_fonts,
        );
        seen_fonts.insert(key.clone(), entry);
    }
    let t_fonts = t0.elapsed();

    // Phase 2: images referenced by <img>
    let mut sources = Vec::new();
    tree.image_sources(&mut sources);
    let mut images: HashMap<String, PlacedImage> = HashMap::new();
    let mut image_xobjects: Vec<(String, Ref)> = Vec::new();
    for src in sources {
        if images.contains_key(src) {
            continue;
        }
        let Some(path) = resolve_image_path(src, options.base_dir.as_deref()) else {
            log::warn!("Skipping image '{src}': only local files are embedded");
            continue;
        };
        let name = format!("Im{}", image_xobjects.len() + 1);
        let xobj_ref = alloc();
        let embedded = std::fs::read(&path)
            .map_err(Error::from)
            .and_then(|data| embed_image(&mut pdf, &mut alloc, xobj_ref, &data));
        match embedded {
            Ok((width, height)) => {
                image_xobjects.push((name.clone(), xobj_ref));
                images.insert(src.to_string(), PlacedImage { name, width, height });
            }
            Err(e) => log::warn!("Skipping image {}: {e}", path.display()),
        }
    }
    let t_images = t0.elapsed();

    // Phase 3: layout and pagination
    let content_rect = options.page.content_rect();
    let ctx = LayoutContext {
        fonts: &seen_fonts,
        images: &images,
    };
    let slices = layout_block(&ctx, &tree, content_rect.x0, content_rect.width());
    let (pages, status) = paginate(&slices, content_rect, options.flow);
    let t_layout = t0.elapsed();

    if let LayoutStatus::Overflow(rect) = status {
        log::warn!(
            "Content overflows the page by {:.1}pt ({} of {} slices placed)",
            rect.height(),
            pages.iter().map(Vec::len).sum::<usize>(),
            slices.len(),
        );
        if options.fail_on_overflow {
            return Err(Error::Overflow(rect.height()));
        }
    }

    // Phase 4: content streams and document assembly
    let page_height = options.page.height;
    let n = pages.len();
    let page_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();
    let content_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();

    for (i, placed) in pages.iter().enumerate() {
        let mut content = Content::new();
        for &(top, slice) in placed {
            let slice_top = content_rect.y0 + top;
            for op in &slice.ops {
                draw(&mut content, op, |y| page_height - (slice_top + y));
            }
        }
        let raw = content.finish();
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
        pdf.stream(content_ids[i], &compressed).filter(Filter::FlateDecode);
    }

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().copied())
        .count(n as i32);

    let font_pairs: Vec<(String, Ref)> = font_order
        .iter()
        .map(|key| (seen_fonts[key].pdf_name.clone(), seen_fonts[key].font_ref))
        .collect();

    for i in 0..n {
        let mut page = pdf.page(page_ids[i]);
        page.media_box(pdf_writer::Rect::new(
            0.0,
            0.0,
            options.page.width,
            options.page.height,
        ))
        .parent(pages_id)
        .contents(content_ids[i]);
        let mut resources = page.resources();
        if !font_pairs.is_empty() {
            let mut fonts = resources.fonts();
            for (name, font_ref) in &font_pairs {
                fonts.pair(Name(name.as_bytes()), *font_ref);
            }
        }
        if !image_xobjects.is_empty() {
            let mut xobjects = resources.x_objects();
            for (name, xobj_ref) in &image_xobjects {
                xobjects.pair(Name(name.as_bytes()), *xobj_ref);
            }
        }
    }

    let t_assembly = t0.elapsed();
    log::info!(
        "Render phases: boxes={:.1}ms, fonts={:.1}ms, images={:.1}ms, layout={:.1}ms, assembly={:.1}ms, pages={}",
        t_boxes.as_secs_f64() * 1000.0,
        (t_fonts - t_boxes).as_secs_f64() * 1000.0,
        (t_images - t_fonts).as_secs_f64() * 1000.0,
        (t_layout - t_images).as_secs_f64() * 1000.0,
        (t_assembly - t_layout).as_secs_f64() * 1000.0,
        n,
    );

    Ok(LayoutOutcome {
        pdf: pdf.finish(),
        page_count: n,
        status,
    })
}

type PlacedPage<'a> = Vec<(f32, &'a Slice)>;

/// Distribute slices over pages. Each placed slice carries its offset from the top of the
/// content rectangle.
fn paginate(slices: &[Slice], content: Rect, flow: PageFlow) -> (Vec<PlacedPage<'_>>, LayoutStatus) {
    let avail = content.height();
    let overflow = |h: f32| LayoutStatus::Overflow(Rect::new(content.x0, content.y1, content.x1, content.y1 + h));

    match flow {
        PageFlow::Single => {
            let mut page = Vec::new();
            let mut y = 0.0f32;
            let mut placed = 0;
            for slice in slices {
                if y + slice.height > avail + FIT_EPSILON {
                    break;
                }
                page.push((y, slice));
                y += slice.height;
                placed += 1;
            }
            let rest = &slices[placed..];
            let status = match rest.iter().rposition(|s| !s.is_blank()) {
                None => LayoutStatus::Fit,
                Some(last) => overflow(rest[..=last].iter().map(|s| s.height).sum()),
            };
            (vec![page], status)
        }
        PageFlow::Continuous => {
            let mut pages: Vec<PlacedPage> = vec![Vec::new()];
            let mut y = 0.0f32;
            let mut status = LayoutStatus::Fit;
            for slice in slices {
                let page_has_content = pages.last().is_some_and(|p| p.iter().any(|(_, s)| !s.is_blank()));
                if y + slice.height > avail + FIT_EPSILON && page_has_content {
                    pages.push(Vec::new());
                    y = 0.0;
                }
                if y == 0.0 && pages.len() > 1 && slice.is_blank() {
                    continue;
                }
                if slice.height > avail + FIT_EPSILON && status == LayoutStatus::Fit {
                    log::debug!("Slice of {:.1}pt is taller than a page", slice.height);
                    status = overflow(slice.height - avail);
                }
                pages.last_mut().expect("at least one page").push((y, slice));
                y += slice.height;
            }
            (pages, status)
        }
    }
}

fn rgb(c: [u8; 3]) -> (f32, f32, f32) {
    (c[0] as f32 / 255.0, c[1] as f32 / 255.0, c[2] as f32 / 255.0)
}

/// Emit one op. `to_pdf_y` maps a slice-relative y (downwards) to PDF user space.
fn draw(content: &mut Content, op: &DrawOp, to_pdf_y: impl Fn(f32) -> f32) {
    match op {
        DrawOp::Text { baseline, spans } => {
            let y = to_pdf_y(*baseline);
            let mut cur_font: Option<(&str, f32)> = None;
            let mut cur_color = None;
            let (mut td_x, mut td_y) = (0.0f32, 0.0f32);
            content.begin_text();
            for span in spans {
                if cur_color != Some(span.color) {
                    match span.color {
                        Some(c) => {
                            let (r, g, b) = rgb(c);
                            content.set_fill_rgb(r, g, b);
                        }
                        None => {
                            content.set_fill_gray(0.0);
                        }
                    }
                    cur_color = Some(span.color);
                }
                if cur_font != Some((span.font.as_str(), span.size)) {
                    content.set_font(Name(span.font.as_bytes()), span.size);
                    cur_font = Some((span.font.as_str(), span.size));
                }
                content.next_line(span.x - td_x, y - td_y);
                td_x = span.x;
                td_y = y;
                content.show(Str(&span.bytes));
            }
            content.end_text();
        }
        DrawOp::Fill { rect, color } => {
            let (r, g, b) = rgb(*color);
            content.save_state();
            content.set_fill_rgb(r, g, b);
            content.rect(rect.x0, to_pdf_y(rect.y1), rect.width(), rect.height());
            content.fill_nonzero();
            content.restore_state();
        }
        DrawOp::Line {
            from,
            to,
            width,
            color,
        } => {
            let (r, g, b) = rgb(*color);
            content.save_state();
            content.set_line_width(*width);
            content.set_stroke_rgb(r, g, b);
            content.move_to(from.0, to_pdf_y(from.1));
            content.line_to(to.0, to_pdf_y(to.1));
            content.stroke();
            content.restore_state();
        }
        DrawOp::Image { name, rect } => {
            content.save_state();
            content.transform([
                rect.width(),
                0.0,
                0.0,
                rect.height(),
                rect.x0,
                to_pdf_y(rect.y1),
            ]);
            content.x_object(Name(name.as_bytes()));
            content.restore_state();
        }
    }
}

fn resolve_image_path(src: &str, base_dir: Option<&Path>) -> Option<PathBuf> {
    let src = src.trim();
    let local = src.strip_prefix("file://").unwrap_or(src);
    if local.is_empty() || local.contains("://") || local.starts_with("data:") {
        return None;
    }
    let path = PathBuf::from(local);
    Some(match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    })
}

/// Write an image XObject and return its natural size in layout units (96 pixels per inch).
/// RGB and grey JPEGs are passed through; everything else is re-encoded as deflated RGB
/// with a soft mask for transparency.
fn embed_image(
    pdf: &mut Pdf,
    alloc: &mut impl FnMut() -> Ref,
    xobj_ref: Ref,
    data: &[u8],
) -> Result<(f32, f32)> {
    let format = image::guess_format(data)?;
    let decoded = image::load_from_memory_with_format(data, format)?;
    let (w, h) = (decoded.width(), decoded.height());

    let jpeg_color = match decoded.color() {
        image::ColorType::Rgb8 => Some(true),
        image::ColorType::L8 => Some(false),
        _ => None,
    };
    if format == image::ImageFormat::Jpeg
        && let Some(is_rgb) = jpeg_color
    {
        let mut xobj = pdf.image_xobject(xobj_ref, data);
        xobj.filter(Filter::DctDecode);
        xobj.width(w as i32);
        xobj.height(h as i32);
        if is_rgb {
            xobj.color_space().device_rgb();
        } else {
            xobj.color_space().device_gray();
        }
        xobj.bits_per_component(8);
    } else {
        let rgba = decoded.to_rgba8();
        let has_alpha = rgba.pixels().any(|p| p.0[3] < 255);
        let rgb_data: Vec<u8> = rgba
            .pixels()
            .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
            .collect();
        let compressed_rgb = miniz_oxide::deflate::compress_to_vec_zlib(&rgb_data, 6);

        let smask_ref = has_alpha.then(|| {
            let alpha: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
            let compressed_alpha = miniz_oxide::deflate::compress_to_vec_zlib(&alpha, 6);
            let mask_ref = alloc();
            let mut mask = pdf.image_xobject(mask_ref, &compressed_alpha);
            mask.filter(Filter::FlateDecode);
            mask.width(w as i32);
            mask.height(h as i32);
            mask.color_space().device_gray();
            mask.bits_per_component(8);
            mask_ref
        });

        let mut xobj = pdf.image_xobject(xobj_ref, &compressed_rgb);
        xobj.filter(Filter::FlateDecode);
        xobj.width(w as i32);
        xobj.height(h as i32);
        xobj.color_space().device_rgb();
        xobj.bits_per_component(8);
        if let Some(mask_ref) = smask_ref {
            xobj.s_mask(mask_ref);
        }
    }
    Ok((w as f32 * 0.75, h as f32 * 0.75))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::DEFAULT_STYLESHEET;

    fn options() -> RenderOptions {
        RenderOptions {
            system_fonts: false,
            ..RenderOptions::default()
        }
    }

    #[test]
    fn short_document_fits_one_page() {
        let out = render_html("<p>Hello</p>", DEFAULT_STYLESHEET, &options()).unwrap();
        assert_eq!(out.page_count, 1);
        assert_eq!(out.status, LayoutStatus::Fit);
        assert!(out.pdf.starts_with(b"%PDF-"));
    }

    #[test]
    fn tall_spacer_overflows_single_page() {
        let html = "<div style=\"height: 700pt\"></div><p>after</p><p>more</p>";
        let out = render_html(html, "", &options()).unwrap();
        assert_eq!(out.page_count, 1);
        let rect = out.status.overflow().expect("overflow");
        assert_eq!(rect.y0, 792.0);
        assert_eq!(rect.x0, 50.0);
        assert!(rect.height() > 0.0);
    }

    #[test]
    fn trailing_margins_do_not_count_as_overflow() {
        let html = "<div style=\"height: 742pt\"></div><p style=\"margin: 0 0 40pt 0\"></p>";
        let out = render_html(html, "", &options()).unwrap();
        assert_eq!(out.status, LayoutStatus::Fit);
    }

    #[test]
    fn continuous_flow_adds_pages() {
        let body: String = (0..120).map(|i| format!("<p>Line {i}</p>")).collect();
        let opts = RenderOptions {
            flow: PageFlow::Continuous,
            ..options()
        };
        let out = render_html(&body, DEFAULT_STYLESHEET, &opts).unwrap();
        assert!(out.page_count > 1);
        assert_eq!(out.status, LayoutStatus::Fit);
    }

    #[test]
    fn overflow_can_be_an_error() {
        let opts = RenderOptions {
            fail_on_overflow: true,
            ..options()
        };
        let err = render_html("<div style=\"height: 800pt\"></div><p>x</p>", "", &opts).unwrap_err();
        assert!(matches!(err, Error::Overflow(_)));
    }

    #[test]
    fn invalid_css_is_a_render_error() {
        let err = render_html("<p>ok</p>", "p { color: red", &options()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Render);
    }

    #[test]
    fn unmatched_end_tags_are_ignored() {
        let out = render_html("<p>Total: 10</b></p></div></span>", DEFAULT_STYLESHEET, &options()).unwrap();
        assert_eq!(out.page_count, 1);
        assert_eq!(out.status, LayoutStatus::Fit);
    }

    #[test]
    fn one_text_object_per_line() {
        let out = render_html("<p>Invoice 42 is <b>due</b> now</p><p>Thanks</p>", "", &options()).unwrap();
        let doc = lopdf::Document::load_mem(&out.pdf).unwrap();
        let page = doc.get_pages()[&1];
        let ops = lopdf::content::Content::decode(&doc.get_page_content(page).unwrap())
            .unwrap()
            .operations;
        let count = |name: &str| ops.iter().filter(|op| op.operator == name).count();
        assert_eq!(count("BT"), 2);
        assert_eq!(count("ET"), 2);
        assert_eq!(count("Tj"), 6);
        assert_eq!(doc.extract_text(&[1]).unwrap(), "Invoice 42 is due now\nThanks\n");
    }

    #[test]
    fn image_paths_resolve_against_base_dir() {
        let base = Path::new("/docs");
        assert_eq!(resolve_image_path("logo.png", Some(base)), Some(PathBuf::from("/docs/logo.png")));
        assert_eq!(resolve_image_path("/abs.png", Some(base)), Some(PathBuf::from("/abs.png")));
        assert_eq!(resolve_image_path("https://x/y.png", Some(base)), None);
    }
}
