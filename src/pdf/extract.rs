//! PDF → Markdown: per-page text plus the page's raster images saved as PNG side files.

use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};

/// Extract a PDF into Markdown. Each page becomes a `## Page n` section holding the page's
/// text, followed by one image reference per raster image on the page. The images are
/// written as `image_p{page}_{index}.png` next to `path`.
pub fn pdf_to_markdown(path: &Path) -> Result<String> {
    let t0 = std::time::Instant::now();
    let doc = Document::load(path).map_err(|e| match e {
        lopdf::Error::Decryption(_) => Error::InvalidPdf("the document is encrypted".into()),
        other => Error::from(other),
    })?;
    let out_dir = path.parent().unwrap_or(Path::new(""));

    let mut md = String::new();
    let mut image_count = 0usize;
    for (page_num, page_id) in doc.get_pages() {
        md.push_str(&format!("## Page {page_num}\n"));
        match doc.extract_text(&[page_num]) {
            Ok(text) => md.push_str(&text),
            Err(e) => log::warn!("No text extracted from page {page_num}: {e}"),
        }
        md.push_str("\n\n");

        for (i, stream) in page_images(&doc, page_id).into_iter().enumerate() {
            let index = i + 1;
            let file_name = format!("image_p{page_num}_{index}.png");
            match save_png(stream, &out_dir.join(&file_name)) {
                Ok(true) => {
                    image_count += 1;
                    md.push_str(&format!(
                        "![Image {index} from page {page_num}]({file_name})\n\n"
                    ));
                }
                Ok(false) => log::warn!("Skipping image {index} on page {page_num}: unsupported encoding"),
                Err(e) => log::warn!("Skipping image {index} on page {page_num}: {e}"),
            }
        }
    }

    log::info!(
        "PDF → Markdown: {} pages, {} images, {:.1}ms",
        doc.get_pages().len(),
        image_count,
        t0.elapsed().as_secs_f64() * 1000.0,
    );
    Ok(md)
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).and_then(|o| o.as_dict().ok())
}

/// The page's `Resources`, inherited from ancestor page-tree nodes when absent.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(res) = node.get(b"Resources") {
            return resolve_dict(doc, res);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Image XObjects of a page in resource-dictionary order.
fn page_images(doc: &Document, page_id: ObjectId) -> Vec<&Stream> {
    let Some(xobjects) = page_resources(doc, page_id)
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|x| resolve_dict(doc, x))
    else {
        return Vec::new();
    };
    xobjects
        .iter()
        .filter_map(|(_, obj)| resolve(doc, obj)?.as_stream().ok())
        .filter(|s| {
            s.dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .is_ok_and(|n| n == b"Image")
        })
        .collect()
}

fn filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn int(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key).ok()?.as_i64().ok().and_then(|v| u32::try_from(v).ok())
}

struct DecodeParams {
    predictor: u32,
    colors: usize,
    columns: usize,
}

/// `DecodeParms` of a Flate stream. Only 8-bit samples are rebuilt, so
/// `BitsPerComponent` is left to the image dictionary.
fn decode_params(dict: &Dictionary) -> Option<DecodeParams> {
    let params = match dict.get(b"DecodeParms").ok()? {
        Object::Dictionary(d) => d,
        Object::Array(arr) => arr.first()?.as_dict().ok()?,
        _ => return None,
    };
    Some(DecodeParams {
        predictor: int(params, b"Predictor").unwrap_or(1),
        colors: int(params, b"Colors").unwrap_or(1) as usize,
        columns: int(params, b"Columns").unwrap_or(1) as usize,
    })
}

/// Undo the PNG row filters of a Flate stream: each row starts with a filter type byte.
fn png_unpredict(data: &[u8], colors: usize, columns: usize) -> Result<Vec<u8>> {
    let bpp = colors.max(1);
    let row_len = columns.saturating_mul(bpp);
    if row_len == 0 {
        return Err(Error::InvalidPdf("image predictor with no columns".into()));
    }
    let mut out = Vec::with_capacity(data.len() / (row_len + 1) * row_len);
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        let Some((&filter, row)) = chunk.split_first() else {
            break;
        };
        if row.len() < row_len {
            break;
        }
        let mut cur = row.to_vec();
        for i in 0..row_len {
            let left = if i >= bpp { cur[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match filter {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => return Err(Error::InvalidPdf(format!("unknown PNG row filter {other}"))),
            };
            cur[i] = cur[i].wrapping_add(predicted);
        }
        out.extend_from_slice(&cur);
        prev = cur;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let (pa, pb, pc) = ((p - i16::from(a)).abs(), (p - i16::from(b)).abs(), (p - i16::from(c)).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Decode one image XObject and write it as PNG. Returns `Ok(false)` for encodings that
/// are not rebuilt (JPEG 2000, CCITT, indexed or 16-bit samples and the like).
fn save_png(stream: &Stream, out: &Path) -> Result<bool> {
    let dict = &stream.dict;
    let filters = filters(dict);
    let image = match filters.as_slice() {
        [f] if f == b"DCTDecode" => {
            image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)?
        }
        [] | [_] if filters.iter().all(|f| f == b"FlateDecode") => {
            let raw = if filters.is_empty() {
                stream.content.clone()
            } else {
                let inflated = miniz_oxide::inflate::decompress_to_vec_zlib(&stream.content)
                    .map_err(|e| Error::InvalidPdf(format!("image stream: {:?}", e.status)))?;
                match decode_params(dict) {
                    Some(params) if params.predictor >= 10 => {
                        png_unpredict(&inflated, params.colors, params.columns)?
                    }
                    Some(params) if params.predictor > 1 => return Ok(false),
                    _ => inflated,
                }
            };
            let (Some(w), Some(h)) = (int(dict, b"Width"), int(dict, b"Height")) else {
                return Ok(false);
            };
            if int(dict, b"BitsPerComponent") != Some(8) {
                return Ok(false);
            }
            let channels = match dict.get(b"ColorSpace").ok().and_then(|c| c.as_name().ok()) {
                Some(b"DeviceRGB") => 3,
                Some(b"DeviceGray") => 1,
                _ => return Ok(false),
            };
            let len = w as usize * h as usize * channels;
            let Some(px) = raw.get(..len) else {
                return Err(Error::InvalidPdf("image data shorter than its dimensions".into()));
            };
            let px = px.to_vec();
            let decoded = if channels == 3 {
                image::RgbImage::from_raw(w, h, px).map(image::DynamicImage::ImageRgb8)
            } else {
                image::GrayImage::from_raw(w, h, px).map(image::DynamicImage::ImageLuma8)
            };
            match decoded {
                Some(img) => img,
                None => return Ok(false),
            }
        }
        _ => return Ok(false),
    };
    if image.width() == 0 || image.height() == 0 {
        return Ok(false);
    }
    image.save_with_format(out, image::ImageFormat::Png)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use miniz_oxide::deflate::compress_to_vec_zlib;

    fn rgb_stream(content: Vec<u8>, params: Option<Dictionary>) -> Stream {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 2,
            "Height" => 2,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        if let Some(params) = params {
            dict.set("DecodeParms", params);
        }
        Stream::new(dict, content)
    }

    const PIXELS: [u8; 12] = [255, 0, 0, 0, 255, 0, 0, 0, 255, 10, 20, 30];

    #[test]
    fn flate_rgb_image_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("img.png");
        let stream = rgb_stream(compress_to_vec_zlib(&PIXELS, 6), None);
        assert!(save_png(&stream, &out).unwrap());

        let img = image::open(&out).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 1).0, [10, 20, 30]);
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn png_predictor_rows_are_unfiltered() {
        // Row 0 with the Sub filter, row 1 with the Up filter.
        let mut filtered = vec![1u8, 255, 0, 0];
        filtered.extend([0u8.wrapping_sub(255), 255, 0]);
        filtered.push(2);
        filtered.extend([0u8, 0, 255].iter().zip(&PIXELS[0..3]).map(|(v, up)| v.wrapping_sub(*up)));
        filtered.extend([10u8, 20, 30].iter().zip(&PIXELS[3..6]).map(|(v, up)| v.wrapping_sub(*up)));
        let params = dictionary! { "Predictor" => 15, "Colors" => 3, "Columns" => 2 };

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pred.png");
        let stream = rgb_stream(compress_to_vec_zlib(&filtered, 6), Some(params));
        assert!(save_png(&stream, &out).unwrap());
        let img = image::open(&out).unwrap().to_rgb8();
        assert_eq!(img.into_raw(), PIXELS);
    }

    #[test]
    fn paeth_picks_the_closest_neighbour() {
        assert_eq!(paeth(10, 20, 10), 20);
        assert_eq!(paeth(20, 10, 10), 20);
        assert_eq!(paeth(0, 0, 0), 0);
    }

    #[test]
    fn tiff_predictor_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let params = dictionary! { "Predictor" => 2, "Colors" => 3, "Columns" => 2 };
        let stream = rgb_stream(compress_to_vec_zlib(&PIXELS, 6), Some(params));
        assert!(!save_png(&stream, &dir.path().join("tiff.png")).unwrap());
    }

    #[test]
    fn corrupt_flate_data_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let stream = rgb_stream(vec![1, 2, 3, 4], None);
        let err = save_png(&stream, &dir.path().join("bad.png")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedSource);
    }
}
