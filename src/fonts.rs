use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use memmap2::Mmap;
use pdf_writer::{Name, Pdf, Rect, Ref};
use ttf_parser::Face;

/// Environment variable with extra font directories, separated like `PATH`.
pub const FONTS_ENV: &str = "LETTERPRESS_FONTS";

/// How text shown with a font is encoded in the content stream.
pub(crate) enum FontEncoding {
    /// Simple font, one WinAnsi byte per character.
    WinAnsi,
    /// Composite font, two-byte glyph ids of the embedded subset.
    Identity(HashMap<char, u16>),
}

pub(crate) struct FontEntry {
    pub(crate) pdf_name: String,
    pub(crate) font_ref: Ref,
    widths_1000: Vec<f32>,
    char_widths_1000: HashMap<char, f32>,
    pub(crate) line_h_ratio: Option<f32>,
    pub(crate) ascender_ratio: Option<f32>,
    pub(crate) encoding: FontEncoding,
}

impl FontEntry {
    /// Width of one character in 1000-units: the embedded face's advance when known,
    /// otherwise the WinAnsi table.
    pub(crate) fn char_width_1000(&self, ch: char) -> f32 {
        if let Some(&w) = self.char_widths_1000.get(&ch) {
            return w;
        }
        let byte = char_to_winansi(ch);
        if byte >= 32 {
            self.widths_1000[(byte - 32) as usize]
        } else {
            0.0
        }
    }

    pub(crate) fn word_width(&self, word: &str, font_size: f32) -> f32 {
        word.chars()
            .map(|ch| self.char_width_1000(ch) * font_size / 1000.0)
            .sum()
    }

    pub(crate) fn space_width(&self, font_size: f32) -> f32 {
        self.char_width_1000(' ') * font_size / 1000.0
    }

    pub(crate) fn encode(&self, text: &str) -> Vec<u8> {
        match &self.encoding {
            FontEncoding::WinAnsi => to_winansi_bytes(text),
            FontEncoding::Identity(map) => encode_as_gids(text, map),
        }
    }
}

/// (lowercase family name, bold, italic) -> (file path, face index within TTC)
type FontLookup = HashMap<(String, bool, bool), (PathBuf, u32)>;

static FONT_INDEX: OnceLock<FontLookup> = OnceLock::new();

fn font_family_name(face: &Face) -> Option<String> {
    // Name ID 1 keeps "Arial Narrow" apart from "Arial"; ID 16 would merge them.
    for name in face.names() {
        if name.name_id == ttf_parser::name_id::FAMILY
            && name.is_unicode()
            && let Some(s) = name.to_string()
        {
            return Some(s);
        }
    }
    None
}

fn font_directories() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Ok(val) = std::env::var(FONTS_ENV) {
        dirs.extend(std::env::split_paths(&val).filter(|p| !p.as_os_str().is_empty()));
    }

    #[cfg(target_os = "macos")]
    {
        dirs.extend([
            "/Library/Fonts".into(),
            "/System/Library/Fonts".into(),
            "/System/Library/Fonts/Supplemental".into(),
        ]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.extend(["/usr/share/fonts".into(), "/usr/local/share/fonts".into()]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "windows")]
    {
        match std::env::var("WINDIR") {
            Ok(windir) => dirs.push(PathBuf::from(windir).join("Fonts")),
            Err(_) => dirs.push("C:\\Windows\\Fonts".into()),
        }
    }

    dirs
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("ttf" | "otf" | "ttc")
    )
}

fn index_font_file(index: &mut FontLookup, path: &Path) {
    let Ok(file) = std::fs::File::open(path) else {
        return;
    };
    // SAFETY: the mapping is read-only and dropped before this function returns.
    let Ok(data) = (unsafe { Mmap::map(&file) }) else {
        return;
    };
    let collection = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ttc"));
    let face_count = if collection {
        ttf_parser::fonts_in_collection(&data).unwrap_or(1)
    } else {
        1
    };
    for face_idx in 0..face_count {
        let Ok(face) = Face::parse(&data, face_idx) else {
            continue;
        };
        if let Some(family) = font_family_name(&face) {
            index
                .entry((family.to_lowercase(), face.is_bold(), face.is_italic()))
                .or_insert((path.to_path_buf(), face_idx));
        }
    }
}

fn scan_font_dirs() -> FontLookup {
    let t0 = std::time::Instant::now();
    let mut index = FontLookup::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut files = 0u32;

    let mut stack = font_directories();
    while let Some(dir) = stack.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_font_file(&path) {
                files += 1;
                index_font_file(&mut index, &path);
            }
        }
    }

    log::info!(
        "Font scan: {:.1}ms, {} dirs, {} files → {} faces",
        t0.elapsed().as_secs_f64() * 1000.0,
        visited.len(),
        files,
        index.len(),
    );
    index
}

/// Look up an installed font by family name, falling back to the regular face when the
/// requested weight/slant is missing.
fn find_font_file(family: &str, bold: bool, italic: bool) -> Option<(PathBuf, u32)> {
    let index = FONT_INDEX.get_or_init(scan_font_dirs);
    let key = family.to_lowercase();
    index
        .get(&(key.clone(), bold, italic))
        .or_else(|| (bold || italic).then(|| index.get(&(key, false, false))).flatten())
        .cloned()
}

/// Windows-1252 bytes 0x80..=0x9F and the characters they stand for.
const WINANSI_HIGH: [(u8, char); 27] = [
    (0x80, '\u{20AC}'),
    (0x82, '\u{201A}'),
    (0x83, '\u{0192}'),
    (0x84, '\u{201E}'),
    (0x85, '\u{2026}'),
    (0x86, '\u{2020}'),
    (0x87, '\u{2021}'),
    (0x88, '\u{02C6}'),
    (0x89, '\u{2030}'),
    (0x8A, '\u{0160}'),
    (0x8B, '\u{2039}'),
    (0x8C, '\u{0152}'),
    (0x8E, '\u{017D}'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '\u{2022}'),
    (0x96, '\u{2013}'),
    (0x97, '\u{2014}'),
    (0x98, '\u{02DC}'),
    (0x99, '\u{2122}'),
    (0x9A, '\u{0161}'),
    (0x9B, '\u{203A}'),
    (0x9C, '\u{0153}'),
    (0x9E, '\u{017E}'),
    (0x9F, '\u{0178}'),
];

fn winansi_to_char(byte: u8) -> char {
    WINANSI_HIGH
        .iter()
        .find(|&&(b, _)| b == byte)
        .map_or(byte as char, |&(_, c)| c)
}

/// Map a character to its WinAnsi byte, or 0 if unmappable.
fn char_to_winansi(c: char) -> u8 {
    match c as u32 {
        0x0020..=0x007F | 0x00A0..=0x00FF => c as u8,
        _ => WINANSI_HIGH
            .iter()
            .find(|&&(_, ch)| ch == c)
            .map_or(0, |&(b, _)| b),
    }
}

/// Encode text for a simple font. Characters outside WinAnsi become `?`.
pub(crate) fn to_winansi_bytes(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            '\t' => b' ',
            c if (c as u32) < 0x20 => b' ',
            c => match char_to_winansi(c) {
                0 => b'?',
                b => b,
            },
        })
        .collect()
}

/// Encode text as big-endian 2-byte glyph IDs for CIDFont content streams.
pub(crate) fn encode_as_gids(text: &str, char_to_gid: &HashMap<char, u16>) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2);
    for ch in text.chars() {
        let gid = char_to_gid.get(&ch).copied().unwrap_or(0);
        out.extend_from_slice(&gid.to_be_bytes());
    }
    out
}

/// The standard PDF font families every viewer carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Base14 {
    Helvetica,
    Times,
    Courier,
}

impl Base14 {
    /// Resolve a CSS family name (generic or concrete) to a base-14 family.
    pub(crate) fn for_family(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sans-serif" | "helvetica" | "arial" | "system-ui" => Some(Base14::Helvetica),
            "serif" | "times" | "times new roman" | "times-roman" => Some(Base14::Times),
            "monospace" | "courier" | "courier new" => Some(Base14::Courier),
            _ => None,
        }
    }

    pub(crate) fn postscript_name(self, bold: bool, italic: bool) -> &'static str {
        match (self, bold, italic) {
            (Base14::Helvetica, false, false) => "Helvetica",
            (Base14::Helvetica, true, false) => "Helvetica-Bold",
            (Base14::Helvetica, false, true) => "Helvetica-Oblique",
            (Base14::Helvetica, true, true) => "Helvetica-BoldOblique",
            (Base14::Times, false, false) => "Times-Roman",
            (Base14::Times, true, false) => "Times-Bold",
            (Base14::Times, false, true) => "Times-Italic",
            (Base14::Times, true, true) => "Times-BoldItalic",
            (Base14::Courier, false, false) => "Courier",
            (Base14::Courier, true, false) => "Courier-Bold",
            (Base14::Courier, false, true) => "Courier-Oblique",
            (Base14::Courier, true, true) => "Courier-BoldOblique",
        }
    }

    /// Approximate widths at 1000 units/em for WinAnsi chars 32..=255.
    fn widths(self, bold: bool) -> Vec<f32> {
        match self {
            Base14::Courier => vec![600.0; 224],
            Base14::Helvetica | Base14::Times => {
                let scale = match (self, bold) {
                    (Base14::Times, false) => 0.9,
                    (Base14::Times, true) => 0.95,
                    (_, true) => 1.06,
                    _ => 1.0,
                };
                helvetica_widths().into_iter().map(|w| w * scale).collect()
            }
        }
    }
}

fn helvetica_widths() -> Vec<f32> {
    (32u8..=255u8)
        .map(|b| match b {
            32 => 278.0,
            33..=47 => 333.0,
            48..=57 => 556.0,
            58..=64 => 333.0,
            73 | 74 => 278.0,
            77 => 833.0,
            65..=90 => 667.0,
            91..=96 => 333.0,
            102 | 105 | 106 | 108 | 116 => 278.0,
            109 | 119 => 833.0,
            97..=122 => 556.0,
            _ => 556.0,
        })
        .collect()
}

struct TrueTypeMetrics {
    widths_1000: Vec<f32>,
    line_h_ratio: f32,
    ascender_ratio: f32,
    char_to_gid: HashMap<char, u16>,
    char_widths_1000: HashMap<char, f32>,
}

/// Embed a TrueType/OpenType face as a Type0 font with Identity-H encoding, subset to the
/// characters the document uses.
#[allow(clippy::too_many_arguments)]
fn embed_truetype(
    pdf: &mut Pdf,
    font_ref: Ref,
    family: &str,
    font_data: &[u8],
    face_index: u32,
    used_chars: &HashSet<char>,
    alloc: &mut impl FnMut() -> Ref,
) -> Option<TrueTypeMetrics> {
    let face = Face::parse(font_data, face_index).ok()?;
    let units = face.units_per_em() as f32;
    let to_1000 = |v: f32| v / units * 1000.0;
    let advance = |gid| face.glyph_hor_advance(gid).map_or(0.0, |a| to_1000(a as f32));

    let widths_1000: Vec<f32> = (32u8..=255u8)
        .map(|byte| face.glyph_index(winansi_to_char(byte)).map_or(0.0, advance))
        .collect();

    let mut remapper = subsetter::GlyphRemapper::new();
    let mut char_to_gid = HashMap::new();
    let mut char_widths_1000 = HashMap::new();
    let mut gid_widths: Vec<(u16, f32)> = Vec::new();
    for &ch in used_chars {
        if let Some(gid) = face.glyph_index(ch) {
            let new_gid = remapper.remap(gid.0);
            let w = advance(gid);
            if char_to_gid.insert(ch, new_gid).is_none() {
                gid_widths.push((new_gid, w));
            }
            char_widths_1000.insert(ch, w);
        }
    }
    gid_widths.sort_by_key(|&(gid, _)| gid);
    gid_widths.dedup_by_key(|&mut (gid, _)| gid);

    let subset = subsetter::subset(font_data, face_index, &remapper).unwrap_or_else(|e| {
        log::warn!("Font subsetting failed for {family}: {e}, embedding the whole face");
        font_data.to_vec()
    });

    let ps_name: String = family.chars().filter(|c| !c.is_whitespace()).collect();
    let descriptor_ref = alloc();
    let data_ref = alloc();
    let cid_font_ref = alloc();
    let tounicode_ref = alloc();

    let data_len = i32::try_from(subset.len()).ok()?;
    pdf.stream(data_ref, &subset).pair(Name(b"Length1"), data_len);

    let bb = face.global_bounding_box();
    pdf.font_descriptor(descriptor_ref)
        .name(Name(ps_name.as_bytes()))
        .flags(pdf_writer::types::FontFlags::NON_SYMBOLIC)
        .bbox(Rect::new(
            to_1000(bb.x_min as f32),
            to_1000(bb.y_min as f32),
            to_1000(bb.x_max as f32),
            to_1000(bb.y_max as f32),
        ))
        .italic_angle(0.0)
        .ascent(to_1000(face.ascender() as f32))
        .descent(to_1000(face.descender() as f32))
        .cap_height(face.capital_height().map_or(700.0, |h| to_1000(h as f32)))
        .stem_v(80.0)
        .font_file2(data_ref);

    let system_info = || pdf_writer::types::SystemInfo {
        registry: pdf_writer::Str(b"Adobe"),
        ordering: pdf_writer::Str(b"Identity"),
        supplement: 0,
    };
    {
        let mut cid = pdf.cid_font(cid_font_ref);
        cid.subtype(pdf_writer::types::CidFontType::Type2);
        cid.base_font(Name(ps_name.as_bytes()));
        cid.system_info(system_info());
        cid.font_descriptor(descriptor_ref);
        cid.default_width(0.0);
        cid.cid_to_gid_map_predefined(Name(b"Identity"));
        if !gid_widths.is_empty() {
            let mut w = cid.widths();
            for &(gid, width) in &gid_widths {
                w.consecutive(gid, [width]);
            }
        }
    }

    let cmap_name = format!("{ps_name}-UTF16");
    let mut cmap = pdf_writer::types::UnicodeCmap::new(Name(cmap_name.as_bytes()), system_info());
    for (&ch, &new_gid) in &char_to_gid {
        cmap.pair(new_gid, ch);
    }
    let cmap_data = cmap.finish();
    pdf.stream(tounicode_ref, cmap_data.as_slice());

    pdf.type0_font(font_ref)
        .base_font(Name(ps_name.as_bytes()))
        .encoding_predefined(Name(b"Identity-H"))
        .descendant_font(cid_font_ref)
        .to_unicode(tounicode_ref);

    let line_gap = face.line_gap() as f32;
    Some(TrueTypeMetrics {
        widths_1000,
        line_h_ratio: (face.ascender() as f32 - face.descender() as f32 + line_gap) / units,
        ascender_ratio: face.ascender() as f32 / units,
        char_to_gid,
        char_widths_1000,
    })
}

/// Split a CSS `font-family` list into bare family names.
pub(crate) fn family_candidates(family: &str) -> Vec<String> {
    family
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn font_key(family: &str, bold: bool, italic: bool) -> String {
    let base = family.to_ascii_lowercase();
    match (bold, italic) {
        (true, true) => format!("{base}/BI"),
        (true, false) => format!("{base}/B"),
        (false, true) => format!("{base}/I"),
        (false, false) => base,
    }
}

/// Write the font resource for one family/weight/slant and return its metrics.
///
/// Candidates are tried in order: generic and standard names resolve to a base-14 font,
/// anything else is looked up among installed fonts (when `system_fonts` is set) and
/// embedded. Helvetica is the last resort.
#[allow(clippy::too_many_arguments)]
pub(crate) fn register_font(
    pdf: &mut Pdf,
    family: &str,
    bold: bool,
    italic: bool,
    pdf_name: String,
    alloc: &mut impl FnMut() -> Ref,
    used_chars: &HashSet<char>,
    system_fonts: bool,
) -> FontEntry {
    let t0 = std::time::Instant::now();
    let font_ref = alloc();

    let mut base14 = None;
    let mut embedded = None;
    for candidate in family_candidates(family) {
        if system_fonts
            && let Some((path, face_index)) = find_font_file(&candidate, bold, italic)
        {
            let metrics = std::fs::read(&path).ok().and_then(|data| {
                embed_truetype(pdf, font_ref, &candidate, &data, face_index, used_chars, alloc)
            });
            if metrics.is_some() {
                embedded = metrics;
                break;
            }
        }
        if let Some(b) = Base14::for_family(&candidate) {
            base14 = Some(b);
            break;
        }
    }

    let entry = match embedded {
        Some(m) => FontEntry {
            pdf_name,
            font_ref,
            widths_1000: m.widths_1000,
            char_widths_1000: m.char_widths_1000,
            line_h_ratio: Some(m.line_h_ratio),
            ascender_ratio: Some(m.ascender_ratio),
            encoding: FontEncoding::Identity(m.char_to_gid),
        },
        None => {
            let b = base14.unwrap_or_else(|| {
                log::warn!("Font not found: {family} bold={bold} italic={italic}, using Helvetica");
                Base14::Helvetica
            });
            pdf.type1_font(font_ref)
                .base_font(Name(b.postscript_name(bold, italic).as_bytes()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            FontEntry {
                pdf_name,
                font_ref,
                widths_1000: b.widths(bold),
                char_widths_1000: HashMap::new(),
                line_h_ratio: None,
                ascender_ratio: None,
                encoding: FontEncoding::WinAnsi,
            }
        }
    };

    log::debug!(
        "register_font: {family} bold={bold} italic={italic} → {:.1}ms",
        t0.elapsed().as_secs_f64() * 1000.0,
    );
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winansi_round_trip_for_high_range() {
        for &(byte, ch) in &WINANSI_HIGH {
            assert_eq!(winansi_to_char(byte), ch);
            assert_eq!(char_to_winansi(ch), byte);
        }
        assert_eq!(to_winansi_bytes("€ café"), vec![0x80, b' ', b'c', b'a', b'f', 0xE9]);
        assert_eq!(to_winansi_bytes("漢"), b"?".to_vec());
    }

    #[test]
    fn gids_are_big_endian() {
        let map = HashMap::from([('A', 0x0102u16)]);
        assert_eq!(encode_as_gids("AB", &map), vec![0x01, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn family_lists_and_base14() {
        assert_eq!(family_candidates("Arial, 'Liberation Sans', sans-serif").len(), 3);
        assert_eq!(Base14::for_family("sans-serif"), Some(Base14::Helvetica));
        assert_eq!(Base14::for_family("Courier New"), Some(Base14::Courier));
        assert_eq!(Base14::Times.postscript_name(true, true), "Times-BoldItalic");
        assert_eq!(font_key("Arial", true, false), "arial/B");
    }

    #[test]
    fn base14_registration_without_system_fonts() {
        let mut pdf = Pdf::new();
        let mut next = 1;
        let mut alloc = || {
            let r = Ref::new(next);
            next += 1;
            r
        };
        let used: HashSet<char> = "Hello".chars().collect();
        let entry = register_font(
            &mut pdf,
            "Arial, sans-serif",
            false,
            false,
            "F1".into(),
            &mut alloc,
            &used,
            false,
        );
        assert!(matches!(entry.encoding, FontEncoding::WinAnsi));
        assert!((entry.space_width(10.0) - 2.78).abs() < 0.001);
        assert_eq!(entry.encode("Hi"), b"Hi".to_vec());
    }
}
