//! Just enough CSS for business documents: element selectors, the box-model properties the
//! layout engine draws, and inheritance of the text properties.

use crate::error::{Error, Result};
use crate::model::{Alignment, CM};

/// House style for rendered documents.
pub const DEFAULT_STYLESHEET: &str = "
body { font-family: Arial, sans-serif; margin: 0; line-height: 1.2; }
h1 { color: #333; margin-bottom: 10px; font-size: 24px; }
h2 { color: #444; margin-bottom: 8px; font-size: 20px; }
h3 { color: #555; margin-bottom: 6px; font-size: 16px; }
p { margin-top: 5px; margin-bottom: 5px; }
pre { background-color: #f5f5f5; padding: 8px; border-radius: 5px; white-space: pre-wrap; word-wrap: break-word; }
code { font-family: monospace; }
blockquote { border-left: 4px solid #ccc; padding-left: 15px; color: #777; margin: 10px 0; }
table { border-collapse: collapse; width: 100%; margin-bottom: 10px; }
th, td { border: 1px solid #ddd; padding: 6px; text-align: left; }
th { background-color: #f2f2f2; }
ul, ol { margin-top: 5px; margin-bottom: 5px; padding-left: 20px; }
li { margin-bottom: 3px; }
";

/// Defaults every element starts from, applied before the author stylesheet.
const USER_AGENT_STYLESHEET: &str = "
body { font-family: serif; font-size: 16px; }
h1 { font-size: 2em; font-weight: bold; margin: 0.67em 0; }
h2 { font-size: 1.5em; font-weight: bold; margin: 0.83em 0; }
h3 { font-size: 1.17em; font-weight: bold; margin: 1em 0; }
h4 { font-weight: bold; margin: 1.33em 0; }
h5 { font-size: 0.83em; font-weight: bold; margin: 1.67em 0; }
h6 { font-size: 0.67em; font-weight: bold; margin: 2.33em 0; }
p, ul, ol, pre { margin: 1em 0; }
ul, ol { padding-left: 40px; }
blockquote { margin: 1em 40px; }
strong, b, th { font-weight: bold; }
em, i { font-style: italic; }
code, pre, kbd, samp, tt { font-family: monospace; }
pre { white-space: pre; }
hr { margin: 0.5em 0; border-top: 1px solid #888; }
del, s { color: #666; }
";

#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

#[derive(Clone, Debug)]
struct Rule {
    selectors: Vec<String>,
    declarations: Vec<Declaration>,
}

#[derive(Clone, Debug, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    pub fn parse(css: &str) -> Result<Self> {
        let css = strip_comments(css)?;
        let mut rules = Vec::new();
        let mut rest = css.as_str();

        loop {
            let Some(open) = rest.find('{') else {
                if rest.contains('}') {
                    return Err(Error::InvalidCss("'}' without a matching '{'".into()));
                }
                if !rest.trim().is_empty() {
                    return Err(Error::InvalidCss(format!(
                        "trailing text without a rule block: {}",
                        rest.trim()
                    )));
                }
                break;
            };
            let selector_text = &rest[..open];
            if selector_text.contains('}') {
                return Err(Error::InvalidCss("'}' without a matching '{'".into()));
            }
            let body_rest = &rest[open + 1..];
            let close = body_rest
                .find('}')
                .ok_or_else(|| Error::InvalidCss("unterminated rule block".into()))?;
            let body = &body_rest[..close];
            rest = &body_rest[close + 1..];

            let selector_text = selector_text.trim();
            if selector_text.starts_with('@') {
                log::debug!("Skipping at-rule {selector_text}");
                continue;
            }
            if body.contains('{') {
                return Err(Error::InvalidCss(format!("nested block in rule '{selector_text}'")));
            }
            let declarations = parse_declarations(body)?;
            let selectors = selector_text
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| {
                    let simple = *s == "*" || (!s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()));
                    if !simple {
                        log::debug!("Ignoring unsupported selector '{s}'");
                    }
                    simple
                })
                .collect();
            rules.push(Rule { selectors, declarations });
        }

        Ok(Self { rules })
    }

    /// Append the rules of `other`; later rules win.
    pub fn extend(&mut self, other: Stylesheet) {
        self.rules.extend(other.rules);
    }

    fn matching<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Declaration> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.selectors.iter().any(|s| s == "*" || s == tag))
            .flat_map(|r| r.declarations.iter())
    }
}

fn strip_comments(css: &str) -> Result<String> {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        let end = rest[start + 2..]
            .find("*/")
            .ok_or_else(|| Error::InvalidCss("unterminated comment".into()))?;
        rest = &rest[start + 2 + end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Parse a declaration list such as the body of a rule or a `style` attribute.
pub fn parse_declarations(body: &str) -> Result<Vec<Declaration>> {
    let mut out = Vec::new();
    for decl in body.split(';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        let (property, value) = decl
            .split_once(':')
            .ok_or_else(|| Error::InvalidCss(format!("declaration without ':' ({decl})")))?;
        let value = value.trim().trim_end_matches("!important").trim();
        out.push(Declaration {
            property: property.trim().to_ascii_lowercase(),
            value: value.to_string(),
        });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Border {
    pub width: f32,
    pub color: [u8; 3],
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Borders {
    pub top: Option<Border>,
    pub right: Option<Border>,
    pub bottom: Option<Border>,
    pub left: Option<Border>,
}

impl Borders {
    pub fn width(side: Option<Border>) -> f32 {
        side.map_or(0.0, |b| b.width)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComputedStyle {
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: Option<[u8; 3]>,
    /// Multiplier of the font size; `None` uses the font's natural line gap.
    pub line_height: Option<f32>,
    pub text_align: Alignment,
    pub preserve_whitespace: bool,
    pub background: Option<[u8; 3]>,
    pub margin: Edges,
    pub padding: Edges,
    pub borders: Borders,
    pub height: Option<f32>,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            font_family: "serif".to_string(),
            font_size: 12.0,
            bold: false,
            italic: false,
            color: None,
            line_height: None,
            text_align: Alignment::Left,
            preserve_whitespace: false,
            background: None,
            margin: Edges::default(),
            padding: Edges::default(),
            borders: Borders::default(),
            height: None,
        }
    }
}

impl ComputedStyle {
    /// A child style carrying over only the inherited text properties.
    pub fn inherit(&self) -> Self {
        Self {
            font_family: self.font_family.clone(),
            font_size: self.font_size,
            bold: self.bold,
            italic: self.italic,
            color: self.color,
            line_height: self.line_height,
            text_align: self.text_align,
            preserve_whitespace: self.preserve_whitespace,
            ..Self::default()
        }
    }

    fn apply(&mut self, decl: &Declaration, parent_font_size: f32) {
        let v = decl.value.as_str();
        let em = self.font_size;
        match decl.property.as_str() {
            "font-size" => {
                if let Some(size) = parse_font_size(v, parent_font_size) {
                    self.font_size = size;
                }
            }
            "font-family" => self.font_family = v.to_string(),
            "font-weight" => {
                self.bold = match v {
                    "bold" | "bolder" => true,
                    "normal" | "lighter" => false,
                    n => n.parse::<u32>().map_or(self.bold, |w| w >= 600),
                }
            }
            "font-style" => self.italic = matches!(v, "italic" | "oblique"),
            "color" => {
                if let Some(c) = parse_color(v) {
                    self.color = Some(c);
                }
            }
            "background-color" | "background" => self.background = parse_color(v),
            "line-height" => {
                self.line_height = if v == "normal" {
                    None
                } else if let Ok(mult) = v.parse::<f32>() {
                    Some(mult)
                } else {
                    parse_length(v, em).map(|len| len / em.max(1.0))
                }
            }
            "text-align" => {
                self.text_align = match v {
                    "center" => Alignment::Center,
                    "right" => Alignment::Right,
                    "justify" => Alignment::Justify,
                    _ => Alignment::Left,
                }
            }
            "white-space" => self.preserve_whitespace = matches!(v, "pre" | "pre-wrap" | "pre-line"),
            "height" => self.height = parse_length(v, em),
            "margin" => {
                if let Some(e) = parse_edges(v, em) {
                    self.margin = e;
                }
            }
            "padding" => {
                if let Some(e) = parse_edges(v, em) {
                    self.padding = e;
                }
            }
            "margin-top" | "margin-right" | "margin-bottom" | "margin-left" => {
                if let Some(len) = parse_length(v, em) {
                    set_edge(&mut self.margin, &decl.property["margin-".len()..], len);
                }
            }
            "padding-top" | "padding-right" | "padding-bottom" | "padding-left" => {
                if let Some(len) = parse_length(v, em) {
                    set_edge(&mut self.padding, &decl.property["padding-".len()..], len);
                }
            }
            "border" => {
                let b = parse_border(v, em);
                self.borders = Borders {
                    top: b,
                    right: b,
                    bottom: b,
                    left: b,
                };
            }
            "border-top" => self.borders.top = parse_border(v, em),
            "border-right" => self.borders.right = parse_border(v, em),
            "border-bottom" => self.borders.bottom = parse_border(v, em),
            "border-left" => self.borders.left = parse_border(v, em),
            _ => {}
        }
    }
}

fn set_edge(edges: &mut Edges, side: &str, len: f32) {
    match side {
        "top" => edges.top = len,
        "right" => edges.right = len,
        "bottom" => edges.bottom = len,
        _ => edges.left = len,
    }
}

/// Resolves element styles from the built-in defaults, the author stylesheet and inline
/// `style` attributes, in that order.
pub struct StyleResolver {
    user_agent: Stylesheet,
    author: Stylesheet,
}

impl StyleResolver {
    pub fn new(author: Stylesheet) -> Self {
        let user_agent =
            Stylesheet::parse(USER_AGENT_STYLESHEET).expect("built-in stylesheet parses");
        Self { user_agent, author }
    }

    pub fn compute(&self, tag: &str, inline: Option<&str>, parent: &ComputedStyle) -> ComputedStyle {
        let mut style = parent.inherit();
        let inline_decls = inline
            .map(|s| match parse_declarations(s) {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("Ignoring style attribute on <{tag}>: {e}");
                    Vec::new()
                }
            })
            .unwrap_or_default();
        let decls: Vec<&Declaration> = self
            .user_agent
            .matching(tag)
            .chain(self.author.matching(tag))
            .chain(inline_decls.iter())
            .collect();

        // Font size first so em lengths in the other properties see the final size.
        for d in decls.iter().filter(|d| d.property == "font-size") {
            style.apply(d, parent.font_size);
        }
        for d in decls.iter().filter(|d| d.property != "font-size") {
            style.apply(d, parent.font_size);
        }
        style
    }
}

fn parse_font_size(v: &str, parent: f32) -> Option<f32> {
    match v {
        "xx-small" => Some(7.0),
        "x-small" => Some(7.5),
        "small" => Some(10.0),
        "medium" => Some(12.0),
        "large" => Some(13.5),
        "x-large" => Some(18.0),
        "xx-large" => Some(24.0),
        "smaller" => Some(parent / 1.2),
        "larger" => Some(parent * 1.2),
        _ => match v.strip_suffix('%') {
            Some(pct) => pct.trim().parse::<f32>().ok().map(|p| parent * p / 100.0),
            None => parse_length(v, parent),
        },
    }
}

/// Convert a CSS length to layout units (points). `em` is the reference font size.
pub fn parse_length(v: &str, em: f32) -> Option<f32> {
    let v = v.trim();
    if v == "0" {
        return Some(0.0);
    }
    let split = v
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(v.len());
    let (num, unit) = v.split_at(split);
    let n: f32 = num.parse().ok()?;
    let factor = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "px" => 0.75,
        "pt" => 1.0,
        "pc" => 12.0,
        "cm" => CM,
        "mm" => CM / 10.0,
        "in" => 72.0,
        "em" | "rem" => em,
        _ => return None,
    };
    Some(n * factor)
}

fn parse_edges(v: &str, em: f32) -> Option<Edges> {
    let parts: Vec<f32> = v
        .split_whitespace()
        .map(|p| if p == "auto" { Some(0.0) } else { parse_length(p, em) })
        .collect::<Option<_>>()?;
    let (top, right, bottom, left) = match parts.as_slice() {
        [a] => (*a, *a, *a, *a),
        [a, b] => (*a, *b, *a, *b),
        [a, b, c] => (*a, *b, *c, *b),
        [a, b, c, d, ..] => (*a, *b, *c, *d),
        [] => return None,
    };
    Some(Edges { top, right, bottom, left })
}

fn parse_border(v: &str, em: f32) -> Option<Border> {
    let mut width = None;
    let mut color = None;
    let mut style_none = false;
    for part in split_css_words(v) {
        match part.as_str() {
            "none" | "hidden" => style_none = true,
            "solid" | "dashed" | "dotted" | "double" | "groove" | "ridge" | "inset" | "outset" => {}
            "thin" => width = Some(0.75),
            "medium" => width = Some(2.25),
            "thick" => width = Some(3.75),
            p => {
                if let Some(len) = parse_length(p, em) {
                    width = Some(len);
                } else if let Some(c) = parse_color(p) {
                    color = Some(c);
                }
            }
        }
    }
    if style_none || width == Some(0.0) {
        return None;
    }
    Some(Border {
        width: width.unwrap_or(2.25),
        color: color.unwrap_or([0, 0, 0]),
    })
}

/// Whitespace split that keeps `rgb(...)` groups together.
fn split_css_words(v: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut depth = 0u32;
    for c in v.chars() {
        match c {
            '(' => {
                depth += 1;
                cur.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                cur.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

pub fn parse_color(v: &str) -> Option<[u8; 3]> {
    let v = v.trim().to_ascii_lowercase();
    if let Some(hex) = v.strip_prefix('#') {
        return match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let d = c.to_digit(16)? as u8;
                    rgb[i] = d * 17;
                }
                Some(rgb)
            }
            6 => Some([
                u8::from_str_radix(&hex[0..2], 16).ok()?,
                u8::from_str_radix(&hex[2..4], 16).ok()?,
                u8::from_str_radix(&hex[4..6], 16).ok()?,
            ]),
            _ => None,
        };
    }
    if let Some(args) = v.strip_prefix("rgb(").and_then(|s| s.strip_suffix(')')) {
        let parts: Vec<u8> = args
            .split(',')
            .map(|p| p.trim().parse::<f32>().ok().map(|n| n.clamp(0.0, 255.0) as u8))
            .collect::<Option<_>>()?;
        return match parts.as_slice() {
            [r, g, b] => Some([*r, *g, *b]),
            _ => None,
        };
    }
    match v.as_str() {
        "black" => Some([0, 0, 0]),
        "white" => Some([255, 255, 255]),
        "red" => Some([255, 0, 0]),
        "green" => Some([0, 128, 0]),
        "blue" => Some([0, 0, 255]),
        "gray" | "grey" => Some([128, 128, 128]),
        "silver" => Some([192, 192, 192]),
        "navy" => Some([0, 0, 128]),
        "maroon" => Some([128, 0, 0]),
        "orange" => Some([255, 165, 0]),
        _ => None,
    }
}
