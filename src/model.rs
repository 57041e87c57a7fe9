/// A4 at 72 units per inch.
pub const A4_WIDTH: f32 = 595.0;
pub const A4_HEIGHT: f32 = 842.0;
pub const DEFAULT_MARGIN: f32 = 50.0;

/// 1cm in layout units.
pub const CM: f32 = 72.0 / 2.54;

/// Height reserved at the top of page one for pre-printed letterhead.
pub const LETTERHEAD_SPACER: f32 = 3.0 * CM;

pub struct Document {
    pub blocks: Vec<Block>,
}

pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Default)]
pub struct Paragraph {
    pub runs: Vec<Run>,
    /// The paragraph carried a drawing or picture (not extracted).
    pub has_drawing: bool,
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

pub struct Table {
    pub rows: Vec<Vec<String>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

/// Rectangle in layout units, origin at the top-left of the page.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSetup {
    pub width: f32,
    pub height: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub margin_right: f32,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            width: A4_WIDTH,
            height: A4_HEIGHT,
            margin_top: DEFAULT_MARGIN,
            margin_bottom: DEFAULT_MARGIN,
            margin_left: DEFAULT_MARGIN,
            margin_right: DEFAULT_MARGIN,
        }
    }
}

impl PageSetup {
    /// The area content is laid out into, in top-left page coordinates.
    pub fn content_rect(&self) -> Rect {
        Rect::new(
            self.margin_left,
            self.margin_top,
            self.width - self.margin_right,
            self.height - self.margin_bottom,
        )
    }
}

/// Result of fitting content into the page's content rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LayoutStatus {
    Fit,
    /// Region below the content rectangle that the unconsumed content would occupy.
    Overflow(Rect),
}

impl LayoutStatus {
    pub fn overflow(&self) -> Option<Rect> {
        match self {
            LayoutStatus::Fit => None,
            LayoutStatus::Overflow(r) => Some(*r),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PageFlow {
    /// Everything goes on one page; what does not fit is reported as overflow.
    Single,
    /// Content flows onto as many pages as needed.
    Continuous,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_content_rect() {
        let r = PageSetup::default().content_rect();
        assert_eq!(r.width(), 495.0);
        assert_eq!(r.height(), 742.0);
    }

    #[test]
    fn spacer_is_about_85_units() {
        assert!((LETTERHEAD_SPACER - 85.04).abs() < 0.01);
    }

    #[test]
    fn blank_paragraph_detection() {
        let p = Paragraph {
            runs: vec![Run { text: "  ".into(), ..Default::default() }],
            has_drawing: false,
        };
        assert!(p.is_blank());
        assert!(Paragraph::default().is_blank());
    }
}
