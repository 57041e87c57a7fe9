use std::path::PathBuf;

use crate::convert::engine::EngineChoice;
use crate::css::DEFAULT_STYLESHEET;
use crate::model::{PageFlow, PageSetup};

/// Settings for Markdown/HTML → PDF rendering.
#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub page: PageSetup,
    /// CSS length of the blank block put above the content; empty disables it.
    pub letterhead_spacer: String,
    pub stylesheet: String,
    pub flow: PageFlow,
    /// Directory `<img src>` paths are resolved against.
    pub base_dir: Option<PathBuf>,
    /// Look up installed TrueType fonts; when false only the base-14 fonts are used.
    pub system_fonts: bool,
    /// Treat overflow as an error instead of a warning.
    pub fail_on_overflow: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            page: PageSetup::default(),
            letterhead_spacer: "3cm".to_string(),
            stylesheet: DEFAULT_STYLESHEET.to_string(),
            flow: PageFlow::Single,
            base_dir: None,
            system_fonts: true,
            fail_on_overflow: false,
        }
    }
}

/// Settings for the format converters and the dispatcher.
#[derive(Clone, Debug, Default)]
pub struct ConvertOptions {
    pub render: RenderOptions,
    /// Where DOCX→Markdown writes its Markdown copy. Defaults to the source path with `.md`.
    pub markdown_side_file: Option<PathBuf>,
    pub engine: EngineChoice,
}
