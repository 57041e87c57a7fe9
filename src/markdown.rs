use pulldown_cmark::{Options, Parser, html};

fn options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts
}

/// Render Markdown to an HTML fragment. Raw HTML in the input is passed through unescaped
/// (generated terms-and-conditions sections arrive as literal `<ul><li>` markup).
/// Rendering is best-effort and never fails.
pub fn render_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// The blank block that keeps the letterhead area free.
pub fn spacer_div(height: &str) -> String {
    format!("<div style=\"height: {height};\"></div>")
}

/// Render Markdown and prepend the letterhead spacer (skipped when `spacer` is empty).
pub fn render_with_spacer(markdown: &str, spacer: &str) -> String {
    let body = render_html(markdown);
    if spacer.trim().is_empty() {
        return body;
    }
    let mut out = spacer_div(spacer.trim());
    out.push_str(&body);
    out
}
