//! Plain-text conversions in both directions.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static HEADING_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"#+\s+").expect("valid regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*+|__|\b_\b").expect("valid regex"));
static HASH_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#{2,}").expect("valid regex"));

/// Strip Markdown syntax. Code blocks and images are dropped, links keep their label.
/// The result never contains `##`, `**` or `](`.
pub fn markdown_to_text(markdown: &str) -> String {
    let text = FENCED_CODE.replace_all(markdown, "");
    let text = IMAGE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = HEADING_MARK.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "");
    // Leftovers the patterns above cannot see, e.g. `##` glued to a word or a `](` from
    // an unclosed link.
    let text = HASH_RUN.replace_all(&text, "");
    text.replace("](", "] (")
}

/// A line counts as a heading when it has cased letters and none is lower case.
fn is_upper(line: &str) -> bool {
    line.chars().any(char::is_uppercase) && !line.chars().any(char::is_lowercase)
}

/// Turn plain text into Markdown: shouting lines and lines ending with a colon become
/// `##` headings, blank lines are kept, everything else is passed through.
pub fn text_to_markdown(text: &str) -> String {
    let mut md = String::with_capacity(text.len() + 64);
    for line in text.split('\n') {
        if line.trim().is_empty() {
            md.push('\n');
        } else if is_upper(line) || line.trim_end().ends_with(':') {
            md.push_str("## ");
            md.push_str(line);
            md.push_str("\n\n");
        } else {
            md.push_str(line);
            md.push('\n');
        }
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_markup() {
        let md = "# Invoice\n\n**Total:** *12* [pay here](https://x.test) ![logo](l.png)\n```\ncode\n```\nend";
        assert_eq!(markdown_to_text(md), "Invoice\n\nTotal: 12 pay here \n\nend");
    }

    #[test]
    fn guards_catch_leftovers() {
        let out = markdown_to_text("a##b [open](close");
        assert_eq!(out, "ab [open] (close");
    }

    #[test]
    fn text_headings() {
        let md = text_to_markdown("QUOTATION\nItems:\nTea 3\n\nTotal 12");
        assert_eq!(md, "## QUOTATION\n\n## Items:\n\nTea 3\n\nTotal 12\n");
    }

    #[test]
    fn digits_alone_are_not_a_heading() {
        assert_eq!(text_to_markdown("2024"), "2024\n");
    }

    proptest! {
        #[test]
        fn text_output_has_no_markdown_residue(s in "[#*\\[\\]()!_a-z \n`]{0,80}") {
            let out = markdown_to_text(&s);
            prop_assert!(!out.contains("##"));
            prop_assert!(!out.contains("**"));
            prop_assert!(!out.contains("]("));
        }

        #[test]
        fn every_input_line_survives(lines in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
            let text = lines.join("\n");
            let md = text_to_markdown(&text);
            for line in &lines {
                prop_assert!(md.contains(line.as_str()));
            }
        }
    }
}
