//! Cleanup of generator output before it is parsed as Markdown.
//!
//! Language models like to wrap a whole document in a ```` ```markdown ```` fence. The
//! opening fence is matched against the *last* closing fence in the text, so inner fences
//! (quoted code, malformed nesting) stay inside the extracted body. Text that legitimately
//! ends with its own code block is therefore ambiguous; the last fence always wins.

const FENCE: &str = "```";
const OPENING_MARKERS: [&str; 2] = ["```markdown", FENCE];

/// Strip a fence wrapper from generated Markdown. Never fails; returns the input unchanged
/// when no wrapper is recognised.
pub fn normalize_markdown(raw: &str) -> String {
    match opening_fence(raw) {
        Some((marker, body_start)) => {
            if let Some(end) = raw[body_start..].rfind(FENCE) {
                return raw[body_start..body_start + end].trim().to_string();
            }
            strip_outer_lines(raw, marker).unwrap_or_else(|| raw.to_string())
        }
        None => strip_outer_lines(raw, FENCE).unwrap_or_else(|| raw.to_string()),
    }
}

/// First opening marker that sits at the start of the text or after whitespace.
/// Returns the marker and the byte offset just past it.
fn opening_fence(raw: &str) -> Option<(&'static str, usize)> {
    for marker in OPENING_MARKERS {
        let Some(idx) = raw.find(marker) else {
            continue;
        };
        let at_boundary = idx == 0
            || raw[..idx]
                .chars()
                .next_back()
                .is_some_and(char::is_whitespace);
        if at_boundary {
            return Some((marker, idx + marker.len()));
        }
    }
    None
}

/// Drop the first line and a trailing bare fence line when the trimmed text is fenced.
fn strip_outer_lines(raw: &str, marker: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with(marker) || !trimmed.ends_with(FENCE) {
        return None;
    }
    let mut lines: Vec<&str> = trimmed.split('\n').collect();
    if !lines.is_empty() {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == FENCE) {
        lines.pop();
    }
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unwraps_markdown_fence() {
        let raw = "```markdown\n# Quotation\n\n| a | b |\n```";
        assert_eq!(normalize_markdown(raw), "# Quotation\n\n| a | b |");
    }

    #[test]
    fn unwraps_bare_fence() {
        assert_eq!(normalize_markdown("```\nHello\n```\n"), "Hello");
    }

    #[test]
    fn unwraps_after_preamble() {
        let raw = "Here is your bill:\n```markdown\n## Bill\nTotal: 10\n```\nThanks!";
        assert_eq!(normalize_markdown(raw), "## Bill\nTotal: 10");
    }

    #[test]
    fn last_fence_wins() {
        let raw = "```markdown\nIntro\n```rust\nfn main() {}\n```\nOutro\n```";
        assert_eq!(
            normalize_markdown(raw),
            "Intro\n```rust\nfn main() {}\n```\nOutro"
        );
    }

    #[test]
    fn fence_glued_to_word_is_not_an_opening() {
        let raw = "see x```y";
        assert_eq!(normalize_markdown(raw), raw);
    }

    #[test]
    fn unclosed_fence_is_left_alone() {
        let raw = "```markdown\n# Only an opening";
        assert_eq!(normalize_markdown(raw), raw);
    }

    #[test]
    fn plain_text_is_unchanged() {
        let raw = "  # Title\n\nBody  \n";
        assert_eq!(normalize_markdown(raw), raw);
    }

    proptest! {
        #[test]
        fn fence_free_markdown_is_identity(m in "[A-Za-z0-9 #*|\\-\n.:]{0,200}") {
            let out = normalize_markdown(&m);
            prop_assert_eq!(out.trim(), m.trim());
        }

        #[test]
        fn wrapped_markdown_is_recovered(m in "[A-Za-z0-9 #*|\\-\n.:]{0,200}") {
            let wrapped = format!("```markdown\n{m}\n```");
            prop_assert_eq!(normalize_markdown(&wrapped), m.trim());
        }
    }
}
