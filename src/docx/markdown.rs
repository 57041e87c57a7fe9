use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Block, Document, Paragraph, Table};

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

fn paragraph(out: &mut String, para: &Paragraph) {
    if para.is_blank() {
        // Paragraphs holding only a picture leave no trace.
        if !para.has_drawing {
            out.push('\n');
        }
        return;
    }
    for run in &para.runs {
        if run.text.is_empty() {
            continue;
        }
        let marker = match (run.bold, run.italic) {
            (true, true) => "***",
            (true, false) => "**",
            (false, true) => "*",
            (false, false) => "",
        };
        out.push_str(marker);
        out.push_str(&run.text);
        out.push_str(marker);
    }
    out.push_str("\n\n");
}

fn table_row(out: &mut String, cells: impl Iterator<Item = String>) {
    out.push_str("| ");
    out.push_str(&cells.collect::<Vec<_>>().join(" | "));
    out.push_str(" |\n");
}

fn table(out: &mut String, table: &Table) {
    let Some((header, body)) = table.rows.split_first() else {
        return;
    };
    table_row(out, header.iter().map(|c| c.trim().to_string()));
    table_row(out, header.iter().map(|_| "---".to_string()));
    for row in body {
        table_row(out, row.iter().map(|c| c.trim().to_string()));
    }
    out.push('\n');
}

/// Markdown for a parsed document, untrimmed, with runs of three or more newlines
/// collapsed to a single blank line.
pub fn to_markdown(doc: &Document) -> String {
    let mut out = String::new();
    for block in &doc.blocks {
        match block {
            Block::Heading { level, text } => {
                out.push_str(&"#".repeat(usize::from(*level)));
                out.push(' ');
                out.push_str(text.trim());
                out.push_str("\n\n");
            }
            Block::Paragraph(para) => paragraph(&mut out, para),
            Block::Table(t) => table(&mut out, t),
        }
    }
    EXCESS_NEWLINES.replace_all(&out, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Run;

    fn run(text: &str, bold: bool, italic: bool) -> Run {
        Run {
            text: text.into(),
            bold,
            italic,
        }
    }

    #[test]
    fn emphasis_wraps_each_run() {
        let doc = Document {
            blocks: vec![Block::Paragraph(Paragraph {
                runs: vec![
                    run("Total: ", true, false),
                    run("", true, true),
                    run("due", false, true),
                    run(" now", true, true),
                ],
                has_drawing: false,
            })],
        };
        assert_eq!(to_markdown(&doc), "**Total: ***due**** now***\n\n");
    }

    #[test]
    fn heading_then_table() {
        let doc = Document {
            blocks: vec![
                Block::Heading {
                    level: 2,
                    text: " Items ".into(),
                },
                Block::Table(Table {
                    rows: vec![
                        vec!["Item".into(), "Price".into()],
                        vec![" Tea ".into(), "3".into()],
                    ],
                }),
            ],
        };
        assert_eq!(
            to_markdown(&doc),
            "## Items\n\n| Item | Price |\n| --- | --- |\n| Tea | 3 |\n\n"
        );
    }

    #[test]
    fn blank_paragraphs_and_collapse() {
        let blank = || Block::Paragraph(Paragraph::default());
        let picture = Block::Paragraph(Paragraph {
            runs: vec![],
            has_drawing: true,
        });
        let text = Block::Paragraph(Paragraph {
            runs: vec![run("a", false, false)],
            has_drawing: false,
        });
        let doc = Document {
            blocks: vec![text, blank(), blank(), picture, blank()],
        };
        assert_eq!(to_markdown(&doc), "a\n\n");
    }

    #[test]
    fn empty_table_is_skipped() {
        let doc = Document {
            blocks: vec![
                Block::Table(Table { rows: vec![] }),
                Block::Heading {
                    level: 2,
                    text: "Terms".into(),
                },
            ],
        };
        assert_eq!(to_markdown(&doc), "## Terms\n\n");
    }
}
