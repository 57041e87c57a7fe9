use std::collections::HashMap;

use super::{WML_NS, wml, wml_attr};

/// Display names of the paragraph styles declared in `word/styles.xml`.
pub(super) struct StyleNames {
    names: HashMap<String, String>,
    default_id: Option<String>,
}

impl StyleNames {
    /// Display name of a paragraph style. `None` resolves to the document's default
    /// paragraph style. Unknown ids fall back to the id itself.
    pub(super) fn name_of<'a>(&'a self, style_id: Option<&'a str>) -> Option<&'a str> {
        let id = style_id.or(self.default_id.as_deref())?;
        Some(self.names.get(id).map(String::as_str).unwrap_or(id))
    }
}

/// Word writes built-in style names in lower case (`heading 1`, `title`) while showing
/// them capitalized. Custom names are kept as written.
fn display_name(raw: &str) -> String {
    const BUILT_IN: [&str; 6] = ["normal", "title", "subtitle", "heading", "quote", "caption"];
    let lower = raw.to_ascii_lowercase();
    let builtin = BUILT_IN
        .iter()
        .any(|b| lower == *b || lower.strip_prefix(b).is_some_and(|rest| rest.starts_with(' ')));
    if !builtin {
        return raw.to_string();
    }
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(super) fn parse_style_names(xml_content: Option<&str>) -> StyleNames {
    let mut names = HashMap::new();
    let mut default_id = None;

    let Some(xml) = xml_content.and_then(|s| roxmltree::Document::parse(s).ok()) else {
        return StyleNames { names, default_id };
    };

    for style_node in xml.root_element().children() {
        if style_node.tag_name().name() != "style"
            || style_node.tag_name().namespace() != Some(WML_NS)
        {
            continue;
        }
        if style_node.attribute((WML_NS, "type")) != Some("paragraph") {
            continue;
        }
        let Some(style_id) = style_node.attribute((WML_NS, "styleId")) else {
            continue;
        };
        let is_default = style_node
            .attribute((WML_NS, "default"))
            .is_some_and(|v| v == "1" || v == "true");
        if is_default {
            default_id = Some(style_id.to_string());
        }
        let name = wml_attr(style_node, "name").unwrap_or(style_id);
        names.insert(style_id.to_string(), display_name(name));
    }

    // Documents without styles.xml still render their plain paragraphs as "Normal".
    if default_id.is_none() && names.contains_key("Normal") {
        default_id = Some("Normal".to_string());
    }
    log::debug!("styles.xml: {} paragraph styles", names.len());
    StyleNames { names, default_id }
}

/// `w:pStyle` of a paragraph, if any.
pub(super) fn paragraph_style_id<'a>(para: roxmltree::Node<'a, 'a>) -> Option<&'a str> {
    wml(para, "pPr").and_then(|ppr| wml_attr(ppr, "pStyle"))
}
