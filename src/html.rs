//! HTML tree for the layout engine.
//!
//! Markup is parsed by html5ever as a fragment in `<body>` context, so the usual HTML5
//! recovery rules apply: unmatched end tags are dropped, `<p>`, `<li>` and table parts get
//! their implied end tags, and a full document collapses to its body content (plus any
//! `<style>` elements). The result is copied into a plain owned tree.

use html5ever::tendril::TendrilSink;
use html5ever::{LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

pub const ROOT: &str = "#root";

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: &str, attrs: Vec<(String, String)>) -> Self {
        Self {
            name: name.to_string(),
            attrs,
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Concatenated text of all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Text content of every `<style>` element in the tree, in document order.
    pub fn style_sheets(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_styles(self, &mut out);
        out
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if e.name == "br" => out.push('\n'),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

fn collect_styles(el: &Element, out: &mut Vec<String>) {
    for child in el.elements() {
        if child.name == "style" {
            out.push(child.text());
        } else {
            collect_styles(child, out);
        }
    }
}

/// Parse an HTML fragment (or a full document) into a tree under a synthetic root.
/// Parsing never fails; malformed markup is recovered the way a browser would.
pub fn parse_fragment(html: &str) -> Element {
    let context = QualName::new(None, Namespace::from(XHTML_NS), LocalName::from("body"));
    let dom = html5ever::parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new())
        .one(html);

    let mut root = Element::new(ROOT, Vec::new());
    // The fragment's nodes hang off a synthetic <html> element under the document.
    for top in dom.document.children.borrow().iter() {
        for child in top.children.borrow().iter() {
            append(child, &mut root.children);
        }
    }
    root
}

fn append(handle: &Handle, out: &mut Vec<Node>) {
    match &handle.data {
        NodeData::Text { contents } => {
            let text = contents.borrow();
            if text.is_empty() {
                return;
            }
            if let Some(Node::Text(prev)) = out.last_mut() {
                prev.push_str(&text);
            } else {
                out.push(Node::Text(text.to_string()));
            }
        }
        NodeData::Element { name, attrs, .. } => {
            let attrs = attrs
                .borrow()
                .iter()
                .map(|a| (a.name.local.to_string(), a.value.to_string()))
                .collect();
            let mut el = Element::new(&name.local, attrs);
            for child in handle.children.borrow().iter() {
                append(child, &mut el.children);
            }
            out.push(Node::Element(el));
        }
        NodeData::Document
        | NodeData::Doctype { .. }
        | NodeData::Comment { .. }
        | NodeData::ProcessingInstruction { .. } => {}
    }
}

/// Replace character references. Text that is not a reference, including a bare `<`, is
/// kept as written.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    parse_fragment(&s.replace('<', "&lt;")).text()
}
