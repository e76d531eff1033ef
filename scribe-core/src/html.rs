//! Minimal HTML fragment tokenizer, tree builder and writer
//!
//! Only what the markup codec needs: elements with attributes, text,
//! character references, comments and doctype skipping, and implied closes
//! for unbalanced input. Output is compact with attributes in key order.

use log::debug;
use std::collections::BTreeMap;

/// A parsed markup node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<HtmlNode>,
}

impl Element {
    pub fn new(tag: impl Into<String>, children: Vec<HtmlNode>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children,
        }
    }

    pub fn with_attrs(mut self, attrs: BTreeMap<String, String>) -> Self {
        self.attrs = attrs;
        self
    }
}

impl HtmlNode {
    pub fn element(tag: impl Into<String>, children: Vec<HtmlNode>) -> Self {
        HtmlNode::Element(Element::new(tag, children))
    }

    pub fn text(text: impl Into<String>) -> Self {
        HtmlNode::Text(text.into())
    }
}

const VOID_ELEMENTS: [&str; 8] = ["br", "hr", "img", "input", "meta", "link", "wbr", "col"];
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Parse an HTML fragment into a node list
pub fn parse_fragment(input: &str) -> Vec<HtmlNode> {
    let bytes = input.as_bytes();
    let mut idx = 0_usize;
    // Open elements; the bottom entry collects top-level nodes
    let mut stack: Vec<Element> = vec![Element::new("#root", Vec::new())];

    while idx < bytes.len() {
        if bytes[idx] != b'<' {
            let next = find_byte(bytes, idx, b'<').unwrap_or(bytes.len());
            push_text(&mut stack, decode_entities(&input[idx..next]));
            idx = next;
            continue;
        }

        if starts_with(bytes, idx, b"<!--") {
            idx = skip_comment(bytes, idx);
            continue;
        }

        if starts_with(bytes, idx, b"<!") || starts_with(bytes, idx, b"<?") {
            idx = skip_to_gt(bytes, idx.saturating_add(2));
            continue;
        }

        let Some((tag, next_idx)) = parse_tag(input, idx) else {
            // A stray '<' is literal text
            push_text(&mut stack, "<".to_string());
            idx = idx.saturating_add(1);
            continue;
        };
        idx = next_idx;

        if tag.is_end {
            close_element(&mut stack, &tag.name);
            continue;
        }

        if RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
            if !tag.self_closing {
                idx = skip_raw_text(bytes, idx, &tag.name);
            }
            continue;
        }

        let element = Element::new(tag.name, Vec::new()).with_attrs(tag.attrs);
        if tag.self_closing || VOID_ELEMENTS.contains(&element.tag.as_str()) {
            append(&mut stack, HtmlNode::Element(element));
        } else {
            stack.push(element);
        }
    }

    while stack.len() > 1 {
        pop_into_parent(&mut stack);
    }
    stack.pop().map(|root| root.children).unwrap_or_default()
}

/// Serialize nodes back to markup
pub fn write_fragment(nodes: &[HtmlNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

fn write_node(node: &HtmlNode, out: &mut String) {
    match node {
        HtmlNode::Text(text) => out.push_str(&escape(text, false)),
        HtmlNode::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attrs {
                if !is_attribute_name(name) {
                    debug!("skipping attribute {:?} on <{}>", name, element.tag);
                    continue;
                }
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape(value, true));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                return;
            }
            for child in &element.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&element.tag);
            out.push('>');
        }
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Decode the character references the writer emits plus the common extras
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_reference(&rest[1..semi]).map(|ch| (ch, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn push_text(stack: &mut [Element], text: String) {
    if text.is_empty() {
        return;
    }
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if let Some(HtmlNode::Text(last)) = parent.children.last_mut() {
        last.push_str(&text);
    } else {
        parent.children.push(HtmlNode::Text(text));
    }
}

fn append(stack: &mut [Element], node: HtmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn pop_into_parent(stack: &mut Vec<Element>) {
    if let Some(element) = stack.pop() {
        append(stack, HtmlNode::Element(element));
    }
}

/// Close the nearest open element named `name`, implicitly closing any
/// elements opened inside it. End tags with no open match are ignored.
fn close_element(stack: &mut Vec<Element>, name: &str) {
    let Some(pos) = stack.iter().skip(1).rposition(|el| el.tag == name) else {
        return;
    };
    let target = pos + 1;
    while stack.len() > target {
        pop_into_parent(stack);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedTag {
    name: String,
    attrs: BTreeMap<String, String>,
    is_end: bool,
    self_closing: bool,
}

fn parse_tag(input: &str, start: usize) -> Option<(ParsedTag, usize)> {
    let bytes = input.as_bytes();
    if bytes.get(start).copied() != Some(b'<') {
        return None;
    }

    let mut idx = start.saturating_add(1);
    let mut is_end = false;
    if bytes.get(idx).copied() == Some(b'/') {
        is_end = true;
        idx = idx.saturating_add(1);
    }

    let name_start = idx;
    while idx < bytes.len() && is_tag_name_char(bytes[idx]) {
        idx = idx.saturating_add(1);
    }
    if idx == name_start {
        return None;
    }
    let name = input[name_start..idx].to_ascii_lowercase();

    let mut attrs = BTreeMap::new();
    let mut self_closing = false;
    loop {
        idx = skip_spaces(bytes, idx);
        match bytes.get(idx).copied() {
            None => return None,
            Some(b'>') => {
                idx = idx.saturating_add(1);
                break;
            }
            Some(b'/') => {
                self_closing = true;
                idx = idx.saturating_add(1);
            }
            Some(_) => {
                let attr_start = idx;
                while idx < bytes.len() && is_attr_name_char(bytes[idx]) {
                    idx = idx.saturating_add(1);
                }
                if idx == attr_start {
                    // Garbage inside the tag, skip a byte
                    idx = idx.saturating_add(1);
                    continue;
                }
                let attr_name = input[attr_start..idx].to_ascii_lowercase();
                self_closing = false;

                idx = skip_spaces(bytes, idx);
                let value = if bytes.get(idx).copied() == Some(b'=') {
                    idx = skip_spaces(bytes, idx.saturating_add(1));
                    let (value, next) = read_attr_value(input, idx)?;
                    idx = next;
                    decode_entities(value)
                } else {
                    String::new()
                };
                attrs.entry(attr_name).or_insert(value);
            }
        }
    }

    Some((
        ParsedTag {
            name,
            attrs,
            is_end,
            self_closing,
        },
        idx,
    ))
}

fn read_attr_value(input: &str, idx: usize) -> Option<(&str, usize)> {
    let bytes = input.as_bytes();
    match bytes.get(idx).copied()? {
        quote @ (b'"' | b'\'') => {
            let end = find_byte(bytes, idx.saturating_add(1), quote)?;
            Some((&input[idx + 1..end], end.saturating_add(1)))
        }
        _ => {
            let mut end = idx;
            while end < bytes.len() && !bytes[end].is_ascii_whitespace() && bytes[end] != b'>' {
                end = end.saturating_add(1);
            }
            Some((&input[idx..end], end))
        }
    }
}

fn skip_raw_text(bytes: &[u8], start: usize, tag_name: &str) -> usize {
    let tag_bytes = tag_name.as_bytes();
    let mut idx = start;
    while idx < bytes.len() {
        if bytes[idx] == b'<'
            && bytes.get(idx.saturating_add(1)).copied() == Some(b'/')
            && starts_with_ignore_ascii_case(bytes, idx.saturating_add(2), tag_bytes)
        {
            return skip_to_gt(bytes, idx);
        }
        idx = idx.saturating_add(1);
    }
    bytes.len()
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    find_subslice(bytes, start.saturating_add(4), b"-->")
        .map(|end| end.saturating_add(3))
        .unwrap_or(bytes.len())
}

fn skip_to_gt(bytes: &[u8], from: usize) -> usize {
    find_byte(bytes, from, b'>')
        .map(|idx| idx.saturating_add(1))
        .unwrap_or(bytes.len())
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx = idx.saturating_add(1);
    }
    idx
}

fn is_tag_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

/// Whether `name` is written and read back unchanged: an ASCII letter
/// followed by lowercase letters, digits, `-`, `_`, `:` or `.`
pub fn is_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | ':' | '.')
        }),
        _ => false,
    }
}

fn is_attr_name_char(byte: u8) -> bool {
    !byte.is_ascii_whitespace() && !matches!(byte, b'=' | b'>' | b'/' | b'"' | b'\'')
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    end <= bytes.len() && bytes[idx..end] == *pattern
}

fn starts_with_ignore_ascii_case(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    end <= bytes.len()
        && bytes[idx..end]
            .iter()
            .zip(pattern.iter())
            .all(|(left, right)| left.eq_ignore_ascii_case(right))
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}
