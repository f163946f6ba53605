//! Provider response documents.
//!
//! Providers answer with JSON, JSON wrapped in a JSONP callback, or XML that
//! is not always well-formed. Everything is normalised into [`Document`]
//! before it reaches the cache or a vendor parser.

use crate::error::{Result, ScanError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Json,
    Xml,
}

impl DocumentFormat {
    pub fn ext(&self) -> &'static str {
        match self {
            DocumentFormat::Json => ".json",
            DocumentFormat::Xml => ".xml",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Json => "json",
            DocumentFormat::Xml => "xml",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Json(Value),
    Xml(XmlNode),
}

impl Document {
    /// Decode a raw response body.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(raw);
        let body = strip_jsonp(text.trim());
        match body.chars().next() {
            Some('<') => Ok(Document::Xml(parse_xml(&fix_xml_error(body))?)),
            Some('{') | Some('[') => serde_json::from_str(body)
                .map(Document::Json)
                .map_err(|e| ScanError::ParseError(format!("invalid JSON: {e}"))),
            _ => Err(ScanError::ParseError(format!(
                "unrecognised document ({} bytes)",
                raw.len()
            ))),
        }
    }

    pub fn format(&self) -> DocumentFormat {
        match self {
            Document::Json(_) => DocumentFormat::Json,
            Document::Xml(_) => DocumentFormat::Xml,
        }
    }

    /// Serialise back to bytes; the output parses to an equal document.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Document::Json(value) => serde_json::to_vec(value)
                .map_err(|e| ScanError::ParseError(format!("JSON encode: {e}"))),
            Document::Xml(root) => {
                let mut writer = Writer::new(Vec::new());
                emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
                write_node(&mut writer, root)?;
                Ok(writer.into_inner())
            }
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Document::Json(v) => Some(v),
            Document::Xml(_) => None,
        }
    }

    pub fn as_xml(&self) -> Option<&XmlNode> {
        match self {
            Document::Xml(n) => Some(n),
            Document::Json(_) => None,
        }
    }
}

/// Element tree produced from an XML response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    pub text: String,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a `/`-separated path of child names, first match at each step.
    pub fn find(&self, path: &str) -> Option<&XmlNode> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, name| node.child(name))
    }
}

/// Unwrap `callback({...});` to `{...}`. Anything that does not look like a
/// JSONP envelope is returned unchanged.
pub fn strip_jsonp(text: &str) -> &str {
    if text.starts_with(['{', '[', '<']) {
        return text;
    }
    let (Some(open), Some(close)) = (text.find('('), text.rfind(')')) else {
        return text;
    };
    let callback = text[..open].trim();
    let is_ident = !callback.is_empty()
        && callback
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'));
    if !is_ident || close <= open {
        return text;
    }
    text[open + 1..close].trim()
}

const XML_ENTITIES: [&str; 5] = ["amp;", "lt;", "gt;", "quot;", "apos;"];

fn starts_entity(rest: &str) -> bool {
    if XML_ENTITIES.iter().any(|e| rest.starts_with(e)) {
        return true;
    }
    let Some(num) = rest.strip_prefix('#') else {
        return false;
    };
    let (digits, hex) = match num.strip_prefix('x') {
        Some(h) => (h, true),
        None => (num, false),
    };
    let len = digits
        .chars()
        .take_while(|c| if hex { c.is_ascii_hexdigit() } else { c.is_ascii_digit() })
        .count();
    len > 0 && digits[len..].starts_with(';')
}

/// Escape bare `&` that do not begin a character or predefined entity
/// reference.
pub fn fix_xml_error(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if c == '&' && !starts_entity(&text[i + 1..]) {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
    }
    out
}

fn xml_err(e: impl std::fmt::Display) -> ScanError {
    ScanError::ParseError(format!("invalid XML: {e}"))
}

fn node_from_start(e: &BytesStart) -> Result<XmlNode> {
    let mut node = XmlNode::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

pub fn parse_xml(text: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(node_from_start(&e)?),
            Ok(Event::Empty(e)) => {
                let node = node_from_start(&e)?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| xml_err("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(xml_err(format!(
                    "{} at position {}",
                    e,
                    reader.buffer_position()
                )));
            }
        }
    }
    if !stack.is_empty() {
        return Err(xml_err("unclosed element"));
    }
    root.ok_or_else(|| xml_err("empty document"))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| ScanError::ParseError(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (k, v) in &node.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if node.children.is_empty() && node.text.is_empty() {
        return emit(writer, Event::Empty(start));
    }
    emit(writer, Event::Start(start))?;
    if !node.text.is_empty() {
        emit(writer, Event::Text(BytesText::new(&node.text)))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    emit(writer, Event::End(BytesEnd::new(node.name.as_str())))
}
