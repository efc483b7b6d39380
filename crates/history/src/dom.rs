//! A small owned XML tree, enough to edit one element of a document and
//! write the rest back unchanged.

use crate::error::{ErrorKind, Result};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}
impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Vec::new(), children: Vec::new() }
    }

    /// An element holding only `text`.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.set_text(text);
        element
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.name == name)
    }

    /// The first child called `name`, appended when there is none.
    pub fn ensure_child(&mut self, name: &str) -> &mut Element {
        let position = self.children.iter().position(|node| matches!(node, Node::Element(e) if e.name == name));
        let index = match position {
            Some(index) => index,
            None => {
                self.children.push(Node::Element(Element::new(name)));
                self.children.len() - 1
            },
        };
        match &mut self.children[index] {
            Node::Element(e) => e,
            Node::Text(_) => unreachable!("index points at an element"),
        }
    }

    pub fn push(&mut self, child: Element) -> &mut Element {
        self.children.push(Node::Element(child));
        match self.children.last_mut() {
            Some(Node::Element(e)) => e,
            _ => unreachable!("just pushed an element"),
        }
    }

    /// Concatenated text content of this element (not of its descendants),
    /// trimmed.
    pub fn text(&self) -> String {
        let text: String = self
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect();
        text.trim().to_string()
    }

    /// Text of the child called `name`, if it has any.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(Element::text).filter(|t| !t.is_empty())
    }

    /// Replace this element's text, keeping child elements.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.retain(|node| matches!(node, Node::Element(_)));
        let text = text.into();
        if !text.is_empty() {
            self.children.insert(0, Node::Text(text));
        }
    }
}

/// Parse a document, returning its root element.
pub fn parse(content: &str) -> Result<Element> {
    let mut reader = Reader::from_str(content.trim_start_matches('\u{feff}'));
    let mut stack: Vec<Element> = Vec::new();
    let mut text = String::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                flush_text(&mut stack, &mut text);
                stack.push(start_element(&e)?);
            },
            Ok(Event::Empty(e)) => {
                flush_text(&mut stack, &mut text);
                attach(&mut stack, &mut root, start_element(&e)?)?;
            },
            Ok(Event::End(_)) => {
                flush_text(&mut stack, &mut text);
                let Some(element) = stack.pop() else {
                    exn::bail!(ErrorKind::Malformed("unbalanced end tag".to_string()));
                };
                attach(&mut stack, &mut root, element)?;
            },
            Ok(Event::Text(e)) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::CData(e)) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::GeneralRef(e)) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                match resolve_entity(&entity) {
                    Some(resolved) => text.push_str(&resolved),
                    None => tracing::warn!(entity = %entity, "Dropping unknown entity reference"),
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => exn::bail!(ErrorKind::Malformed(e.to_string())),
            _ => {},
        }
    }
    if !stack.is_empty() {
        exn::bail!(ErrorKind::Malformed("unclosed element".to_string()));
    }
    match root {
        Some(root) => Ok(root),
        None => exn::bail!(ErrorKind::Malformed("no root element".to_string())),
    }
}

/// Serialize a document with an XML declaration and two-space indentation.
pub fn write(root: &Element) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| ErrorKind::Malformed(e.to_string()))?;
    write_element(&mut writer, root)?;
    let mut out = String::from_utf8(writer.into_inner()).map_err(|e| ErrorKind::Malformed(e.to_string()))?;
    out.push('\n');
    Ok(out)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(|e| ErrorKind::Malformed(e.to_string()))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start)).map_err(|e| ErrorKind::Malformed(e.to_string()))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => {
                writer.write_event(Event::Text(BytesText::new(t))).map_err(|e| ErrorKind::Malformed(e.to_string()))?
            },
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| ErrorKind::Malformed(e.to_string()))?;
    Ok(())
}

fn start_element(e: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8(e.name().as_ref().to_vec()).map_err(|e| ErrorKind::Malformed(e.to_string()))?;
    let mut element = Element::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ErrorKind::Malformed(e.to_string()))?;
        let key = String::from_utf8(attr.key.as_ref().to_vec()).map_err(|e| ErrorKind::Malformed(e.to_string()))?;
        let raw = String::from_utf8(attr.value.to_vec()).map_err(|e| ErrorKind::Malformed(e.to_string()))?;
        let value = unescape(&raw).map_err(|e| ErrorKind::Malformed(e.to_string()))?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

/// Pending text becomes a text node of the open element. Whitespace-only
/// runs are layout and are dropped.
fn flush_text(stack: &mut [Element], text: &mut String) {
    if let Some(current) = stack.last_mut()
        && !text.trim().is_empty()
    {
        current.children.push(Node::Text(text.clone()));
    }
    text.clear();
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => exn::bail!(ErrorKind::Malformed("more than one root element".to_string())),
    }
    Ok(())
}

fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {},
    }
    let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => entity.strip_prefix('#')?.parse::<u32>().ok()?,
    };
    char::from_u32(code).map(String::from)
}
