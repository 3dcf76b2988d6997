//! Minimal XML element tree
//!
//! Enough DOM for the config layout: elements with attributes, child
//! elements and text. Parsed from and written to quick-xml events.

use std::fmt::Display;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::constants::xml::{APPLICATION, CONFIG, ENCODING, INDENT, NAME_ATTR, STANDALONE, VERSION};
use crate::error::{Error, Result};

fn xml_error(e: impl Display) -> Error {
    Error::format(format!("XML error: {e}"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
    }

    /// First child element called `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn force_child(&mut self, name: &str) -> &mut Element {
        let index = match self.children.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.children.push(Element::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    /// Child elements called `tag`.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == tag)
    }

    /// First `tag` child whose `name` attribute is `name`.
    pub fn find_named(&self, tag: &str, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|c| c.name == tag && c.attr(NAME_ATTR) == Some(name))
    }

    pub fn find_named_mut(&mut self, tag: &str, name: &str) -> Option<&mut Element> {
        self.children
            .iter_mut()
            .find(|c| c.name == tag && c.attr(NAME_ATTR) == Some(name))
    }

    pub fn force_named(&mut self, tag: &str, name: &str) -> &mut Element {
        let found = self
            .children
            .iter()
            .position(|c| c.name == tag && c.attr(NAME_ATTR) == Some(name));
        let index = match found {
            Some(index) => index,
            None => {
                let mut element = Element::new(tag);
                element.set_attr(NAME_ATTR, name);
                self.children.push(element);
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    /// Drop every `tag` child named `name`.
    pub fn remove_named(&mut self, tag: &str, name: &str) {
        self.children
            .retain(|c| !(c.name == tag && c.attr(NAME_ATTR) == Some(name)));
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() && self.text.is_empty() {
            writer.write_event(Event::Empty(start)).map_err(xml_error)?;
            return Ok(());
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(xml_error)?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)?;
        Ok(())
    }
}

/// An `<application>` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Document {
    pub root: Element,
}

impl Default for Document {
    fn default() -> Self {
        let mut root = Element::new(APPLICATION);
        root.children.push(Element::new(CONFIG));
        Self { root }
    }
}

impl Document {
    /// Parse a document that declares UTF-8 and has an `<application>` root.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut declared_utf8 = false;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Decl(decl) => match decl.encoding() {
                    Some(Ok(encoding)) if encoding.eq_ignore_ascii_case(ENCODING.as_bytes()) => {
                        declared_utf8 = true;
                    }
                    Some(Ok(encoding)) => {
                        return Err(Error::format(format!(
                            "document declares encoding '{}', expected {ENCODING}",
                            String::from_utf8_lossy(&encoding)
                        )));
                    }
                    Some(Err(e)) => return Err(xml_error(e)),
                    None => {}
                },
                Event::Start(start) => stack.push(element_from(&start)?),
                Event::Empty(start) => attach(element_from(&start)?, &mut stack, &mut root)?,
                Event::End(_) => {
                    let Some(mut element) = stack.pop() else {
                        return Err(Error::format("unbalanced end tag"));
                    };
                    // Indentation between child elements is not content.
                    if !element.children.is_empty() && element.text.trim().is_empty() {
                        element.text.clear();
                    }
                    attach(element, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape().map_err(xml_error)?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(std::str::from_utf8(&data).map_err(xml_error)?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !declared_utf8 {
            return Err(Error::format(format!("document does not declare {ENCODING} encoding")));
        }
        let root = root.ok_or_else(|| Error::format("document has no root element"))?;
        if root.name != APPLICATION {
            return Err(Error::format(format!(
                "document root is <{}>, expected <{APPLICATION}>",
                root.name
            )));
        }
        Ok(Self { root })
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT);
        writer
            .write_event(Event::Decl(BytesDecl::new(VERSION, Some(ENCODING), Some(STANDALONE))))
            .map_err(xml_error)?;
        self.root.write_to(&mut writer)?;
        let mut text = String::from_utf8(writer.into_inner()).map_err(xml_error)?;
        text.push('\n');
        Ok(text)
    }

    /// The `<config>` element, i.e. the root node.
    pub fn config(&self) -> Option<&Element> {
        self.root.child(CONFIG)
    }

    pub fn config_mut(&mut self) -> &mut Element {
        self.root.force_child(CONFIG)
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(start.name().into_inner()).map_err(xml_error)?;
    let mut element = Element::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(xml_error)?;
        let key = std::str::from_utf8(attribute.key.as_ref()).map_err(xml_error)?;
        let value = attribute.unescape_value().map_err(xml_error)?;
        element.attributes.push((key.to_string(), value.into_owned()));
    }
    Ok(element)
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::format("document has more than one root element")),
    }
    Ok(())
}
