//! Minimal XML reader for CAS protocol documents.
//!
//! CAS responses and logout notifications are small, so the document is read
//! into a tiny element tree keyed by local name. Namespace prefixes are
//! ignored: `cas:user`, `user` and `x:user` are the same element.

use quick_xml::{Reader, escape, events::Event};
use thiserror::Error;

/// Documents nested deeper than this are rejected outright.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("invalid XML: {0}")]
    Syntax(String),

    #[error("document has no root element")]
    NoRoot,

    #[error("document ends inside <{0}>")]
    Unclosed(String),

    #[error("document is nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        XmlError::Syntax(e.to_string())
    }
}

impl From<quick_xml::encoding::EncodingError> for XmlError {
    fn from(e: quick_xml::encoding::EncodingError) -> Self {
        XmlError::Syntax(e.to_string())
    }
}

impl From<std::str::Utf8Error> for XmlError {
    fn from(e: std::str::Utf8Error) -> Self {
        XmlError::Syntax(e.to_string())
    }
}

impl From<escape::EscapeError> for XmlError {
    fn from(e: escape::EscapeError) -> Self {
        XmlError::Syntax(e.to_string())
    }
}

/// One element of a parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name, without namespace prefix.
    pub name: String,
    /// Attributes by local name.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    text: String,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            ..Default::default()
        }
    }

    /// Character data directly inside this element, trimmed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct children named `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First element anywhere below this one named `name`, depth first.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find_map(|c| if c.name == name { Some(c) } else { c.find(name) })
    }

    /// First child element, whatever its name.
    pub fn first_child(&self) -> Option<&Element> {
        self.children.first()
    }
}

fn local_name(qualified: &[u8]) -> Result<String, XmlError> {
    let name = std::str::from_utf8(qualified)?;
    Ok(name.rsplit(':').next().unwrap_or(name).to_owned())
}

fn read_element(e: &quick_xml::events::BytesStart<'_>) -> Result<Element, XmlError> {
    let name = local_name(e.local_name().as_ref())?;
    let mut attributes = Vec::new();
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.as_ref())?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let raw = std::str::from_utf8(&attr.value)?;
        let value = escape::unescape(raw)?;
        attributes.push((local_name(attr.key.as_ref())?, value.into_owned()));
    }
    Ok(Element::new(name, attributes))
}

/// Parse `xml` and return its root element.
#[tracing::instrument(level = "trace", skip(xml), fields(xml_len = xml.len()))]
pub fn parse_document(xml: &[u8]) -> Result<Element, XmlError> {
    let mut reader = Reader::from_reader(xml);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep);
                }
                stack.push(read_element(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let element = read_element(e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => {
                        root.get_or_insert(element);
                    }
                }
            }
            Ok(Event::End(_)) => {
                // quick-xml has already checked that the names match
                if let Some(element) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => {
                            root.get_or_insert(element);
                        }
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&reader.decoder().decode(e.as_ref())?);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&reader.decoder().decode(e.as_ref())?);
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                let Some(current) = stack.last_mut() else {
                    continue;
                };
                if let Some(ch) = e.resolve_char_ref()? {
                    current.text.push(ch);
                } else {
                    let name = e.decode()?;
                    let resolved = escape::resolve_predefined_entity(&name).ok_or_else(|| {
                        XmlError::Syntax(format!("unknown entity reference '&{name};'"))
                    })?;
                    current.text.push_str(resolved);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name));
    }
    root.ok_or(XmlError::NoRoot)
}
