//! Minimal XML inspection used for routing.
//!
//! Bindings only need the root element (namespace, local name, attributes)
//! to build a decoder key; decoders get the full text and parse whatever
//! they need themselves.

use std::io::Write;

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::{NsReader, Reader};
use quick_xml::Writer;

pub const CONTENT_TYPE_XML: &str = "application/xml";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("request body is empty")]
    Empty,
    #[error("request body is not valid UTF-8")]
    Encoding,
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("XML output could not be written: {0}")]
    Write(String),
}

/// A namespace-qualified element name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: Option<String>,
    pub local_name: String,
}

/// An XML document whose root element has been resolved.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    root: QName,
    /// Root attributes by local name, namespace declarations excluded.
    attributes: Vec<(String, String)>,
    text: String,
}

impl XmlDocument {
    /// Parses `text`, checking well-formedness and resolving the root.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Empty`] when there is no root element and
    /// [`XmlError::Malformed`] for any syntax error or stray text outside it.
    pub fn parse(text: impl Into<String>) -> Result<Self, XmlError> {
        let text = text.into();
        let (root, attributes) = inspect(&text)?;
        Ok(Self {
            root,
            attributes,
            text,
        })
    }

    /// Like [`parse`](Self::parse) but from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Encoding`] if `bytes` is not UTF-8, otherwise as
    /// [`parse`](Self::parse).
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, XmlError> {
        let text = std::str::from_utf8(bytes).map_err(|_| XmlError::Encoding)?;
        Self::parse(text)
    }

    /// Parses an element cut out of a larger document, re-declaring the
    /// namespace bindings it inherited from its ancestors.
    ///
    /// `inherited` holds `(attribute name, uri)` pairs such as
    /// `("xmlns:sos", "http://www.opengis.net/sos/2.0")`. Bindings the
    /// fragment declares itself are left alone.
    ///
    /// # Errors
    ///
    /// As [`parse`](Self::parse).
    pub fn from_fragment(fragment: &str, inherited: &[(String, String)]) -> Result<Self, XmlError> {
        let fragment = fragment.trim();
        let own = root_declarations(fragment)?;
        let missing: String = inherited
            .iter()
            .filter(|(name, _)| !own.iter().any(|n| n == name))
            .map(|(name, uri)| format!(" {name}=\"{}\"", quick_xml::escape::escape(uri.as_str())))
            .collect();
        if missing.is_empty() {
            return Self::parse(fragment);
        }
        let name_end = fragment
            .char_indices()
            .skip(1)
            .find(|(_, c)| c.is_whitespace() || *c == '/' || *c == '>')
            .map_or(fragment.len(), |(i, _)| i);
        let (head, tail) = fragment.split_at(name_end);
        Self::parse(format!("{head}{missing}{tail}"))
    }

    #[must_use]
    pub fn root(&self) -> &QName {
        &self.root
    }

    #[must_use]
    pub fn root_namespace(&self) -> Option<&str> {
        self.root.namespace.as_deref()
    }

    #[must_use]
    pub fn root_name(&self) -> &str {
        &self.root.local_name
    }

    /// Root attribute by local name.
    #[must_use]
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == local_name)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }
}

type RootInfo = (QName, Vec<(String, String)>);

fn malformed(e: impl std::fmt::Display) -> XmlError {
    XmlError::Malformed(e.to_string())
}

fn inspect(text: &str) -> Result<RootInfo, XmlError> {
    let mut reader = NsReader::from_str(text);
    let mut root: Option<RootInfo> = None;
    let mut depth = 0usize;

    loop {
        let (resolved, event) = reader.read_resolved_event().map_err(malformed)?;
        let namespace = match resolved {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.0).into_owned()),
            ResolveResult::Unknown(prefix) => {
                return Err(XmlError::Malformed(format!(
                    "unbound namespace prefix '{}'",
                    String::from_utf8_lossy(&prefix)
                )))
            }
            ResolveResult::Unbound => None,
        };
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if root.is_none() {
                    if depth > 0 {
                        return Err(XmlError::Malformed("unexpected element nesting".into()));
                    }
                    let mut attributes = Vec::new();
                    for attr in e.attributes() {
                        let attr = attr.map_err(malformed)?;
                        let key = attr.key.as_ref();
                        if key == b"xmlns" || key.starts_with(b"xmlns:") {
                            continue;
                        }
                        let value = attr.unescape_value().map_err(malformed)?;
                        attributes.push((
                            String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                            value.into_owned(),
                        ));
                    }
                    let local_name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    root = Some((
                        QName {
                            namespace,
                            local_name,
                        },
                        attributes,
                    ));
                } else if depth == 0 {
                    return Err(XmlError::Malformed("more than one root element".into()));
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(ref t) if depth == 0 => {
                let raw = t.unescape().map_err(malformed)?;
                if !raw.trim().is_empty() {
                    return Err(XmlError::Malformed("text outside the root element".into()));
                }
            }
            Event::CData(_) if depth == 0 => {
                return Err(XmlError::Malformed("CDATA outside the root element".into()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(XmlError::Malformed("unexpected end of document".into()));
    }
    root.ok_or(XmlError::Empty)
}

/// Namespace declaration attribute names on the fragment's first element.
fn root_declarations(fragment: &str) -> Result<Vec<String>, XmlError> {
    let mut reader = Reader::from_str(fragment);
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) => {
                let mut names = Vec::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(malformed)?;
                    let key = attr.key.as_ref();
                    if key == b"xmlns" || key.starts_with(b"xmlns:") {
                        names.push(String::from_utf8_lossy(key).into_owned());
                    }
                }
                return Ok(names);
            }
            Event::Eof => return Err(XmlError::Empty),
            _ => {}
        }
    }
}

/// Writes one event, flattening the writer's error type.
///
/// # Errors
///
/// Returns [`XmlError::Write`] when the underlying writer fails.
pub fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}

/// Strips a leading `<?xml ...?>` declaration so a document can be embedded.
#[must_use]
pub fn strip_declaration(document: &str) -> &str {
    let trimmed = document.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}
