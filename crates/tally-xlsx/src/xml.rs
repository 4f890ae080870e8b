//! A small owned XML tree for parts that are edited structurally (`styles.xml`).
//!
//! Element names keep their source prefix so a rewritten part uses the same spelling as the
//! original. Comments, CDATA and processing instructions are carried through verbatim.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::XlsxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Already-serialized markup (comments, CDATA, processing instructions).
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written in the source (`x:font` or `font`).
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// New element sharing this element's namespace prefix.
    pub fn sibling_named(&self, local: &str) -> Self {
        match self.name.rsplit_once(':') {
            Some((prefix, _)) => Self::new(format!("{prefix}:{local}")),
            None => Self::new(local),
        }
    }

    pub fn local(&self) -> &str {
        self.name.rsplit_once(':').map_or(&self.name, |(_, l)| l)
    }

    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.rsplit_once(':').map_or(k.as_str(), |(_, l)| l) == local)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute in place, or append it when absent.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attrs.retain(|(k, _)| k != key);
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> + '_ {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.local() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|c| match c {
            XmlNode::Element(el) if el.local() == local => Some(el),
            _ => None,
        })
    }

    pub fn children_by_local<'a>(
        &'a self,
        local: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |el| el.local() == local)
    }

    pub fn push_element(&mut self, el: XmlElement) {
        self.children.push(XmlNode::Element(el));
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write(out),
                XmlNode::Text(t) => out.push_str(&escape(t.as_str())),
                XmlNode::Raw(raw) => out.push_str(raw),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// A parsed document: everything before the root element is kept as raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub prolog: String,
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, XlsxError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();
        let mut prolog = String::new();
        let mut stack: Vec<XmlElement> = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let el = element_from_start(&e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_element(el),
                        None => return Ok(Self { prolog, root: el }),
                    }
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| XlsxError::Invalid("unbalanced xml end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_element(el),
                        None => return Ok(Self { prolog, root: el }),
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?.into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Text(text)),
                        None => prolog.push_str(&text),
                    }
                }
                Event::Decl(d) => {
                    prolog.push_str("<?");
                    prolog.push_str(std::str::from_utf8(&d)?);
                    prolog.push_str("?>");
                }
                Event::Eof => break,
                other => {
                    let raw = raw_markup(&other)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Raw(raw)),
                        None => prolog.push_str(&raw),
                    }
                }
            }
            buf.clear();
        }
        Err(XlsxError::Invalid("xml document has no root element".to_string()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.prolog.clone();
        self.root.write(&mut out);
        out.into_bytes()
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement, XlsxError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        attrs.push((key, attr.unescape_value()?.into_owned()));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn raw_markup(event: &Event<'_>) -> Result<String, XlsxError> {
    Ok(match event {
        Event::Comment(c) => format!("<!--{}-->", std::str::from_utf8(c)?),
        Event::CData(c) => format!("<![CDATA[{}]]>", std::str::from_utf8(c)?),
        Event::PI(p) => format!("<?{}?>", std::str::from_utf8(p)?),
        Event::DocType(d) => format!("<!DOCTYPE {}>", std::str::from_utf8(d)?),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_prefixes_comments_and_escapes() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<x:styleSheet xmlns:x="urn:x"><!-- keep --><x:numFmts count="1"><x:numFmt numFmtId="164" formatCode="&quot;kg&quot; 0.00"/></x:numFmts><x:t>a &amp; b</x:t></x:styleSheet>"#;
        let doc = XmlDocument::parse(xml.as_bytes()).unwrap();
        assert_eq!(doc.root.local(), "styleSheet");
        let fmt = doc.root.child("numFmts").unwrap().child("numFmt").unwrap();
        assert_eq!(fmt.attr("formatCode"), Some("\"kg\" 0.00"));
        assert_eq!(doc.root.sibling_named("fonts").name, "x:fonts");

        let again = XmlDocument::parse(&doc.to_bytes()).unwrap();
        assert_eq!(again, doc);
    }
}
