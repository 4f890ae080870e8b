use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::openxml::local_name;
use crate::xml::{XmlDocument, XmlElement, XmlNode};
use crate::XlsxError;

/// The workbook's shared string table.
///
/// Existing items are read as plain text (rich-text runs concatenated, phonetic runs skipped) and
/// left untouched on save. Strings written by the engine are appended.
#[derive(Debug, Clone, Default)]
pub struct SharedStrings {
    items: Vec<String>,
    index: HashMap<String, u32>,
    appended: Vec<String>,
    references: u32,
}

impl SharedStrings {
    pub fn parse(xml: &[u8]) -> Result<Self, XlsxError> {
        let mut reader = Reader::from_reader(Cursor::new(xml));
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();
        let mut items = Vec::new();
        let mut current: Option<String> = None;
        let mut in_text = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match local_name(e.name().as_ref()) {
                    b"si" => current = Some(String::new()),
                    b"t" if current.is_some() => in_text = true,
                    b"rPh" => {
                        reader.read_to_end_into(e.name(), &mut Vec::new())?;
                    }
                    _ => {}
                },
                Event::Empty(e) if local_name(e.name().as_ref()) == b"si" => {
                    items.push(String::new());
                }
                Event::End(e) => match local_name(e.name().as_ref()) {
                    b"si" => items.extend(current.take()),
                    b"t" => in_text = false,
                    _ => {}
                },
                Event::Text(e) if in_text => {
                    if let Some(text) = current.as_mut() {
                        text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) if in_text => {
                    if let Some(text) = current.as_mut() {
                        text.push_str(std::str::from_utf8(e.as_ref())?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            index.entry(item.clone()).or_insert(i as u32);
        }
        Ok(Self {
            items,
            index,
            appended: Vec::new(),
            references: 0,
        })
    }

    pub fn get(&self, idx: u32) -> Option<&str> {
        let idx = idx as usize;
        match idx.checked_sub(self.items.len()) {
            None => self.items.get(idx).map(String::as_str),
            Some(extra) => self.appended.get(extra).map(String::as_str),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len() + self.appended.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of `text`, appending a plain item when the table does not have one yet.
    pub fn get_or_insert(&mut self, text: &str) -> u32 {
        self.references += 1;
        if let Some(idx) = self.index.get(text) {
            return *idx;
        }
        let idx = self.len() as u32;
        self.appended.push(text.to_string());
        self.index.insert(text.to_string(), idx);
        idx
    }

    pub fn is_dirty(&self) -> bool {
        !self.appended.is_empty()
    }

    /// Forget reference counts gathered by a previous save.
    pub(crate) fn reset_references(&mut self) {
        self.references = 0;
    }

    /// Rewrite `original` with the appended items and refreshed counts.
    pub fn write(&self, original: Option<&[u8]>) -> Result<Vec<u8>, XlsxError> {
        let mut doc = match original {
            Some(bytes) => XmlDocument::parse(bytes)?,
            None => XmlDocument {
                prolog: crate::XML_DECLARATION.to_string(),
                root: {
                    let mut sst = XmlElement::new("sst");
                    sst.set_attr("xmlns", crate::SPREADSHEETML_NS);
                    sst
                },
            },
        };
        for text in &self.appended {
            let mut si = doc.root.sibling_named("si");
            let mut t = doc.root.sibling_named("t");
            if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
                t.set_attr("xml:space", "preserve");
            }
            t.children.push(XmlNode::Text(text.clone()));
            si.push_element(t);
            doc.root.push_element(si);
        }
        let unique = self.len() as u32;
        doc.root
            .set_attr("count", self.references.max(unique).to_string());
        doc.root.set_attr("uniqueCount", unique.to_string());
        Ok(doc.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>Bag</t></si><si><r><rPr><b/></rPr><t>Total </t></r><r><t>Weight</t></r><rPh sb="0" eb="1"><t>x</t></rPh></si><si/></sst>"#;

    #[test]
    fn reads_plain_rich_and_empty_items() {
        let sst = SharedStrings::parse(SST.as_bytes()).unwrap();
        assert_eq!(sst.len(), 3);
        assert_eq!(sst.get(0), Some("Bag"));
        assert_eq!(sst.get(1), Some("Total Weight"));
        assert_eq!(sst.get(2), Some(""));
        assert_eq!(sst.get(3), None);
    }

    #[test]
    fn appends_new_items_and_keeps_rich_text() {
        let mut sst = SharedStrings::parse(SST.as_bytes()).unwrap();
        assert_eq!(sst.get_or_insert("Bag"), 0);
        assert_eq!(sst.get_or_insert("12 Bags"), 3);
        assert_eq!(sst.get_or_insert("12 Bags"), 3);
        assert!(sst.is_dirty());

        let written = sst.write(Some(SST.as_bytes())).unwrap();
        let text = String::from_utf8(written.clone()).unwrap();
        assert!(text.contains("<b/>"));
        assert!(text.contains(r#"uniqueCount="4""#));

        let reread = SharedStrings::parse(&written).unwrap();
        assert_eq!(reread.get(3), Some("12 Bags"));
    }
}
