use std::io::Cursor;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::XlsxError;

pub(crate) const REL_TYPE_CALC_CHAIN: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
pub(crate) const REL_TYPE_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub(crate) const REL_TYPE_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case("external"))
    }
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`.
pub fn rels_part_name(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the relationship.
///
/// Absolute targets (`/xl/...`) are rooted at the package; relative ones are resolved against the
/// owning part's folder with `.` and `..` segments collapsed. Fragments are dropped.
pub fn resolve_target(base_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or_default();
    let (target, absolute) = match target.strip_prefix('/') {
        Some(rest) => (rest, true),
        None => (target, false),
    };

    let mut segments: Vec<&str> = if absolute {
        Vec::new()
    } else {
        base_part
            .rsplit_once('/')
            .map(|(dir, _)| dir.split('/').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Relationship") =>
            {
                let (mut id, mut type_uri, mut target, mut target_mode) = (None, None, None, None);
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?.into_owned();
                    match local_name(attr.key.as_ref()) {
                        b"Id" => id = Some(value),
                        b"Type" => type_uri = Some(value),
                        b"Target" => target = Some(value),
                        b"TargetMode" => target_mode = Some(value),
                        _ => {}
                    }
                }
                if let (Some(id), Some(type_uri), Some(target)) = (id, type_uri, target) {
                    out.push(Relationship {
                        id,
                        type_uri,
                        target,
                        target_mode,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Part name of the first relationship of `type_uri` owned by `owner`, if any.
pub(crate) fn find_related_part(
    package: &crate::XlsxPackage,
    owner: &str,
    type_uri: &str,
) -> Result<Option<String>, XlsxError> {
    let Some(rels) = package.part(&rels_part_name(owner)) else {
        return Ok(None);
    };
    Ok(parse_relationships(rels)?
        .into_iter()
        .find(|r| r.type_uri == type_uri && !r.is_external())
        .map(|r| resolve_target(owner, &r.target)))
}

/// Strip a namespace prefix: `x:row` -> `row`.
pub fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|b| *b == b':')
        .map_or(name, |idx| &name[idx + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolves_relative_and_absolute_targets() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../drawings/drawing1.xml#x"),
            "xl/drawings/drawing1.xml"
        );
        assert_eq!(rels_part_name("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
    }

    #[test]
    fn parses_relationship_entries() {
        let rels = br#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;
        let parsed = parse_relationships(rels).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].target, "worksheets/sheet1.xml");
        assert!(parsed[1].is_external());
    }

    proptest::proptest! {
        #[test]
        fn resolved_targets_stay_inside_the_package(
            base in "[a-z]{1,4}(/[a-z]{1,4}){0,3}\\.xml",
            target in "(/|\\.\\./|\\./)?([a-z.]{1,4}/){0,4}[a-z]{1,4}\\.xml",
        ) {
            let resolved = resolve_target(&base, &target);
            proptest::prop_assert!(!resolved.starts_with('/'), "{}", resolved);
            proptest::prop_assert!(
                resolved.split('/').all(|s| !s.is_empty() && s != "." && s != ".."),
                "{}",
                resolved
            );
        }
    }
}
