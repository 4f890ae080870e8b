//! Recalculation metadata for saved workbooks.
//!
//! Cached `<v>` values and `xl/calcChain.xml` go stale once rows move or formulas are rewritten.
//! The calc chain is dropped and a full calculation is requested on the next open.

use crate::openxml::{rels_part_name, REL_TYPE_CALC_CHAIN};
use crate::package::WORKBOOK_PART;
use crate::xml::{XmlDocument, XmlNode};
use crate::{XlsxError, XlsxPackage};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Workbook children that must follow `calcPr`.
const AFTER_CALC_PR: &[&str] = &[
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalcPolicy {
    /// Set `<calcPr fullCalcOnLoad="1"/>` in `xl/workbook.xml`.
    pub force_full_calc_on_load: bool,
    /// Remove `xl/calcChain.xml` with its relationship and content-type override.
    pub drop_calc_chain: bool,
}

impl RecalcPolicy {
    pub const PRESERVE: Self = Self {
        force_full_calc_on_load: false,
        drop_calc_chain: false,
    };
}

impl Default for RecalcPolicy {
    fn default() -> Self {
        Self {
            force_full_calc_on_load: true,
            drop_calc_chain: true,
        }
    }
}

pub(crate) fn apply_recalc_policy(
    package: &mut XlsxPackage,
    policy: RecalcPolicy,
) -> Result<(), XlsxError> {
    if policy.force_full_calc_on_load {
        if let Some(workbook) = package.part(WORKBOOK_PART) {
            let updated = workbook_force_full_calc_on_load(workbook)?;
            package.set_part(WORKBOOK_PART, updated);
        }
    }
    if policy.drop_calc_chain {
        drop_calc_chain(package)?;
    }
    Ok(())
}

fn workbook_force_full_calc_on_load(xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
    let mut doc = XmlDocument::parse(xml)?;
    match doc.root.child_mut("calcPr") {
        Some(calc_pr) => calc_pr.set_attr("fullCalcOnLoad", "1"),
        None => {
            let mut calc_pr = doc.root.sibling_named("calcPr");
            calc_pr.set_attr("fullCalcOnLoad", "1");
            let at = doc
                .root
                .children
                .iter()
                .position(|c| matches!(c, XmlNode::Element(e) if AFTER_CALC_PR.contains(&e.local())))
                .unwrap_or(doc.root.children.len());
            doc.root.children.insert(at, XmlNode::Element(calc_pr));
        }
    }
    Ok(doc.to_bytes())
}

fn drop_calc_chain(package: &mut XlsxPackage) -> Result<(), XlsxError> {
    let rels_name = rels_part_name(WORKBOOK_PART);
    let target = crate::openxml::find_related_part(package, WORKBOOK_PART, REL_TYPE_CALC_CHAIN)?
        .unwrap_or_else(|| "xl/calcChain.xml".to_string());
    if package.remove_part(&target).is_some() {
        log::debug!("dropped {target}");
    }

    if let Some(rels) = package.part(&rels_name) {
        let mut doc = XmlDocument::parse(rels)?;
        let before = doc.root.children.len();
        doc.root.children.retain(|c| match c {
            XmlNode::Element(e) if e.local() == "Relationship" => {
                e.attr("Type") != Some(REL_TYPE_CALC_CHAIN)
                    && !e.attr("Target").is_some_and(|t| t.ends_with("calcChain.xml"))
            }
            _ => true,
        });
        if doc.root.children.len() != before {
            package.set_part(&rels_name, doc.to_bytes());
        }
    }

    if let Some(types) = package.part(CONTENT_TYPES_PART) {
        let mut doc = XmlDocument::parse(types)?;
        let part_name = format!("/{target}");
        let before = doc.root.children.len();
        doc.root.children.retain(|c| match c {
            XmlNode::Element(e) if e.local() == "Override" => !e
                .attr("PartName")
                .is_some_and(|p| crate::zip_util::part_names_equivalent(p, &part_name)),
            _ => true,
        });
        if doc.root.children.len() != before {
            package.set_part(CONTENT_TYPES_PART, doc.to_bytes());
        }
    }
    Ok(())
}

/// Register a new part: a relationship from `owner` and a content-type override.
pub(crate) fn register_part(
    package: &mut XlsxPackage,
    owner: &str,
    part: &str,
    rel_type: &str,
    content_type: &str,
) -> Result<(), XlsxError> {
    let rels_name = rels_part_name(owner);
    let mut rels = match package.part(&rels_name) {
        Some(bytes) => XmlDocument::parse(bytes)?,
        None => XmlDocument::parse(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#,
        )?,
    };
    let mut n = rels.root.children_by_local("Relationship").count() + 1;
    let taken: Vec<String> = rels
        .root
        .children_by_local("Relationship")
        .filter_map(|r| r.attr("Id").map(str::to_string))
        .collect();
    while taken.contains(&format!("rId{n}")) {
        n += 1;
    }
    let owner_dir = owner.rsplit_once('/').map_or("", |(dir, _)| dir);
    let target = part
        .strip_prefix(owner_dir)
        .and_then(|t| t.strip_prefix('/'))
        .map_or_else(|| format!("/{part}"), str::to_string);
    let mut rel = rels.root.sibling_named("Relationship");
    rel.set_attr("Id", format!("rId{n}"));
    rel.set_attr("Type", rel_type);
    rel.set_attr("Target", target);
    rels.root.push_element(rel);
    package.set_part(&rels_name, rels.to_bytes());

    if let Some(types) = package.part(CONTENT_TYPES_PART) {
        let mut doc = XmlDocument::parse(types)?;
        let mut over = doc.root.sibling_named("Override");
        over.set_attr("PartName", format!("/{part}"));
        over.set_attr("ContentType", content_type);
        doc.root.push_element(over);
        package.set_part(CONTENT_TYPES_PART, doc.to_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimal::WorkbookBuilder;

    #[test]
    fn drops_calc_chain_and_requests_full_calc() {
        let bytes = WorkbookBuilder::new("Invoice")
            .with_calc_chain()
            .build()
            .unwrap();
        let mut pkg = XlsxPackage::from_bytes(&bytes).unwrap();
        assert!(pkg.has_part("xl/calcChain.xml"));

        apply_recalc_policy(&mut pkg, RecalcPolicy::default()).unwrap();

        assert!(!pkg.has_part("xl/calcChain.xml"));
        let rels = std::str::from_utf8(pkg.part("xl/_rels/workbook.xml.rels").unwrap()).unwrap();
        assert!(!rels.contains("calcChain"));
        let types = std::str::from_utf8(pkg.part("[Content_Types].xml").unwrap()).unwrap();
        assert!(!types.contains("calcChain"));
        let workbook = std::str::from_utf8(pkg.part("xl/workbook.xml").unwrap()).unwrap();
        assert!(workbook.contains(r#"<calcPr fullCalcOnLoad="1"/>"#), "{workbook}");
    }

    #[test]
    fn existing_calc_pr_keeps_its_attributes() {
        let xml = br#"<workbook xmlns="urn:s"><sheets/><calcPr calcId="191029"/><extLst/></workbook>"#;
        let out = String::from_utf8(workbook_force_full_calc_on_load(xml).unwrap()).unwrap();
        assert_eq!(
            out,
            r#"<workbook xmlns="urn:s"><sheets/><calcPr calcId="191029" fullCalcOnLoad="1"/><extLst/></workbook>"#
        );
    }

    #[test]
    fn preserve_policy_is_a_no_op() {
        let bytes = WorkbookBuilder::new("Invoice")
            .with_calc_chain()
            .build()
            .unwrap();
        let mut pkg = XlsxPackage::from_bytes(&bytes).unwrap();
        let before = pkg.clone();
        apply_recalc_policy(&mut pkg, RecalcPolicy::PRESERVE).unwrap();
        assert_eq!(pkg, before);
    }
}
