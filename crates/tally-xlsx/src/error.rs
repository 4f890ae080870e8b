use thiserror::Error;

/// Anything that keeps a workbook from being loaded or written back.
#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip container: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed xml: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("malformed xml attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("part is not utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("element is missing its {0} attribute")]
    MissingAttr(&'static str),
    #[error("workbook has no {0} part")]
    MissingPart(String),
    #[error("unsupported workbook: {0}")]
    Invalid(String),
    #[error("not an .xlsx workbook (no zip container found)")]
    NotAWorkbook,
    #[error("workbook is password-protected; save an unprotected copy first")]
    PasswordProtected,
    /// A single part inflates past [`crate::PackageLimits::max_part_bytes`].
    #[error("{part} inflates to {size} bytes, over the {max} byte part limit")]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("workbook inflates to {total} bytes, over the {max} byte package limit")]
    PackageTooLarge { total: u64, max: u64 },
}
