//! Recognition of OLE compound files handed to the loader in place of a zip package.

use std::io::{Cursor, Read, Seek};

use crate::XlsxError;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub(crate) fn is_ole_container(bytes: &[u8]) -> bool {
    bytes.starts_with(&OLE_MAGIC)
}

/// Office wraps password-protected workbooks in an OLE file with an `EncryptedPackage` stream.
/// Any other compound file (a legacy `.xls`, for instance) is simply not a workbook we can read.
pub(crate) fn classify_ole_container(bytes: &[u8]) -> XlsxError {
    let Ok(mut ole) = cfb::CompoundFile::open(Cursor::new(bytes)) else {
        return XlsxError::NotAWorkbook;
    };
    if stream_exists(&mut ole, "EncryptedPackage") {
        log::debug!("input is an encrypted OOXML package");
        XlsxError::PasswordProtected
    } else {
        XlsxError::NotAWorkbook
    }
}

fn stream_exists<R: Read + Seek>(ole: &mut cfb::CompoundFile<R>, name: &str) -> bool {
    ole.open_stream(name).is_ok() || ole.open_stream(format!("/{name}")).is_ok()
}
