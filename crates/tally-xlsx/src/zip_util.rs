use std::io::Read;

use crate::XlsxError;

/// Largest single part we inflate into memory.
pub const DEFAULT_MAX_PART_BYTES: u64 = 256 * 1024 * 1024;

/// Largest total of inflated parts for one package.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024;

/// Inflation limits applied while reading a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageLimits {
    pub max_part_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

/// Running total of inflated bytes across a package.
#[derive(Debug)]
pub(crate) struct InflateBudget {
    limits: PackageLimits,
    used: u64,
}

impl InflateBudget {
    pub(crate) fn new(limits: PackageLimits) -> Self {
        Self { limits, used: 0 }
    }

    /// Inflate one entry, enforcing both the per-part and the package-wide limit.
    ///
    /// The declared size is only a fast path; the reader is capped so forged sizes cannot
    /// inflate past the limit.
    pub(crate) fn read_entry(
        &mut self,
        entry: &mut impl Read,
        name: &str,
        declared_size: u64,
    ) -> Result<Vec<u8>, XlsxError> {
        let max_part = self.limits.max_part_bytes;
        if declared_size > max_part {
            return Err(XlsxError::PartTooLarge {
                part: name.to_string(),
                size: declared_size,
                max: max_part,
            });
        }
        let remaining = self.limits.max_total_bytes.saturating_sub(self.used);
        let cap = max_part.min(remaining);

        let mut buf = Vec::with_capacity(declared_size.min(cap) as usize);
        entry.take(cap.saturating_add(1)).read_to_end(&mut buf)?;
        let size = buf.len() as u64;
        if size > max_part {
            return Err(XlsxError::PartTooLarge {
                part: name.to_string(),
                size,
                max: max_part,
            });
        }
        self.used = self.used.saturating_add(size);
        if self.used > self.limits.max_total_bytes {
            return Err(XlsxError::PackageTooLarge {
                total: self.used,
                max: self.limits.max_total_bytes,
            });
        }
        Ok(buf)
    }
}

/// Compare part names the way producers in the wild disagree on them: case-insensitively, with
/// `\` treated as `/`, leading separators ignored and `%XX` escapes decoded.
pub(crate) fn part_names_equivalent(a: &str, b: &str) -> bool {
    normalize_part_name(a) == normalize_part_name(b)
}

fn normalize_part_name(name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let mut b = bytes[i];
        i += 1;
        if b == b'%' {
            let hex = bytes.get(i..i + 2).and_then(|h| std::str::from_utf8(h).ok());
            if let Some(decoded) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                b = decoded;
                i += 2;
            }
        }
        let b = if b == b'\\' { b'/' } else { b.to_ascii_lowercase() };
        if b == b'/' && out.is_empty() {
            continue;
        }
        out.push(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn equivalent_names() {
        assert!(part_names_equivalent("XL\\Workbook.xml", "xl/workbook.xml"));
        assert!(part_names_equivalent("/xl/workbook.xml", "xl/workbook.xml"));
        assert!(part_names_equivalent("xl/worksheets/sheet%201.xml", "xl/worksheets/sheet 1.xml"));
        assert!(!part_names_equivalent("xl/worksheets/sheet1.xml", "xl/worksheets/sheet2.xml"));
    }

    #[test]
    fn budget_rejects_forged_sizes_and_totals() {
        let mut budget = InflateBudget::new(PackageLimits {
            max_part_bytes: 8,
            max_total_bytes: 12,
        });
        let err = budget
            .read_entry(&mut Cursor::new(b"123456789".to_vec()), "forged", 1)
            .unwrap_err();
        assert!(matches!(err, XlsxError::PartTooLarge { size: 9, .. }));

        let ok = budget
            .read_entry(&mut Cursor::new(b"12345678".to_vec()), "a", 8)
            .unwrap();
        assert_eq!(ok.len(), 8);

        let err = budget
            .read_entry(&mut Cursor::new(b"123456".to_vec()), "c", 6)
            .unwrap_err();
        assert!(matches!(err, XlsxError::PackageTooLarge { .. }));
    }
}
