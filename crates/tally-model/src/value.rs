use serde::{Deserialize, Serialize};

/// Value stored in a cell.
///
/// Rich text runs and other exotic payloads are flattened to their plain text when loaded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Error literal such as `#REF!`.
    Error(String),
}

impl CellValue {
    #[inline]
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_can_be_read_from_text() {
        assert_eq!(CellValue::from("1,204.50").as_number(), Some(1204.5));
        assert_eq!(CellValue::from("n/a").as_number(), None);
        assert_eq!(CellValue::Boolean(true).as_number(), None);
    }

    #[test]
    fn serde_shape_is_tagged() {
        let json = serde_json::to_string(&CellValue::Number(2.5)).unwrap();
        assert_eq!(json, r#"{"type":"number","value":2.5}"#);
        let back: CellValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CellValue::Number(2.5));
    }
}
