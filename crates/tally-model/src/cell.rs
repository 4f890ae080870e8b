use serde::{Deserialize, Serialize};

use crate::{CellValue, Range};

/// Formula attached to a cell. The text is stored without the leading `=`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<SharedFormula>,
    /// Target range of an array formula.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_range: Option<Range>,
}

impl Formula {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let text = text.strip_prefix('=').map(str::to_string).unwrap_or(text);
        Self {
            text,
            shared: None,
            array_range: None,
        }
    }
}

/// Membership in a shared formula group. Only the master cell carries text and `range`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SharedFormula {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<Formula>,
    /// Id into the document's [`crate::StyleTable`].
    #[serde(default)]
    pub style_id: u32,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn with_style(mut self, style_id: u32) -> Self {
        self.style_id = style_id;
        self
    }

    /// A cell with no value, no formula and the default style can be dropped from storage.
    pub fn is_truly_empty(&self) -> bool {
        self.value.is_empty() && self.formula.is_none() && self.style_id == 0
    }

    /// Fresh cell carrying only this cell's style.
    pub fn clone_style_only(&self) -> Self {
        Self {
            style_id: self.style_id,
            ..Self::default()
        }
    }

    /// Reset value and formula, keeping the style.
    pub fn clear_contents(&mut self) {
        self.value = CellValue::Empty;
        self.formula = None;
    }
}
