use core::fmt;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// ARGB color, serialized as `#AARRGGBB`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Color {
    pub argb: u32,
}

impl Color {
    pub const fn new_argb(argb: u32) -> Self {
        Self { argb }
    }

    /// Parse `AARRGGBB` or `RRGGBB` hex (optionally `#`-prefixed). Six digits imply opaque alpha.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        let argb = u32::from_str_radix(hex, 16).ok()?;
        match hex.len() {
            8 => Some(Self { argb }),
            6 => Some(Self {
                argb: 0xFF00_0000 | argb,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08X}", self.argb)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color `{value}`"))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Font {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in hundredths of a point (`900` is 9pt).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_100pt: Option<u16>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl Font {
    /// Size in points, if the font declares one.
    pub fn size_pt(&self) -> Option<f64> {
        self.size_100pt.map(|s| f64::from(s) / 100.0)
    }

    /// Convert a point size to the stored representation, clamped to what a `u16` holds.
    pub fn size_from_pt(pt: f64) -> u16 {
        (pt * 100.0).round().clamp(1.0, f64::from(u16::MAX)) as u16
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fill {
    /// Pattern type (`solid`, `gray125`, ...). `None` means no fill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<Color>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderStyle {
    #[default]
    None,
    Thin,
    Medium,
    Thick,
    Dashed,
    Dotted,
    Double,
    /// Any other line style the container knows about.
    Other,
}

impl BorderStyle {
    pub fn from_ooxml(s: &str) -> Self {
        match s {
            "" | "none" => BorderStyle::None,
            "thin" | "hair" => BorderStyle::Thin,
            "medium" => BorderStyle::Medium,
            "thick" => BorderStyle::Thick,
            "dashed" | "mediumDashed" => BorderStyle::Dashed,
            "dotted" => BorderStyle::Dotted,
            "double" => BorderStyle::Double,
            _ => BorderStyle::Other,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Border {
    #[serde(default)]
    pub left: BorderStyle,
    #[serde(default)]
    pub right: BorderStyle,
    #[serde(default)]
    pub top: BorderStyle,
    #[serde(default)]
    pub bottom: BorderStyle,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlignment {
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
}

impl HorizontalAlignment {
    pub fn from_ooxml(s: &str) -> Option<Self> {
        Some(match s {
            "general" => HorizontalAlignment::General,
            "left" => HorizontalAlignment::Left,
            "center" | "centerContinuous" => HorizontalAlignment::Center,
            "right" => HorizontalAlignment::Right,
            "fill" => HorizontalAlignment::Fill,
            "justify" | "distributed" => HorizontalAlignment::Justify,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal: Option<HorizontalAlignment>,
    #[serde(default)]
    pub wrap_text: bool,
}

/// Shared, immutable formatting descriptor referenced by cells through a style id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Style {
    #[serde(default)]
    pub font: Font,
    #[serde(default)]
    pub fill: Fill,
    #[serde(default)]
    pub border: Border,
    #[serde(default)]
    pub alignment: Alignment,
    /// Number format code (`#,##0.00`). `None` is the container's general format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
}

/// Style table of a document.
///
/// Styles read from the source document keep their position, so a loaded style id is the
/// container's own style index. Styles created later are *derived*: each records the loaded style
/// it was cloned from so a writer can start from the source definition and only change the
/// attributes the model tracks.
#[derive(Clone, Debug, PartialEq)]
pub struct StyleTable {
    styles: Vec<Style>,
    bases: Vec<Option<u32>>,
    derived: HashMap<(u32, Style), u32>,
}

impl Default for StyleTable {
    fn default() -> Self {
        Self::from_loaded(Vec::new())
    }
}

impl StyleTable {
    /// Build a table from the styles found in a source document. An empty list gets a default style
    /// so that style id 0 always exists.
    pub fn from_loaded(mut styles: Vec<Style>) -> Self {
        if styles.is_empty() {
            styles.push(Style::default());
        }
        let bases = vec![None; styles.len()];
        Self {
            styles,
            bases,
            derived: HashMap::new(),
        }
    }

    pub fn get(&self, id: u32) -> Option<&Style> {
        self.styles.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Number of styles that came from the source document.
    pub fn loaded_len(&self) -> usize {
        self.bases.iter().take_while(|b| b.is_none()).count()
    }

    /// Return a style id for `style` derived from `base`.
    ///
    /// Returns `base` itself when nothing changed. Identical derivations of the same base share a
    /// single id. A derived base is resolved to the loaded style it came from.
    pub fn derive(&mut self, base: u32, style: Style) -> u32 {
        let base = self.root_of(base);
        if self.get(base) == Some(&style) {
            return base;
        }
        if let Some(id) = self.derived.get(&(base, style.clone())) {
            return *id;
        }
        let id = self.styles.len() as u32;
        self.styles.push(style.clone());
        self.bases.push(Some(base));
        self.derived.insert((base, style), id);
        id
    }

    /// Loaded style a derived style was cloned from, or `None` for loaded styles.
    pub fn base_of(&self, id: u32) -> Option<u32> {
        self.bases.get(id as usize).copied().flatten()
    }

    /// Derived styles in creation order as `(id, base, style)`.
    pub fn derived_styles(&self) -> impl Iterator<Item = (u32, u32, &Style)> + '_ {
        self.styles
            .iter()
            .zip(&self.bases)
            .enumerate()
            .filter_map(|(id, (style, base))| base.map(|b| (id as u32, b, style)))
    }

    fn root_of(&self, id: u32) -> u32 {
        match self.base_of(id) {
            Some(base) => base,
            None if (id as usize) < self.styles.len() => id,
            None => 0,
        }
    }
}
