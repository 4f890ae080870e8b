//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document is a valid configuration:
//!
//! ```toml
//! max_bags = 500
//! number_format = "#,##0.00"
//! locale = "de-DE"
//!
//! [weight_font]
//! name = "Arial"
//! size = 10.0
//!
//! [render]
//! page_size = "letter"
//!
//! [templates.export]
//! weight_column = "H"
//! start_row = 12
//! total_row = 40
//! totals_cell = "H41"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tally_format::Locale;
use tally_model::MAX_ROWS;
use thiserror::Error;

use crate::template::{BandLayout, TemplateDescriptor};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Hard ceiling on the number of bags a request may ask for.
    pub max_bags: u32,
    /// Full re-draws attempted before the distributor clamps the final bag.
    pub max_retries: u32,
    /// Extra percentage points allowed on the final bag's variation.
    pub tolerance_percent: f64,
    /// Number format applied to weight and totals cells.
    pub number_format: String,
    /// Number format applied to the date anchor when its style has no date format.
    pub date_format: String,
    pub locale: String,
    pub weight_font: WeightFont,
    pub render: RenderConfig,
    /// Template descriptors merged over the built-in registry.
    pub templates: BTreeMap<String, TemplateDescriptor>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_bags: 1000,
            max_retries: 50,
            tolerance_percent: 0.0,
            number_format: "#,##0.00".to_string(),
            date_format: "yyyy-mm-dd".to_string(),
            locale: "en-US".to_string(),
            weight_font: WeightFont::default(),
            render: RenderConfig::default(),
            templates: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bags == 0 {
            return Err(ConfigError::Invalid("max_bags must be at least 1".into()));
        }
        if self.max_bags > MAX_ROWS {
            return Err(ConfigError::Invalid(format!(
                "max_bags must not exceed the sheet's {MAX_ROWS} rows, got {}",
                self.max_bags
            )));
        }
        if !self.tolerance_percent.is_finite() || self.tolerance_percent < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tolerance_percent must be a non-negative number, got {}",
                self.tolerance_percent
            )));
        }
        if Locale::from_id(&self.locale).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unsupported locale {:?}",
                self.locale
            )));
        }
        if !(self.weight_font.size > 0.0 && self.weight_font.size <= 409.0) {
            return Err(ConfigError::Invalid(format!(
                "weight_font.size must be within (0, 409], got {}",
                self.weight_font.size
            )));
        }
        if !tally_format::is_date_format(&self.date_format) {
            return Err(ConfigError::Invalid(format!(
                "date_format {:?} does not render a date",
                self.date_format
            )));
        }
        for (name, descriptor) in &self.templates {
            BandLayout::resolve(name, descriptor)
                .map_err(|err| ConfigError::Invalid(format!("templates.{name}: {err}")))?;
        }
        Ok(())
    }

    /// Locale used for display strings. Unknown ids fall back to `en-US`.
    pub fn locale(&self) -> Locale {
        Locale::from_id(&self.locale).unwrap_or_default()
    }
}

/// Font applied to generated weight values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeightFont {
    /// Font name; `None` keeps the name of the cloned cell style.
    pub name: Option<String>,
    /// Size in points.
    pub size: f64,
}

impl Default for WeightFont {
    fn default() -> Self {
        Self {
            name: None,
            size: 9.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    A4,
    Letter,
}

impl PageSize {
    /// Text lines per page.
    pub const fn lines(self) -> usize {
        match self {
            PageSize::A4 => 60,
            PageSize::Letter => 55,
        }
    }

    /// Character columns per line.
    pub const fn columns(self) -> usize {
        match self {
            PageSize::A4 => 100,
            PageSize::Letter => 95,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub page_size: PageSize,
    pub include_header: bool,
    pub include_footer: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            include_header: true,
            include_footer: true,
        }
    }
}
