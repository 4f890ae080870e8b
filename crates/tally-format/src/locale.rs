/// Separators used when rendering numbers and dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locale {
    pub id: &'static str,
    pub decimal_sep: char,
    pub thousands_sep: char,
    /// Replaces `/` in date codes.
    pub date_sep: char,
}

impl Locale {
    pub const fn en_us() -> Self {
        Self {
            id: "en-US",
            decimal_sep: '.',
            thousands_sep: ',',
            date_sep: '/',
        }
    }

    pub const fn en_gb() -> Self {
        Self {
            id: "en-GB",
            ..Self::en_us()
        }
    }

    pub const fn de_de() -> Self {
        Self {
            id: "de-DE",
            decimal_sep: ',',
            thousands_sep: '.',
            date_sep: '.',
        }
    }

    /// French uses a no-break space for grouping.
    pub const fn fr_fr() -> Self {
        Self {
            id: "fr-FR",
            decimal_sep: ',',
            thousands_sep: '\u{00A0}',
            date_sep: '/',
        }
    }

    pub const fn it_it() -> Self {
        Self {
            id: "it-IT",
            decimal_sep: ',',
            thousands_sep: '.',
            date_sep: '/',
        }
    }

    pub const fn es_es() -> Self {
        Self {
            id: "es-ES",
            ..Self::it_it()
        }
    }

    /// Look up a locale by tag (`de-DE`, `de_DE.UTF-8`, `fr`).
    pub fn from_id(id: &str) -> Option<Self> {
        Some(match normalize_locale_id(id)? {
            "en-US" => Self::en_us(),
            "en-GB" => Self::en_gb(),
            "de-DE" => Self::de_de(),
            "fr-FR" => Self::fr_fr(),
            "it-IT" => Self::it_it(),
            "es-ES" => Self::es_es(),
            _ => return None,
        })
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::en_us()
    }
}

/// Canonical tag for a supported locale, accepting `_` for `-`, any case, POSIX encoding
/// suffixes and bare language codes.
pub fn normalize_locale_id(id: &str) -> Option<&'static str> {
    let mut key = id.trim().replace('_', "-").to_ascii_lowercase();
    if let Some(idx) = key.find(['.', '@']) {
        key.truncate(idx);
    }
    if key.is_empty() {
        return None;
    }

    let exact = match key.as_str() {
        "en-us" => Some("en-US"),
        "en-gb" | "en-uk" => Some("en-GB"),
        "de-de" => Some("de-DE"),
        "fr-fr" => Some("fr-FR"),
        "it-it" => Some("it-IT"),
        "es-es" => Some("es-ES"),
        _ => None,
    };
    exact.or_else(|| match key.split('-').next().unwrap_or_default() {
        "en" => Some("en-US"),
        "de" => Some("de-DE"),
        "fr" => Some("fr-FR"),
        "it" => Some("it-IT"),
        "es" => Some("es-ES"),
        _ => None,
    })
}
