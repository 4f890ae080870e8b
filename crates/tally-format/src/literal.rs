/// One unit of a format-code section after quoting and escapes are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    /// Text rendered as-is.
    Literal(String),
    /// An unquoted character with formatting meaning (`0`, `#`, `,`, `.`, `%`, `y`, ...).
    Code(char),
}

/// Split a format code into its `;`-separated sections, ignoring separators inside quotes.
pub(crate) fn split_sections(code: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (idx, ch) in code.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if !in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                sections.push(&code[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    sections.push(&code[start..]);
    sections
}

pub(crate) fn tokenize(section: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut chars = section.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                let text: String = chars.by_ref().take_while(|c| *c != '"').collect();
                pieces.push(Piece::Literal(text));
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    pieces.push(Piece::Literal(next.to_string()));
                }
            }
            '_' => {
                chars.next();
                pieces.push(Piece::Literal(" ".to_string()));
            }
            '*' => {
                chars.next();
            }
            '[' => {
                let inner: String = chars.by_ref().take_while(|c| *c != ']').collect();
                if let Some(symbol) = currency_symbol(&inner) {
                    pieces.push(Piece::Literal(symbol.to_string()));
                }
            }
            '$' | '-' | '+' | '(' | ')' | ' ' => pieces.push(Piece::Literal(ch.to_string())),
            _ => pieces.push(Piece::Code(ch)),
        }
    }
    pieces
}

/// `[$€-407]` carries a currency symbol; color and condition brackets render nothing.
fn currency_symbol(bracket: &str) -> Option<&str> {
    let symbol = bracket.strip_prefix('$')?;
    let symbol = symbol.split_once('-').map_or(symbol, |(s, _)| s);
    (!symbol.is_empty()).then_some(symbol)
}

/// Concatenate pieces, rendering stray code characters literally.
pub(crate) fn render(pieces: &[Piece]) -> String {
    pieces
        .iter()
        .map(|p| match p {
            Piece::Literal(s) => s.clone(),
            Piece::Code(c) => c.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sections_respect_quotes() {
        assert_eq!(split_sections(r#"0.00" kg;x";-0.00"#), vec![r#"0.00" kg;x""#, "-0.00"]);
    }

    #[test]
    fn literals_are_resolved() {
        let pieces = tokenize(r#"[Red][$€-407]0\k"g"_)*-"#);
        assert_eq!(
            pieces,
            vec![
                Piece::Literal("€".to_string()),
                Piece::Code('0'),
                Piece::Literal("k".to_string()),
                Piece::Literal("g".to_string()),
                Piece::Literal(" ".to_string()),
            ]
        );
    }
}
