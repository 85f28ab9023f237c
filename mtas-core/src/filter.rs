//! Value filters and split index selections

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// A string filter applied to computed values.
///
/// Filters always run in a fixed order regardless of how they were listed:
/// case first, then ASCII folding. The item prefix is applied last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Uppercase,
    Lowercase,
    Ascii,
    /// Keep only selected segments of a `textSplit` value.
    SplitSelect(IndexSelection),
}

impl Filter {
    /// Parse a single builtin filter expression.
    pub fn parse_builtin(expr: &str) -> Result<Option<Self>, ConfigError> {
        let expr = expr.trim();
        Ok(match expr {
            "uppercase" => Some(Filter::Uppercase),
            "lowercase" => Some(Filter::Lowercase),
            "ascii" => Some(Filter::Ascii),
            _ => match expr
                .strip_prefix("split(")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                Some(inner) => Some(Filter::SplitSelect(IndexSelection::parse(inner)?)),
                None => None,
            },
        })
    }

    pub fn is_split(&self) -> bool {
        matches!(self, Filter::SplitSelect(_))
    }
}

/// Split a filter list on commas that are not inside parentheses.
pub fn split_filter_list(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Inclusive index ranges, e.g. `0,2-4`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSelection {
    pub ranges: Vec<(usize, usize)>,
}

impl IndexSelection {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "split".to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let mut ranges = Vec::new();
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = match part.split_once('-') {
                Some((start, end)) => {
                    let start = start.trim().parse().map_err(|_| invalid("bad range start"))?;
                    let end = end.trim().parse().map_err(|_| invalid("bad range end"))?;
                    if end < start {
                        return Err(invalid("range end before start"));
                    }
                    (start, end)
                }
                None => {
                    let index = part.parse().map_err(|_| invalid("bad index"))?;
                    (index, index)
                }
            };
            ranges.push(range);
        }
        if ranges.is_empty() {
            return Err(invalid("empty selection"));
        }
        Ok(Self { ranges })
    }

    pub fn contains(&self, index: usize) -> bool {
        self.ranges
            .iter()
            .any(|(start, end)| (*start..=*end).contains(&index))
    }
}

/// Apply case and ASCII filters, then the prefix.
pub fn apply_filters(value: &str, filters: &[Filter], prefix: Option<&str>) -> String {
    let mut result = value.to_string();
    if filters.contains(&Filter::Uppercase) {
        result = result.to_uppercase();
    } else if filters.contains(&Filter::Lowercase) {
        result = result.to_lowercase();
    }
    if filters.contains(&Filter::Ascii) {
        result = ascii_fold(&result);
    }
    match prefix {
        Some(prefix) => format!("{}{}", prefix, result),
        None => result,
    }
}

/// Fold accented and ligature characters to plain ASCII where a mapping is known.
pub fn ascii_fold(value: &str) -> String {
    let mut folded = String::with_capacity(value.len());
    for c in value.nfd().filter(|c| !is_combining_mark(*c)) {
        match c {
            'ß' => folded.push_str("ss"),
            'æ' => folded.push_str("ae"),
            'Æ' => folded.push_str("AE"),
            'œ' => folded.push_str("oe"),
            'Œ' => folded.push_str("OE"),
            'ø' => folded.push('o'),
            'Ø' => folded.push('O'),
            'ł' => folded.push('l'),
            'Ł' => folded.push('L'),
            'đ' | 'ð' => folded.push('d'),
            'Đ' | 'Ð' => folded.push('D'),
            'þ' => folded.push_str("th"),
            'Þ' => folded.push_str("TH"),
            other => folded.push(other),
        }
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_selection() {
        let selection = IndexSelection::parse("0, 2-4").unwrap();
        let kept: Vec<usize> = (0..6).filter(|i| selection.contains(*i)).collect();
        assert_eq!(kept, vec![0, 2, 3, 4]);
        assert!(IndexSelection::parse("4-2").is_err());
        assert!(IndexSelection::parse("x").is_err());
        assert!(IndexSelection::parse("").is_err());
    }

    #[test]
    fn test_split_filter_list_respects_parentheses() {
        assert_eq!(
            split_filter_list("uppercase, split(0,2-4),ascii"),
            vec!["uppercase", "split(0,2-4)", "ascii"]
        );
    }

    #[test]
    fn test_parse_builtin() {
        assert_eq!(Filter::parse_builtin("ascii").unwrap(), Some(Filter::Ascii));
        assert!(Filter::parse_builtin("split(1)").unwrap().unwrap().is_split());
        assert_eq!(Filter::parse_builtin("myfilter").unwrap(), None);
    }

    #[test]
    fn test_filter_order_is_fixed() {
        let filters = [Filter::Ascii, Filter::Uppercase];
        assert_eq!(apply_filters("café", &filters, Some("t_")), "t_CAFE");
    }

    #[test]
    fn test_ascii_fold_ligatures() {
        assert_eq!(ascii_fold("Straße œuvre Ærø"), "Strasse oeuvre AEro");
        assert_eq!(ascii_fold("naïve"), "naive");
    }
}
