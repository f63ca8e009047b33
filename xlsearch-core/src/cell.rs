//! Cell values and row text

use serde::{Deserialize, Serialize};

/// Integral floats below this magnitude render without a fractional part.
const INTEGRAL_LIMIT: f64 = 1e15;

/// A single spreadsheet cell as yielded by a [`crate::reader::Workbook`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    /// Any other scalar (booleans, dates, durations) already rendered as text.
    Other(String),
}

impl CellValue {
    /// Searchable text of this cell, or `None` when it contributes nothing.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(s) | Self::Other(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Self::Number(n) => Some(format_number(*n)),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Render a number without float artifacts: `3.0` becomes `3`, `0.1` stays `0.1`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < INTEGRAL_LIMIT {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Join the non-empty cells of a row with single spaces, in column order.
pub fn join_row(cells: &[CellValue]) -> String {
    cells
        .iter()
        .filter_map(CellValue::to_text)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-7.0), "-7");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(1234.5), "1234.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_join_row_skips_empty_cells() {
        let row = vec![
            CellValue::from("Widget"),
            CellValue::Empty,
            CellValue::from(3.0),
            CellValue::Text("   ".to_string()),
            CellValue::Other("TRUE".to_string()),
        ];
        assert_eq!(join_row(&row), "Widget 3 TRUE");
    }

    #[test]
    fn test_join_row_all_empty() {
        assert_eq!(join_row(&[CellValue::Empty, CellValue::Empty]), "");
        assert_eq!(join_row(&[]), "");
    }
}
