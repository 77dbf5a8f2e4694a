use std::{fmt, sync::Arc};

/// Canonical key for a Berlin voting district (Wahlbezirk):
/// 2-digit borough code followed by the 3-digit sub-district code, e.g. "01002".
///
/// The district polygon dataset carries this form natively; every other source
/// (station points, results spreadsheet, density blocks) must be normalized
/// into it before joining. Keep the original text (with leading zeros) but
/// avoid repeated owned Strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationKey {
    id: Arc<str>,
}

impl StationKey {
    /// Normalize a combined key column ("01002", "01-002", "01 / 002", ...).
    /// Strips every non-digit character; the remainder must be exactly the
    /// 5 digits of borough + sub-district. Anything else is not a key.
    pub fn from_combined(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.len() {
            5 => Some(Self { id: Arc::from(digits.as_str()) }),
            // Numeric columns lose the borough's leading zero ("1002" = "01002").
            4 => Some(Self { id: Arc::from(format!("0{digits}").as_str()) }),
            _ => None,
        }
    }

    /// Normalize split borough / sub-district columns ("01" + "002", "1" + "2", ...).
    /// Each side is stripped of non-digits and zero-padded to its canonical width.
    pub fn from_parts(borough: &str, unit: &str) -> Option<Self> {
        let b: String = borough.chars().filter(|c| c.is_ascii_digit()).collect();
        let u: String = unit.chars().filter(|c| c.is_ascii_digit()).collect();
        if b.is_empty() || b.len() > 2 || u.is_empty() || u.len() > 3 {
            return None;
        }
        Some(Self { id: Arc::from(format!("{b:0>2}{u:0>3}").as_str()) })
    }

    /// Normalize numeric id columns (spreadsheets often deliver these as floats).
    pub fn from_numeric(borough: f64, unit: f64) -> Option<Self> {
        if !borough.is_finite() || !unit.is_finite() || borough < 0.0 || unit < 0.0 {
            return None;
        }
        Self::from_parts(&format!("{}", borough as u64), &format!("{}", unit as u64))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// The 2-digit borough prefix ("01" for Mitte, ... "12" for Reinickendorf).
    #[inline]
    pub fn borough(&self) -> &str {
        &self.id[..2]
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
