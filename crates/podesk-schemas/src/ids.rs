//! Order identifiers and allocation periods.
//!
//! The identifier format is bit-exact:
//!
//! ```text
//! CMD/<yyyy>/<mm>/<nnnn>     e.g. CMD/2025/03/0001
//! ```
//!
//! The sequence is zero-padded to 4 digits; it widens past 9999 rather than
//! wrapping. Because the canonical form contains `/`, HTTP paths use the
//! URL-safe spelling `CMD-2025-03-0001`; [`OrderId::parse`] accepts both.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const ORDER_ID_PREFIX: &str = "CMD";

// ---------------------------------------------------------------------------
// IdError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Period key is not `YYYY-MM` with a month in 1..=12.
    InvalidPeriod(String),
    /// Identifier does not match `CMD/YYYY/MM/NNNN`.
    InvalidOrderId(String),
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdError::InvalidPeriod(s) => write!(f, "invalid period '{s}': expected YYYY-MM"),
            IdError::InvalidOrderId(s) => {
                write!(f, "invalid order id '{s}': expected CMD/YYYY/MM/NNNN")
            }
        }
    }
}

impl std::error::Error for IdError {}

// ---------------------------------------------------------------------------
// YearMonth
// ---------------------------------------------------------------------------

/// Calendar period that scopes the sequence counter (`yearMonth` key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, IdError> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return Err(IdError::InvalidPeriod(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(d: NaiveDate) -> Self {
        Self {
            year: d.year(),
            month: d.month(),
        }
    }

    /// Parse a `YYYY-MM` period key.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let err = || IdError::InvalidPeriod(s.to_string());
        let (y, m) = s.trim().split_once('-').ok_or_else(err)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(err());
        }
        let year: i32 = y.parse().map_err(|_| err())?;
        let month: u32 = m.parse().map_err(|_| err())?;
        Self::new(year, month).map_err(|_| err())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Storage key, `YYYY-MM`.
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Globally unique, immutable order identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderId(String);

impl OrderId {
    /// Format an identifier from its period and sequence number.
    pub fn new(period: YearMonth, seq: i64) -> Self {
        Self(format!(
            "{ORDER_ID_PREFIX}/{:04}/{:02}/{:04}",
            period.year, period.month, seq
        ))
    }

    /// Parse either `CMD/YYYY/MM/NNNN` or the URL-safe `CMD-YYYY-MM-NNNN`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let err = || IdError::InvalidOrderId(s.to_string());
        let t = s.trim();
        let sep = if t.contains('/') { '/' } else { '-' };
        let parts: Vec<&str> = t.split(sep).collect();
        if parts.len() != 4 || parts[0] != ORDER_ID_PREFIX {
            return Err(err());
        }
        if parts[1].len() != 4 || parts[2].len() != 2 || parts[3].len() < 4 {
            return Err(err());
        }
        if !parts[1..].iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
            return Err(err());
        }
        let year: i32 = parts[1].parse().map_err(|_| err())?;
        let month: u32 = parts[2].parse().map_err(|_| err())?;
        let seq: i64 = parts[3].parse().map_err(|_| err())?;
        if seq <= 0 {
            return Err(err());
        }
        let period = YearMonth::new(year, month).map_err(|_| err())?;
        Ok(Self::new(period, seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `CMD-YYYY-MM-NNNN`, safe to embed in a URL path segment.
    pub fn url_form(&self) -> String {
        self.0.replace('/', "-")
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrderId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        OrderId::parse(&s)
    }
}

impl From<OrderId> for String {
    fn from(id: OrderId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bit_exact() {
        let p = YearMonth::parse("2025-03").unwrap();
        assert_eq!(OrderId::new(p, 1).as_str(), "CMD/2025/03/0001");
        assert_eq!(OrderId::new(p, 42).as_str(), "CMD/2025/03/0042");
        assert_eq!(OrderId::new(p, 12345).as_str(), "CMD/2025/03/12345");
    }

    #[test]
    fn parses_both_spellings() {
        let a = OrderId::parse("CMD/2025/05/0002").unwrap();
        let b = OrderId::parse("CMD-2025-05-0002").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.url_form(), "CMD-2025-05-0002");
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in [
            "",
            "CMD/2025/5/0001",
            "PO/2025/05/0001",
            "CMD/2025/13/0001",
            "CMD/2025/05/01",
            "CMD/2025/05/0000",
        ] {
            assert!(OrderId::parse(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn period_parse_and_key() {
        let p = YearMonth::parse("2025-05").unwrap();
        assert_eq!(p.key(), "2025-05");
        assert!(YearMonth::parse("2025-5").is_err());
        assert!(YearMonth::parse("2025-00").is_err());
        assert!(YearMonth::parse("25-05").is_err());
    }
}
