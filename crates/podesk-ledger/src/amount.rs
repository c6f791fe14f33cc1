//! Decimal amount parsing at the intake/wire boundary.
//!
//! Amounts arrive as decimal strings (`"1500"`, `"1234.56"`) and are
//! converted to [`Micros`] without ever passing through `f64`.

use podesk_schemas::{Micros, MICROS_PER_UNIT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    Empty,
    Negative,
    /// Not `digits[.digits]`.
    Malformed(String),
    /// More than 6 fractional digits; rounding would be ambiguous.
    TooPrecise,
    Overflow,
}

impl std::fmt::Display for AmountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmountError::Empty => write!(f, "amount: empty input"),
            AmountError::Negative => write!(f, "amount: negative values are not allowed"),
            AmountError::Malformed(s) => write!(f, "amount: invalid decimal '{s}'"),
            AmountError::TooPrecise => write!(f, "amount: more than 6 decimal places"),
            AmountError::Overflow => write!(f, "amount: out of range"),
        }
    }
}

impl std::error::Error for AmountError {}

/// Parse a non-negative decimal string into micros.
///
/// Accepts an optional leading `+` and either `.` or `,` as the decimal
/// separator. Rejects negatives and anything finer than 1e-6.
pub fn parse_amount(s: &str) -> Result<Micros, AmountError> {
    let t = s.trim();
    if t.is_empty() {
        return Err(AmountError::Empty);
    }
    let t = t.strip_prefix('+').unwrap_or(t);
    if t.starts_with('-') {
        return Err(AmountError::Negative);
    }

    let normalized = t.replace(',', ".");
    let mut parts = normalized.split('.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    if parts.next().is_some() {
        return Err(AmountError::Malformed(s.to_string()));
    }
    if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(AmountError::Malformed(s.to_string()));
    }

    let int_val: i64 = int_part.parse().map_err(|_| AmountError::Overflow)?;

    let frac_val = match frac_part {
        None | Some("") => 0,
        Some(frac) => {
            if !frac.chars().all(|c| c.is_ascii_digit()) {
                return Err(AmountError::Malformed(s.to_string()));
            }
            if frac.len() > 6 {
                return Err(AmountError::TooPrecise);
            }
            let padded = format!("{frac:0<6}");
            padded
                .parse::<i64>()
                .map_err(|_| AmountError::Malformed(s.to_string()))?
        }
    };

    int_val
        .checked_mul(MICROS_PER_UNIT)
        .and_then(|v| v.checked_add(frac_val))
        .map(Micros::new)
        .ok_or(AmountError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fractional() {
        assert_eq!(parse_amount("1500").unwrap(), Micros::from_units(1500));
        assert_eq!(parse_amount("1234.56").unwrap(), Micros::new(1_234_560_000));
        assert_eq!(parse_amount("+0.000001").unwrap(), Micros::new(1));
        assert_eq!(parse_amount("12,5").unwrap(), Micros::new(12_500_000));
        assert_eq!(parse_amount("7.").unwrap(), Micros::from_units(7));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_amount(" "), Err(AmountError::Empty));
        assert_eq!(parse_amount("-3"), Err(AmountError::Negative));
        assert_eq!(parse_amount("1.0000001"), Err(AmountError::TooPrecise));
        assert!(matches!(parse_amount("1.2.3"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_amount("abc"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_amount(".5"), Err(AmountError::Malformed(_))));
        assert_eq!(parse_amount("99999999999999999"), Err(AmountError::Overflow));
    }
}
