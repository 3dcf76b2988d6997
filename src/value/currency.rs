//! Fixed-point currency
//!
//! Four decimal places stored as a scaled 64-bit integer. Text conversion is
//! locale independent: `.` is always the decimal separator and trailing
//! fractional zeros are dropped (`12.5`, `-0.0001`, `100`).

use std::fmt;
use std::str::FromStr;

use crate::constants::currency::{DECIMALS, SCALE};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Currency(i64);

impl Currency {
    pub const ZERO: Currency = Currency(0);

    /// Build from raw ten-thousandths.
    pub const fn from_scaled(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw ten-thousandths.
    pub const fn scaled(self) -> i64 {
        self.0
    }

    /// Whole units, `None` on overflow.
    pub fn from_units(units: i64) -> Option<Self> {
        units.checked_mul(SCALE).map(Self)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.unsigned_abs();
        let scale = SCALE.unsigned_abs();
        let (whole, frac) = (abs / scale, abs % scale);
        if self.0 < 0 {
            f.write_str("-")?;
        }
        write!(f, "{whole}")?;
        if frac != 0 {
            let digits = format!("{frac:0width$}", width = DECIMALS);
            write!(f, ".{}", digits.trim_end_matches('0'))?;
        }
        Ok(())
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::format(format!("invalid currency text '{s}'"));

        let text = s.trim();
        let (negative, unsigned) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };

        // Keep four places; the fifth rounds half away from zero.
        let mut kept = 0i64;
        for (i, digit) in frac.bytes().take(DECIMALS).enumerate() {
            kept += i64::from(digit - b'0') * 10i64.pow((DECIMALS - 1 - i) as u32);
        }
        if frac.as_bytes().get(DECIMALS).is_some_and(|d| *d >= b'5') {
            kept += 1;
        }

        // Signed before narrowing so i64::MIN fits.
        let magnitude = whole
            .checked_mul(i128::from(SCALE))
            .and_then(|w| w.checked_add(i128::from(kept)))
            .ok_or_else(invalid)?;
        let raw = if negative { -magnitude } else { magnitude };
        i64::try_from(raw).map(Self).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_trims_fraction() {
        assert_eq!(Currency::from_scaled(125_000).to_string(), "12.5");
        assert_eq!(Currency::from_scaled(1_000_000).to_string(), "100");
        assert_eq!(Currency::from_scaled(-1).to_string(), "-0.0001");
        assert_eq!(Currency::from_scaled(12_345).to_string(), "1.2345");
        assert_eq!(Currency::ZERO.to_string(), "0");
    }

    #[test]
    fn test_parse_plain_and_signed() {
        assert_eq!("12.5".parse::<Currency>().unwrap(), Currency::from_scaled(125_000));
        assert_eq!("-3".parse::<Currency>().unwrap(), Currency::from_scaled(-30_000));
        assert_eq!("+0.25".parse::<Currency>().unwrap(), Currency::from_scaled(2_500));
        assert_eq!(".5".parse::<Currency>().unwrap(), Currency::from_scaled(5_000));
        assert_eq!(" 7 ".parse::<Currency>().unwrap(), Currency::from_scaled(70_000));
    }

    #[test]
    fn test_parse_rounds_fifth_decimal() {
        assert_eq!("0.00005".parse::<Currency>().unwrap(), Currency::from_scaled(1));
        assert_eq!("0.00004".parse::<Currency>().unwrap(), Currency::from_scaled(0));
        assert_eq!("-1.23456".parse::<Currency>().unwrap(), Currency::from_scaled(-12_346));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Currency>().is_err());
        assert!("-".parse::<Currency>().is_err());
        assert!("1,5".parse::<Currency>().is_err());
        assert!("1.2.3".parse::<Currency>().is_err());
        assert!("abc".parse::<Currency>().is_err());
        assert!("99999999999999999999".parse::<Currency>().is_err());
        assert!("922337203685477.5808".parse::<Currency>().is_err());
        assert!("-922337203685477.5809".parse::<Currency>().is_err());
    }

    #[test]
    fn test_display_parse_agree_at_extremes() {
        for raw in [i64::MAX, i64::MIN, 1, -1, 9_999, -10_000] {
            let c = Currency::from_scaled(raw);
            assert_eq!(c.to_string().parse::<Currency>().unwrap(), c, "raw={raw}");
        }
    }

    #[test]
    fn test_parse_smallest_value() {
        assert_eq!(
            "-922337203685477.5808".parse::<Currency>().unwrap(),
            Currency::from_scaled(i64::MIN)
        );
    }

    #[test]
    fn test_from_units() {
        assert_eq!(Currency::from_units(3), Some(Currency::from_scaled(30_000)));
        assert_eq!(Currency::from_units(i64::MAX), None);
        assert_eq!(Currency::from_units(2).unwrap().to_f64(), 2.0);
    }
}
