use thiserror::Error;

use crate::types::Cents;

/// Errors produced while coercing a form amount into minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is not a number")]
    NotANumber,
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount exceeds the supported range")]
    TooLarge,
}

/// Converts a major-unit decimal string (for example `"19.99"`) into cents.
///
/// The conversion works on the decimal digits directly so no binary floating
/// point rounding is involved. Blank input counts as zero. A third fractional
/// digit rounds half up; further digits are ignored. The result is always
/// strictly positive.
pub fn parse_major_units(raw: &str) -> Result<Cents, AmountError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AmountError::NotPositive);
    }

    let (negative, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::NotANumber);
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(AmountError::NotANumber);
    }
    if negative {
        return Err(AmountError::NotPositive);
    }

    let mut cents: i64 = 0;
    for digit in whole.bytes() {
        cents = push_digit(cents, digit)?;
    }

    let mut fraction_digits = fraction.bytes();
    for _ in 0..2 {
        cents = push_digit(cents, fraction_digits.next().unwrap_or(b'0'))?;
    }
    if matches!(fraction_digits.next(), Some(b'5'..=b'9')) {
        cents = cents.checked_add(1).ok_or(AmountError::TooLarge)?;
    }

    if cents == 0 {
        return Err(AmountError::NotPositive);
    }

    Cents::try_from(cents).map_err(|_| AmountError::NotPositive)
}

fn push_digit(acc: i64, digit: u8) -> Result<i64, AmountError> {
    acc.checked_mul(10)
        .and_then(|value| value.checked_add(i64::from(digit - b'0')))
        .ok_or(AmountError::TooLarge)
}

/// Renders minor units in major units the way a form field shows them:
/// `1999` → `"19.99"`, `1950` → `"19.5"`, `20000` → `"200"`.
pub fn format_major_units(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let whole = abs / 100;
    let fraction = abs % 100;
    match fraction {
        0 => format!("{sign}{whole}"),
        f if f % 10 == 0 => format!("{sign}{whole}.{}", f / 10),
        f => format!("{sign}{whole}.{f:02}"),
    }
}

/// Formats minor units as US dollars with thousands separators, e.g. `$1,234.56`.
pub fn format_currency(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, ch) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{:02}", abs % 100)
}
