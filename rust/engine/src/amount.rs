use thiserror::Error;

/// Bet amount in ledger base units (the native token uses 18 decimals).
pub type Amount = u128;

/// Base units per whole token.
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

/// Table limits of the original deployment, used when the ledger cannot
/// report its own.
pub const DEFAULT_MIN_BET: Amount = ONE_TOKEN / 1_000; // 0.001
pub const DEFAULT_MAX_BET: Amount = ONE_TOKEN; // 1.0

const DECIMALS: u32 = 18;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount string: {0}")]
    Invalid(String),
    #[error("Amount has more than {DECIMALS} decimal places: {0}")]
    TooPrecise(String),
    #[error("Amount overflows the ledger base unit range: {0}")]
    Overflow(String),
}

/// Parses a decimal token string (e.g. `"0.01"`) into base units.
pub fn parse_amount(s: &str) -> Result<Amount, AmountError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AmountError::Invalid(s.to_string()));
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };

    if frac.len() as u32 > DECIMALS {
        return Err(AmountError::TooPrecise(s.to_string()));
    }
    if (!whole.is_empty() && !whole.bytes().all(|b| b.is_ascii_digit()))
        || !frac.bytes().all(|b| b.is_ascii_digit())
        || (whole.is_empty() && frac.is_empty())
    {
        return Err(AmountError::Invalid(s.to_string()));
    }

    let whole_units: Amount = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<Amount>()
            .map_err(|_| AmountError::Overflow(s.to_string()))?
    };
    let mut frac_units: Amount = 0;
    if !frac.is_empty() {
        frac_units = frac
            .parse::<Amount>()
            .map_err(|_| AmountError::Invalid(s.to_string()))?;
        frac_units *= 10u128.pow(DECIMALS - frac.len() as u32);
    }

    whole_units
        .checked_mul(ONE_TOKEN)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(|| AmountError::Overflow(s.to_string()))
}

/// Formats base units as a decimal token string with trailing zeros
/// trimmed (`10_000_000_000_000_000` -> `"0.01"`).
pub fn format_amount(amount: Amount) -> String {
    let whole = amount / ONE_TOKEN;
    let frac = amount % ONE_TOKEN;
    if frac == 0 {
        return whole.to_string();
    }
    let mut frac_str = format!("{frac:018}");
    while frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{whole}.{frac_str}")
}
