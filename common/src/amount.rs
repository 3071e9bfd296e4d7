use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Fractional digits carried by every amount.
pub const AMOUNT_DECIMALS: u32 = 4;

/// Ten-thousandths per whole unit.
pub const AMOUNT_SCALE: u64 = 10u64.pow(AMOUNT_DECIMALS);

/// Smallest indivisible units (MIST) per SUI.
pub const MIST_PER_SUI: u64 = 1_000_000_000;

/// Largest accepted base amount in whole SUI (total supply).
pub const MAX_BASE_WHOLE: u64 = 10_000_000_000;

/// Inclusive range the random fractional suffix is drawn from. Excludes
/// suffixes with a leading zero so every generated key visibly differs from
/// the base amount.
pub const SUFFIX_MIN: u64 = 1000;
pub const SUFFIX_MAX: u64 = 9999;

/// Default bound on generation attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 64;

/// Fixed-point decimal with exactly four fractional digits.
///
/// Stored as a count of ten-thousandths so equality and formatting never go
/// through floating point. The `Display` form (`"1.4732"`) is the correlation
/// key used by the store's amount index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_ten_thousandths(units: u64) -> Self {
        Amount(units)
    }

    pub const fn ten_thousandths(self) -> u64 {
        self.0
    }

    pub const fn whole(self) -> u64 {
        self.0 / AMOUNT_SCALE
    }

    pub const fn fraction(self) -> u64 {
        self.0 % AMOUNT_SCALE
    }

    /// Validate a viewer-chosen base amount and round it to four decimals for
    /// display.
    pub fn from_base(value: f64) -> Result<Self, LedgerError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(LedgerError::InvalidInput(format!(
                "amount must be a positive number, got {value}"
            )));
        }
        if value > MAX_BASE_WHOLE as f64 {
            return Err(LedgerError::InvalidInput(format!(
                "amount {value} exceeds the maximum of {MAX_BASE_WHOLE}"
            )));
        }
        let units = (value * AMOUNT_SCALE as f64).round() as u64;
        if units == 0 {
            return Err(LedgerError::InvalidInput(format!(
                "amount {value} is below the smallest unit of 0.0001"
            )));
        }
        Ok(Amount(units))
    }

    /// Whole part a generated amount builds on, after the same validation as
    /// [`Amount::from_base`]. Truncates: `0.99999` gives `0`, never `1`.
    pub fn base_whole_part(value: f64) -> Result<u64, LedgerError> {
        Self::from_base(value)?;
        Ok(value.trunc() as u64)
    }

    /// Convert a raw on-chain value into an amount, truncating everything
    /// below the fourth decimal. `0.12349999` becomes `0.1234`, never `0.1235`.
    pub fn from_raw_units(raw: u128, unit_scale: u64) -> Option<Self> {
        if unit_scale == 0 {
            return None;
        }
        let units = raw.checked_mul(AMOUNT_SCALE as u128)? / unit_scale as u128;
        u64::try_from(units).ok().map(Amount)
    }

    /// Raw on-chain value (e.g. MIST) a payer must send for this amount.
    pub fn to_raw_units(self, unit_scale: u64) -> u128 {
        self.0 as u128 * unit_scale as u128 / AMOUNT_SCALE as u128
    }

    /// Canonical four-decimal key.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04}", self.whole(), self.fraction())
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    /// Parse a decimal string with at most four fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidInput(format!("invalid amount '{s}'"));
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || frac.len() > AMOUNT_DECIMALS as usize {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let mut frac_units: u64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| invalid())?
        };
        for _ in frac.len()..AMOUNT_DECIMALS as usize {
            frac_units *= 10;
        }
        whole
            .checked_mul(AMOUNT_SCALE)
            .and_then(|w| w.checked_add(frac_units))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

// Serialized as the four-decimal string so JSON never loses precision.
impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ─── Generation ──────────────────────────────────────────────────────────────

/// Produces unique exact amounts for a base amount.
///
/// The generator never touches the store: callers pass an `is_taken`
/// predicate and must insert the result under the same lock they checked it
/// with.
#[derive(Debug, Clone, Copy)]
pub struct AmountGenerator {
    max_attempts: u32,
}

impl Default for AmountGenerator {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl AmountGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Append a random four-digit suffix to `whole`, retrying while
    /// `is_taken` reports the key as in use.
    pub fn generate<R, F>(
        &self,
        whole: u64,
        rng: &mut R,
        is_taken: F,
    ) -> Result<Amount, LedgerError>
    where
        R: Rng + ?Sized,
        F: Fn(&str) -> bool,
    {
        let whole_units = whole.checked_mul(AMOUNT_SCALE).ok_or_else(|| {
            LedgerError::InvalidInput(format!("whole part {whole} is out of range"))
        })?;
        for _ in 0..self.max_attempts {
            let suffix = rng.gen_range(SUFFIX_MIN..=SUFFIX_MAX);
            let candidate = Amount(whole_units + suffix);
            if !is_taken(&candidate.key()) {
                return Ok(candidate);
            }
        }
        Err(LedgerError::GenerationExhausted {
            base: whole.to_string(),
            attempts: self.max_attempts,
        })
    }
}
