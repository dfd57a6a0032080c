//! Fixed-rate conversion from funding units to allocation units.
//!
//! `allocation = floor(funding * SCALE / rate_per_unit)` where `SCALE` is
//! `10^decimals` of the allocation asset. The product is taken in 256 bits so
//! it never wraps; only a quotient wider than `Balance` is rejected.

use primitive_types::U256;

use crate::error::{Result, SaleError};
use crate::Balance;

/// Decimals used when the allocation asset follows the common 18-decimal layout.
pub const DEFAULT_DECIMALS: u8 = 18;

/// `10^38` is the largest power of ten that fits in `u128`.
pub const MAX_DECIMALS: u8 = 38;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateConverter {
    rate_per_unit: Balance,
    scale: Balance,
}

impl RateConverter {
    pub fn new(rate_per_unit: Balance) -> Result<Self> {
        Self::with_decimals(rate_per_unit, DEFAULT_DECIMALS)
    }

    pub fn with_decimals(rate_per_unit: Balance, decimals: u8) -> Result<Self> {
        if rate_per_unit == 0 {
            return Err(SaleError::InvalidConfig("rate_per_unit must be > 0".into()));
        }
        if decimals > MAX_DECIMALS {
            return Err(SaleError::InvalidConfig(format!(
                "allocation decimals must be <= {MAX_DECIMALS}"
            )));
        }
        Ok(Self { rate_per_unit, scale: 10u128.pow(decimals as u32) })
    }

    pub fn rate_per_unit(&self) -> Balance {
        self.rate_per_unit
    }

    pub fn scale(&self) -> Balance {
        self.scale
    }

    /// Allocation bought by `funding`, rounded down.
    pub fn convert(&self, funding: Balance) -> Result<Balance> {
        if funding == 0 {
            return Ok(0);
        }
        // u128 * u128 always fits in 256 bits.
        let quotient = U256::from(funding) * U256::from(self.scale) / U256::from(self.rate_per_unit);
        if quotient > U256::from(u128::MAX) {
            return Err(SaleError::ArithmeticOverflow);
        }
        Ok(quotient.as_u128())
    }
}
