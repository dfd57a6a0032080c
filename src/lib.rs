//! Fixed-price sale ledger.
//!
//! Buyers pay a funding asset and accrue an allocation of a second asset at a
//! fixed rate. Each purchase becomes claimable once `claim_delay` has elapsed
//! since it was made; claims pay out exactly what has matured and was not yet
//! disbursed.
//!
//! Layers:
//! - [`rate::RateConverter`]: pure fixed-point conversion.
//! - [`ledger::SaleLedger`]: owned accounting store; every mutation takes `now`.
//! - [`sale::Sale`]: serialized service over a [`sale::SaleBackend`] that moves
//!   funds, supplies the clock and receives [`sale::SaleEvent`]s.
//!
//! Address/AssetId are placeholders; map them onto host chain primitives in
//! the backend.

#![forbid(unsafe_code)]

use std::{fmt, str::FromStr};

pub mod config;
pub mod error;
pub mod ledger;
pub mod rate;
pub mod sale;
pub mod telemetry;

pub use error::{BackendError, Result, SaleError};
pub use ledger::{Purchase, SaleConfig, SaleLedger, SaleTotals, UserAccount, UserDetails};
pub use rate::RateConverter;
pub use sale::{Sale, SaleBackend, SaleEvent};

/// Smallest unit balance.
pub type Balance = u128;

/// 20-byte account identity.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Parse from 0x-prefixed or raw 40-hex string.
impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let raw = s.trim();
        let raw = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")).unwrap_or(raw);
        let mut out = [0u8; 20];
        hex::decode_to_slice(raw, &mut out)?;
        Ok(Address(out))
    }
}

/// Opaque handle of the asset being sold.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct AssetId(pub u32);
