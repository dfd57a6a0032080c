//! Sale accounting: per-buyer purchase history, sale-wide totals and the
//! time-locked claim rule.
//!
//! The ledger never touches funds. `buy_settled`/`claim_settled` accept a
//! settle closure that performs the matching transfer; it runs after every
//! check has passed and before anything is written, so a failed transfer
//! leaves the ledger exactly as it was.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{BackendError, Result, SaleError};
use crate::rate::{RateConverter, DEFAULT_DECIMALS};
use crate::{Address, AssetId, Balance};

/// Immutable sale parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleConfig {
    /// Asset paid out by `claim`.
    pub allocation_asset: AssetId,
    /// Receives the funding paid by buyers.
    pub beneficiary: Address,
    /// Funding units per one whole allocation unit (scaled by `10^allocation_decimals`).
    pub rate_per_unit: Balance,
    /// Second resolution; sub-second parts are ignored.
    pub claim_delay: Duration,
    /// Decimals of the allocation asset, at most 38.
    pub allocation_decimals: u8,
}

impl SaleConfig {
    /// Parameters for an 18-decimal allocation asset.
    pub fn new(
        allocation_asset: AssetId,
        beneficiary: Address,
        rate_per_unit: Balance,
        claim_delay: Duration,
    ) -> Self {
        Self {
            allocation_asset,
            beneficiary,
            rate_per_unit,
            claim_delay,
            allocation_decimals: DEFAULT_DECIMALS,
        }
    }

    /// Validates the rate and decimals.
    pub fn converter(&self) -> Result<RateConverter> {
        RateConverter::with_decimals(self.rate_per_unit, self.allocation_decimals)
    }
}

/// One buy event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Purchase {
    pub funding_spent: Balance,
    pub allocation_acquired: Balance,
    /// UNIX seconds.
    pub timestamp: u64,
}

impl Purchase {
    fn matured(&self, now: u64, delay_secs: u64) -> bool {
        now.saturating_sub(self.timestamp) >= delay_secs
    }
}

/// Everything recorded for one buyer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserAccount {
    total_funding_spent: Balance,
    total_allocation_acquired: Balance,
    total_claimed: Balance,
    purchases: Vec<Purchase>,
}

impl UserAccount {
    pub fn total_funding_spent(&self) -> Balance {
        self.total_funding_spent
    }

    pub fn total_allocation_acquired(&self) -> Balance {
        self.total_allocation_acquired
    }

    /// Allocation already disbursed by `claim`.
    pub fn total_claimed(&self) -> Balance {
        self.total_claimed
    }

    /// In insertion order.
    pub fn purchases(&self) -> &[Purchase] {
        &self.purchases
    }

    /// Allocation of every purchase whose delay has elapsed at `now`.
    fn matured_allocation(&self, now: u64, delay_secs: u64) -> Result<Balance> {
        self.purchases
            .iter()
            .filter(|p| p.matured(now, delay_secs))
            .try_fold(0u128, |acc, p| acc.checked_add(p.allocation_acquired))
            .ok_or(SaleError::ArithmeticOverflow)
    }

    /// Matured minus already disbursed. Saturates so a clock that steps back
    /// reports nothing owed instead of underflowing.
    fn claimable(&self, now: u64, delay_secs: u64) -> Result<Balance> {
        Ok(self.matured_allocation(now, delay_secs)?.saturating_sub(self.total_claimed))
    }
}

/// Read-only per-buyer summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserDetails {
    pub total_funding_spent: Balance,
    pub total_allocation_acquired: Balance,
    /// Number of purchases recorded; the index the next purchase will get.
    pub next_purchase_index: usize,
}

/// Sale-wide aggregates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaleTotals {
    pub funding_raised: Balance,
    pub allocation_sold: Balance,
    pub allocation_claimed: Balance,
    /// Distinct addresses with at least one purchase.
    pub buyers: usize,
}

impl SaleTotals {
    /// Allocation the reserve still has to cover.
    pub fn outstanding(&self) -> Balance {
        self.allocation_sold.saturating_sub(self.allocation_claimed)
    }
}

/// The sale's books: per-buyer accounts and running totals.
///
/// Single-threaded; wrap it (see [`crate::Sale`]) to share across callers.
/// Every mutating call validates and checks its arithmetic before writing, so
/// an error leaves the ledger exactly as it was.
#[derive(Clone, Debug)]
pub struct SaleLedger {
    config: SaleConfig,
    converter: RateConverter,
    accounts: BTreeMap<Address, UserAccount>,
    totals: SaleTotals,
}

impl SaleLedger {
    /// Empty ledger. Fails with `InvalidConfig` if the rate is zero or the
    /// decimals exceed 38.
    pub fn new(config: SaleConfig) -> Result<Self> {
        let converter = config.converter()?;
        Ok(Self {
            config,
            converter,
            accounts: BTreeMap::new(),
            totals: SaleTotals::default(),
        })
    }

    /// Parameters fixed at construction.
    pub fn config(&self) -> &SaleConfig {
        &self.config
    }

    /// Converter derived from the config.
    pub fn converter(&self) -> &RateConverter {
        &self.converter
    }

    fn delay_secs(&self) -> u64 {
        self.config.claim_delay.as_secs()
    }

    /// Preview of the allocation `funding` would buy.
    pub fn compute_token(&self, funding: Balance) -> Result<Balance> {
        self.converter.convert(funding)
    }

    /// Record a purchase without an external transfer.
    pub fn buy(&mut self, caller: Address, funding: Balance, now: u64) -> Result<Purchase> {
        self.buy_settled(caller, funding, now, |_| Ok(()))
    }

    /// Record a purchase; `settle` collects the funding and must succeed for
    /// the purchase to be written.
    pub fn buy_settled<F>(
        &mut self,
        caller: Address,
        funding: Balance,
        now: u64,
        settle: F,
    ) -> Result<Purchase>
    where
        F: FnOnce(&Purchase) -> std::result::Result<(), BackendError>,
    {
        if funding == 0 {
            return Err(SaleError::ZeroAmount);
        }
        let allocation = self.converter.convert(funding)?;
        let purchase = Purchase { funding_spent: funding, allocation_acquired: allocation, timestamp: now };

        let (spent, acquired, is_new) = match self.accounts.get(&caller) {
            Some(acc) => (
                acc.total_funding_spent.checked_add(funding).ok_or(SaleError::ArithmeticOverflow)?,
                acc.total_allocation_acquired
                    .checked_add(allocation)
                    .ok_or(SaleError::ArithmeticOverflow)?,
                false,
            ),
            None => (funding, allocation, true),
        };
        let raised = self
            .totals
            .funding_raised
            .checked_add(funding)
            .ok_or(SaleError::ArithmeticOverflow)?;
        let sold = self
            .totals
            .allocation_sold
            .checked_add(allocation)
            .ok_or(SaleError::ArithmeticOverflow)?;

        settle(&purchase)?;

        let acc = self.accounts.entry(caller).or_default();
        acc.total_funding_spent = spent;
        acc.total_allocation_acquired = acquired;
        acc.purchases.push(purchase);

        self.totals.funding_raised = raised;
        self.totals.allocation_sold = sold;
        if is_new {
            self.totals.buyers += 1;
        }
        Ok(purchase)
    }

    /// Allocation `user` could claim at `now`; zero when nothing is owed.
    pub fn claimable(&self, user: &Address, now: u64) -> Result<Balance> {
        match self.accounts.get(user) {
            Some(acc) => acc.claimable(now, self.delay_secs()),
            None => Ok(0),
        }
    }

    /// Mark everything matured at `now` as disbursed, without an external transfer.
    pub fn claim(&mut self, caller: Address, now: u64) -> Result<Balance> {
        self.claim_settled(caller, now, |_| Ok(()))
    }

    /// Mark everything matured at `now` as disbursed; `settle` pays the
    /// amount out and must succeed for the claim to be written.
    pub fn claim_settled<F>(&mut self, caller: Address, now: u64, settle: F) -> Result<Balance>
    where
        F: FnOnce(Balance) -> std::result::Result<(), BackendError>,
    {
        let delay = self.delay_secs();
        let acc = self.accounts.get(&caller).ok_or(SaleError::AlreadyClaimedAll)?;
        let amount = acc.claimable(now, delay)?;
        if amount == 0 {
            return Err(SaleError::AlreadyClaimedAll);
        }
        let user_claimed = acc.total_claimed.checked_add(amount).ok_or(SaleError::ArithmeticOverflow)?;
        let sale_claimed = self
            .totals
            .allocation_claimed
            .checked_add(amount)
            .ok_or(SaleError::ArithmeticOverflow)?;

        settle(amount)?;

        if let Some(acc) = self.accounts.get_mut(&caller) {
            acc.total_claimed = user_claimed;
        }
        self.totals.allocation_claimed = sale_claimed;
        Ok(amount)
    }

    /// Unknown users report zeros.
    pub fn user_details(&self, user: &Address) -> UserDetails {
        self.accounts
            .get(user)
            .map(|acc| UserDetails {
                total_funding_spent: acc.total_funding_spent,
                total_allocation_acquired: acc.total_allocation_acquired,
                next_purchase_index: acc.purchases.len(),
            })
            .unwrap_or_default()
    }

    /// The `index`-th purchase of `user`, counted from 0.
    pub fn purchase_at(&self, user: &Address, index: usize) -> Result<Purchase> {
        let purchases = self.accounts.get(user).map(|acc| acc.purchases.as_slice()).unwrap_or(&[]);
        purchases
            .get(index)
            .copied()
            .ok_or(SaleError::IndexOutOfRange { index, len: purchases.len() })
    }

    /// Snapshot of the purchase history in insertion order.
    pub fn all_purchases(&self, user: &Address) -> Vec<Purchase> {
        self.accounts.get(user).map(|acc| acc.purchases.clone()).unwrap_or_default()
    }

    /// Full account of `user`, `None` if they never bought.
    pub fn account(&self, user: &Address) -> Option<&UserAccount> {
        self.accounts.get(user)
    }

    /// Sale-wide aggregates.
    pub fn totals(&self) -> SaleTotals {
        self.totals
    }

    /// Allocation sold but not yet claimed.
    pub fn outstanding_allocation(&self) -> Balance {
        self.totals.outstanding()
    }
}
