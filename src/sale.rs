//! Sale service: one [`SaleLedger`] shared by many callers.
//!
//! - Calls are serialized by a single `parking_lot::Mutex`; each buy/claim
//!   runs to completion before the next starts.
//! - Time and transfers come from the [`SaleBackend`]; a transfer error aborts
//!   the call and the ledger is left untouched.
//! - Committed calls are published as [`SaleEvent`]s (tokio broadcast).

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{BackendError, Result, SaleError};
use crate::ledger::{Purchase, SaleConfig, SaleLedger, SaleTotals, UserDetails};
use crate::{Address, AssetId, Balance};

/// Host-side collaborators: clock, funding receipt and allocation reserve.
pub trait SaleBackend: Send + Sync + 'static {
    /// Current UNIX time (seconds), non-decreasing across calls.
    fn now_unix(&self) -> u64;

    /// Move `amount` of the funding asset from `payer` to `beneficiary`.
    fn collect_funding(
        &self,
        payer: Address,
        beneficiary: Address,
        amount: Balance,
    ) -> std::result::Result<(), BackendError>;

    /// Pay `amount` of the allocation asset out of the sale reserve.
    fn disburse_allocation(
        &self,
        asset: AssetId,
        to: Address,
        amount: Balance,
    ) -> std::result::Result<(), BackendError>;

    /// Allocation asset currently held in custody for the sale.
    fn allocation_reserve(&self, asset: AssetId) -> std::result::Result<Balance, BackendError>;
}

/// Published after a call commits; rejected calls publish nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaleEvent {
    /// `index` is the position of `purchase` in the buyer's history.
    Purchased { buyer: Address, index: usize, purchase: Purchase },
    /// `total_claimed` includes `amount`.
    Claimed { buyer: Address, amount: Balance, total_claimed: Balance },
}

/// Thread-safe sale: a [`SaleLedger`] behind a mutex, wired to a backend.
pub struct Sale<B: SaleBackend> {
    backend: Arc<B>,
    ledger: Mutex<SaleLedger>,
    events_tx: broadcast::Sender<SaleEvent>,
}

impl<B: SaleBackend> fmt::Debug for Sale<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Sale");
        match self.ledger.try_lock() {
            Some(l) => d.field("config", l.config()).field("totals", &l.totals()),
            None => d.field("ledger", &format_args!("<locked>")),
        };
        d.finish()
    }
}

impl<B: SaleBackend> Sale<B> {
    /// Open a sale. Fails with `InvalidConfig` for a zero rate or too many
    /// decimals. `event_capacity` bounds the broadcast buffer (minimum 1).
    pub fn new(backend: Arc<B>, config: SaleConfig, event_capacity: usize) -> Result<Arc<Self>> {
        let ledger = SaleLedger::new(config)?;
        let (tx, _) = broadcast::channel(event_capacity.max(1));
        info!(
            target: "fixed_sale",
            asset = ?ledger.config().allocation_asset,
            beneficiary = %ledger.config().beneficiary,
            rate_per_unit = ledger.config().rate_per_unit,
            claim_delay_secs = ledger.config().claim_delay.as_secs(),
            "sale opened"
        );
        Ok(Arc::new(Self { backend, ledger: Mutex::new(ledger), events_tx: tx }))
    }

    /// Receiver for events committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SaleEvent> {
        self.events_tx.subscribe()
    }

    /// Copy of the parameters the sale was opened with.
    pub fn config(&self) -> SaleConfig {
        self.ledger.lock().config().clone()
    }

    /// Pay `funding` and record the converted allocation for `buyer`.
    pub fn buy(&self, buyer: Address, funding: Balance) -> Result<Purchase> {
        let mut ledger = self.ledger.lock();
        let now = self.backend.now_unix();
        let beneficiary = ledger.config().beneficiary;

        let res = ledger.buy_settled(buyer, funding, now, |_| {
            self.backend.collect_funding(buyer, beneficiary, funding)
        });
        let purchase = match res {
            Ok(p) => p,
            Err(e) => {
                log_rejected("buy", buyer, &e);
                return Err(e);
            }
        };

        let index = ledger.user_details(&buyer).next_purchase_index - 1;
        info!(
            target: "fixed_sale",
            buyer = %buyer,
            index,
            funding = purchase.funding_spent,
            allocation = purchase.allocation_acquired,
            "purchase recorded"
        );
        let _ = self.events_tx.send(SaleEvent::Purchased { buyer, index, purchase });
        Ok(purchase)
    }

    /// Disburse everything that has matured for `buyer` and was not yet paid.
    pub fn claim(&self, buyer: Address) -> Result<Balance> {
        let mut ledger = self.ledger.lock();
        let now = self.backend.now_unix();
        let asset = ledger.config().allocation_asset;

        let res = ledger.claim_settled(buyer, now, |amount| {
            self.backend.disburse_allocation(asset, buyer, amount)
        });
        let amount = match res {
            Ok(a) => a,
            Err(e) => {
                log_rejected("claim", buyer, &e);
                return Err(e);
            }
        };

        let total_claimed = ledger.account(&buyer).map(|a| a.total_claimed()).unwrap_or(amount);
        info!(target: "fixed_sale", buyer = %buyer, amount, total_claimed, "allocation claimed");
        let _ = self.events_tx.send(SaleEvent::Claimed { buyer, amount, total_claimed });
        Ok(amount)
    }

    /// What `claim` would pay `user` right now.
    pub fn claimable(&self, user: &Address) -> Result<Balance> {
        let ledger = self.ledger.lock();
        ledger.claimable(user, self.backend.now_unix())
    }

    /// See [`SaleLedger::compute_token`].
    pub fn compute_token(&self, funding: Balance) -> Result<Balance> {
        self.ledger.lock().compute_token(funding)
    }

    /// See [`SaleLedger::user_details`].
    pub fn user_details(&self, user: &Address) -> UserDetails {
        self.ledger.lock().user_details(user)
    }

    /// See [`SaleLedger::purchase_at`].
    pub fn purchase_at(&self, user: &Address, index: usize) -> Result<Purchase> {
        self.ledger.lock().purchase_at(user, index)
    }

    /// See [`SaleLedger::all_purchases`].
    pub fn all_purchases(&self, user: &Address) -> Vec<Purchase> {
        self.ledger.lock().all_purchases(user)
    }

    /// Snapshot of the sale-wide aggregates.
    pub fn totals(&self) -> SaleTotals {
        self.ledger.lock().totals()
    }

    /// Allocation owed to buyers that the reserve cannot currently cover.
    pub fn reserve_shortfall(&self) -> Result<Balance> {
        let ledger = self.ledger.lock();
        let reserve = self.backend.allocation_reserve(ledger.config().allocation_asset)?;
        let shortfall = ledger.outstanding_allocation().saturating_sub(reserve);
        if shortfall > 0 {
            warn!(target: "fixed_sale", shortfall, reserve, "allocation reserve under-funded");
        }
        Ok(shortfall)
    }
}

fn log_rejected(op: &'static str, buyer: Address, err: &SaleError) {
    match err {
        SaleError::Backend(e) => warn!(target: "fixed_sale", op, buyer = %buyer, error = %e, "transfer failed"),
        e => debug!(target: "fixed_sale", op, buyer = %buyer, error = %e, "call rejected"),
    }
}
