use thiserror::Error;

pub type Result<T> = std::result::Result<T, SaleError>;

/// Failures reported by the host ledger that moves funds on our behalf.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("insufficient balance")]
    Insufficient,
    #[error("asset not supported")]
    UnsupportedAsset,
    #[error("backend failure: {0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaleError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("amount must be > 0")]
    ZeroAmount,
    /// Nothing is owed to the caller: no purchase has matured yet, every
    /// matured purchase was already paid out, or the caller never bought.
    #[error("already claimed all")]
    AlreadyClaimedAll,
    #[error("purchase index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}
