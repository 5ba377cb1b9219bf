//! Error types for the Tally engine.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("caller does not own {0}")] NotOwner(String),
    #[error("insufficient fee: paid {paid}, required {required}")] InsufficientFee { paid: u64, required: u64 },
    #[error("invalid amount: {0}")] InvalidAmount(String),
    #[error("base power already resolved for position {0}")] AlreadyResolved(u64),
    #[error("nothing to claim for position {0}")] NothingToClaim(u64),
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("unknown position: {0}")] UnknownPosition(u64),
    #[error("unknown deposit: {0}")] UnknownDeposit(u64),
    #[error("deposit {0} is already held by the ledger")] DepositInUse(u64),
    #[error("entry cycle {0} has not ended")] EntryCyclePending(u64),
    #[error("deposit of position {0} already redeemed")] AlreadyRedeemed(u64),
    #[error("deposit {0} is not redeemable yet")] NotRedeemable(u64),
    #[error("insufficient stake balance: have {have}, need {need}")] InsufficientStakeBalance { have: u64, need: u64 },
    #[error("insufficient fee balance: have {have}, need {need}")] InsufficientFeeBalance { have: u64, need: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid length: {0}")] InvalidLength(usize),
    #[error("invalid hex")] InvalidHex,
}

#[derive(Error, Debug)]
pub enum TallyError {
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error("storage: {0}")] Storage(String),
    #[error("config: {0}")] Config(String),
}
