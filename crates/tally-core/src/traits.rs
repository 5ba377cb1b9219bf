//! Trait interfaces for the ledger's external collaborators.
//!
//! The accounting engine owns none of the assets it accounts for. These
//! traits define the boundary:
//! - [`Clock`]: wall-clock source (tally-ledger implements system and manual clocks)
//! - [`DepositCustody`]: the externally issued deposits positions are created from
//! - [`StakeToken`]: the fungible token staked into positions
//! - [`PositionRegistry`]: ownership of positions
//! - [`FeeChannel`]: fee payments into and out of the ledger
//!
//! Inbound calls (receiving fees, taking custody, pulling stake) may fail and
//! run before the ledger mutates anything. Outbound calls run after the
//! ledger has committed and cannot fail: the ledger already holds the value
//! being released.

use crate::error::LedgerError;
use crate::types::{AccountId, DepositId, DepositTerms, PositionId};

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Custodian of the deposits that positions are created from.
pub trait DepositCustody: Send + Sync {
    /// Terms of a deposit. Fails with `UnknownDeposit` if it does not exist.
    fn terms(&self, deposit: DepositId) -> Result<DepositTerms, LedgerError>;

    /// Move the deposit from `from` into the ledger's custody.
    fn take_custody(&self, deposit: DepositId, from: &AccountId) -> Result<(), LedgerError>;

    /// Whether the deposit's underlying value may be redeemed at `now`.
    fn is_redeemable(&self, deposit: DepositId, now: i64) -> bool;

    /// Release the deposit's underlying value to `to`. The deposit itself stays
    /// in custody.
    fn redeem(&self, deposit: DepositId, to: &AccountId);
}

/// The fungible token staked into positions.
pub trait StakeToken: Send + Sync {
    /// Pull `amount` from `from` into the ledger's escrow.
    fn transfer_from(&self, from: &AccountId, amount: u64) -> Result<(), LedgerError>;

    /// Return `amount` from escrow to `to`.
    fn transfer(&self, to: &AccountId, amount: u64);

    /// Balance held by `account`.
    ///
    /// Default implementation reports zero (override for queryable tokens).
    fn balance_of(&self, _account: &AccountId) -> u64 {
        0
    }
}

/// Non-fungible registry recording who owns each position.
pub trait PositionRegistry: Send + Sync {
    /// Issue a new position id owned by `owner`.
    fn mint(&self, owner: &AccountId) -> PositionId;

    /// Current owner of `position`, if it exists.
    fn owner_of(&self, position: PositionId) -> Option<AccountId>;

    /// Check that `caller` owns `position`.
    ///
    /// Default implementation delegates to [`owner_of`](Self::owner_of).
    fn ensure_owner(&self, position: PositionId, caller: &AccountId) -> Result<(), LedgerError> {
        match self.owner_of(position) {
            Some(owner) if owner == *caller => Ok(()),
            Some(_) => Err(LedgerError::NotOwner(format!("position {position}"))),
            None => Err(LedgerError::UnknownPosition(position.0)),
        }
    }
}

/// Channel for the fee currency.
pub trait FeeChannel: Send + Sync {
    /// Take `amount` from `from` into the ledger's fee holdings.
    fn receive(&self, from: &AccountId, amount: u64) -> Result<(), LedgerError>;

    /// Pay `amount` to `to` from the ledger's fee holdings.
    fn credit(&self, to: &AccountId, amount: u64);
}
