//! Identifier types, deposit terms, and ledger events.
//!
//! All monetary values are in base units (1 token = 10^8 base units).
//! Power values are `u128`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IdError;

/// Cycle index, counted from genesis.
pub type Cycle = u64;

/// A 20-byte account identifier, rendered as lowercase hex.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    /// The all-zero account.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Parse a 40-character hex string, with or without a `0x` prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_core::types::AccountId;
    /// let id = AccountId::from_hex(&"ab".repeat(20)).unwrap();
    /// assert_eq!(id, AccountId([0xAB; 20]));
    /// ```
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 40 {
            return Err(IdError::InvalidLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| IdError::InvalidLength(b.len() * 2))?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for AccountId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_string()
    }
}

/// Identifier of a position, issued by the position registry.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an externally held deposit.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
#[serde(transparent)]
pub struct DepositId(pub u64);

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the deposit custodian reports about a deposit.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepositTerms {
    /// Current holder of the deposit.
    pub owner: AccountId,
    /// Raw entry weight the deposit contributes.
    pub weight: u64,
    /// Whether the underlying value was already redeemed.
    pub redeemed: bool,
    /// Whether the ledger already holds the deposit.
    pub in_custody: bool,
}

/// Events emitted by successful ledger operations.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    PositionCreated {
        position: PositionId,
        owner: AccountId,
        deposit: DepositId,
        cycle: Cycle,
        entry_weight: u64,
        /// Fee retained for the cycle's fee pool.
        fee_accrued: u64,
        treasury_cut: u64,
        refund: u64,
    },
    Staked {
        position: PositionId,
        amount: u64,
        fee_accrued: u64,
        refund: u64,
        cycle: Cycle,
        effective_cycle: Cycle,
    },
    Unstaked {
        position: PositionId,
        amount: u64,
        cycle: Cycle,
        effective_cycle: Cycle,
    },
    FeesClaimed {
        position: PositionId,
        owner: AccountId,
        amount: u64,
        through_cycle: Cycle,
    },
    DepositRedeemed {
        position: PositionId,
        deposit: DepositId,
        cycle: Cycle,
        effective_cycle: Cycle,
    },
}

impl LedgerEvent {
    /// Position the event refers to.
    pub fn position(&self) -> PositionId {
        match self {
            Self::PositionCreated { position, .. }
            | Self::Staked { position, .. }
            | Self::Unstaked { position, .. }
            | Self::FeesClaimed { position, .. }
            | Self::DepositRedeemed { position, .. } => *position,
        }
    }
}
