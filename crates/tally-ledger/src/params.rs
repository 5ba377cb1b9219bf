//! Deployment parameters of a ledger instance.

use serde::{Deserialize, Serialize};

use tally_core::constants::{
    BPS_PRECISION, DEFAULT_CYCLE_LENGTH_SECS, DEFAULT_GENESIS_TIME, PROTOCOL_FEE_BPS,
};
use tally_core::error::TallyError;
use tally_core::types::AccountId;

/// Parameters fixed for the lifetime of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerParams {
    /// Unix timestamp at which cycle 0 starts.
    pub genesis_time: i64,
    /// Length of a cycle in seconds.
    pub cycle_length_secs: u64,
    /// Account receiving the protocol share of entry fees.
    pub treasury: AccountId,
    /// Protocol share of entry fees in basis points.
    pub protocol_fee_bps: u64,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            genesis_time: DEFAULT_GENESIS_TIME,
            cycle_length_secs: DEFAULT_CYCLE_LENGTH_SECS,
            treasury: AccountId::ZERO,
            protocol_fee_bps: PROTOCOL_FEE_BPS,
        }
    }
}

impl LedgerParams {
    /// Reject parameters the engine cannot run with.
    pub fn validate(&self) -> Result<(), TallyError> {
        if self.cycle_length_secs == 0 {
            return Err(TallyError::Config("cycle_length_secs must be positive".into()));
        }
        if self.protocol_fee_bps > BPS_PRECISION {
            return Err(TallyError::Config(format!(
                "protocol_fee_bps {} exceeds {BPS_PRECISION}",
                self.protocol_fee_bps
            )));
        }
        Ok(())
    }
}
