//! Claim tracking and claimable-fee computation.
//!
//! A position is paid through `last_claimed_cycle`; the next claim starts at
//! the following cycle, or at the entry cycle if it never claimed. Claims
//! only cover fully elapsed cycles, up to `current - 1`.
//!
//! The amount has two parts, computed separately and added:
//! - the entry-cycle share, in which the position's power is strictly its
//!   base power;
//! - the post-entry share, which splits the accumulator delta at the
//!   position's own segment boundaries and weights each piece by the power
//!   in effect during it.

use serde::{Deserialize, Serialize};

use tally_core::constants::SCALING_FACTOR;
use tally_core::error::LedgerError;
use tally_core::types::Cycle;

use crate::positions::Position;

/// Claimable fees of a position, split by source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimable {
    pub entry_share: u128,
    pub post_entry_share: u128,
    /// Last cycle covered; `None` if no cycle is claimable yet.
    pub through_cycle: Option<Cycle>,
}

impl Claimable {
    pub fn total(&self) -> Result<u64, LedgerError> {
        let sum = self
            .entry_share
            .checked_add(self.post_entry_share)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        u64::try_from(sum).map_err(|_| LedgerError::ArithmeticOverflow)
    }
}

/// First cycle not yet paid out to `position`.
pub fn claim_cursor(position: &Position) -> Cycle {
    position
        .last_claimed_cycle
        .map(|c| c.saturating_add(1))
        .unwrap_or(position.entry_cycle)
}

/// `power * (acc(end + 1) - acc(start)) / SCALING_FACTOR`.
fn share(power: u128, acc_start: u128, acc_end: u128) -> Result<u128, LedgerError> {
    let delta = acc_end
        .checked_sub(acc_start)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    Ok(power
        .checked_mul(delta)
        .ok_or(LedgerError::ArithmeticOverflow)?
        / SCALING_FACTOR)
}

/// Share of the fees accrued during the entry cycle `E`:
/// `base_power * (acc(E + 1) - acc(E)) / SCALING_FACTOR`.
///
/// Stakes made during the entry cycle apply from `E + 1` and are ignored.
pub fn entry_cycle_share(
    position: &Position,
    base_power: u128,
    acc: impl Fn(Cycle) -> u128,
) -> Result<u128, LedgerError> {
    let e = position.entry_cycle;
    share(base_power, acc(e), acc(e + 1))
}

/// Share of the fees accrued during cycles `from..=through`, all after the
/// entry cycle.
pub fn post_entry_share(
    position: &Position,
    base_power: u128,
    from: Cycle,
    through: Cycle,
    acc: impl Fn(Cycle) -> u128,
) -> Result<u128, LedgerError> {
    let mut total: u128 = 0;
    let segments = &position.segments;
    for (i, segment) in segments.iter().enumerate() {
        let start = segment.from_cycle.max(from);
        let end = match segments.get(i + 1) {
            Some(next) => (next.from_cycle - 1).min(through),
            None => through,
        };
        if start > end {
            continue;
        }
        let power = segment.power(base_power)?;
        total = total
            .checked_add(share(power, acc(start), acc(end + 1))?)
            .ok_or(LedgerError::ArithmeticOverflow)?;
    }
    Ok(total)
}

/// Everything `position` may claim during `current`.
///
/// `base_power` is `None` while the entry cycle is still running, in which
/// case nothing is claimable yet.
pub fn claimable(
    position: &Position,
    base_power: Option<u128>,
    current: Cycle,
    acc: impl Fn(Cycle) -> u128,
) -> Result<Claimable, LedgerError> {
    let (Some(base), Some(through)) = (base_power, current.checked_sub(1)) else {
        return Ok(Claimable::default());
    };
    let cursor = claim_cursor(position);
    if cursor > through {
        return Ok(Claimable::default());
    }

    let entry = position.entry_cycle;
    let entry_share = if cursor == entry {
        entry_cycle_share(position, base, &acc)?
    } else {
        0
    };
    let from = cursor.max(entry + 1);
    let post_entry_share = if from <= through {
        post_entry_share(position, base, from, through, &acc)?
    } else {
        0
    };

    Ok(Claimable {
        entry_share,
        post_entry_share,
        through_cycle: Some(through),
    })
}
