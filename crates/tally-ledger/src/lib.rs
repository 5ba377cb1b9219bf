//! # tally-ledger: Cycle-based power and fee accounting.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! Positions enter in a cycle and share that cycle's reward emission in
//! proportion to their deposit weight. Staking adds extra power from the next
//! cycle; fees accrued in each cycle are distributed over total power through
//! a cumulative fees-per-power accumulator.
//!
//! - [`clock::CycleClock`]: wall-clock time to cycle index
//! - [`reward::RewardSchedule`]: lazily compounded per-cycle reward
//! - [`accumulator::FeeAccumulator`]: fee pools and the accumulator
//! - [`positions::PositionLedger`]: positions and base-power resolution
//! - [`stakes`] / [`claims`]: stake planning and claimable fees
//! - [`ledger::Ledger`]: the composed, atomic boundary operations

pub mod accumulator;
pub mod claims;
pub mod clock;
pub mod ledger;
pub mod memory;
pub mod params;
pub mod positions;
pub mod reward;
pub mod stakes;
pub mod state;

pub use claims::Claimable;
pub use clock::{CycleClock, ManualClock, SystemClock};
pub use ledger::{Collaborators, Ledger};
pub use memory::{MemoryWorld, WorldState};
pub use params::LedgerParams;
pub use positions::{Position, PowerSegment};
pub use state::{ChangeSet, CycleRecord, GlobalMeta, LedgerState};
