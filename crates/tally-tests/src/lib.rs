//! Scenario and property test suite for the Tally ledger.
//!
//! The integration tests in `tests/` drive the ledger end to end through its
//! boundary operations and check the economic invariants: fee conservation,
//! reward compounding, the one-cycle power lag, idempotent claims, and
//! equivalence of skipped and visited cycles.

pub mod helpers;
