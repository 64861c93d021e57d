pub mod balance;
pub mod position_sync;

pub use balance::{BalanceAggregator, BalanceSummary, ExchangeBalance};
pub use position_sync::{CycleOutcome, PositionSync, SyncConfig, SyncError, SyncHandle, SyncState};
