pub mod db;
pub mod ledger;
pub mod metrics;

pub use db::{ShadowDb, ShadowDbError};
pub use ledger::ShadowLedger;
