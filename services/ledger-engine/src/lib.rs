pub mod config;
pub mod coordinator;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use coordinator::{LedgerCoordinator, LedgerLimits};
pub use errors::{LedgerError, Result, StoreError};
