//! # Application Layer
//!
//! Background readers, transaction workflows and the session coordinator.

pub mod approval;
pub mod balance_reader;
pub mod contract_stats;
pub mod coordinator;
mod deadline;
pub mod event_sync;
pub mod post;
pub mod price_feed;
pub mod scheduler;
pub mod session;
pub mod snapshot;

pub use approval::{ApprovalWorkflow, TransactionSettings};
pub use balance_reader::BalanceAllowanceReader;
pub use contract_stats::ContractStatsReader;
pub use coordinator::SessionCoordinator;
pub use event_sync::{EventLogSynchronizer, EventSyncSettings};
pub use post::PostWorkflow;
pub use price_feed::PriceFeed;
pub use scheduler::{schedule, schedule_once, TaskHandle, TaskSet};
pub use session::SessionContext;
pub use snapshot::{ChatView, SharedSnapshot, Snapshot};
