mod ledger_flow_api;
mod sync_tracker_api;

pub use ledger_flow_api::{BatchOutcome, EventOutcome, ImportRowOutcome, IntegrationContext, LedgerFlowApi};
pub use sync_tracker_api::SyncTrackerApi;
