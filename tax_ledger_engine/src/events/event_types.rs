use crate::db_types::{ImportSummary, TransactionRecord};

/// Emitted whenever an event is accepted into the ledger (insert or overwrite).
#[derive(Debug, Clone)]
pub struct TransactionIngestedEvent {
    pub record: TransactionRecord,
    /// True for a fresh insert, false for an accepted overwrite.
    pub inserted: bool,
}

impl TransactionIngestedEvent {
    pub fn new(record: TransactionRecord, inserted: bool) -> Self {
        Self { record, inserted }
    }
}

/// Emitted when a historical import reaches a terminal state.
#[derive(Debug, Clone)]
pub struct ImportCompletedEvent {
    pub integration_id: i64,
    pub summary: ImportSummary,
}

/// The producer set handed to the ledger flow API. Empty by default; the server subscribes the hooks it wants.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub transaction_ingested: Vec<super::EventProducer<TransactionIngestedEvent>>,
    pub import_completed: Vec<super::EventProducer<ImportCompletedEvent>>,
}
