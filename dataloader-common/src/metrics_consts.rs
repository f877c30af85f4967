pub const RECORDS_FETCHED: &str = "dataloader_records_fetched";
pub const RECORDS_SKIPPED_AT_FETCH: &str = "dataloader_records_skipped_at_fetch";
pub const BUFFER_BLOCKED: &str = "dataloader_buffer_blocked";
pub const BUFFER_DEPTH: &str = "dataloader_buffer_depth";
pub const CONSUMER_LAG: &str = "dataloader_consumer_lag";

pub const RECORDS_PROCESSED: &str = "dataloader_records_processed";
pub const RECORDS_SKIPPED: &str = "dataloader_records_skipped";
pub const DOCUMENTS_AFFECTED: &str = "dataloader_documents_affected";
pub const DOCUMENTS_PER_RECORD: &str = "dataloader_documents_per_record";
pub const DECODE_ERRORS: &str = "dataloader_decode_errors";
pub const STORE_ERRORS: &str = "dataloader_store_errors";
pub const RECORD_PROCESS_TIME: &str = "dataloader_record_process_time_seconds";
