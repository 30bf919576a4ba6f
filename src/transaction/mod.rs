// Write-ahead logging and crash recovery

pub mod wal;
pub mod recovery;

// Public exports
pub use wal::log_manager::LogManager;
pub use wal::log_record::{LogRecord, LogRecordType};
pub use recovery::LogRecovery;
