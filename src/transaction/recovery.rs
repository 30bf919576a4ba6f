use std::collections::HashMap;
use std::sync::Arc;
use log::{debug, info};
use thiserror::Error;

use crate::common::types::{Lsn, Page, Rid, TxnId, INVALID_LSN, INVALID_PAGE_ID, LOG_BUFFER_SIZE};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::storage::page::{table_page, PageError};
use crate::transaction::wal::log_record::{LogPayload, LogRecord, LogRecordType};

/// Error type for recovery operations
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Disk manager error: {0}")]
    DiskManagerError(#[from] DiskManagerError),

    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),

    #[error("Table page error: {0}")]
    PageError(#[from] PageError),

    #[error("Log record at offset {0} is corrupt")]
    CorruptRecord(u64),
}

/// Result type for recovery operations
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// ARIES-style restart recovery, simplified: a forward redo pass over the
/// whole log that also discovers the loser transactions, then a backward
/// undo pass walking each loser's prev-LSN chain.
///
/// Runs while logging is disabled; the operations it replays go through the
/// table-page functions directly.
pub struct LogRecovery {
    disk_manager: Arc<DiskManager>,
    buffer_pool: Arc<BufferPoolManager>,

    /// Transactions without a COMMIT/ABORT, keyed to their last seen LSN
    active_txn: HashMap<TxnId, Lsn>,

    /// Byte offset of each record in the log stream
    lsn_mapping: HashMap<Lsn, u64>,
}

impl LogRecovery {
    pub fn new(disk_manager: Arc<DiskManager>, buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            disk_manager,
            buffer_pool,
            active_txn: HashMap::new(),
            lsn_mapping: HashMap::new(),
        }
    }

    /// Run the full restart sequence: redo, then undo the losers
    pub fn recover(&mut self) -> Result<()> {
        info!("starting restart recovery");
        self.redo()?;
        self.undo()?;
        info!("restart recovery complete");
        Ok(())
    }

    /// Forward pass: replay every logged change whose page missed it.
    ///
    /// The log is prefetched a buffer at a time; a chunk is re-read from the
    /// first unparsed byte, so a record straddling the chunk boundary is
    /// picked up whole on the next read. A chunk that yields no record at
    /// all is the torn tail and ends the scan.
    pub fn redo(&mut self) -> Result<()> {
        self.active_txn.clear();
        self.lsn_mapping.clear();

        let mut buf = vec![0u8; LOG_BUFFER_SIZE];
        let mut file_offset: u64 = 0;
        let mut replayed = 0usize;

        loop {
            let n = self.disk_manager.read_log(&mut buf, file_offset)?;
            if n == 0 {
                break;
            }

            let mut pos = 0;
            while let Some(record) = LogRecord::deserialize(&buf[pos..n]) {
                self.lsn_mapping.insert(record.lsn, file_offset + pos as u64);

                match record.record_type {
                    LogRecordType::Commit | LogRecordType::Abort => {
                        self.active_txn.remove(&record.txn_id);
                    }
                    _ => {
                        self.active_txn.insert(record.txn_id, record.lsn);
                    }
                }

                if self.redo_record(&record)? {
                    replayed += 1;
                }
                pos += record.size as usize;
            }

            if pos == 0 {
                // Torn or short tail: nothing more to replay
                break;
            }
            file_offset += pos as u64;
        }

        info!(
            "redo pass done: {} records replayed, {} loser transaction(s)",
            replayed,
            self.active_txn.len()
        );
        Ok(())
    }

    /// Backward pass: reverse every change of every loser transaction
    pub fn undo(&mut self) -> Result<()> {
        let losers: Vec<(TxnId, Lsn)> = self.active_txn.iter().map(|(&t, &l)| (t, l)).collect();

        for (txn_id, last_lsn) in losers {
            debug!("undoing transaction {} from LSN {}", txn_id, last_lsn);
            let mut lsn = last_lsn;

            loop {
                let offset = match self.lsn_mapping.get(&lsn) {
                    Some(&o) => o,
                    None => break,
                };
                let record = self.read_record_at(offset)?;
                self.undo_record(&record)?;

                if record.prev_lsn == INVALID_LSN {
                    break;
                }
                lsn = record.prev_lsn;
            }
        }

        self.active_txn.clear();
        self.lsn_mapping.clear();
        Ok(())
    }

    /// Re-apply one record's forward effect if its page missed it. Returns
    /// whether the page was touched.
    fn redo_record(&self, record: &LogRecord) -> Result<bool> {
        match (&record.record_type, &record.payload) {
            (LogRecordType::Insert, LogPayload::Tuple { rid, tuple }) => {
                self.redo_on_page(*rid, record.lsn, |page| {
                    table_page::insert_tuple(page, tuple).map(|_| ())
                })
            }
            (LogRecordType::MarkDelete, LogPayload::Tuple { rid, .. }) => {
                self.redo_on_page(*rid, record.lsn, |page| table_page::mark_delete(page, *rid))
            }
            (LogRecordType::ApplyDelete, LogPayload::Tuple { rid, .. }) => {
                self.redo_on_page(*rid, record.lsn, |page| table_page::apply_delete(page, *rid))
            }
            (LogRecordType::RollbackDelete, LogPayload::Tuple { rid, .. }) => {
                self.redo_on_page(*rid, record.lsn, |page| {
                    table_page::rollback_delete(page, *rid)
                })
            }
            (LogRecordType::Update, LogPayload::Update { rid, new_tuple, .. }) => {
                self.redo_on_page(*rid, record.lsn, |page| {
                    table_page::update_tuple(page, *rid, new_tuple).map(|_| ())
                })
            }
            (LogRecordType::NewPage, LogPayload::NewPage { prev_page_id }) => {
                self.redo_new_page(*prev_page_id, record.lsn)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Fetch the target page and apply `op` iff the page's durable LSN
    /// trails the record. Stamping the record's LSN afterwards is what makes
    /// a repeated redo pass a no-op.
    fn redo_on_page<F>(&self, rid: Rid, lsn: Lsn, op: F) -> Result<bool>
    where
        F: FnOnce(&mut Page) -> std::result::Result<(), PageError>,
    {
        let mut guard = self.buffer_pool.fetch_page_guard(rid.page_id)?;
        let page_ptr = guard.page().clone();
        let mut page = page_ptr.write();

        if table_page::lsn(&page) >= lsn {
            return Ok(false);
        }

        op(&mut page)?;
        table_page::set_lsn(&mut page, lsn);
        drop(page);
        guard.mark_dirty();
        Ok(true)
    }

    /// Replay a page allocation: make a fresh table page and link it behind
    /// its predecessor when the predecessor has not been linked yet.
    fn redo_new_page(&self, prev_page_id: u32, lsn: Lsn) -> Result<()> {
        let mut guard = self.buffer_pool.new_page_guard()?;
        let new_page_id = guard.page_id();
        {
            let mut page = guard.page().write();
            table_page::init(&mut page, prev_page_id);
            table_page::set_lsn(&mut page, lsn);
        }
        guard.mark_dirty();
        drop(guard);

        if prev_page_id != INVALID_PAGE_ID {
            let mut prev_guard = self.buffer_pool.fetch_page_guard(prev_page_id)?;
            let page_ptr = prev_guard.page().clone();
            let mut page = page_ptr.write();
            if table_page::next_page_id(&page) == INVALID_PAGE_ID {
                table_page::set_next_page_id(&mut page, new_page_id);
                drop(page);
                prev_guard.mark_dirty();
            }
        }

        Ok(())
    }

    /// Apply the inverse of one record
    fn undo_record(&self, record: &LogRecord) -> Result<()> {
        match (&record.record_type, &record.payload) {
            (LogRecordType::Insert, LogPayload::Tuple { rid, .. }) => {
                self.undo_on_page(*rid, |page| table_page::apply_delete(page, *rid))
            }
            (LogRecordType::MarkDelete, LogPayload::Tuple { rid, .. }) => {
                self.undo_on_page(*rid, |page| table_page::rollback_delete(page, *rid))
            }
            (LogRecordType::ApplyDelete, LogPayload::Tuple { rid, tuple }) => {
                self.undo_on_page(*rid, |page| {
                    table_page::insert_tuple(page, tuple).map(|_| ())
                })
            }
            (LogRecordType::RollbackDelete, LogPayload::Tuple { rid, .. }) => {
                self.undo_on_page(*rid, |page| table_page::mark_delete(page, *rid))
            }
            (LogRecordType::Update, LogPayload::Update { rid, old_tuple, .. }) => {
                self.undo_on_page(*rid, |page| {
                    table_page::update_tuple(page, *rid, old_tuple).map(|_| ())
                })
            }
            _ => Ok(()),
        }
    }

    fn undo_on_page<F>(&self, rid: Rid, op: F) -> Result<()>
    where
        F: FnOnce(&mut Page) -> std::result::Result<(), PageError>,
    {
        let mut guard = self.buffer_pool.fetch_page_guard(rid.page_id)?;
        let page_ptr = guard.page().clone();
        let mut page = page_ptr.write();
        op(&mut page)?;
        drop(page);
        guard.mark_dirty();
        Ok(())
    }

    /// Read one whole record at a byte offset of the log stream
    fn read_record_at(&self, offset: u64) -> Result<LogRecord> {
        let mut buf = vec![0u8; LOG_BUFFER_SIZE];
        let n = self.disk_manager.read_log(&mut buf, offset)?;
        LogRecord::deserialize(&buf[..n]).ok_or(RecoveryError::CorruptRecord(offset))
    }
}
