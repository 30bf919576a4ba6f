use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use log::error;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::common::types::{Lsn, INVALID_LSN, LOG_BUFFER_SIZE};
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::transaction::wal::log_record::LogRecord;

/// Error type for log manager operations
#[derive(Error, Debug)]
pub enum LogManagerError {
    #[error("I/O error: {0}")]
    IoError(#[from] DiskManagerError),

    #[error("Log record of {0} bytes exceeds the log buffer")]
    RecordTooLarge(usize),
}

/// Result type for log manager operations
pub type Result<T> = std::result::Result<T, LogManagerError>;

/// Configuration for the log manager
#[derive(Debug, Clone)]
pub struct LogManagerConfig {
    /// How long the flush thread sleeps before flushing an unfilled buffer
    pub log_timeout: Duration,

    /// Size of each of the two in-memory buffers in bytes
    pub buffer_size: usize,
}

impl Default for LogManagerConfig {
    fn default() -> Self {
        Self {
            log_timeout: Duration::from_millis(100),
            buffer_size: LOG_BUFFER_SIZE,
        }
    }
}

/// State behind the log latch: the double buffers and the LSN counters.
///
/// Appends fill `log_buffer`; the flush thread swaps it with `flush_buffer`
/// and writes the swapped-out bytes without holding the latch. The round
/// counters are the flush future: waiting for "the current flush" is
/// waiting until `completed_round` passes the round opened after a signal.
struct LogCore {
    log_buffer: Vec<u8>,
    flush_buffer: Vec<u8>,
    offset: usize,
    next_lsn: Lsn,
    persistent_lsn: Lsn,
    flush_round: u64,
    completed_round: u64,
}

/// Group-commit write-ahead log with a background flusher.
pub struct LogManager {
    disk_manager: Arc<DiskManager>,
    config: LogManagerConfig,
    core: Mutex<LogCore>,
    /// Wakes the flush thread
    flush_cv: Condvar,
    /// Wakes appenders and force-flushers waiting on a round
    done_cv: Condvar,
    enabled: AtomicBool,
    flush_thread: Mutex<Option<JoinHandle<()>>>,
}

impl LogManager {
    pub fn new(disk_manager: Arc<DiskManager>, config: LogManagerConfig) -> Self {
        let core = LogCore {
            log_buffer: vec![0; config.buffer_size],
            flush_buffer: vec![0; config.buffer_size],
            offset: 0,
            next_lsn: 1,
            persistent_lsn: INVALID_LSN,
            flush_round: 0,
            completed_round: 0,
        };
        Self {
            disk_manager,
            config,
            core: Mutex::new(core),
            flush_cv: Condvar::new(),
            done_cv: Condvar::new(),
            enabled: AtomicBool::new(false),
            flush_thread: Mutex::new(None),
        }
    }

    pub fn with_default_config(disk_manager: Arc<DiskManager>) -> Self {
        Self::new(disk_manager, LogManagerConfig::default())
    }

    /// Whether logging is currently running (recovery runs with it off)
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// LSN that will be assigned to the next appended record
    pub fn next_lsn(&self) -> Lsn {
        self.core.lock().next_lsn
    }

    /// Highest LSN known to be durable in the log stream
    pub fn persistent_lsn(&self) -> Lsn {
        self.core.lock().persistent_lsn
    }

    /// Append a record to the log buffer, assigning its LSN. Blocks for a
    /// flush round when the buffer is too full to take the record.
    pub fn append_log_record(&self, record: &mut LogRecord) -> Result<Lsn> {
        let size = record.size as usize;
        if size > self.config.buffer_size {
            return Err(LogManagerError::RecordTooLarge(size));
        }

        let mut core = self.core.lock();
        while core.offset + size > self.config.buffer_size {
            if !self.is_enabled() {
                // No flusher to hand off to: drain the buffer inline
                let len = core.offset;
                self.disk_manager.write_log(&core.log_buffer[..len])?;
                core.persistent_lsn = core.next_lsn - 1;
                core.offset = 0;
                continue;
            }
            let target = core.flush_round + 1;
            self.flush_cv.notify_one();
            while core.completed_round < target {
                self.done_cv.wait(&mut core);
            }
        }

        record.lsn = core.next_lsn;
        core.next_lsn += 1;

        let offset = core.offset;
        record.serialize_into(&mut core.log_buffer[offset..offset + size]);
        core.offset += size;

        Ok(record.lsn)
    }

    /// Start the background flush thread and enable logging
    pub fn run_flush_thread(self: &Arc<Self>) {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = Arc::clone(self);
        let handle = std::thread::spawn(move || manager.flush_loop());
        *self.flush_thread.lock() = Some(handle);
    }

    /// Disable logging, wake the flusher for a final drain and join it
    pub fn stop_flush_thread(&self) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        self.flush_cv.notify_one();
        if let Some(handle) = self.flush_thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Kick the flusher and wait until the round it runs has completed
    pub fn force_flush(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let mut core = self.core.lock();
        let target = core.flush_round + 1;
        self.flush_cv.notify_one();
        while core.completed_round < target {
            self.done_cv.wait(&mut core);
        }
        Ok(())
    }

    /// WAL gate: block until everything up to `lsn` is durable. A page
    /// carrying `lsn` may be written to disk once this returns.
    pub fn flush_until(&self, lsn: Lsn) -> Result<()> {
        while self.is_enabled() {
            if self.core.lock().persistent_lsn >= lsn {
                break;
            }
            self.force_flush()?;
        }
        Ok(())
    }

    fn flush_loop(&self) {
        loop {
            let keep_running = self.enabled.load(Ordering::SeqCst);

            let (round, flush_len, buf, last_lsn) = {
                let mut guard = self.core.lock();
                if keep_running {
                    self.flush_cv.wait_for(&mut guard, self.config.log_timeout);
                }
                let core = &mut *guard;

                // Everything appended so far sits below next_lsn
                let last_lsn = core.next_lsn - 1;
                core.flush_round += 1;
                let round = core.flush_round;

                let flush_len = core.offset;
                core.offset = 0;
                std::mem::swap(&mut core.log_buffer, &mut core.flush_buffer);
                let buf = std::mem::take(&mut core.flush_buffer);

                (round, flush_len, buf, last_lsn)
            };

            // The write happens outside the latch; appenders keep filling
            // the other buffer meanwhile.
            let mut write_ok = true;
            if flush_len > 0 {
                if let Err(e) = self.disk_manager.write_log(&buf[..flush_len]) {
                    error!("log flush failed: {}", e);
                    write_ok = false;
                }
            }

            let mut core = self.core.lock();
            core.flush_buffer = buf;
            if write_ok && last_lsn != INVALID_LSN {
                core.persistent_lsn = last_lsn;
            }
            core.completed_round = round;
            self.done_cv.notify_all();
            drop(core);

            if !keep_running {
                break;
            }
        }
    }
}
