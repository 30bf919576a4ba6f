use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager is responsible for the actual disk I/O: fixed-size page
/// reads and writes against the database file, and an append-only log
/// stream kept in a sibling file.
pub struct DiskManager {
    db_file: Mutex<File>,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

impl DiskManager {
    /// Create a new DiskManager for the specified database file. The log
    /// stream lives next to it with a `.log` suffix appended.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&db_path)?;

        let mut log_path = db_path.as_ref().as_os_str().to_os_string();
        log_path.push(".log");
        let log_path = PathBuf::from(log_path);
        let log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&log_path)?;

        Ok(Self {
            db_file: Mutex::new(db_file),
            log_file: Mutex::new(log_file),
            log_path,
        })
    }

    /// Read a page from disk
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut buffer = [0u8; PAGE_SIZE];

        {
            let mut file = self.db_file.lock();
            let file_size = file.metadata()?.len();

            // Past the end of the file: hand back a zeroed page
            if offset >= file_size {
                page.data.fill(0);
                page.page_id = page_id;
                return Ok(());
            }

            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }

        page.data.copy_from_slice(&buffer);
        page.page_id = page_id;

        Ok(())
    }

    /// Write a page to disk
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = Self::page_offset(page.page_id);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.flush()?;

        Ok(())
    }

    /// Allocate a new page on disk and return its ID
    pub fn allocate_page(&self) -> Result<PageId, DiskManagerError> {
        let mut file = self.db_file.lock();

        // The file length determines the next page ID (first page is 1)
        let file_size = file.metadata()?.len();
        let new_page_id = (file_size / PAGE_SIZE as u64) as PageId + 1;

        // Extend the file with a page of zeros
        file.seek(SeekFrom::End(0))?;
        let zeros = [0u8; PAGE_SIZE];
        file.write_all(&zeros)?;
        file.flush()?;

        Ok(new_page_id)
    }

    /// Release a page's number back to the store. Allocation is by file
    /// extension, so this is bookkeeping only; the bytes stay where they are.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Read up to `buf.len()` bytes of the log stream starting at
    /// `file_offset`. Returns the number of bytes read; 0 means EOF.
    pub fn read_log(&self, buf: &mut [u8], file_offset: u64) -> Result<usize, DiskManagerError> {
        let mut file = self.log_file.lock();
        let file_size = file.metadata()?.len();

        if file_offset >= file_size {
            return Ok(0);
        }

        file.seek(SeekFrom::Start(file_offset))?;
        let available = (file_size - file_offset) as usize;
        let to_read = available.min(buf.len());
        file.read_exact(&mut buf[..to_read])?;

        Ok(to_read)
    }

    /// Append bytes to the log stream and sync them to disk
    pub fn write_log(&self, data: &[u8]) -> Result<(), DiskManagerError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.log_file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        file.sync_data()?;

        Ok(())
    }

    /// Path of the log stream backing file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn page_offset(page_id: PageId) -> u64 {
        (page_id as u64 - 1) * PAGE_SIZE as u64
    }
}
