use std::sync::Arc;
use byteorder::{ByteOrder, LittleEndian};
use parking_lot::RwLock;

/// Page size in bytes (8KB)
pub const PAGE_SIZE: usize = 8192;

/// Size of the in-memory log buffers (64KB)
pub const LOG_BUFFER_SIZE: usize = 64 * 1024;

/// Page ID type
pub type PageId = u32;

/// Reserved page ID; valid pages are numbered from 1
pub const INVALID_PAGE_ID: PageId = 0;

/// Transaction ID type
pub type TxnId = u32;

/// Buffer pool frame ID type
pub type FrameId = u32;

/// LSN (Log Sequence Number) type
pub type Lsn = u32;

/// Reserved LSN; assigned LSNs are numbered from 1
pub const INVALID_LSN: Lsn = 0;

/// Record ID: the page a tuple lives on and its slot within the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    /// Serialized width of a record ID
    pub const SIZE: usize = 8;

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.page_id);
        LittleEndian::write_u32(&mut bytes[4..8], self.slot);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            page_id: LittleEndian::read_u32(&bytes[0..4]),
            slot: LittleEndian::read_u32(&bytes[4..8]),
        }
    }
}

/// Page structure
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
    /// LSN of the last logged modification since this page was loaded.
    /// INVALID_LSN right after a load; the durable LSN of a table page
    /// lives in its byte header.
    pub lsn: Lsn,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
            lsn: INVALID_LSN,
        }
    }
}

/// Smart pointer to a page
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame structure
#[derive(Debug)]
pub struct Frame {
    pub page: PagePtr,
    pub frame_id: FrameId,
    pub is_dirty: bool,
    pub pin_count: u32,
}

impl Frame {
    pub fn new(frame_id: FrameId, page: PagePtr) -> Self {
        Self {
            page,
            frame_id,
            is_dirty: false,
            pin_count: 0,
        }
    }
}

/// Smart pointer to a frame
pub type FramePtr = Arc<RwLock<Frame>>;
