//! Typed log records and their wire format.
//!
//! Every record starts with a fixed 20-byte little-endian header:
//!
//! | size | lsn | txn_id | prev_lsn | type |
//!
//! followed by a payload that depends on the type. Tuple images serialize
//! as length-prefixed bytes; record IDs are 8 bytes.

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Lsn, PageId, Rid, TxnId, INVALID_LSN};
use crate::storage::page::Tuple;

/// Fixed byte width of the record header
pub const HEADER_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    /// Marks the beginning of a transaction
    Begin = 1,
    /// Marks the successful completion of a transaction
    Commit = 2,
    /// Marks the abortion of a transaction
    Abort = 3,
    /// A tuple was inserted
    Insert = 4,
    /// A tuple was logically deleted (rollback still possible)
    MarkDelete = 5,
    /// A tuple was physically removed
    ApplyDelete = 6,
    /// A logical delete was rolled back
    RollbackDelete = 7,
    /// A tuple was overwritten; carries both images
    Update = 8,
    /// A table page was allocated and linked after `prev_page_id`
    NewPage = 9,
}

impl LogRecordType {
    fn from_u32(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Begin),
            2 => Some(Self::Commit),
            3 => Some(Self::Abort),
            4 => Some(Self::Insert),
            5 => Some(Self::MarkDelete),
            6 => Some(Self::ApplyDelete),
            7 => Some(Self::RollbackDelete),
            8 => Some(Self::Update),
            9 => Some(Self::NewPage),
            _ => None,
        }
    }
}

/// Type-specific payload of a log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPayload {
    /// Begin/Commit/Abort carry nothing
    None,
    /// Insert and the three delete flavors carry the touched tuple
    Tuple { rid: Rid, tuple: Tuple },
    /// Update carries both images so it can be replayed or reversed
    Update {
        rid: Rid,
        old_tuple: Tuple,
        new_tuple: Tuple,
    },
    /// NewPage records which page the new one was chained after
    NewPage { prev_page_id: PageId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Total serialized length including the header
    pub size: u32,
    /// Assigned by the log manager at append time
    pub lsn: Lsn,
    pub txn_id: TxnId,
    /// Previous record of the same transaction; INVALID_LSN at txn start
    pub prev_lsn: Lsn,
    pub record_type: LogRecordType,
    pub payload: LogPayload,
}

impl LogRecord {
    fn new(txn_id: TxnId, prev_lsn: Lsn, record_type: LogRecordType, payload: LogPayload) -> Self {
        let payload_size = match &payload {
            LogPayload::None => 0,
            LogPayload::Tuple { tuple, .. } => Rid::SIZE + tuple.serialized_size(),
            LogPayload::Update {
                old_tuple,
                new_tuple,
                ..
            } => Rid::SIZE + old_tuple.serialized_size() + new_tuple.serialized_size(),
            LogPayload::NewPage { .. } => 4,
        };
        Self {
            size: (HEADER_SIZE + payload_size) as u32,
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            record_type,
            payload,
        }
    }

    pub fn new_begin(txn_id: TxnId) -> Self {
        Self::new(txn_id, INVALID_LSN, LogRecordType::Begin, LogPayload::None)
    }

    pub fn new_commit(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogRecordType::Commit, LogPayload::None)
    }

    pub fn new_abort(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogRecordType::Abort, LogPayload::None)
    }

    pub fn new_insert(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(
            txn_id,
            prev_lsn,
            LogRecordType::Insert,
            LogPayload::Tuple { rid, tuple },
        )
    }

    pub fn new_mark_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(
            txn_id,
            prev_lsn,
            LogRecordType::MarkDelete,
            LogPayload::Tuple { rid, tuple },
        )
    }

    pub fn new_apply_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(
            txn_id,
            prev_lsn,
            LogRecordType::ApplyDelete,
            LogPayload::Tuple { rid, tuple },
        )
    }

    pub fn new_rollback_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(
            txn_id,
            prev_lsn,
            LogRecordType::RollbackDelete,
            LogPayload::Tuple { rid, tuple },
        )
    }

    pub fn new_update(
        txn_id: TxnId,
        prev_lsn: Lsn,
        rid: Rid,
        old_tuple: Tuple,
        new_tuple: Tuple,
    ) -> Self {
        Self::new(
            txn_id,
            prev_lsn,
            LogRecordType::Update,
            LogPayload::Update {
                rid,
                old_tuple,
                new_tuple,
            },
        )
    }

    pub fn new_new_page(txn_id: TxnId, prev_lsn: Lsn, prev_page_id: PageId) -> Self {
        Self::new(
            txn_id,
            prev_lsn,
            LogRecordType::NewPage,
            LogPayload::NewPage { prev_page_id },
        )
    }

    /// Serialize header and payload into `buf`, which must hold `size` bytes
    pub fn serialize_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..4], self.size);
        LittleEndian::write_u32(&mut buf[4..8], self.lsn);
        LittleEndian::write_u32(&mut buf[8..12], self.txn_id);
        LittleEndian::write_u32(&mut buf[12..16], self.prev_lsn);
        LittleEndian::write_u32(&mut buf[16..20], self.record_type as u32);

        let mut pos = HEADER_SIZE;
        match &self.payload {
            LogPayload::None => {}
            LogPayload::Tuple { rid, tuple } => {
                buf[pos..pos + Rid::SIZE].copy_from_slice(&rid.to_bytes());
                pos += Rid::SIZE;
                tuple.serialize_into(&mut buf[pos..]);
            }
            LogPayload::Update {
                rid,
                old_tuple,
                new_tuple,
            } => {
                buf[pos..pos + Rid::SIZE].copy_from_slice(&rid.to_bytes());
                pos += Rid::SIZE;
                old_tuple.serialize_into(&mut buf[pos..]);
                pos += old_tuple.serialized_size();
                new_tuple.serialize_into(&mut buf[pos..]);
            }
            LogPayload::NewPage { prev_page_id } => {
                LittleEndian::write_u32(&mut buf[pos..pos + 4], *prev_page_id);
            }
        }
    }

    /// Parse one record from the front of `buf`. Returns None when the
    /// buffer holds less than a complete record (the torn-tail case that
    /// ends a recovery scan).
    pub fn deserialize(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }

        let size = LittleEndian::read_u32(&buf[0..4]);
        if (size as usize) < HEADER_SIZE || buf.len() < size as usize {
            return None;
        }

        let lsn = LittleEndian::read_u32(&buf[4..8]);
        let txn_id = LittleEndian::read_u32(&buf[8..12]);
        let prev_lsn = LittleEndian::read_u32(&buf[12..16]);
        let record_type = LogRecordType::from_u32(LittleEndian::read_u32(&buf[16..20]))?;

        let body = &buf[HEADER_SIZE..size as usize];
        let payload = match record_type {
            LogRecordType::Begin | LogRecordType::Commit | LogRecordType::Abort => {
                LogPayload::None
            }
            LogRecordType::Insert
            | LogRecordType::MarkDelete
            | LogRecordType::ApplyDelete
            | LogRecordType::RollbackDelete => {
                if body.len() < Rid::SIZE {
                    return None;
                }
                let rid = Rid::from_bytes(&body[0..Rid::SIZE]);
                let tuple = Tuple::deserialize_from(&body[Rid::SIZE..])?;
                LogPayload::Tuple { rid, tuple }
            }
            LogRecordType::Update => {
                if body.len() < Rid::SIZE {
                    return None;
                }
                let rid = Rid::from_bytes(&body[0..Rid::SIZE]);
                let old_tuple = Tuple::deserialize_from(&body[Rid::SIZE..])?;
                let new_tuple =
                    Tuple::deserialize_from(&body[Rid::SIZE + old_tuple.serialized_size()..])?;
                LogPayload::Update {
                    rid,
                    old_tuple,
                    new_tuple,
                }
            }
            LogRecordType::NewPage => {
                if body.len() < 4 {
                    return None;
                }
                LogPayload::NewPage {
                    prev_page_id: LittleEndian::read_u32(&body[0..4]),
                }
            }
        };

        Some(Self {
            size,
            lsn,
            txn_id,
            prev_lsn,
            record_type,
            payload,
        })
    }
}
