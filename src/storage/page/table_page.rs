//! Slotted table page.
//!
//! Layout: a fixed header, a slot directory growing up from the header, and
//! tuple bytes growing down from the end of the page.
//!
//! ```text
//! | header | slot 0 | slot 1 | ...   free   ... | tuple 1 | tuple 0 |
//! ```
//!
//! Each slot is `(offset, size)`. An offset of zero marks a slot whose tuple
//! was physically removed; the top bit of `size` marks a tuple that is
//! logically deleted but still present (the mark/rollback pair used by
//! transaction rollback). Space freed by physical deletes is reclaimed
//! lazily, not compacted.

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Lsn, Page, PageId, Rid, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::page::error::PageError;
use crate::storage::page::tuple::Tuple;

/// Header: lsn(4) | prev_page_id(4) | next_page_id(4) | free_space_offset(4)
/// | slot_count(4)
pub const HEADER_SIZE: usize = 20;
/// Slot entry: offset(4) | size(4)
pub const SLOT_SIZE: usize = 8;

const DELETE_MASK: u32 = 1 << 31;

/// Initialize an empty table page
pub fn init(page: &mut Page, prev_page_id: PageId) {
    page.data[..HEADER_SIZE].fill(0);
    LittleEndian::write_u32(&mut page.data[4..8], prev_page_id);
    LittleEndian::write_u32(&mut page.data[8..12], INVALID_PAGE_ID);
    LittleEndian::write_u32(&mut page.data[12..16], PAGE_SIZE as u32);
}

/// Durable LSN of the page (what the redo guard compares)
pub fn lsn(page: &Page) -> Lsn {
    LittleEndian::read_u32(&page.data[0..4])
}

/// Stamp the page with an LSN, both in the byte header and in the frame
/// metadata the WAL gate consults.
pub fn set_lsn(page: &mut Page, lsn: Lsn) {
    LittleEndian::write_u32(&mut page.data[0..4], lsn);
    page.lsn = lsn;
}

pub fn prev_page_id(page: &Page) -> PageId {
    LittleEndian::read_u32(&page.data[4..8])
}

pub fn next_page_id(page: &Page) -> PageId {
    LittleEndian::read_u32(&page.data[8..12])
}

pub fn set_next_page_id(page: &mut Page, next: PageId) {
    LittleEndian::write_u32(&mut page.data[8..12], next);
}

pub fn tuple_count(page: &Page) -> u32 {
    LittleEndian::read_u32(&page.data[16..20])
}

/// Insert a tuple, reusing a dead slot when one exists. Returns the record
/// ID the tuple now lives at.
pub fn insert_tuple(page: &mut Page, tuple: &Tuple) -> Result<Rid, PageError> {
    let count = tuple_count(page);
    let len = tuple.len() as u32;

    // A physically deleted slot can take the new tuple without growing the
    // directory.
    let mut slot = None;
    for i in 0..count {
        let (offset, _) = read_slot(page, i);
        if offset == 0 {
            slot = Some(i);
            break;
        }
    }
    let (slot, new_slot) = match slot {
        Some(i) => (i, false),
        None => (count, true),
    };

    let directory_end = HEADER_SIZE + SLOT_SIZE * (count as usize + usize::from(new_slot));
    let free_ptr = free_space_offset(page);
    if (free_ptr as usize) < directory_end + len as usize {
        return Err(PageError::InsufficientSpace);
    }

    let new_offset = free_ptr - len;
    page.data[new_offset as usize..(new_offset + len) as usize].copy_from_slice(tuple.data());
    write_slot(page, slot, new_offset, len);
    set_free_space_offset(page, new_offset);
    if new_slot {
        LittleEndian::write_u32(&mut page.data[16..20], count + 1);
    }

    Ok(Rid::new(page.page_id, slot))
}

/// Read a live tuple
pub fn get_tuple(page: &Page, rid: Rid) -> Result<Tuple, PageError> {
    let (offset, size) = checked_slot(page, rid)?;
    if size & DELETE_MASK != 0 {
        return Err(PageError::TupleDeleted);
    }
    let start = offset as usize;
    let end = start + size as usize;
    Ok(Tuple::new(page.data[start..end].to_vec()))
}

/// Replace a tuple's bytes, returning the old image. Updates that fit are
/// done in place; growing updates relocate the tuple to fresh space and
/// leave the old bytes for lazy reclamation.
pub fn update_tuple(page: &mut Page, rid: Rid, new_tuple: &Tuple) -> Result<Tuple, PageError> {
    let (offset, size) = checked_slot(page, rid)?;
    if size & DELETE_MASK != 0 {
        return Err(PageError::TupleDeleted);
    }

    let old = Tuple::new(page.data[offset as usize..(offset + size) as usize].to_vec());
    let new_len = new_tuple.len() as u32;

    if new_len <= size {
        page.data[offset as usize..(offset as usize + new_tuple.len())]
            .copy_from_slice(new_tuple.data());
        write_slot(page, rid.slot, offset, new_len);
        return Ok(old);
    }

    let directory_end = HEADER_SIZE + SLOT_SIZE * tuple_count(page) as usize;
    let free_ptr = free_space_offset(page);
    if (free_ptr as usize) < directory_end + new_len as usize {
        return Err(PageError::InsufficientSpace);
    }

    let new_offset = free_ptr - new_len;
    page.data[new_offset as usize..(new_offset + new_len) as usize]
        .copy_from_slice(new_tuple.data());
    write_slot(page, rid.slot, new_offset, new_len);
    set_free_space_offset(page, new_offset);

    Ok(old)
}

/// Logically delete a tuple, keeping its bytes for a possible rollback
pub fn mark_delete(page: &mut Page, rid: Rid) -> Result<(), PageError> {
    let (offset, size) = checked_slot(page, rid)?;
    if size & DELETE_MASK != 0 {
        return Err(PageError::TupleDeleted);
    }
    write_slot(page, rid.slot, offset, size | DELETE_MASK);
    Ok(())
}

/// Undo a logical delete
pub fn rollback_delete(page: &mut Page, rid: Rid) -> Result<(), PageError> {
    let (offset, size) = checked_slot(page, rid)?;
    write_slot(page, rid.slot, offset, size & !DELETE_MASK);
    Ok(())
}

/// Physically remove a tuple. The slot becomes reusable; the bytes are
/// reclaimed lazily.
pub fn apply_delete(page: &mut Page, rid: Rid) -> Result<(), PageError> {
    checked_slot(page, rid)?;
    write_slot(page, rid.slot, 0, 0);
    Ok(())
}

fn checked_slot(page: &Page, rid: Rid) -> Result<(u32, u32), PageError> {
    if rid.slot >= tuple_count(page) {
        return Err(PageError::InvalidRecordId);
    }
    let (offset, size) = read_slot(page, rid.slot);
    if offset == 0 {
        return Err(PageError::TupleNotFound);
    }
    Ok((offset, size))
}

fn free_space_offset(page: &Page) -> u32 {
    LittleEndian::read_u32(&page.data[12..16])
}

fn set_free_space_offset(page: &mut Page, offset: u32) {
    LittleEndian::write_u32(&mut page.data[12..16], offset);
}

fn read_slot(page: &Page, slot: u32) -> (u32, u32) {
    let pos = HEADER_SIZE + SLOT_SIZE * slot as usize;
    (
        LittleEndian::read_u32(&page.data[pos..pos + 4]),
        LittleEndian::read_u32(&page.data[pos + 4..pos + 8]),
    )
}

fn write_slot(page: &mut Page, slot: u32, offset: u32, size: u32) {
    let pos = HEADER_SIZE + SLOT_SIZE * slot as usize;
    LittleEndian::write_u32(&mut page.data[pos..pos + 4], offset);
    LittleEndian::write_u32(&mut page.data[pos + 4..pos + 8], size);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_page() -> Page {
        let mut page = Page::new(1);
        init(&mut page, INVALID_PAGE_ID);
        page
    }

    #[test]
    fn test_insert_and_get() {
        let mut page = fresh_page();
        let tuple = Tuple::new(b"hello".to_vec());

        let rid = insert_tuple(&mut page, &tuple).unwrap();
        assert_eq!(rid, Rid::new(1, 0));
        assert_eq!(get_tuple(&page, rid).unwrap(), tuple);
        assert_eq!(tuple_count(&page), 1);
    }

    #[test]
    fn test_delete_lifecycle() {
        let mut page = fresh_page();
        let tuple = Tuple::new(b"doomed".to_vec());
        let rid = insert_tuple(&mut page, &tuple).unwrap();

        mark_delete(&mut page, rid).unwrap();
        assert!(matches!(get_tuple(&page, rid), Err(PageError::TupleDeleted)));

        rollback_delete(&mut page, rid).unwrap();
        assert_eq!(get_tuple(&page, rid).unwrap(), tuple);

        mark_delete(&mut page, rid).unwrap();
        apply_delete(&mut page, rid).unwrap();
        assert!(matches!(get_tuple(&page, rid), Err(PageError::TupleNotFound)));
    }

    #[test]
    fn test_dead_slot_is_reused() {
        let mut page = fresh_page();
        let first = insert_tuple(&mut page, &Tuple::new(b"one".to_vec())).unwrap();
        let _second = insert_tuple(&mut page, &Tuple::new(b"two".to_vec())).unwrap();

        apply_delete(&mut page, first).unwrap();
        let third = insert_tuple(&mut page, &Tuple::new(b"three".to_vec())).unwrap();

        assert_eq!(third.slot, first.slot);
        assert_eq!(tuple_count(&page), 2);
        assert_eq!(get_tuple(&page, third).unwrap().data(), b"three");
    }

    #[test]
    fn test_update_in_place_and_relocated() {
        let mut page = fresh_page();
        let rid = insert_tuple(&mut page, &Tuple::new(b"abcdef".to_vec())).unwrap();

        let old = update_tuple(&mut page, rid, &Tuple::new(b"xyz".to_vec())).unwrap();
        assert_eq!(old.data(), b"abcdef");
        assert_eq!(get_tuple(&page, rid).unwrap().data(), b"xyz");

        let old = update_tuple(&mut page, rid, &Tuple::new(b"a longer tuple".to_vec())).unwrap();
        assert_eq!(old.data(), b"xyz");
        assert_eq!(get_tuple(&page, rid).unwrap().data(), b"a longer tuple");
    }

    #[test]
    fn test_page_fills_up() {
        let mut page = fresh_page();
        let big = Tuple::new(vec![0u8; 4000]);

        insert_tuple(&mut page, &big).unwrap();
        insert_tuple(&mut page, &big).unwrap();
        assert!(matches!(
            insert_tuple(&mut page, &big),
            Err(PageError::InsufficientSpace)
        ));
    }

    #[test]
    fn test_lsn_and_links() {
        let mut page = fresh_page();
        assert_eq!(lsn(&page), 0);

        set_lsn(&mut page, 42);
        assert_eq!(lsn(&page), 42);
        assert_eq!(page.lsn, 42);

        assert_eq!(next_page_id(&page), INVALID_PAGE_ID);
        set_next_page_id(&mut page, 9);
        assert_eq!(next_page_id(&page), 9);
        assert_eq!(prev_page_id(&page), INVALID_PAGE_ID);
    }
}
