use anyhow::Result;

mod common;
use common::create_test_buffer_pool;

use opaldb::storage::buffer::BufferPoolError;

#[test]
fn test_new_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;

    // Page IDs start at 1
    assert!(page_id > 0);

    {
        let page_guard = page.read();
        assert_eq!(page_guard.page_id, page_id);
        assert!(page_guard.data.iter().all(|&b| b == 0));
    }

    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_fetch_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(page_guard.page_id, page_id);
    }
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_page_modification() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        let test_data = b"Test Data";
        page_guard.data[100..100 + test_data.len()].copy_from_slice(test_data);
    }
    buffer_pool.unpin_page(page_id, true)?;

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(&page_guard.data[100..109], b"Test Data");
    }
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_eviction_rereads_last_written_bytes() -> Result<()> {
    // Three frames: a, b, c fill the pool
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (page_a, a) = buffer_pool.new_page()?;
    {
        let mut page_guard = page_a.write();
        page_guard.data[0..7].copy_from_slice(b"frame-a");
    }
    buffer_pool.unpin_page(a, true)?;

    let (_, b) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(b, false)?;
    let (_, c) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(c, false)?;

    // A fourth page forces an eviction; a was unpinned first, so the clock
    // hand reaches it first.
    let (_, d) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(d, false)?;

    // Fetching a again must read its last written bytes back from disk
    let fetched = buffer_pool.fetch_page(a)?;
    {
        let page_guard = fetched.read();
        assert_eq!(&page_guard.data[0..7], b"frame-a");
    }
    buffer_pool.unpin_page(a, false)?;

    Ok(())
}

#[test]
fn test_pool_exhausted_when_all_pinned() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let mut pinned = Vec::new();
    for _ in 0..3 {
        let (_, page_id) = buffer_pool.new_page()?;
        pinned.push(page_id);
    }

    // No free frame and no victim
    assert!(matches!(
        buffer_pool.new_page(),
        Err(BufferPoolError::PoolExhausted)
    ));

    // Unpinning one page makes room again
    buffer_pool.unpin_page(pinned[0], false)?;
    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_unpin_errors() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Unpinning a page that is not resident
    assert!(matches!(
        buffer_pool.unpin_page(42, false),
        Err(BufferPoolError::PageNotFound(42))
    ));

    // Unpinning below zero
    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;
    assert!(matches!(
        buffer_pool.unpin_page(page_id, false),
        Err(BufferPoolError::PageNotPinned(_))
    ));

    Ok(())
}

#[test]
fn test_dirty_flag_is_sticky() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        page_guard.data[0] = 0xAB;
    }

    // Pin twice, report dirty only on the first unpin; the second clean
    // unpin must not wash the flag out.
    let _ = buffer_pool.fetch_page(page_id)?;
    buffer_pool.unpin_page(page_id, true)?;
    buffer_pool.unpin_page(page_id, false)?;
    buffer_pool.flush_all_pages()?;

    // Evict everything by filling the pool, then re-read from disk
    for _ in 0..10 {
        let (_, id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(id, false)?;
    }

    let fetched = buffer_pool.fetch_page(page_id)?;
    assert_eq!(fetched.read().data[0], 0xAB);
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_flush_all_pages() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let mut page_ids = Vec::new();
    for i in 0..5 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            let test_data = format!("Test Data {}", i).into_bytes();
            page_guard.data[100..100 + test_data.len()].copy_from_slice(&test_data);
        }
        buffer_pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }

    buffer_pool.flush_all_pages()?;

    for (i, &page_id) in page_ids.iter().enumerate() {
        let fetched_page = buffer_pool.fetch_page(page_id)?;
        {
            let page_guard = fetched_page.read();
            let expected_data = format!("Test Data {}", i).into_bytes();
            assert_eq!(
                &page_guard.data[100..100 + expected_data.len()],
                expected_data.as_slice()
            );
        }
        buffer_pool.unpin_page(page_id, false)?;
    }

    Ok(())
}

#[test]
fn test_delete_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;

    // Pinned pages refuse deletion
    assert!(matches!(
        buffer_pool.delete_page(page_id),
        Err(BufferPoolError::PagePinned(_))
    ));

    buffer_pool.unpin_page(page_id, false)?;
    buffer_pool.delete_page(page_id)?;

    // Deleting an absent page is fine
    buffer_pool.delete_page(page_id)?;

    // The freed frame is reusable
    let (new_page, new_page_id) = buffer_pool.new_page()?;
    {
        let page_guard = new_page.read();
        assert_eq!(page_guard.page_id, new_page_id);
    }
    buffer_pool.unpin_page(new_page_id, false)?;

    Ok(())
}

#[test]
fn test_page_guard_unpins_on_drop() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let page_id = {
        let mut guard = buffer_pool.new_page_guard()?;
        {
            let mut page_guard = guard.page().write();
            page_guard.data[0] = 9;
        }
        guard.mark_dirty();
        guard.page_id()
    };

    // The guard released its pin, so the pool can evict freely
    for _ in 0..3 {
        let (_, id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(id, false)?;
    }

    let guard = buffer_pool.fetch_page_guard(page_id)?;
    assert_eq!(guard.page().read().data[0], 9);

    Ok(())
}
