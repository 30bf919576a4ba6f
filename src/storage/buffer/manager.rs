use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{
    Frame, FrameId, Lsn, Page, PageId, PagePtr, FramePtr, INVALID_LSN, INVALID_PAGE_ID,
};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::page_guard::PageGuard;
use crate::storage::buffer::replacer::ClockReplacer;
use crate::storage::disk::DiskManager;
use crate::transaction::wal::log_manager::LogManager;

/// Bookkeeping shared by every public operation. One latch serializes the
/// pool: simple, and sufficient for a teaching system even though disk I/O
/// happens inside the critical section.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: ClockReplacer,
}

pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<FramePtr>,
    latch: Mutex<PoolState>,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_disk_manager(pool_size, disk_manager, None))
    }

    /// Create a buffer pool whose dirty-page writes respect the WAL rule
    /// enforced by the given log manager.
    pub fn new_with_wal(
        pool_size: usize,
        db_path: impl AsRef<Path>,
        log_manager: Arc<LogManager>,
    ) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_disk_manager(pool_size, disk_manager, Some(log_manager)))
    }

    /// Create a buffer pool over an existing disk manager, so recovery and
    /// the log manager can share the same store.
    pub fn with_disk_manager(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = i as FrameId;
            let frame = Frame::new(frame_id, Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))));
            frames.push(Arc::new(RwLock::new(frame)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            latch: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer: ClockReplacer::new(pool_size),
            }),
            disk_manager,
            log_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Fetch a page, reading it from disk if it is not resident. The page
    /// comes back pinned; every fetch must be paired with an unpin.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "cannot fetch the invalid page ID".to_string(),
            ));
        }

        let mut state = self.latch.lock();

        // Already resident: pin it and shield it from eviction
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();
            frame_guard.pin_count += 1;
            state.replacer.pin(frame_id);
            return Ok(frame_guard.page.clone());
        }

        // Miss: claim a frame, retarget the page table, read from disk
        let frame_id = self.allocate_frame(&mut state)?;
        self.evict_frame_contents(&mut state, frame_id)?;

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        {
            let mut page_guard = frame_guard.page.write();
            self.disk_manager.read_page(page_id, &mut page_guard)?;
            page_guard.lsn = INVALID_LSN;
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = false;

        state.page_table.insert(page_id, frame_id);

        Ok(frame_guard.page.clone())
    }

    /// Allocate a brand-new page on disk and return it pinned and zeroed.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.latch.lock();

        let frame_id = self.allocate_frame(&mut state)?;
        self.evict_frame_contents(&mut state, frame_id)?;

        let page_id = self.disk_manager.allocate_page()?;

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        {
            let mut page_guard = frame_guard.page.write();
            *page_guard = Page::new(page_id);
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = false;

        state.page_table.insert(page_id, frame_id);

        Ok((frame_guard.page.clone(), page_id))
    }

    /// Drop one pin from a page. The dirty flag is sticky: once any holder
    /// reported a modification the frame stays dirty until flushed.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.latch.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotFound(page_id)),
        };

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();

        if frame_guard.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }

        frame_guard.pin_count -= 1;
        if is_dirty {
            frame_guard.is_dirty = true;
        }

        if frame_guard.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write a resident dirty page to disk. A page that is absent or clean
    /// is left alone.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "cannot flush the invalid page ID".to_string(),
            ));
        }

        let state = self.latch.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.flush_frame(frame_id)?;
        }

        Ok(())
    }

    /// Flush every resident dirty page
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let state = self.latch.lock();

        for &frame_id in state.page_table.values() {
            self.flush_frame(frame_id)?;
        }

        Ok(())
    }

    /// Remove a page from the pool and release its number on disk. Absent
    /// pages delete trivially; pinned pages refuse.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.latch.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Ok(()),
        };

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();

        if frame_guard.pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        state.page_table.remove(&page_id);
        {
            let mut page_guard = frame_guard.page.write();
            *page_guard = Page::new(INVALID_PAGE_ID);
        }
        frame_guard.is_dirty = false;

        state.replacer.pin(frame_id);
        state.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);

        Ok(())
    }

    /// Fetch a page behind an RAII guard that unpins on drop
    pub fn fetch_page_guard(&self, page_id: PageId) -> Result<PageGuard<'_>, BufferPoolError> {
        let page = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self, page, page_id))
    }

    /// Allocate a new page behind an RAII guard that unpins on drop
    pub fn new_page_guard(&self) -> Result<PageGuard<'_>, BufferPoolError> {
        let (page, page_id) = self.new_page()?;
        Ok(PageGuard::new(self, page, page_id))
    }

    /// Claim a frame for a new occupant: free list first, else evict
    fn allocate_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        state.replacer.victim().ok_or(BufferPoolError::PoolExhausted)
    }

    /// Write back and unmap whatever page currently occupies the frame. The
    /// old page ID comes straight from the frame metadata.
    fn evict_frame_contents(
        &self,
        state: &mut PoolState,
        frame_id: FrameId,
    ) -> Result<(), BufferPoolError> {
        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();

        let old_page_id = frame_guard.page.read().page_id;
        if old_page_id == INVALID_PAGE_ID {
            return Ok(());
        }

        if frame_guard.is_dirty {
            let page_guard = frame_guard.page.read();
            self.enforce_wal(page_guard.lsn)?;
            self.disk_manager.write_page(&page_guard)?;
            drop(page_guard);
            frame_guard.is_dirty = false;
        }

        state.page_table.remove(&old_page_id);

        Ok(())
    }

    fn flush_frame(&self, frame_id: FrameId) -> Result<(), BufferPoolError> {
        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();

        if frame_guard.is_dirty {
            let page_guard = frame_guard.page.read();
            self.enforce_wal(page_guard.lsn)?;
            self.disk_manager.write_page(&page_guard)?;
            drop(page_guard);
            frame_guard.is_dirty = false;
        }

        Ok(())
    }

    /// WAL rule: a page may not reach disk before the log records that
    /// produced its current LSN are durable.
    fn enforce_wal(&self, page_lsn: Lsn) -> Result<(), BufferPoolError> {
        if page_lsn == INVALID_LSN {
            return Ok(());
        }
        if let Some(ref log_manager) = self.log_manager {
            log_manager.flush_until(page_lsn)?;
        }
        Ok(())
    }
}
