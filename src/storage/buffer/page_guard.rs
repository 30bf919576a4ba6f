use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::manager::BufferPoolManager;

/// RAII handle to a pinned page.
///
/// Holding a guard keeps the page pinned; dropping it unpins with the
/// accumulated dirty flag, so every exit path releases the page exactly
/// once. Callers that modify the page call `mark_dirty` before the guard
/// goes out of scope.
pub struct PageGuard<'a> {
    pool: &'a BufferPoolManager,
    page: PagePtr,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(pool: &'a BufferPoolManager, page: PagePtr, page_id: PageId) -> Self {
        Self {
            pool,
            page,
            page_id,
            dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// The guarded page. Lock it through the pointer to read or write.
    pub fn page(&self) -> &PagePtr {
        &self.page
    }

    /// Record that the holder modified the page; the unpin on drop will
    /// carry the dirty flag.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        // The page was resident and pinned for the guard's whole lifetime,
        // so the unpin can only fail if the pool itself is gone.
        let _ = self.pool.unpin_page(self.page_id, self.dirty);
    }
}
