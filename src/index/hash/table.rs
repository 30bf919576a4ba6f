use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use log::warn;
use parking_lot::RwLock;

use crate::common::types::PageId;
use crate::index::hash::block_page;
use crate::index::hash::error::HashIndexError;
use crate::index::hash::header_page;
use crate::index::hash::storable::Storable;
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::manager::BufferPoolManager;

/// On-disk hash table with linear probing.
///
/// A header page lists the block pages in probe order; each block page holds
/// a fixed number of slots. A probe starts at `hash(key) % size` and walks
/// forward one slot at a time, crossing block pages through the header's
/// list. Deletions tombstone their slot (occupied stays set) so probes keep
/// walking; growth appends block pages and rehashes live entries under the
/// new modulus.
///
/// One table-level reader/writer latch covers all operations: lookups share
/// the read side, mutations take the write side. The latch is eventually
/// fair rather than strictly writer-preferring: a waiting writer cannot
/// starve, but a reader arriving just ahead of it may still enter. Growth
/// triggered by an insert runs entirely under the insert's own write latch.
pub struct LinearHashTable<K, V> {
    buffer_pool: Arc<BufferPoolManager>,
    header_page_id: PageId,
    slots_per_page: usize,
    state: RwLock<TableState>,
    _marker: PhantomData<fn() -> (K, V)>,
}

struct TableState {
    /// Total logical slots; always `block_count * slots_per_page`
    size: usize,
}

impl<K, V> LinearHashTable<K, V>
where
    K: Storable + Hash + Eq,
    V: Storable + Eq,
{
    /// Create a table with at least `num_buckets` slots: a header page, one
    /// block page, then growth up to the requested capacity.
    pub fn new(
        buffer_pool: Arc<BufferPoolManager>,
        num_buckets: usize,
    ) -> Result<Self, HashIndexError> {
        let slots_per_page = block_page::slot_capacity::<K, V>();

        let mut header = buffer_pool.new_page_guard()?;
        let header_page_id = header.page_id();
        {
            let mut page = header.page().write();
            header_page::init(&mut page);
        }

        // New pages come back zeroed, which is exactly an empty block page
        let first_block = buffer_pool.new_page_guard()?;
        {
            let mut page = header.page().write();
            header_page::add_block_page_id(&mut page, first_block.page_id());
        }
        header.mark_dirty();
        drop(first_block);
        drop(header);

        let table = Self {
            buffer_pool,
            header_page_id,
            slots_per_page,
            state: RwLock::new(TableState {
                size: slots_per_page,
            }),
            _marker: PhantomData,
        };
        table.resize(num_buckets)?;

        Ok(table)
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Total logical slots currently allocated
    pub fn size(&self) -> usize {
        self.state.read().size
    }

    /// Collect every value stored under `key`.
    ///
    /// The probe stops at the first slot that has never been occupied, or
    /// after a full wrap of the table.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>, HashIndexError> {
        let state = self.state.read();
        let size = state.size;
        let blocks = self.block_ids()?;

        let start = self.slot_for(key, size);
        let mut slot = start;
        let mut result = Vec::new();

        'probe: loop {
            let guard = self
                .buffer_pool
                .fetch_page_guard(blocks[slot / self.slots_per_page])?;
            let page = guard.page().read();

            loop {
                let offset = slot % self.slots_per_page;
                if !block_page::is_occupied::<K, V>(&page, offset) {
                    break 'probe;
                }
                if block_page::is_readable::<K, V>(&page, offset)
                    && block_page::key_at::<K, V>(&page, offset) == *key
                {
                    result.push(block_page::value_at::<K, V>(&page, offset));
                }

                slot = (slot + 1) % size;
                if slot == start {
                    break 'probe;
                }
                if slot % self.slots_per_page == 0 {
                    break;
                }
            }
        }

        Ok(result)
    }

    /// Insert a pair. Returns false when the exact pair is already present,
    /// or when the table has exhausted its growth capacity.
    pub fn insert(&self, key: K, value: V) -> Result<bool, HashIndexError> {
        let mut state = self.state.write();
        self.insert_locked(&mut state, key, value)
    }

    /// Remove a pair, tombstoning its slot. Returns false when the pair is
    /// not in the table.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let state = self.state.write();
        let size = state.size;
        let blocks = self.block_ids()?;

        let start = self.slot_for(key, size);
        let mut slot = start;

        loop {
            let mut guard = self
                .buffer_pool
                .fetch_page_guard(blocks[slot / self.slots_per_page])?;
            let page_ptr = guard.page().clone();

            loop {
                let offset = slot % self.slots_per_page;
                let page = page_ptr.read();
                if !block_page::is_occupied::<K, V>(&page, offset) {
                    return Ok(false);
                }
                if block_page::is_readable::<K, V>(&page, offset)
                    && block_page::key_at::<K, V>(&page, offset) == *key
                    && block_page::value_at::<K, V>(&page, offset) == *value
                {
                    drop(page);
                    block_page::remove::<K, V>(&mut page_ptr.write(), offset);
                    guard.mark_dirty();
                    return Ok(true);
                }
                drop(page);

                slot = (slot + 1) % size;
                if slot == start {
                    return Ok(false);
                }
                if slot % self.slots_per_page == 0 {
                    break;
                }
            }
        }
    }

    /// Grow the table to cover at least `new_size` slots and rehash every
    /// live entry under the new modulus.
    pub fn resize(&self, new_size: usize) -> Result<bool, HashIndexError> {
        let mut state = self.state.write();
        self.resize_locked(&mut state, new_size)
    }

    /// Insert assuming the write latch is already held.
    ///
    /// The probe walks the whole occupied chain before placing anything: a
    /// tombstone ahead of a live duplicate must not swallow the pair, so the
    /// first reusable slot (tombstone or never-occupied) is only remembered
    /// and filled once the chain ends without a duplicate. Growth restarts
    /// the probe because rehashing moves the key's home slot.
    fn insert_locked(
        &self,
        state: &mut TableState,
        key: K,
        value: V,
    ) -> Result<bool, HashIndexError> {
        loop {
            let size = state.size;
            let blocks = self.block_ids()?;
            let mut slot = self.slot_for(&key, size);
            let mut candidate: Option<usize> = None;

            'probe: while slot < size {
                let guard = self
                    .buffer_pool
                    .fetch_page_guard(blocks[slot / self.slots_per_page])?;
                let page = guard.page().read();

                loop {
                    let offset = slot % self.slots_per_page;
                    if !block_page::is_occupied::<K, V>(&page, offset) {
                        // End of the chain; this slot is free if no
                        // tombstone came first
                        if candidate.is_none() {
                            candidate = Some(slot);
                        }
                        break 'probe;
                    }
                    if block_page::is_readable::<K, V>(&page, offset) {
                        if block_page::key_at::<K, V>(&page, offset) == key
                            && block_page::value_at::<K, V>(&page, offset) == value
                        {
                            return Ok(false);
                        }
                    } else if candidate.is_none() {
                        candidate = Some(slot);
                    }

                    slot += 1;
                    if slot % self.slots_per_page == 0 {
                        break;
                    }
                }
            }

            if let Some(slot) = candidate {
                let mut guard = self
                    .buffer_pool
                    .fetch_page_guard(blocks[slot / self.slots_per_page])?;
                let page_ptr = guard.page().clone();
                block_page::insert::<K, V>(
                    &mut page_ptr.write(),
                    slot % self.slots_per_page,
                    &key,
                    &value,
                );
                guard.mark_dirty();
                return Ok(true);
            }

            // Every slot from the home slot to the end of the region is
            // live: grow, then retry under the new modulus.
            if !self.resize_locked(state, size * 2)? {
                return Ok(false);
            }
        }
    }

    /// Grow assuming the write latch is already held. Returns false when no
    /// block page could be added (header full or pool exhausted) and the
    /// table did not get any larger.
    fn resize_locked(
        &self,
        state: &mut TableState,
        new_size: usize,
    ) -> Result<bool, HashIndexError> {
        let spp = self.slots_per_page;
        let target_pages = new_size.div_ceil(spp);

        let mut header = self.buffer_pool.fetch_page_guard(self.header_page_id)?;
        let current_pages = header_page::block_count(&header.page().read());

        if target_pages <= current_pages {
            // The allocated region already covers the request
            state.size = state.size.max(current_pages * spp);
            return Ok(true);
        }

        let mut added = false;
        for _ in current_pages..target_pages {
            if header_page::block_count(&header.page().read()) >= header_page::MAX_BLOCK_PAGES {
                warn!("hash table header is full; cannot add more block pages");
                break;
            }
            let block = match self.buffer_pool.new_page_guard() {
                Ok(guard) => guard,
                Err(BufferPoolError::PoolExhausted) => {
                    warn!("buffer pool exhausted while growing hash table");
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            {
                let mut page = header.page().write();
                header_page::add_block_page_id(&mut page, block.page_id());
            }
            header.mark_dirty();
            added = true;
        }

        let final_pages = header_page::block_count(&header.page().read());
        drop(header);

        if !added {
            return Ok(false);
        }

        let old_size = state.size;
        state.size = final_pages * spp;
        self.rehash(state, old_size)?;

        Ok(true)
    }

    /// Re-insert every live entry of the old region under the new modulus.
    /// Old occupied bits stay set, so stale probe chains still terminate
    /// correctly.
    fn rehash(&self, state: &mut TableState, old_size: usize) -> Result<(), HashIndexError> {
        let spp = self.slots_per_page;
        let blocks = self.block_ids()?;
        let old_pages = old_size / spp;

        for block_idx in 0..old_pages {
            for offset in 0..spp {
                let pair = {
                    let mut guard = self.buffer_pool.fetch_page_guard(blocks[block_idx])?;
                    let page_ptr = guard.page().clone();
                    let page = page_ptr.read();
                    if !block_page::is_readable::<K, V>(&page, offset) {
                        continue;
                    }
                    let key = block_page::key_at::<K, V>(&page, offset);
                    let value = block_page::value_at::<K, V>(&page, offset);
                    drop(page);
                    block_page::remove::<K, V>(&mut page_ptr.write(), offset);
                    guard.mark_dirty();
                    (key, value)
                };
                self.insert_locked(state, pair.0, pair.1)?;
            }
        }

        Ok(())
    }

    fn slot_for(&self, key: &K, size: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % size as u64) as usize
    }

    /// Snapshot the block page list from the header
    fn block_ids(&self) -> Result<Vec<PageId>, HashIndexError> {
        let guard = self.buffer_pool.fetch_page_guard(self.header_page_id)?;
        let ids = header_page::block_page_ids(&guard.page().read());
        Ok(ids)
    }
}
