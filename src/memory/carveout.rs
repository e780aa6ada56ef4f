// Copyright (c) 2025 Syswonder
// ion-tiler is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//     http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND, EITHER
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT, MERCHANTABILITY OR
// FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.
//
// Syswonder Website:
//      https://www.syswonder.org
//
// Authors:
//
//! Carveout pool: page granular allocation out of a reserved physical range.

use alloc::sync::Arc;
use alloc::vec::Vec;
use bitmap_allocator::BitAlloc;

use spin::Mutex;

use super::addr::{is_aligned, pages_of, PhysAddr};
use super::PAGE_SIZE;
use crate::consts::CARVEOUT_MAX_PAGES;
use crate::error::IonResult;

// Support max 64K * 4096 = 256MB carveout.
type PoolAlloc = bitmap_allocator::BitAlloc64K;

struct PoolInner {
    bitmap: PoolAlloc,
    free_pages: usize,
}

/// A fixed physical range handing out page-aligned blocks.
///
/// The free-space tracker lives behind the pool's own lock, so one pool can
/// serve concurrent allocate and free calls from every buffer drawn from it.
pub struct CarveoutPool {
    base: PhysAddr,
    total_pages: usize,
    inner: Mutex<PoolInner>,
}

impl CarveoutPool {
    pub fn new(base: PhysAddr, size: usize) -> IonResult<Self> {
        if !is_aligned(base) || !is_aligned(size) {
            return ion_result_err!(
                EINVAL,
                format!("carveout {:#x}+{:#x} is not page aligned", base, size)
            );
        }
        let total_pages = size / PAGE_SIZE;
        if total_pages == 0 || total_pages > CARVEOUT_MAX_PAGES {
            return ion_result_err!(
                EINVAL,
                format!("carveout of {} pages is not supported", total_pages)
            );
        }
        let mut bitmap = PoolAlloc::DEFAULT;
        bitmap.insert(0..total_pages);
        info!(
            "Carveout pool initialized: {:#x?}",
            base..base + total_pages * PAGE_SIZE
        );
        Ok(Self {
            base,
            total_pages,
            inner: Mutex::new(PoolInner {
                bitmap,
                free_pages: total_pages,
            }),
        })
    }

    pub fn base(&self) -> PhysAddr {
        self.base
    }

    pub fn size(&self) -> usize {
        self.total_pages * PAGE_SIZE
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn free_pages(&self) -> usize {
        self.inner.lock().free_pages
    }

    pub fn contains(&self, paddr: PhysAddr) -> bool {
        paddr >= self.base && paddr < self.base + self.size()
    }

    /// Allocate `size` bytes (rounded up to whole pages) of contiguous memory.
    pub fn alloc(&self, size: usize) -> Option<PhysAddr> {
        let count = pages_of(size);
        if count == 0 || count > self.total_pages {
            return None;
        }
        let mut inner = self.inner.lock();
        let idx = match count {
            1 => inner.bitmap.alloc(),
            _ => inner.bitmap.alloc_contiguous(count, 0),
        };
        let ret = idx.map(|idx| idx * PAGE_SIZE + self.base);
        if ret.is_some() {
            inner.free_pages -= count;
        }
        trace!("Allocate {} carveout pages: {:x?}", count, ret);
        ret
    }

    /// Return `size` bytes starting at `paddr` to the pool.
    ///
    /// The range must come from a single earlier [`CarveoutPool::alloc`] or
    /// be a sub-range of one.
    pub fn free(&self, paddr: PhysAddr, size: usize) {
        let count = pages_of(size);
        assert!(is_aligned(paddr) && self.contains(paddr));
        assert!(paddr + count * PAGE_SIZE <= self.base + self.size());
        trace!("Deallocate {} carveout pages: {:x}", count, paddr);
        let start_idx = (paddr - self.base) / PAGE_SIZE;
        let mut inner = self.inner.lock();
        for idx in start_idx..start_idx + count {
            assert!(!inner.bitmap.test(idx), "carveout page {:#x} freed twice", idx);
            inner.bitmap.dealloc(idx);
        }
        inner.free_pages += count;
    }
}

/// Physical pages backing one tiler buffer.
///
/// Dropping the value gives the pages back to the pool: a lump is freed in
/// one call, single pages are freed last to first.
pub struct CarveoutPages {
    pool: Arc<CarveoutPool>,
    addrs: Vec<PhysAddr>,
    lump: bool,
}

impl CarveoutPages {
    /// Back `n_pages` pages, preferring one contiguous lump and falling back
    /// to page by page allocation.
    pub fn alloc(pool: &Arc<CarveoutPool>, n_pages: usize) -> IonResult<Self> {
        if n_pages == 0 {
            return ion_result_err!(EINVAL, "empty carveout request");
        }
        let mut addrs = Vec::new();
        addrs
            .try_reserve_exact(n_pages)
            .map_err(|_| ion_err!(ENOMEM, "no memory for the page address array"))?;

        if let Some(start) = pool.alloc(n_pages * PAGE_SIZE) {
            addrs.extend((0..n_pages).map(|i| start + i * PAGE_SIZE));
            debug!("carveout lump of {} pages at {:#x}", n_pages, start);
            return Ok(Self {
                pool: pool.clone(),
                addrs,
                lump: true,
            });
        }

        let mut pages = Self {
            pool: pool.clone(),
            addrs,
            lump: false,
        };
        for _ in 0..n_pages {
            match pool.alloc(PAGE_SIZE) {
                Some(paddr) => pages.addrs.push(paddr),
                None => {
                    error!(
                        "failed to allocate pages to back tiler address space ({} of {})",
                        pages.addrs.len(),
                        n_pages
                    );
                    // `pages` drops here and returns what it already holds.
                    return ion_result_err!(ENOMEM);
                }
            }
        }
        Ok(pages)
    }

    pub fn addrs(&self) -> &[PhysAddr] {
        &self.addrs
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn is_lump(&self) -> bool {
        self.lump
    }
}

impl Drop for CarveoutPages {
    fn drop(&mut self) {
        if self.addrs.is_empty() {
            return;
        }
        if self.lump {
            self.pool.free(self.addrs[0], self.addrs.len() * PAGE_SIZE);
            return;
        }
        for &paddr in self.addrs.iter().rev() {
            self.pool.free(paddr, PAGE_SIZE);
        }
    }
}
