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
//! The tiler heap: carveout backed buffers living in tiler address space.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::min;

use numeric_enum_macro::numeric_enum;

use crate::config::PlatformHeap;
use crate::error::IonResult;
use crate::memory::addr::{page_offset, pages_of, phys_to_pfn};
use crate::memory::{
    CarveoutPages, CarveoutPool, MapFlags, MemoryMap, PhysAddr, SgTable, TilerAddr, UserMapper,
    VmArea, PAGE_SHIFT, PAGE_SIZE,
};
use crate::tiler::{
    self, layout_tiler_pages, Pinned, Reservation, TilerBlock, TilerFormat, TilerManager,
};

numeric_enum! {
    #[repr(u32)]
    #[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Copy, Clone)]
    pub enum HeapId {
        LargeSurfaces = 0,
        Tiler = 1,
        SecureInput = 2,
        NonsecureTiler = 3,
        TilerReservation = 4,
    }
}

impl HeapId {
    /// Heaps that back their buffers with carveout pages and pin them.
    pub fn uses_carveout(self) -> bool {
        matches!(self, HeapId::Tiler | HeapId::NonsecureTiler)
    }
}

/// Tiler allocation request, as passed by the custom alloc ioctl.
#[derive(Clone, Copy, Debug)]
pub struct TilerAllocRequest {
    /// Raw tiler format value.
    pub fmt: u32,
    /// Width in pixels, or length in bytes for page mode.
    pub w: usize,
    pub h: usize,
}

impl TilerAllocRequest {
    pub fn new(fmt: TilerFormat, w: usize, h: usize) -> Self {
        Self {
            fmt: fmt as u32,
            w,
            h,
        }
    }

    /// A linear (page mode) buffer of `len` bytes.
    pub fn linear(len: usize) -> Self {
        Self::new(TilerFormat::Page, len, 1)
    }
}

/// One allocated tiler buffer.
///
/// Fields drop in declaration order: unpin, release the tiler block, free the
/// carveout pages, then the sg table.
pub struct TilerBuffer<T: TilerManager + ?Sized> {
    pin: Option<Pinned<T>>,
    reservation: Reservation<T>,
    backing: Option<CarveoutPages>,
    sg_table: SgTable,
    heap: HeapId,
    fmt: TilerFormat,
    tiler_addrs: Vec<TilerAddr>,
    tiler_start: TilerAddr,
    vstride: usize,
    vsize: usize,
}

impl<T: TilerManager + ?Sized> TilerBuffer<T> {
    pub fn heap(&self) -> HeapId {
        self.heap
    }

    pub fn fmt(&self) -> TilerFormat {
        self.fmt
    }

    /// Whether the backing pages are one contiguous carveout allocation.
    pub fn is_lump(&self) -> bool {
        self.backing.as_ref().is_some_and(CarveoutPages::is_lump)
    }

    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }

    pub fn n_phys_pages(&self) -> usize {
        self.phys_addrs().len()
    }

    pub fn phys_addrs(&self) -> &[PhysAddr] {
        match self.backing {
            Some(ref pages) => pages.addrs(),
            None => &[],
        }
    }

    pub fn n_tiler_pages(&self) -> usize {
        self.tiler_addrs.len()
    }

    pub fn tiler_addrs(&self) -> &[TilerAddr] {
        &self.tiler_addrs
    }

    /// Tiler address of the first pixel. Not necessarily page aligned.
    pub fn tiler_start(&self) -> TilerAddr {
        self.tiler_start
    }

    /// Offset of the first pixel inside its page.
    pub fn offset(&self) -> usize {
        page_offset(self.tiler_start)
    }

    pub fn vstride(&self) -> usize {
        self.vstride
    }

    pub fn vsize(&self) -> usize {
        self.vsize
    }

    /// Tiler block the buffer lives in.
    pub fn block(&self) -> &TilerBlock {
        self.reservation.block()
    }

    pub fn sg_table(&self) -> &SgTable {
        &self.sg_table
    }
}

pub struct TilerHeap<T: TilerManager + ?Sized> {
    id: HeapId,
    name: String,
    pool: Option<Arc<CarveoutPool>>,
    tiler: Arc<T>,
    memmap: MemoryMap,
    map_flags: MapFlags,
}

impl<T: TilerManager + ?Sized> TilerHeap<T> {
    /// Set up the heap described by `data`. Carveout heaps get a pool over
    /// `data.base .. data.base + data.size`.
    pub fn create(data: &PlatformHeap, tiler: Arc<T>, memmap: MemoryMap) -> IonResult<Self> {
        let id = data.heap_id()?;
        let pool = if id.uses_carveout() {
            Some(Arc::new(CarveoutPool::new(data.base, data.size)?))
        } else {
            None
        };
        // OMAP5 needs shared device mappings, everything else write-combines.
        let map_flags = if data.device_shared_mappings {
            MapFlags::DEVICE_SHARED
        } else {
            MapFlags::WRITE_COMBINE
        };
        info!("tiler heap {:?} \"{}\" created", id, data.name);
        Ok(Self {
            id,
            name: data.name.clone(),
            pool,
            tiler,
            memmap,
            map_flags,
        })
    }

    pub fn id(&self) -> HeapId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> Option<&Arc<CarveoutPool>> {
        self.pool.as_ref()
    }

    pub fn tiler(&self) -> &Arc<T> {
        &self.tiler
    }

    /// Allocate a buffer for `req`.
    ///
    /// On failure everything acquired so far is given back in reverse order
    /// and no buffer is returned.
    pub fn allocate(&self, req: &TilerAllocRequest) -> IonResult<TilerBuffer<T>> {
        let fmt = TilerFormat::from_raw(req.fmt)?;
        if fmt == TilerFormat::Page && req.h != 1 {
            error!("Page mode (1D) allocations must have a height of one");
            return ion_result_err!(EINVAL, format!("1D allocation with height {}", req.h));
        }
        if req.w == 0 || req.h == 0 {
            return ion_result_err!(EINVAL, format!("empty {}x{} allocation", req.w, req.h));
        }
        fmt.check_fits(req.w, req.h)
            .inspect_err(|_| error!("{:?} request of {}x{} is larger than the tiler", fmt, req.w, req.h))?;

        let (n_phys_pages, n_tiler_pages) = match fmt {
            TilerFormat::Page => {
                let n = pages_of(req.w);
                (n, n)
            }
            _ => (
                tiler::size(fmt, req.w, req.h) >> PAGE_SHIFT,
                tiler::virtual_size(fmt, req.w, req.h) >> PAGE_SHIFT,
            ),
        };

        // Only page alignment is supported.
        let reservation = Reservation::new(&self.tiler, fmt, req.w, req.h, PAGE_SIZE)
            .inspect_err(|_| error!("failure to allocate address space from tiler"))?;

        let tiler_start = reservation.block().ssptr();
        let vstride = reservation.block().stride();
        let vsize = n_tiler_pages << PAGE_SHIFT;
        let phys_stride = match fmt {
            TilerFormat::Page => vstride,
            _ => tiler::stride(tiler_start),
        };
        let tiler_addrs = layout_tiler_pages(tiler_start, n_tiler_pages, vstride, phys_stride)?;

        let backing = match self.pool {
            Some(ref pool) => Some(CarveoutPages::alloc(pool, n_phys_pages)?),
            None => None,
        };
        let pin = match backing {
            Some(ref pages) => Some(
                reservation
                    .pin(pages.addrs())
                    .inspect_err(|_| error!("failure to pin pages to tiler"))?,
            ),
            None => None,
        };
        let sg_table = match backing {
            Some(ref pages) => SgTable::from_pages(pages.addrs(), pages.is_lump(), &self.memmap)
                .inspect_err(|_| error!("failure to allocate sg_table"))?,
            None => SgTable::empty(),
        };

        debug!(
            "{:?} buffer {}x{}: {} phys pages, {} tiler pages at {:#x}, stride {:#x}",
            fmt,
            req.w,
            req.h,
            backing.as_ref().map_or(0, CarveoutPages::len),
            n_tiler_pages,
            tiler_start,
            vstride
        );
        Ok(TilerBuffer {
            pin,
            reservation,
            backing,
            sg_table,
            heap: self.id,
            fmt,
            tiler_addrs,
            tiler_start,
            vstride,
            vsize,
        })
    }

    /// Give a buffer back: unpin, release its tiler block, free its carveout
    /// pages and its sg table, in that order.
    pub fn free(&self, buffer: TilerBuffer<T>) {
        if buffer.heap != self.id {
            warn!("{:?} buffer freed through heap {:?}", buffer.heap, self.id);
        }
        debug!("free tiler buffer at {:#x}", buffer.tiler_start);
        drop(buffer);
    }

    /// Tiler address and size of `buffer`.
    pub fn phys(&self, buffer: &TilerBuffer<T>) -> (TilerAddr, usize) {
        (buffer.tiler_start, buffer.vsize)
    }

    /// Virtual stride and size of `buffer`.
    pub fn vinfo(&self, buffer: &TilerBuffer<T>) -> (usize, usize) {
        (buffer.vstride, buffer.vsize)
    }

    pub fn map_dma<'a>(&self, buffer: &'a TilerBuffer<T>) -> &'a SgTable {
        &buffer.sg_table
    }

    pub fn unmap_dma(&self, _buffer: &TilerBuffer<T>) {}

    /// Map `buffer` into the user area `vma` through `mapper`.
    pub fn map_user<M: UserMapper + ?Sized>(
        &self,
        buffer: &TilerBuffer<T>,
        vma: &VmArea,
        mapper: &mut M,
    ) -> IonResult {
        if vma.is_empty() || vma.len() > buffer.vsize {
            return ion_result_err!(
                EINVAL,
                format!("cannot map {:#x} bytes of a {:#x} byte buffer", vma.len(), buffer.vsize)
            );
        }
        let flags = vma.flags | self.map_flags;

        if buffer.fmt == TilerFormat::Page {
            // 1D buffers are linear, map them in one shot
            return mapper.remap_pfn_range(vma.start, phys_to_pfn(buffer.tiler_addrs[0]), vma.len(), flags);
        }

        let n_pages = min(vma.pages(), buffer.n_tiler_pages());
        let mut addr = vma.start;
        for &tiler_addr in buffer.tiler_addrs.iter().take(n_pages).skip(vma.pgoff) {
            mapper.remap_pfn_range(addr, phys_to_pfn(tiler_addr), PAGE_SIZE, flags)?;
            addr += PAGE_SIZE;
        }
        Ok(())
    }
}
