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
//! Software model of the DMM/TILER container.
//!
//! The container is a grid of `TILER_WIDTH` x `TILER_HEIGHT` one-page slots.
//! The bottom rows form the page mode (1D) area, handed out by a buddy
//! allocator; the rest is the 2D area where blocks are rectangles of slots.
//! Pinning fills the page address translation table (PAT), one physical page
//! per slot.

use alloc::collections::btree_map::{BTreeMap, Entry};
use alloc::vec::Vec;

use bit_field::BitArray;
use buddy_system_allocator::FrameAllocator;
use spin::Mutex;

use super::{TilerArea, TilerBlock, TilerFormat, TilerManager};
use crate::consts::*;
use crate::error::IonResult;
use crate::memory::addr::{is_aligned, pages_of};
use crate::memory::{PhysAddr, TilerAddr};

const ROW_WORDS: usize = TILER_WIDTH / 64;

/// Frame number the page area starts at inside the buddy allocator. Being a
/// multiple of the area size, the whole area seeds a single top-order block.
const PAGE_AREA_BASE: usize = TILER_1D_SLOTS;

type SlotRow = [u64; ROW_WORDS];

struct LiveBlock {
    block: TilerBlock,
    pinned: bool,
}

struct ContainerInner {
    rows: Vec<SlotRow>,
    page_area: FrameAllocator,
    pat: BTreeMap<usize, PhysAddr>,
    blocks: BTreeMap<u32, LiveBlock>,
    next_id: u32,
    used_slots: usize,
}

/// In-memory tiler container.
pub struct SoftTiler {
    inner: Mutex<ContainerInner>,
}

impl ContainerInner {
    fn rect_is_free(&self, x: usize, y: usize, w: usize, h: usize) -> bool {
        self.rows[y..y + h]
            .iter()
            .all(|row| (x..x + w).all(|col| !row[..].get_bit(col)))
    }

    fn mark_rect(&mut self, x: usize, y: usize, w: usize, h: usize, used: bool) {
        for row in &mut self.rows[y..y + h] {
            for col in x..x + w {
                row[..].set_bit(col, used);
            }
        }
    }

    /// First fit, scanning lines top to bottom, for a `w` x `h` rectangle
    /// whose left edge is a multiple of `align` slots.
    fn find_rect(&self, w: usize, h: usize, align: usize) -> Option<(usize, usize)> {
        (0..=TILER_2D_ROWS - h).find_map(|y| {
            (0..=TILER_WIDTH - w)
                .step_by(align)
                .find(|&x| self.rect_is_free(x, y, w, h))
                .map(|x| (x, y))
        })
    }

    fn next_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    fn insert(&mut self, block: TilerBlock) -> TilerBlock {
        self.used_slots += block.slot_count();
        self.blocks.insert(
            block.id(),
            LiveBlock {
                block: block.clone(),
                pinned: false,
            },
        );
        block
    }

    /// Give `count` frames from `frame` back to the page area, split into
    /// the aligned power-of-two runs the buddy allocator works in.
    fn free_frames(&mut self, mut frame: usize, count: usize) {
        let end = frame + count;
        while frame < end {
            let left = end - frame;
            let run = (1 << frame.trailing_zeros()).min(1 << (usize::BITS - 1 - left.leading_zeros()));
            self.page_area.dealloc(frame, run);
            frame += run;
        }
    }

    fn unpin_slots(&mut self, block: &TilerBlock) {
        for slot in slots_of(&block.area()) {
            self.pat.remove(&slot);
        }
    }
}

/// Container slot indices covered by `area`, line by line.
fn slots_of(area: &TilerArea) -> Vec<usize> {
    match *area {
        TilerArea::Linear { start, slots } => {
            let first = TILER_2D_ROWS * TILER_WIDTH + start;
            (first..first + slots).collect()
        }
        TilerArea::Rect { x, y, w, h } => (y..y + h)
            .flat_map(|row| (x..x + w).map(move |col| row * TILER_WIDTH + col))
            .collect(),
    }
}

impl SoftTiler {
    pub fn new() -> Self {
        let mut page_area = FrameAllocator::new();
        page_area.add_frame(PAGE_AREA_BASE, PAGE_AREA_BASE + TILER_1D_SLOTS);
        Self {
            inner: Mutex::new(ContainerInner {
                rows: vec![[0; ROW_WORDS]; TILER_2D_ROWS],
                page_area,
                pat: BTreeMap::new(),
                blocks: BTreeMap::new(),
                next_id: 0,
                used_slots: 0,
            }),
        }
    }

    /// Slots currently reserved by live blocks.
    pub fn used_slots(&self) -> usize {
        self.inner.lock().used_slots
    }

    pub fn live_blocks(&self) -> usize {
        self.inner.lock().blocks.len()
    }

    /// Pages currently present in the PAT.
    pub fn pinned_pages(&self) -> usize {
        self.inner.lock().pat.len()
    }

    /// Physical page behind container slot `slot`, if pinned.
    pub fn pat_entry(&self, slot: usize) -> Option<PhysAddr> {
        self.inner.lock().pat.get(&slot).copied()
    }

    /// Physical page behind each slot of `block`, line by line.
    pub fn translate(&self, block: &TilerBlock) -> Vec<Option<PhysAddr>> {
        let inner = self.inner.lock();
        slots_of(&block.area())
            .into_iter()
            .map(|slot| inner.pat.get(&slot).copied())
            .collect()
    }

    fn reserve_1d(&self, len: usize) -> IonResult<TilerBlock> {
        let slots = pages_of(len);
        let mut inner = self.inner.lock();
        let frame = inner.page_area.alloc(slots).ok_or_else(|| {
            error!("failure to allocate {} pages of 1D tiler space", slots);
            ion_err!(ENOMEM, "tiler page area exhausted")
        })?;
        // runs come in powers of two, hand the unused tail back
        inner.free_frames(frame + slots, slots.next_power_of_two() - slots);
        let start = frame - PAGE_AREA_BASE;
        let id = inner.next_id();
        let ssptr: TilerAddr = TILVIEW_PAGE + (TILER_2D_ROWS * TILER_WIDTH + start) * PAGE_SIZE;
        let block = TilerBlock::new(
            id,
            TilerFormat::Page,
            ssptr,
            slots * PAGE_SIZE,
            TilerArea::Linear { start, slots },
        );
        Ok(inner.insert(block))
    }

    fn reserve_2d(&self, fmt: TilerFormat, w: usize, h: usize, align: usize) -> IonResult<TilerBlock> {
        let (slot_w, slot_h) = fmt.slot_size();
        let w_slots = w.div_ceil(slot_w);
        let h_slots = h.div_ceil(slot_h);

        // alignment is in bytes of a line, at least one slot wide
        let slot_bytes = slot_w * fmt.bytes_per_pixel();
        let align = if align > slot_bytes {
            align.div_ceil(slot_bytes) * slot_bytes
        } else {
            slot_bytes
        };
        let align_slots = align / slot_bytes;

        let mut inner = self.inner.lock();
        let (x, y) = inner.find_rect(w_slots, h_slots, align_slots).ok_or_else(|| {
            error!("failure to allocate {}x{} slots of 2D tiler space", w_slots, h_slots);
            ion_err!(ENOMEM, "tiler 2D area exhausted")
        })?;
        inner.mark_rect(x, y, w_slots, h_slots, true);
        let id = inner.next_id();
        let ssptr = fmt.view_base() + y * slot_h * fmt.container_stride() + x * slot_bytes;
        let block = TilerBlock::new(
            id,
            fmt,
            ssptr,
            super::block_stride(fmt, w),
            TilerArea::Rect {
                x,
                y,
                w: w_slots,
                h: h_slots,
            },
        );
        Ok(inner.insert(block))
    }
}

impl Default for SoftTiler {
    fn default() -> Self {
        Self::new()
    }
}

impl TilerManager for SoftTiler {
    fn reserve(&self, fmt: TilerFormat, w: usize, h: usize, align: usize) -> IonResult<TilerBlock> {
        fmt.check_fits(w, h)?;
        match fmt {
            TilerFormat::Page => self.reserve_1d(w),
            _ => self.reserve_2d(fmt, w, h, align),
        }
    }

    fn pin(&self, block: &TilerBlock, pages: &[PhysAddr]) -> IonResult {
        if pages.len() != block.slot_count() {
            return ion_result_err!(
                EINVAL,
                format!("{} pages for a block of {} slots", pages.len(), block.slot_count())
            );
        }
        if let Some(&paddr) = pages.iter().find(|&&paddr| !is_aligned(paddr)) {
            return ion_result_err!(EINVAL, format!("unaligned page {:#x}", paddr));
        }
        let mut inner = self.inner.lock();
        match inner.blocks.get_mut(&block.id()) {
            Some(live) if live.pinned => return ion_result_err!(EBUSY),
            Some(live) => live.pinned = true,
            None => return ion_result_err!(ENOENT, format!("no tiler block {}", block.id())),
        }
        for (slot, &paddr) in slots_of(&block.area()).into_iter().zip(pages) {
            inner.pat.insert(slot, paddr);
        }
        Ok(())
    }

    fn unpin(&self, block: &TilerBlock) {
        let mut inner = self.inner.lock();
        match inner.blocks.get_mut(&block.id()) {
            Some(live) if live.pinned => live.pinned = false,
            _ => return,
        }
        inner.unpin_slots(block);
    }

    fn release(&self, block: &TilerBlock) {
        let mut inner = self.inner.lock();
        let live = match inner.blocks.entry(block.id()) {
            Entry::Occupied(e) => e.remove(),
            Entry::Vacant(_) => {
                warn!("release of unknown tiler block {}", block.id());
                return;
            }
        };
        if live.pinned {
            warn!("tiler block {} released while pinned", block.id());
            inner.unpin_slots(&live.block);
        }
        match live.block.area() {
            TilerArea::Linear { start, slots } => inner.free_frames(PAGE_AREA_BASE + start, slots),
            TilerArea::Rect { x, y, w, h } => inner.mark_rect(x, y, w, h, false),
        }
        inner.used_slots -= live.block.slot_count();
    }
}
