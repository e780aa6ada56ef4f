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
//! DMM/TILER address space: formats, geometry and the reservation client.

pub mod container;

use alloc::sync::Arc;
use alloc::vec::Vec;

use bit_field::BitField;
use numeric_enum_macro::numeric_enum;

use crate::consts::*;
use crate::error::IonResult;
use crate::memory::addr::{align_up, round_up};
use crate::memory::{PhysAddr, TilerAddr};

numeric_enum! {
    #[repr(u32)]
    #[derive(Debug, Eq, PartialEq, Copy, Clone)]
    pub enum TilerFormat {
        Bit8 = 0,
        Bit16 = 1,
        Bit32 = 2,
        Page = 3,
    }
}

/// Pixel geometry of a tiler format. Every slot is exactly one page.
#[derive(Debug)]
struct Geometry {
    bpp: usize,
    slot_w: usize,
    slot_h: usize,
    view: TilerAddr,
}

const GEOMETRY: [Geometry; 4] = [
    Geometry { bpp: 1, slot_w: 64, slot_h: 64, view: TILVIEW_8BIT },
    Geometry { bpp: 2, slot_w: 64, slot_h: 32, view: TILVIEW_16BIT },
    Geometry { bpp: 4, slot_w: 32, slot_h: 32, view: TILVIEW_32BIT },
    Geometry { bpp: 1, slot_w: 64, slot_h: 64, view: TILVIEW_PAGE },
];

impl TilerFormat {
    /// Parse a raw format value coming from user space.
    pub fn from_raw(raw: u32) -> IonResult<Self> {
        Self::try_from(raw).map_err(|_| ion_err!(EINVAL, format!("unsupported tiler format {}", raw)))
    }

    fn geometry(self) -> &'static Geometry {
        &GEOMETRY[self as usize]
    }

    pub fn is_2d(self) -> bool {
        self != TilerFormat::Page
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.geometry().bpp
    }

    /// Slot size in pixels, `(width, height)`.
    pub fn slot_size(self) -> (usize, usize) {
        let geom = self.geometry();
        (geom.slot_w, geom.slot_h)
    }

    /// Base address of the view this format is accessed through.
    pub fn view_base(self) -> TilerAddr {
        self.geometry().view
    }

    /// Distance in bytes between two pixel lines of the view.
    pub fn container_stride(self) -> usize {
        match self {
            TilerFormat::Page => 0,
            _ => {
                let geom = self.geometry();
                TILER_WIDTH * geom.slot_w * geom.bpp
            }
        }
    }

    /// Check that a `w` x `h` buffer fits the part of the container this
    /// format allocates from.
    pub fn check_fits(self, w: usize, h: usize) -> IonResult {
        let fits = match self {
            TilerFormat::Page => h == 1 && w <= TILER_1D_SLOTS * PAGE_SIZE,
            _ => {
                let geom = self.geometry();
                w.div_ceil(geom.slot_w) <= TILER_WIDTH && h.div_ceil(geom.slot_h) <= TILER_2D_ROWS
            }
        };
        if w == 0 || h == 0 || !fits {
            return ion_result_err!(
                EINVAL,
                format!("{:?} buffer of {}x{} does not fit the container", self, w, h)
            );
        }
        Ok(())
    }

    fn align(self, w: usize, h: usize) -> (usize, usize) {
        let geom = self.geometry();
        (round_up(w, geom.slot_w), round_up(h, geom.slot_h))
    }
}

/// Physical bytes needed to back a `w` x `h` buffer.
///
/// `w` and `h` must have passed [`TilerFormat::check_fits`].
pub fn size(fmt: TilerFormat, w: usize, h: usize) -> usize {
    if !fmt.is_2d() {
        return align_up(w * h);
    }
    let (w, h) = fmt.align(w, h);
    fmt.bytes_per_pixel() * w * h
}

/// Bytes of tiler address space spanned by a `w` x `h` buffer.
pub fn virtual_size(fmt: TilerFormat, w: usize, h: usize) -> usize {
    if !fmt.is_2d() {
        return align_up(w * h);
    }
    let (_, aligned_h) = fmt.align(w, h);
    block_stride(fmt, w) * aligned_h
}

/// Virtual stride of a 2D block `w` pixels wide.
pub fn block_stride(fmt: TilerFormat, w: usize) -> usize {
    let (aligned_w, _) = fmt.align(w, 1);
    align_up(fmt.bytes_per_pixel() * aligned_w)
}

/// Format of the view `addr` belongs to, if it is a tiler address at all.
pub fn view_of(addr: TilerAddr) -> Option<TilerFormat> {
    if !(TILVIEW_8BIT..TILVIEW_END).contains(&addr) {
        return None;
    }
    TilerFormat::try_from(addr.get_bits(27..29) as u32).ok()
}

/// Line stride of the view containing `addr`; 0 for the page view and for
/// anything outside the tiler aperture.
pub fn stride(addr: TilerAddr) -> usize {
    view_of(addr).map_or(0, TilerFormat::container_stride)
}

/// Tiler address of every page of a buffer starting at `start`.
///
/// Pages follow each other until `vstride` bytes of the current line are
/// used up; the next line then starts `phys_stride` bytes after the previous
/// one.
pub fn layout_tiler_pages(
    start: TilerAddr,
    n_pages: usize,
    vstride: usize,
    phys_stride: usize,
) -> IonResult<Vec<TilerAddr>> {
    if vstride == 0 || vstride % PAGE_SIZE != 0 || phys_stride < vstride {
        return ion_result_err!(
            EINVAL,
            format!("bad tiler strides: vstride {:#x}, phys_stride {:#x}", vstride, phys_stride)
        );
    }
    let mut addrs = Vec::new();
    addrs
        .try_reserve_exact(n_pages)
        .map_err(|_| ion_err!(ENOMEM, "no memory for the tiler address array"))?;

    let mut ssptr = start;
    let mut remainder = vstride;
    for _ in 0..n_pages {
        addrs.push(align_up(ssptr));
        ssptr += PAGE_SIZE;
        remainder -= PAGE_SIZE;

        // end of this line, go to the next one
        if remainder == 0 {
            remainder = vstride;
            ssptr += phys_stride - vstride;
        }
    }
    Ok(addrs)
}

/// Slots of the container held by a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TilerArea {
    /// Run of `slots` slots of the page mode area.
    Linear { start: usize, slots: usize },
    /// Rectangle of slots in the 2D area.
    Rect { x: usize, y: usize, w: usize, h: usize },
}

impl TilerArea {
    pub fn slot_count(&self) -> usize {
        match *self {
            TilerArea::Linear { slots, .. } => slots,
            TilerArea::Rect { w, h, .. } => w * h,
        }
    }
}

/// Handle to a reserved region of tiler address space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilerBlock {
    id: u32,
    fmt: TilerFormat,
    ssptr: TilerAddr,
    stride: usize,
    area: TilerArea,
}

impl TilerBlock {
    pub fn new(id: u32, fmt: TilerFormat, ssptr: TilerAddr, stride: usize, area: TilerArea) -> Self {
        Self {
            id,
            fmt,
            ssptr,
            stride,
            area,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn fmt(&self) -> TilerFormat {
        self.fmt
    }

    /// System space address of the first pixel.
    pub fn ssptr(&self) -> TilerAddr {
        self.ssptr
    }

    /// Virtual stride of the block, in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn area(&self) -> TilerArea {
        self.area
    }

    /// Number of physical pages the block is pinned with.
    pub fn slot_count(&self) -> usize {
        self.area.slot_count()
    }
}

/// The tiler address space manager.
///
/// Implementations do their own locking; callers only sequence the calls:
/// `reserve`, then `pin`, and on the way out `unpin` before `release`.
pub trait TilerManager: Send + Sync {
    /// Reserve a view for a `w` x `h` buffer of `fmt`. Page mode
    /// reservations are linear and `w` is the length in bytes.
    fn reserve(&self, fmt: TilerFormat, w: usize, h: usize, align: usize) -> IonResult<TilerBlock>;

    /// Back every slot of `block` with the matching page of `pages`.
    fn pin(&self, block: &TilerBlock, pages: &[PhysAddr]) -> IonResult;

    fn unpin(&self, block: &TilerBlock);

    fn release(&self, block: &TilerBlock);
}

/// A reserved block, released when dropped.
pub struct Reservation<T: TilerManager + ?Sized> {
    tiler: Arc<T>,
    block: TilerBlock,
}

impl<T: TilerManager + ?Sized> Reservation<T> {
    pub fn new(tiler: &Arc<T>, fmt: TilerFormat, w: usize, h: usize, align: usize) -> IonResult<Self> {
        let block = tiler.reserve(fmt, w, h, align)?;
        debug!("tiler block {} reserved at {:#x}", block.id(), block.ssptr());
        Ok(Self {
            tiler: tiler.clone(),
            block,
        })
    }

    pub fn block(&self) -> &TilerBlock {
        &self.block
    }

    /// Pin `pages` into the block; the pages stay pinned until the returned
    /// guard is dropped.
    pub fn pin(&self, pages: &[PhysAddr]) -> IonResult<Pinned<T>> {
        self.tiler.pin(&self.block, pages)?;
        debug!("tiler block {} pinned with {} pages", self.block.id(), pages.len());
        Ok(Pinned {
            tiler: self.tiler.clone(),
            block: self.block.clone(),
        })
    }
}

impl<T: TilerManager + ?Sized> Drop for Reservation<T> {
    fn drop(&mut self) {
        debug!("tiler block {} released", self.block.id());
        self.tiler.release(&self.block);
    }
}

/// Pages pinned into a block, unpinned when dropped.
pub struct Pinned<T: TilerManager + ?Sized> {
    tiler: Arc<T>,
    block: TilerBlock,
}

impl<T: TilerManager + ?Sized> Drop for Pinned<T> {
    fn drop(&mut self) {
        debug!("tiler block {} unpinned", self.block.id());
        self.tiler.unpin(&self.block);
    }
}
