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
pub mod addr;
pub mod carveout;
pub mod sg;

use alloc::vec::Vec;
use core::ops::Range;

use bitflags::bitflags;

use crate::error::IonResult;

pub use addr::{PhysAddr, TilerAddr, VirtAddr};
pub use carveout::{CarveoutPages, CarveoutPool};
pub use sg::{SgEntry, SgTable};

pub const PAGE_SHIFT: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

bitflags! {
    /// Attributes of a user space mapping of tiler pages.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MapFlags: u64 {
        const READ          = 1 << 0;
        const WRITE         = 1 << 1;
        const SHARED        = 1 << 2;
        const WRITE_COMBINE = 1 << 3;
        const DEVICE_SHARED = 1 << 4;
    }
}

/// Physical ranges that have page descriptors, i.e. memory the DMA layer can
/// build scatterlists over.
#[derive(Clone, Debug, Default)]
pub struct MemoryMap {
    ram: Vec<Range<PhysAddr>>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self { ram: Vec::new() }
    }

    pub fn with_ram(mut self, start: PhysAddr, size: usize) -> Self {
        self.add_ram(start, size);
        self
    }

    pub fn add_ram(&mut self, start: PhysAddr, size: usize) {
        self.ram.push(start..start + size);
    }

    /// Whether the page containing `paddr` is backed by a page descriptor.
    pub fn has_page(&self, paddr: PhysAddr) -> bool {
        self.ram.iter().any(|r| r.contains(&paddr))
    }
}

/// A user space virtual memory area being mapped.
#[derive(Clone, Copy, Debug)]
pub struct VmArea {
    pub start: VirtAddr,
    pub end: VirtAddr,
    /// Offset into the buffer, in pages.
    pub pgoff: usize,
    pub flags: MapFlags,
}

impl VmArea {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn pages(&self) -> usize {
        self.len() / PAGE_SIZE
    }
}

/// Installs page frame mappings into a user address space.
pub trait UserMapper {
    fn remap_pfn_range(&mut self, vaddr: VirtAddr, pfn: usize, size: usize, flags: MapFlags) -> IonResult;
}
