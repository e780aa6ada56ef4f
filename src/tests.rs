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
//! Fixtures shared by the unit tests of this crate.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Once;

use crate::error::IonResult;
use crate::memory::{MapFlags, MemoryMap, PhysAddr, UserMapper, VirtAddr, PAGE_SIZE};
use crate::tiler::container::SoftTiler;
use crate::tiler::{TilerBlock, TilerFormat, TilerManager};

pub const CARVEOUT_BASE: PhysAddr = 0xb400_0000;
pub const RAM_BASE: PhysAddr = 0x8000_0000;
pub const RAM_SIZE: usize = 0x4000_0000;

/// All of RAM, carveouts included, has page descriptors.
pub fn memory_map() -> MemoryMap {
    MemoryMap::new().with_ram(RAM_BASE, RAM_SIZE)
}

fn console(s: &str) {
    std::eprint!("{}", s);
}

/// Send log output to stderr, where the test harness captures it.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| crate::logging::init(console, log::LevelFilter::Trace));
}

/// A tiler whose reserve and pin calls can be made to fail.
#[derive(Default)]
pub struct FaultyTiler {
    pub inner: SoftTiler,
    pub fail_reserve: AtomicBool,
    pub fail_pin: AtomicBool,
    pub unpins: AtomicUsize,
    pub releases: AtomicUsize,
    /// Order of unpin ("U") and release ("R") calls.
    pub events: spin::Mutex<Vec<&'static str>>,
}

impl FaultyTiler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TilerManager for FaultyTiler {
    fn reserve(&self, fmt: TilerFormat, w: usize, h: usize, align: usize) -> IonResult<TilerBlock> {
        if self.fail_reserve.load(Ordering::SeqCst) {
            return ion_result_err!(ENOMEM, "injected reserve failure");
        }
        self.inner.reserve(fmt, w, h, align)
    }

    fn pin(&self, block: &TilerBlock, pages: &[PhysAddr]) -> IonResult {
        if self.fail_pin.load(Ordering::SeqCst) {
            return ion_result_err!(EFAULT, "injected pin failure");
        }
        self.inner.pin(block, pages)
    }

    fn unpin(&self, block: &TilerBlock) {
        self.unpins.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push("U");
        self.inner.unpin(block)
    }

    fn release(&self, block: &TilerBlock) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push("R");
        self.inner.release(block)
    }
}

/// Records every mapping request.
#[derive(Default)]
pub struct RecordingMapper {
    pub calls: Vec<(VirtAddr, usize, usize, MapFlags)>,
    pub fail_after: Option<usize>,
}

impl UserMapper for RecordingMapper {
    fn remap_pfn_range(&mut self, vaddr: VirtAddr, pfn: usize, size: usize, flags: MapFlags) -> IonResult {
        if self.fail_after == Some(self.calls.len()) {
            return ion_result_err!(EFAULT);
        }
        assert_eq!(size % PAGE_SIZE, 0);
        self.calls.push((vaddr, pfn, size, flags));
        Ok(())
    }
}
