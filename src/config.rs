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
//! Platform description of the ION heaps.

use alloc::string::String;
use alloc::vec::Vec;

use crate::consts::HEAP_NAME_MAXLEN;
use crate::error::IonResult;
use crate::heap::HeapId;
use crate::memory::addr::is_aligned;
use crate::memory::PhysAddr;

/// One heap as described by the board file.
#[derive(Debug, Clone)]
pub struct PlatformHeap {
    /// Raw heap id.
    pub id: u32,
    pub name: String,
    /// Carveout base, only meaningful for carveout backed heaps.
    pub base: PhysAddr,
    pub size: usize,
    /// Map buffers to user space as shared device memory instead of
    /// write-combined memory.
    pub device_shared_mappings: bool,
}

impl PlatformHeap {
    pub fn new(id: HeapId, name: &str, base: PhysAddr, size: usize) -> Self {
        Self {
            id: id as u32,
            name: String::from(name),
            base,
            size,
            device_shared_mappings: false,
        }
    }

    pub fn with_device_shared_mappings(mut self) -> Self {
        self.device_shared_mappings = true;
        self
    }

    pub fn heap_id(&self) -> IonResult<HeapId> {
        HeapId::try_from(self.id)
            .map_err(|_| ion_err!(EINVAL, format!("unknown heap id {}", self.id)))
    }

    pub fn check(&self) -> IonResult {
        let id = self.heap_id()?;
        if self.name.is_empty() || self.name.len() > HEAP_NAME_MAXLEN {
            return ion_result_err!(EINVAL, format!("bad heap name {:?}", self.name));
        }
        if id.uses_carveout() {
            if self.size == 0 {
                return ion_result_err!(EINVAL, format!("heap {:?} has no carveout", id));
            }
            if !is_aligned(self.base) || !is_aligned(self.size) {
                return ion_result_err!(
                    EINVAL,
                    format!("heap {:?} carveout {:#x}+{:#x} not page aligned", id, self.base, self.size)
                );
            }
            if self.base.checked_add(self.size).is_none() {
                return ion_result_err!(ERANGE);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IonPlatformData {
    pub heaps: Vec<PlatformHeap>,
}

impl IonPlatformData {
    pub fn new(heaps: Vec<PlatformHeap>) -> Self {
        Self { heaps }
    }

    /// Validate every heap and reject duplicate ids or overlapping carveouts.
    pub fn check(&self) -> IonResult {
        for (i, heap) in self.heaps.iter().enumerate() {
            heap.check()?;
            for other in &self.heaps[..i] {
                if other.id == heap.id {
                    return ion_result_err!(EEXIST, format!("heap id {} listed twice", heap.id));
                }
                if carveout_overlaps(heap, other) {
                    return ion_result_err!(
                        EINVAL,
                        format!("carveouts of \"{}\" and \"{}\" overlap", heap.name, other.name)
                    );
                }
            }
        }
        Ok(())
    }
}

fn carveout_overlaps(a: &PlatformHeap, b: &PlatformHeap) -> bool {
    let has_pool = |h: &PlatformHeap| h.heap_id().is_ok_and(HeapId::uses_carveout);
    if !has_pool(a) || !has_pool(b) {
        return false;
    }
    !(a.base + a.size <= b.base || b.base + b.size <= a.base)
}
