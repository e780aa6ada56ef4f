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
//! Heaps by id and buffers by handle.

use alloc::collections::btree_map::{BTreeMap, Entry};
use alloc::sync::Arc;

use crate::config::{IonPlatformData, PlatformHeap};
use crate::error::IonResult;
use crate::heap::{HeapId, TilerAllocRequest, TilerBuffer, TilerHeap};
use crate::memory::{MemoryMap, SgTable, TilerAddr, UserMapper, VmArea};
use crate::tiler::TilerManager;

/// Client visible name of an allocated buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferHandle(u32);

impl BufferHandle {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Owns every heap of a device and every buffer allocated from them.
pub struct HeapRegistry<T: TilerManager + ?Sized> {
    tiler: Arc<T>,
    memmap: MemoryMap,
    heaps: BTreeMap<HeapId, TilerHeap<T>>,
    buffers: BTreeMap<BufferHandle, TilerBuffer<T>>,
    next_handle: u32,
}

impl<T: TilerManager + ?Sized> HeapRegistry<T> {
    pub fn new(tiler: Arc<T>, memmap: MemoryMap) -> Self {
        Self {
            tiler,
            memmap,
            heaps: BTreeMap::new(),
            buffers: BTreeMap::new(),
            next_handle: 0,
        }
    }

    /// Create every heap of `data`.
    pub fn init(data: &IonPlatformData, tiler: Arc<T>, memmap: MemoryMap) -> IonResult<Self> {
        data.check()?;
        let mut registry = Self::new(tiler, memmap);
        for heap in &data.heaps {
            registry.create_heap(heap)?;
        }
        info!("{} ion heaps registered", registry.heaps.len());
        Ok(registry)
    }

    pub fn create_heap(&mut self, data: &PlatformHeap) -> IonResult<HeapId> {
        data.check()?;
        let id = data.heap_id()?;
        match self.heaps.entry(id) {
            Entry::Occupied(_) => ion_result_err!(EEXIST, format!("heap {:?} exists", id)),
            Entry::Vacant(e) => {
                e.insert(TilerHeap::create(data, self.tiler.clone(), self.memmap.clone())?);
                Ok(id)
            }
        }
    }

    /// Remove heap `id`. Fails while buffers allocated from it are alive.
    pub fn destroy_heap(&mut self, id: HeapId) -> IonResult {
        if !self.heaps.contains_key(&id) {
            return ion_result_err!(ENOENT, format!("no heap {:?}", id));
        }
        let live = self.buffers.values().filter(|b| b.heap() == id).count();
        if live != 0 {
            warn!("heap {:?} still has {} buffers", id, live);
            return ion_result_err!(EBUSY);
        }
        self.heaps.remove(&id);
        info!("tiler heap {:?} destroyed", id);
        Ok(())
    }

    pub fn heap(&self, id: HeapId) -> Option<&TilerHeap<T>> {
        self.heaps.get(&id)
    }

    pub fn heap_count(&self) -> usize {
        self.heaps.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn heap_of(&self, id: HeapId) -> IonResult<&TilerHeap<T>> {
        self.heaps
            .get(&id)
            .ok_or_else(|| ion_err!(ENODEV, format!("no heap {:?}", id)))
    }

    pub fn allocate(&mut self, id: HeapId, req: &TilerAllocRequest) -> IonResult<BufferHandle> {
        let buffer = self.heap_of(id)?.allocate(req)?;
        self.next_handle = self.next_handle.wrapping_add(1);
        while self.buffers.contains_key(&BufferHandle(self.next_handle)) || self.next_handle == 0 {
            self.next_handle = self.next_handle.wrapping_add(1);
        }
        let handle = BufferHandle(self.next_handle);
        self.buffers.insert(handle, buffer);
        Ok(handle)
    }

    pub fn free(&mut self, handle: BufferHandle) -> IonResult {
        let buffer = self
            .buffers
            .remove(&handle)
            .ok_or_else(|| ion_err!(ENOENT, format!("no buffer {:?}", handle)))?;
        match self.heaps.get(&buffer.heap()) {
            Some(heap) => heap.free(buffer),
            None => drop(buffer),
        }
        Ok(())
    }

    pub fn buffer(&self, handle: BufferHandle) -> IonResult<&TilerBuffer<T>> {
        self.buffers
            .get(&handle)
            .ok_or_else(|| ion_err!(ENOENT, format!("no buffer {:?}", handle)))
    }

    fn heap_and_buffer(&self, handle: BufferHandle) -> IonResult<(&TilerHeap<T>, &TilerBuffer<T>)> {
        let buffer = self.buffer(handle)?;
        Ok((self.heap_of(buffer.heap())?, buffer))
    }

    pub fn phys(&self, handle: BufferHandle) -> IonResult<(TilerAddr, usize)> {
        let (heap, buffer) = self.heap_and_buffer(handle)?;
        Ok(heap.phys(buffer))
    }

    /// Tiler address of every page of the buffer.
    pub fn tiler_pages(&self, handle: BufferHandle) -> IonResult<&[TilerAddr]> {
        // validate that the handle exists
        self.phys(handle)?;
        Ok(self.buffer(handle)?.tiler_addrs())
    }

    pub fn vinfo(&self, handle: BufferHandle) -> IonResult<(usize, usize)> {
        let (heap, buffer) = self.heap_and_buffer(handle)?;
        Ok(heap.vinfo(buffer))
    }

    pub fn sg_table(&self, handle: BufferHandle) -> IonResult<&SgTable> {
        let (heap, buffer) = self.heap_and_buffer(handle)?;
        Ok(heap.map_dma(buffer))
    }

    pub fn map_user<M: UserMapper + ?Sized>(
        &self,
        handle: BufferHandle,
        vma: &VmArea,
        mapper: &mut M,
    ) -> IonResult {
        let (heap, buffer) = self.heap_and_buffer(handle)?;
        heap.map_user(buffer, vma, mapper)
    }
}

#[cfg(test)]
mod tests;
