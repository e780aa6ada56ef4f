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
//! Tiler-backed ION heap for OMAP4-class SoCs.
//!
//! Buffers are carved out of a reserved physical pool, given a view in the
//! DMM/TILER address space, pinned into the tiler's page tables and described
//! to DMA clients through a scatter-gather table.
#![no_std]

#[macro_use]
extern crate alloc;
#[macro_use]
extern crate log;
#[cfg(test)]
extern crate std;

#[macro_use]
pub mod error;
#[macro_use]
pub mod logging;

pub mod config;
pub mod consts;
pub mod heap;
pub mod memory;
pub mod registry;
pub mod tiler;

#[cfg(test)]
mod tests;

pub use config::{IonPlatformData, PlatformHeap};
pub use error::{IonError, IonErrorNum, IonResult};
pub use heap::{HeapId, TilerAllocRequest, TilerBuffer, TilerHeap};
pub use memory::{
    CarveoutPool, MapFlags, MemoryMap, PhysAddr, SgEntry, SgTable, UserMapper, VmArea,
};
pub use registry::{BufferHandle, HeapRegistry};
pub use tiler::{container::SoftTiler, TilerBlock, TilerFormat, TilerManager};
