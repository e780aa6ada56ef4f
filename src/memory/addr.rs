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
use super::PAGE_SIZE;

pub type PhysAddr = usize;
pub type VirtAddr = usize;
/// Address inside one of the tiler views.
pub type TilerAddr = usize;

pub const fn align_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

pub const fn is_aligned(addr: usize) -> bool {
    page_offset(addr) == 0
}

pub const fn page_offset(addr: usize) -> usize {
    addr & (PAGE_SIZE - 1)
}

/// Round `value` up to a multiple of `align`, which need not be a power of two.
pub const fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Number of pages needed to hold `size` bytes.
pub const fn pages_of(size: usize) -> usize {
    align_up(size) / PAGE_SIZE
}

pub const fn phys_to_pfn(paddr: PhysAddr) -> usize {
    paddr >> super::PAGE_SHIFT
}
